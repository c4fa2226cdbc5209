use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Film::Table)
                    .if_not_exists()
                    .col(string(Film::Id).primary_key())
                    .col(string(Film::NamePrimary))
                    .col(string_null(Film::NameSecondary))
                    .col(text(Film::Description))
                    .col(integer(Film::Year))
                    .col(double(Film::Rating))
                    .col(integer(Film::Assessments))
                    .col(integer(Film::Reviews))
                    .col(integer(Film::AgeLimit))
                    .col(string(Film::Duration))
                    .col(string_null(Film::Image))
                    .col(big_integer(Film::CreatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_film_name_year_unique")
                    .table(Film::Table)
                    .col(Film::NamePrimary)
                    .col(Film::Year)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_film_created_at")
                    .table(Film::Table)
                    .col(Film::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Trailer::Table)
                    .if_not_exists()
                    .col(string(Trailer::Id).primary_key())
                    .col(string(Trailer::FilmId))
                    .col(string(Trailer::Url))
                    .col(string(Trailer::Image))
                    .col(string(Trailer::Date))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_trailer_film")
                    .table(Trailer::Table)
                    .col(Trailer::FilmId)
                    .to_owned(),
            )
            .await?;

        for (table, name) in [
            (Reference::Country, "idx_country_name_unique"),
            (Reference::Quality, "idx_quality_name_unique"),
            (Reference::Language, "idx_language_name_unique"),
        ] {
            let mut create = Table::create();
            create
                .table(table)
                .if_not_exists()
                .col(string(Reference::Id).primary_key())
                .col(string(Reference::Name));
            if !matches!(table, Reference::Quality) {
                create.col(string(Reference::Slug));
            }
            manager.create_table(create.to_owned()).await?;

            manager
                .create_index(
                    Index::create()
                        .name(name)
                        .table(table)
                        .col(Reference::Name)
                        .unique()
                        .to_owned(),
                )
                .await?;
        }

        manager
            .create_table(
                Table::create()
                    .table(Genre::Table)
                    .if_not_exists()
                    .col(string(Genre::Id).primary_key())
                    .col(string(Genre::NamePrimary))
                    .col(string_null(Genre::NameSecondary))
                    .col(string(Genre::Slug))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_genre_name_unique")
                    .table(Genre::Table)
                    .col(Genre::NamePrimary)
                    .unique()
                    .to_owned(),
            )
            .await?;

        for (table, target) in [
            (Link::FilmGenre, Link::GenreId),
            (Link::FilmQuality, Link::QualityId),
            (Link::FilmLanguageAudio, Link::LanguageId),
            (Link::FilmLanguageSubtitle, Link::LanguageId),
            (Link::FilmCountry, Link::CountryId),
        ] {
            create_link_table(manager, table, target).await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for table in [
            Link::FilmCountry,
            Link::FilmLanguageSubtitle,
            Link::FilmLanguageAudio,
            Link::FilmQuality,
            Link::FilmGenre,
        ] {
            manager.drop_table(Table::drop().table(table).to_owned()).await?;
        }
        manager.drop_table(Table::drop().table(Genre::Table).to_owned()).await?;
        for table in [Reference::Language, Reference::Quality, Reference::Country] {
            manager.drop_table(Table::drop().table(table).to_owned()).await?;
        }
        manager.drop_table(Table::drop().table(Trailer::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Film::Table).to_owned()).await?;
        Ok(())
    }
}

async fn create_link_table(
    manager: &SchemaManager<'_>,
    table: Link,
    target: Link,
) -> Result<(), DbErr> {
    manager
        .create_table(
            Table::create()
                .table(table)
                .if_not_exists()
                .col(pk_auto(Link::Id))
                .col(string(Link::FilmId))
                .col(string(target))
                .to_owned(),
        )
        .await?;

    manager
        .create_index(
            Index::create()
                .name(format!("idx_{}_unique", table.to_string()))
                .table(table)
                .col(Link::FilmId)
                .col(target)
                .unique()
                .to_owned(),
        )
        .await?;

    Ok(())
}

#[derive(DeriveIden)]
enum Film {
    Table,
    Id,
    NamePrimary,
    NameSecondary,
    Description,
    Year,
    Rating,
    Assessments,
    Reviews,
    AgeLimit,
    Duration,
    Image,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Trailer {
    Table,
    Id,
    FilmId,
    Url,
    Image,
    Date,
}

#[derive(DeriveIden, Clone, Copy)]
enum Reference {
    Country,
    Quality,
    Language,
    Id,
    Name,
    Slug,
}

#[derive(DeriveIden)]
enum Genre {
    Table,
    Id,
    NamePrimary,
    NameSecondary,
    Slug,
}

#[derive(DeriveIden, Clone, Copy)]
enum Link {
    FilmGenre,
    FilmQuality,
    FilmLanguageAudio,
    FilmLanguageSubtitle,
    FilmCountry,
    Id,
    FilmId,
    GenreId,
    QualityId,
    LanguageId,
    CountryId,
}
