use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Person::Table)
                    .if_not_exists()
                    .col(string(Person::Id).primary_key())
                    .col(string(Person::FirstNamePrimary))
                    .col(string(Person::LastNamePrimary))
                    .col(string_null(Person::FirstNameSecondary))
                    .col(string_null(Person::LastNameSecondary))
                    .col(string_null(Person::Image))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_person_name_unique")
                    .table(Person::Table)
                    .col(Person::FirstNamePrimary)
                    .col(Person::LastNamePrimary)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FilmRole::Table)
                    .if_not_exists()
                    .col(string(FilmRole::Id).primary_key())
                    .col(string(FilmRole::Name))
                    .col(string(FilmRole::Slug))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_film_role_name_unique")
                    .table(FilmRole::Table)
                    .col(FilmRole::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FilmPerson::Table)
                    .if_not_exists()
                    .col(pk_auto(FilmPerson::Id))
                    .col(string(FilmPerson::FilmId))
                    .col(string(FilmPerson::PersonId))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_film_person_unique")
                    .table(FilmPerson::Table)
                    .col(FilmPerson::FilmId)
                    .col(FilmPerson::PersonId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PersonFilmRole::Table)
                    .if_not_exists()
                    .col(pk_auto(PersonFilmRole::Id))
                    .col(string(PersonFilmRole::PersonId))
                    .col(string(PersonFilmRole::FilmRoleId))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_person_film_role_unique")
                    .table(PersonFilmRole::Table)
                    .col(PersonFilmRole::PersonId)
                    .col(PersonFilmRole::FilmRoleId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(PersonFilmRole::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(FilmPerson::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(FilmRole::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Person::Table).to_owned()).await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Person {
    Table,
    Id,
    FirstNamePrimary,
    LastNamePrimary,
    FirstNameSecondary,
    LastNameSecondary,
    Image,
}

#[derive(DeriveIden)]
enum FilmRole {
    Table,
    Id,
    Name,
    Slug,
}

#[derive(DeriveIden)]
enum FilmPerson {
    Table,
    Id,
    FilmId,
    PersonId,
}

#[derive(DeriveIden)]
enum PersonFilmRole {
    Table,
    Id,
    PersonId,
    FilmRoleId,
}
