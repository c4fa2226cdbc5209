//! Deduplicated lookup entities and the join rows that link them.
//!
//! Every natural key is backed by a unique index, so find-or-create is an
//! `INSERT .. ON CONFLICT DO NOTHING` followed by a re-read. Racing callers
//! all land on the single surviving row.

use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DbErr,
    EntityTrait, IntoActiveModel, QueryFilter, Set, sea_query::OnConflict,
};
use tracing::debug;

use crate::{
    entities::{
        country, film_country, film_genre, film_language_audio, film_language_subtitle,
        film_person, film_quality, film_role, genre, language, person_film_role, quality,
    },
    error::{CatalogError, CatalogResult},
    slug::slugify,
};

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// A reference entity keyed by its natural key, plus the defaults used when
/// it has to be created.
#[derive(Clone, Copy, Debug)]
pub enum Reference<'a> {
    Country(&'a str),
    Quality(&'a str),
    Language(&'a str),
    Genre { name_primary: &'a str, name_secondary: Option<&'a str>, slug: Option<&'a str> },
    FilmRole { name: &'a str, slug: Option<&'a str> },
}

impl Reference<'_> {
    pub fn kind(&self) -> &'static str {
        match self {
            Reference::Country(_) => "country",
            Reference::Quality(_) => "quality",
            Reference::Language(_) => "language",
            Reference::Genre { .. } => "genre",
            Reference::FilmRole { .. } => "film role",
        }
    }

    fn natural_key(&self) -> &str {
        match self {
            Reference::Country(name) | Reference::Quality(name) | Reference::Language(name) => {
                name
            },
            Reference::Genre { name_primary, .. } => name_primary,
            Reference::FilmRole { name, .. } => name,
        }
    }
}

/// Join relations, each row linking `left` to `right`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Join {
    FilmGenre,
    FilmQuality,
    FilmAudio,
    FilmSubtitle,
    FilmCountry,
    /// `left` is the film, `right` the person.
    FilmPerson,
    /// `left` is the person, `right` the role.
    PersonRole,
}

#[derive(Clone, Debug)]
pub struct ReferenceStore {
    db: DatabaseConnection,
}

impl ReferenceStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Returns the id of the row holding this natural key, creating it first
    /// if needed. Country, quality, language and genre keys match exactly as
    /// supplied; role names are lower-cased.
    pub async fn resolve(&self, reference: Reference<'_>) -> CatalogResult<String> {
        let key = reference.natural_key();
        if key.trim().is_empty() {
            return Err(CatalogError::validation(format!("{} name is empty", reference.kind())));
        }

        let id = match reference {
            Reference::Country(name) => {
                let model = country::ActiveModel {
                    id: Set(new_id()),
                    name: Set(name.to_string()),
                    slug: Set(slugify(name)),
                };
                insert_or_fetch(
                    &self.db,
                    model,
                    OnConflict::column(country::Column::Name).do_nothing().to_owned(),
                    Condition::all().add(country::Column::Name.eq(name)),
                )
                .await?
                .id
            },
            Reference::Quality(name) => {
                let model = quality::ActiveModel { id: Set(new_id()), name: Set(name.to_string()) };
                insert_or_fetch(
                    &self.db,
                    model,
                    OnConflict::column(quality::Column::Name).do_nothing().to_owned(),
                    Condition::all().add(quality::Column::Name.eq(name)),
                )
                .await?
                .id
            },
            Reference::Language(name) => {
                let model = language::ActiveModel {
                    id: Set(new_id()),
                    name: Set(name.to_string()),
                    slug: Set(slugify(name)),
                };
                insert_or_fetch(
                    &self.db,
                    model,
                    OnConflict::column(language::Column::Name).do_nothing().to_owned(),
                    Condition::all().add(language::Column::Name.eq(name)),
                )
                .await?
                .id
            },
            Reference::Genre { name_primary, name_secondary, slug } => {
                let slug = supplied_or_derived(slug, name_secondary.unwrap_or(name_primary));
                let model = genre::ActiveModel {
                    id: Set(new_id()),
                    name_primary: Set(name_primary.to_string()),
                    name_secondary: Set(name_secondary.map(str::to_string)),
                    slug: Set(slug),
                };
                insert_or_fetch(
                    &self.db,
                    model,
                    OnConflict::column(genre::Column::NamePrimary).do_nothing().to_owned(),
                    Condition::all().add(genre::Column::NamePrimary.eq(name_primary)),
                )
                .await?
                .id
            },
            Reference::FilmRole { name, slug } => {
                let name = name.to_lowercase();
                let slug = supplied_or_derived(slug, &name);
                let model = film_role::ActiveModel {
                    id: Set(new_id()),
                    name: Set(name.clone()),
                    slug: Set(slug),
                };
                insert_or_fetch(
                    &self.db,
                    model,
                    OnConflict::column(film_role::Column::Name).do_nothing().to_owned(),
                    Condition::all().add(film_role::Column::Name.eq(name)),
                )
                .await?
                .id
            },
        };

        debug!(kind = reference.kind(), key = %key, id = %id, "resolved reference");
        Ok(id)
    }

    /// Inserts the join row unless it already exists. Returns whether a row
    /// was written.
    pub async fn link(&self, join: Join, left: &str, right: &str) -> CatalogResult<bool> {
        let (left, right) = (left.to_string(), right.to_string());
        let written = match join {
            Join::FilmGenre => {
                let model = film_genre::ActiveModel {
                    film_id: Set(left),
                    genre_id: Set(right),
                    ..Default::default()
                };
                insert_ignore(
                    &self.db,
                    model,
                    OnConflict::columns([film_genre::Column::FilmId, film_genre::Column::GenreId]),
                )
                .await?
            },
            Join::FilmQuality => {
                let model = film_quality::ActiveModel {
                    film_id: Set(left),
                    quality_id: Set(right),
                    ..Default::default()
                };
                insert_ignore(
                    &self.db,
                    model,
                    OnConflict::columns([
                        film_quality::Column::FilmId,
                        film_quality::Column::QualityId,
                    ]),
                )
                .await?
            },
            Join::FilmAudio => {
                let model = film_language_audio::ActiveModel {
                    film_id: Set(left),
                    language_id: Set(right),
                    ..Default::default()
                };
                insert_ignore(
                    &self.db,
                    model,
                    OnConflict::columns([
                        film_language_audio::Column::FilmId,
                        film_language_audio::Column::LanguageId,
                    ]),
                )
                .await?
            },
            Join::FilmSubtitle => {
                let model = film_language_subtitle::ActiveModel {
                    film_id: Set(left),
                    language_id: Set(right),
                    ..Default::default()
                };
                insert_ignore(
                    &self.db,
                    model,
                    OnConflict::columns([
                        film_language_subtitle::Column::FilmId,
                        film_language_subtitle::Column::LanguageId,
                    ]),
                )
                .await?
            },
            Join::FilmCountry => {
                let model = film_country::ActiveModel {
                    film_id: Set(left),
                    country_id: Set(right),
                    ..Default::default()
                };
                insert_ignore(
                    &self.db,
                    model,
                    OnConflict::columns([
                        film_country::Column::FilmId,
                        film_country::Column::CountryId,
                    ]),
                )
                .await?
            },
            Join::FilmPerson => {
                let model = film_person::ActiveModel {
                    film_id: Set(left),
                    person_id: Set(right),
                    ..Default::default()
                };
                insert_ignore(
                    &self.db,
                    model,
                    OnConflict::columns([film_person::Column::FilmId, film_person::Column::PersonId]),
                )
                .await?
            },
            Join::PersonRole => {
                let model = person_film_role::ActiveModel {
                    person_id: Set(left),
                    film_role_id: Set(right),
                    ..Default::default()
                };
                insert_ignore(
                    &self.db,
                    model,
                    OnConflict::columns([
                        person_film_role::Column::PersonId,
                        person_film_role::Column::FilmRoleId,
                    ]),
                )
                .await?
            },
        };

        Ok(written)
    }
}

fn supplied_or_derived(supplied: Option<&str>, name: &str) -> String {
    match supplied.map(str::trim).filter(|s| !s.is_empty()) {
        Some(slug) => slug.to_lowercase(),
        None => slugify(name),
    }
}

/// `INSERT .. ON CONFLICT DO NOTHING`, then read back whichever row owns the
/// key.
pub(crate) async fn insert_or_fetch<A>(
    db: &DatabaseConnection,
    model: A,
    on_conflict: OnConflict,
    key: Condition,
) -> CatalogResult<<A::Entity as EntityTrait>::Model>
where
    A: ActiveModelTrait + ActiveModelBehavior + Send,
    <A::Entity as EntityTrait>::Model: IntoActiveModel<A>,
{
    <A::Entity as EntityTrait>::insert(model)
        .on_conflict(on_conflict)
        .exec_without_returning(db)
        .await?;

    <A::Entity as EntityTrait>::find()
        .filter(key)
        .one(db)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound("row for natural key vanished".to_string()).into())
}

/// Returns `false` when the conflict target already held the key.
pub(crate) async fn insert_ignore<A>(
    db: &DatabaseConnection,
    model: A,
    mut on_conflict: OnConflict,
) -> CatalogResult<bool>
where
    A: ActiveModelTrait + ActiveModelBehavior + Send,
    <A::Entity as EntityTrait>::Model: IntoActiveModel<A>,
{
    let rows = <A::Entity as EntityTrait>::insert(model)
        .on_conflict(on_conflict.do_nothing().to_owned())
        .exec_without_returning(db)
        .await?;
    Ok(rows > 0)
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, sync::Arc};

    use sea_orm::PaginatorTrait;
    use tokio::sync::Barrier;

    use super::*;
    use crate::db;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_encounters_yield_one_row() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = ReferenceStore::new(db::file_backed(&dir, 8).await);
        let start = Arc::new(Barrier::new(32));

        let handles: Vec<_> = (0..32)
            .map(|i| {
                let store = store.clone();
                let start = start.clone();
                tokio::spawn(async move {
                    start.wait().await;
                    if i % 2 == 0 {
                        store.resolve(Reference::Country("France")).await
                    } else {
                        store.resolve(Reference::FilmRole { name: "Director", slug: None }).await
                    }
                })
            })
            .collect();

        let mut countries = HashSet::new();
        let mut roles = HashSet::new();
        for (i, handle) in handles.into_iter().enumerate() {
            let id = handle.await.unwrap().unwrap();
            let seen = if i % 2 == 0 { &mut countries } else { &mut roles };
            seen.insert(id);
        }

        assert_eq!(countries.len(), 1);
        assert_eq!(roles.len(), 1);
        assert_eq!(country::Entity::find().count(store.db()).await.unwrap(), 1);
        assert_eq!(film_role::Entity::find().count(store.db()).await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_links_write_one_row() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = ReferenceStore::new(db::file_backed(&dir, 8).await);
        let start = Arc::new(Barrier::new(16));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                let start = start.clone();
                tokio::spawn(async move {
                    start.wait().await;
                    store.link(Join::FilmPerson, "film-1", "person-1").await
                })
            })
            .collect();

        let mut written = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() {
                written += 1;
            }
        }

        assert_eq!(written, 1);
        assert_eq!(film_person::Entity::find().count(store.db()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn resolve_reuses_existing_row_and_derives_slug() {
        let store = ReferenceStore::new(db::memory().await);

        let first = store.resolve(Reference::Language("Русский")).await.unwrap();
        let again = store.resolve(Reference::Language("Русский")).await.unwrap();
        assert_eq!(first, again);

        let row = language::Entity::find_by_id(first).one(store.db()).await.unwrap().unwrap();
        assert_eq!(row.slug, "russkii");
    }

    #[tokio::test]
    async fn natural_keys_are_case_sensitive_except_roles() {
        let store = ReferenceStore::new(db::memory().await);

        let upper = store.resolve(Reference::Quality("HD")).await.unwrap();
        let lower = store.resolve(Reference::Quality("hd")).await.unwrap();
        assert_ne!(upper, lower);

        let actor = store.resolve(Reference::FilmRole { name: "Actor", slug: None }).await.unwrap();
        let same = store
            .resolve(Reference::FilmRole { name: "actor", slug: Some("ACTOR") })
            .await
            .unwrap();
        assert_eq!(actor, same);

        let role = film_role::Entity::find_by_id(actor).one(store.db()).await.unwrap().unwrap();
        assert_eq!((role.name.as_str(), role.slug.as_str()), ("actor", "actor"));
    }

    #[tokio::test]
    async fn genre_keeps_supplied_slug() {
        let store = ReferenceStore::new(db::memory().await);

        let id = store
            .resolve(Reference::Genre {
                name_primary: "драма",
                name_secondary: Some("drama"),
                slug: Some("Drama"),
            })
            .await
            .unwrap();

        let row = genre::Entity::find_by_id(id).one(store.db()).await.unwrap().unwrap();
        assert_eq!(row.slug, "drama");
        assert_eq!(row.name_secondary.as_deref(), Some("drama"));
    }

    #[tokio::test]
    async fn empty_key_is_rejected() {
        let store = ReferenceStore::new(db::memory().await);

        let err = store.resolve(Reference::Country("  ")).await.unwrap_err();
        assert!(matches!(err, CatalogError::Validation(_)));
        assert_eq!(country::Entity::find().count(store.db()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn linking_twice_writes_one_row() {
        let store = ReferenceStore::new(db::memory().await);

        assert!(store.link(Join::FilmPerson, "film-1", "person-1").await.unwrap());
        assert!(!store.link(Join::FilmPerson, "film-1", "person-1").await.unwrap());
        assert!(store.link(Join::FilmPerson, "film-1", "person-2").await.unwrap());

        assert_eq!(film_person::Entity::find().count(store.db()).await.unwrap(), 2);
    }
}
