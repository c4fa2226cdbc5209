use std::collections::{HashMap, HashSet};

use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, JoinType, QueryFilter, QueryOrder, QuerySelect,
    RelationTrait,
};

use crate::{
    entities::{
        country, film, film_country, film_genre, film_language_audio, film_language_subtitle,
        film_person, film_quality, film_role, genre, language, person, person_film_role, quality,
        trailer,
    },
    error::CatalogResult,
    models::{FilmRef, FilmSummary, FilmView, GenreDetails, PersonView},
};

#[derive(Clone, Debug)]
pub struct FilmReader {
    db: DatabaseConnection,
}

impl FilmReader {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn film(&self, id: &str) -> CatalogResult<Option<FilmView>> {
        let Some(film) = film::Entity::find_by_id(id.to_string()).one(&self.db).await? else {
            return Ok(None);
        };
        Ok(self.hydrate(vec![film]).await?.pop())
    }

    pub async fn all_films(&self, limit: u64) -> CatalogResult<Vec<FilmView>> {
        let films = film::Entity::find()
            .order_by_asc(film::Column::CreatedAt)
            .order_by_asc(film::Column::Id)
            .limit(limit)
            .all(&self.db)
            .await?;
        self.hydrate(films).await
    }

    pub async fn films_by_ids(&self, ids: &[String]) -> CatalogResult<Vec<FilmView>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let films = film::Entity::find()
            .filter(film::Column::Id.is_in(ids.iter().cloned()))
            .order_by_asc(film::Column::CreatedAt)
            .order_by_asc(film::Column::Id)
            .all(&self.db)
            .await?;
        self.hydrate(films).await
    }

    /// Case-insensitive substring match against either film name.
    pub async fn films_by_name(&self, name: &str) -> CatalogResult<Vec<FilmView>> {
        let needle = name.trim().to_lowercase();
        let films = film::Entity::find()
            .order_by_asc(film::Column::CreatedAt)
            .order_by_asc(film::Column::Id)
            .all(&self.db)
            .await?
            .into_iter()
            .filter(|f| {
                contains_folded(&f.name_primary, &needle)
                    || f.name_secondary.as_deref().is_some_and(|n| contains_folded(n, &needle))
            })
            .collect();
        self.hydrate(films).await
    }

    /// Loads every related collection for `films`, keeping their order.
    pub async fn hydrate(&self, films: Vec<film::Model>) -> CatalogResult<Vec<FilmView>> {
        if films.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<String> = films.iter().map(|f| f.id.clone()).collect();

        let mut trailers: HashMap<String, Vec<trailer::Model>> = HashMap::new();
        for row in trailer::Entity::find()
            .filter(trailer::Column::FilmId.is_in(ids.iter().cloned()))
            .order_by_asc(trailer::Column::Date)
            .order_by_asc(trailer::Column::Url)
            .all(&self.db)
            .await?
        {
            trailers.entry(row.film_id.clone()).or_default().push(row);
        }

        let pairs = link_pairs::<film_genre::Entity>(
            &self.db,
            film_genre::Column::FilmId,
            film_genre::Column::GenreId,
            &ids,
        )
        .await?;
        let rows = genre::Entity::find()
            .filter(genre::Column::Id.is_in(targets(&pairs)))
            .order_by_asc(genre::Column::NamePrimary)
            .all(&self.db)
            .await?;
        let mut genres = group(&pairs, rows, |g| &g.id);

        let pairs = link_pairs::<film_quality::Entity>(
            &self.db,
            film_quality::Column::FilmId,
            film_quality::Column::QualityId,
            &ids,
        )
        .await?;
        let rows = quality::Entity::find()
            .filter(quality::Column::Id.is_in(targets(&pairs)))
            .order_by_asc(quality::Column::Name)
            .all(&self.db)
            .await?;
        let mut qualities = group(&pairs, rows, |q| &q.id);

        let audio_pairs = link_pairs::<film_language_audio::Entity>(
            &self.db,
            film_language_audio::Column::FilmId,
            film_language_audio::Column::LanguageId,
            &ids,
        )
        .await?;
        let subtitle_pairs = link_pairs::<film_language_subtitle::Entity>(
            &self.db,
            film_language_subtitle::Column::FilmId,
            film_language_subtitle::Column::LanguageId,
            &ids,
        )
        .await?;
        let language_ids = targets(&audio_pairs).chain(targets(&subtitle_pairs));
        let rows = language::Entity::find()
            .filter(language::Column::Id.is_in(language_ids))
            .order_by_asc(language::Column::Name)
            .all(&self.db)
            .await?;
        let mut languages_audio = group(&audio_pairs, rows.clone(), |l| &l.id);
        let mut languages_subtitle = group(&subtitle_pairs, rows, |l| &l.id);

        let pairs = link_pairs::<film_country::Entity>(
            &self.db,
            film_country::Column::FilmId,
            film_country::Column::CountryId,
            &ids,
        )
        .await?;
        let rows = country::Entity::find()
            .filter(country::Column::Id.is_in(targets(&pairs)))
            .order_by_asc(country::Column::Name)
            .all(&self.db)
            .await?;
        let mut countries = group(&pairs, rows, |c| &c.id);

        Ok(films
            .into_iter()
            .map(|film| FilmView {
                trailers: trailers.remove(&film.id).unwrap_or_default(),
                genres: genres.remove(&film.id).unwrap_or_default(),
                qualities: qualities.remove(&film.id).unwrap_or_default(),
                languages_audio: languages_audio.remove(&film.id).unwrap_or_default(),
                languages_subtitle: languages_subtitle.remove(&film.id).unwrap_or_default(),
                countries: countries.remove(&film.id).unwrap_or_default(),
                film,
            })
            .collect())
    }

    pub async fn genre(&self, id: &str) -> CatalogResult<Option<GenreDetails>> {
        let Some(genre) = genre::Entity::find_by_id(id.to_string()).one(&self.db).await? else {
            return Ok(None);
        };

        let films = film::Entity::find()
            .join(JoinType::InnerJoin, film_genre::Relation::Film.def().rev())
            .filter(film_genre::Column::GenreId.eq(id))
            .order_by_asc(film::Column::CreatedAt)
            .order_by_asc(film::Column::Id)
            .all(&self.db)
            .await?
            .into_iter()
            .map(FilmSummary::from)
            .collect();

        Ok(Some(GenreDetails { genre, films }))
    }

    pub async fn genres(&self, limit: u64) -> CatalogResult<Vec<genre::Model>> {
        Ok(genre::Entity::find()
            .order_by_asc(genre::Column::NamePrimary)
            .limit(limit)
            .all(&self.db)
            .await?)
    }

    pub async fn countries(&self) -> CatalogResult<Vec<country::Model>> {
        Ok(country::Entity::find().order_by_asc(country::Column::Name).all(&self.db).await?)
    }

    /// Case-insensitive substring match on name or slug.
    pub async fn countries_by_name(&self, name: &str) -> CatalogResult<Vec<country::Model>> {
        let needle = name.trim().to_lowercase();
        Ok(self
            .countries()
            .await?
            .into_iter()
            .filter(|c| contains_folded(&c.name, &needle) || contains_folded(&c.slug, &needle))
            .collect())
    }
}

#[derive(Clone, Debug)]
pub struct PersonReader {
    db: DatabaseConnection,
}

impl PersonReader {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn person(&self, id: &str) -> CatalogResult<Option<PersonView>> {
        let Some(person) = person::Entity::find_by_id(id.to_string()).one(&self.db).await? else {
            return Ok(None);
        };
        Ok(self.hydrate(vec![person]).await?.pop())
    }

    pub async fn all_persons(&self, limit: u64) -> CatalogResult<Vec<PersonView>> {
        let persons = person::Entity::find()
            .order_by_asc(person::Column::LastNamePrimary)
            .order_by_asc(person::Column::FirstNamePrimary)
            .limit(limit)
            .all(&self.db)
            .await?;
        self.hydrate(persons).await
    }

    /// Everyone linked to `film_id`, in the order they were linked.
    pub async fn persons_from_film(&self, film_id: &str) -> CatalogResult<Vec<PersonView>> {
        let persons = person::Entity::find()
            .join(JoinType::InnerJoin, film_person::Relation::Person.def().rev())
            .filter(film_person::Column::FilmId.eq(film_id))
            .order_by_asc(film_person::Column::Id)
            .all(&self.db)
            .await?;
        self.hydrate(persons).await
    }

    pub async fn hydrate(&self, persons: Vec<person::Model>) -> CatalogResult<Vec<PersonView>> {
        if persons.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<String> = persons.iter().map(|p| p.id.clone()).collect();

        let pairs = link_pairs::<person_film_role::Entity>(
            &self.db,
            person_film_role::Column::PersonId,
            person_film_role::Column::FilmRoleId,
            &ids,
        )
        .await?;
        let rows = film_role::Entity::find()
            .filter(film_role::Column::Id.is_in(targets(&pairs)))
            .order_by_asc(film_role::Column::Name)
            .all(&self.db)
            .await?;
        let mut roles = group(&pairs, rows, |r| &r.id);

        let links: Vec<(String, String)> = film_person::Entity::find()
            .select_only()
            .column(film_person::Column::PersonId)
            .column(film_person::Column::FilmId)
            .filter(film_person::Column::PersonId.is_in(ids.iter().cloned()))
            .order_by_asc(film_person::Column::Id)
            .into_tuple()
            .all(&self.db)
            .await?;
        let mut films: HashMap<String, Vec<String>> = HashMap::new();
        for (person_id, film_id) in links {
            films.entry(person_id).or_default().push(film_id);
        }

        Ok(persons
            .into_iter()
            .map(|person| PersonView {
                roles: roles.remove(&person.id).unwrap_or_default(),
                films: dedup_film_refs(films.remove(&person.id).unwrap_or_default()),
                person,
            })
            .collect())
    }
}

/// Drops repeated film ids, keeping the first occurrence of each.
pub fn dedup_film_refs(film_ids: impl IntoIterator<Item = String>) -> Vec<FilmRef> {
    let mut seen = HashSet::new();
    film_ids
        .into_iter()
        .filter(|id| seen.insert(id.clone()))
        .map(|film_id| FilmRef { film_id })
        .collect()
}

pub(crate) fn contains_folded(haystack: &str, folded_needle: &str) -> bool {
    haystack.to_lowercase().contains(folded_needle)
}

/// `(owner, target)` id pairs from a join table for the given owners.
async fn link_pairs<J: EntityTrait>(
    db: &DatabaseConnection,
    owner: J::Column,
    target: J::Column,
    owner_ids: &[String],
) -> CatalogResult<Vec<(String, String)>> {
    Ok(J::find()
        .select_only()
        .column(owner)
        .column(target)
        .filter(owner.is_in(owner_ids.iter().cloned()))
        .into_tuple()
        .all(db)
        .await?)
}

fn targets(pairs: &[(String, String)]) -> impl Iterator<Item = String> + '_ {
    pairs.iter().map(|(_, target)| target.clone())
}

/// Distributes `rows` to their owners; each owner's list keeps `rows` order.
fn group<M: Clone>(
    pairs: &[(String, String)],
    rows: Vec<M>,
    id_of: impl Fn(&M) -> &String,
) -> HashMap<String, Vec<M>> {
    let mut owners: HashMap<&str, Vec<&str>> = HashMap::new();
    for (owner, target) in pairs {
        owners.entry(target.as_str()).or_default().push(owner.as_str());
    }

    let mut grouped: HashMap<String, Vec<M>> = HashMap::new();
    for row in rows {
        if let Some(list) = owners.get(id_of(&row).as_str()) {
            for owner in list {
                grouped.entry((*owner).to_string()).or_default().push(row.clone());
            }
        }
    }
    grouped
}

#[cfg(test)]
mod tests {
    use sea_orm::{ActiveModelTrait, Set};

    use super::*;
    use crate::{
        db,
        reference::{Join, Reference, ReferenceStore},
    };

    async fn insert_film(db: &DatabaseConnection, id: &str, name: &str, created_at: i64) {
        film::ActiveModel {
            id: Set(id.to_string()),
            name_primary: Set(name.to_string()),
            name_secondary: Set(None),
            description: Set(String::new()),
            year: Set(2000),
            rating: Set(7.0),
            assessments: Set(10),
            reviews: Set(1),
            age_limit: Set(16),
            duration: Set("1:40".to_string()),
            image: Set(None),
            created_at: Set(created_at),
        }
        .insert(db)
        .await
        .unwrap();
    }

    #[test]
    fn dedup_keeps_first_seen_order() {
        let refs = dedup_film_refs(["b", "a", "b", "c", "a"].map(String::from));
        let ids: Vec<_> = refs.iter().map(|r| r.film_id.as_str()).collect();
        assert_eq!(ids, ["b", "a", "c"]);
    }

    #[tokio::test]
    async fn missing_film_is_none() {
        let reader = FilmReader::new(db::memory().await);
        assert!(reader.film("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn hydrate_splits_audio_and_subtitle_languages() {
        let db = db::memory().await;
        let store = ReferenceStore::new(db.clone());
        insert_film(&db, "f1", "Solaris", 1).await;

        let russian = store.resolve(Reference::Language("Russian")).await.unwrap();
        let english = store.resolve(Reference::Language("English")).await.unwrap();
        store.link(Join::FilmAudio, "f1", &russian).await.unwrap();
        store.link(Join::FilmSubtitle, "f1", &english).await.unwrap();
        store.link(Join::FilmSubtitle, "f1", &russian).await.unwrap();

        let view = FilmReader::new(db).film("f1").await.unwrap().unwrap();
        let audio: Vec<_> = view.languages_audio.iter().map(|l| l.name.as_str()).collect();
        let subs: Vec<_> = view.languages_subtitle.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(audio, ["Russian"]);
        assert_eq!(subs, ["English", "Russian"]);
        assert!(view.genres.is_empty());
    }

    #[tokio::test]
    async fn person_films_are_deduplicated() {
        let db = db::memory().await;
        let store = ReferenceStore::new(db.clone());
        person::ActiveModel {
            id: Set("p1".to_string()),
            first_name_primary: Set("Andrei".to_string()),
            last_name_primary: Set("Tarkovsky".to_string()),
            first_name_secondary: Set(None),
            last_name_secondary: Set(None),
            image: Set(None),
        }
        .insert(&db)
        .await
        .unwrap();
        store.link(Join::FilmPerson, "f2", "p1").await.unwrap();
        store.link(Join::FilmPerson, "f1", "p1").await.unwrap();
        store.link(Join::FilmPerson, "f2", "p1").await.unwrap();

        let view = PersonReader::new(db).person("p1").await.unwrap().unwrap();
        let films: Vec<_> = view.films.iter().map(|f| f.film_id.as_str()).collect();
        assert_eq!(films, ["f2", "f1"]);
    }

    #[tokio::test]
    async fn listing_follows_insertion_order() {
        let db = db::memory().await;
        insert_film(&db, "b", "Stalker", 1).await;
        insert_film(&db, "a", "Mirror", 2).await;

        let reader = FilmReader::new(db);
        let all: Vec<_> = reader.all_films(10).await.unwrap().into_iter().map(|f| f.film.id).collect();
        assert_eq!(all, ["b", "a"]);

        let found = reader.films_by_name("STALK").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id(), "b");
    }
}
