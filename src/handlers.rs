use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    entities::genre,
    error::{CatalogError, CatalogResult},
    lookup::PersonLookup,
    models::{
        AddPersons, FilmFilter, FilmIds, FilmView, LimitQuery, NameQuery, NewFilm, PersonQuery,
        PersonView, UpdateFilmName, UpdateGenreName,
    },
    people::{PersonDirectory, PersonWriter},
    query::{CatalogQuery, RoleTokens},
    reader::FilmReader,
    transport::{Handler, Reply},
    writer::FilmWriter,
};

pub mod cmd {
    pub const GET_FILM: &str = "get_film";
    pub const GET_ALL_FILMS: &str = "get_all_films";
    pub const GET_FILMS_BY_ID: &str = "get_films_by_id";
    pub const GET_FILMS_BY_NAME: &str = "get_films_by_name";
    pub const GET_FILTERED_FILMS: &str = "get_filtered_films";
    pub const ADD_FILM: &str = "add_film";
    pub const UPDATE_FILM_NAME: &str = "update_film_name";
    pub const DELETE_FILM: &str = "delete_film";
    pub const GET_ALL_COUNTRIES: &str = "get_all_countries";
    pub const GET_COUNTRIES_BY_NAME: &str = "get_countries_by_name";
    pub const GET_GENRE: &str = "get_genre";
    pub const GET_ALL_GENRES: &str = "get_all_genres";
    pub const UPDATE_GENRE_NAME: &str = "update_genre_name";

    pub const GET_PERSON: &str = "get_person";
    pub const GET_ALL_PERSONS: &str = "get_all_persons";
    pub const GET_PERSONS_FROM_FILM: &str = "get_persons_from_film";
    pub const GET_PERSONS_BY_NAME: &str = "get_persons_by_name";
    pub const GET_FILMS_BY_PERSON: &str = "get_films_by_person";
    pub const ADD_PERSON: &str = "add_person";
}

fn decode<T: DeserializeOwned>(payload: Value) -> CatalogResult<T> {
    Ok(serde_json::from_value(payload)?)
}

/// Like [`decode`], treating a missing payload as the default.
fn decode_or_default<T: DeserializeOwned + Default>(payload: Value) -> CatalogResult<T> {
    if payload.is_null() { Ok(T::default()) } else { decode(payload) }
}

fn unknown(command: &str) -> Reply {
    CatalogError::validation(format!("unknown command {command}")).into()
}

pub struct FilmService {
    reader: FilmReader,
    writer: FilmWriter,
    query: CatalogQuery,
    default_limit: u64,
}

impl FilmService {
    pub fn new(
        db: sea_orm::DatabaseConnection,
        lookup: Arc<dyn PersonLookup>,
        roles: RoleTokens,
        fanout: usize,
        default_limit: u64,
    ) -> Self {
        Self {
            reader: FilmReader::new(db.clone()),
            writer: FilmWriter::new(db.clone(), fanout),
            query: CatalogQuery::new(db, lookup, roles, default_limit),
            default_limit,
        }
    }

    fn limit(&self, query: LimitQuery) -> CatalogResult<u64> {
        match query.limit {
            Some(0) => Err(CatalogError::validation("limit must be at least 1")),
            Some(limit) => Ok(limit),
            None => Ok(self.default_limit),
        }
    }

    async fn all_films(&self, payload: Value) -> CatalogResult<Vec<FilmView>> {
        let limit = self.limit(decode_or_default(payload)?)?;
        self.reader.all_films(limit).await
    }

    async fn all_genres(&self, payload: Value) -> CatalogResult<Vec<genre::Model>> {
        let limit = self.limit(decode_or_default(payload)?)?;
        self.reader.genres(limit).await
    }
}

#[async_trait]
impl Handler for FilmService {
    async fn handle(&self, command: &str, payload: Value) -> Reply {
        match command {
            cmd::GET_FILM => match decode::<String>(payload) {
                Ok(id) => Reply::from_found(self.reader.film(&id).await),
                Err(err) => err.into(),
            },
            cmd::GET_ALL_FILMS => Reply::from_result(self.all_films(payload).await),
            cmd::GET_FILMS_BY_ID => match decode::<FilmIds>(payload) {
                Ok(ids) => Reply::from_result(self.reader.films_by_ids(&ids.films).await),
                Err(err) => err.into(),
            },
            cmd::GET_FILMS_BY_NAME => match decode::<NameQuery>(payload) {
                Ok(q) => Reply::from_result(self.reader.films_by_name(&q.name).await),
                Err(err) => err.into(),
            },
            cmd::GET_FILTERED_FILMS => match decode_or_default::<FilmFilter>(payload) {
                Ok(filter) => Reply::from_result(self.query.filtered_films(&filter).await),
                Err(err) => err.into(),
            },
            cmd::ADD_FILM => match decode::<NewFilm>(payload) {
                Ok(new) => Reply::from_result(self.writer.add_film(&new).await),
                Err(err) => err.into(),
            },
            cmd::UPDATE_FILM_NAME => match decode::<UpdateFilmName>(payload) {
                Ok(u) => Reply::from_found(
                    self.writer
                        .update_film(&u.film_id, &u.name_primary, u.name_secondary.as_deref())
                        .await,
                ),
                Err(err) => err.into(),
            },
            cmd::DELETE_FILM => match decode::<String>(payload) {
                Ok(id) => Reply::from_found(self.writer.delete_film(&id).await),
                Err(err) => err.into(),
            },
            cmd::GET_ALL_COUNTRIES => Reply::from_result(self.reader.countries().await),
            cmd::GET_COUNTRIES_BY_NAME => match decode::<String>(payload) {
                Ok(name) => Reply::from_result(self.reader.countries_by_name(&name).await),
                Err(err) => err.into(),
            },
            cmd::GET_GENRE => match decode::<String>(payload) {
                Ok(id) => Reply::from_found(self.reader.genre(&id).await),
                Err(err) => err.into(),
            },
            cmd::GET_ALL_GENRES => Reply::from_result(self.all_genres(payload).await),
            cmd::UPDATE_GENRE_NAME => match decode::<UpdateGenreName>(payload) {
                Ok(u) => Reply::from_found(
                    self.writer
                        .update_genre(&u.genre_id, &u.name_primary, u.name_secondary.as_deref())
                        .await,
                ),
                Err(err) => err.into(),
            },
            other => unknown(other),
        }
    }
}

pub struct PersonService {
    writer: PersonWriter,
    directory: PersonDirectory,
    default_limit: u64,
}

impl PersonService {
    pub fn new(db: sea_orm::DatabaseConnection, fanout: usize, default_limit: u64) -> Self {
        Self {
            writer: PersonWriter::new(db.clone(), fanout),
            directory: PersonDirectory::new(db),
            default_limit,
        }
    }

    async fn all_persons(&self, payload: Value) -> CatalogResult<Vec<PersonView>> {
        let limit = match decode_or_default::<LimitQuery>(payload)?.limit {
            Some(0) => return Err(CatalogError::validation("limit must be at least 1")),
            Some(limit) => limit,
            None => self.default_limit,
        };
        self.directory.reader().all_persons(limit).await
    }
}

#[async_trait]
impl Handler for PersonService {
    async fn handle(&self, command: &str, payload: Value) -> Reply {
        match command {
            cmd::GET_PERSON => match decode::<String>(payload) {
                Ok(id) => Reply::from_found(self.directory.reader().person(&id).await),
                Err(err) => err.into(),
            },
            cmd::GET_ALL_PERSONS => Reply::from_result(self.all_persons(payload).await),
            cmd::GET_PERSONS_FROM_FILM => match decode::<String>(payload) {
                Ok(film_id) => {
                    Reply::from_result(self.directory.reader().persons_from_film(&film_id).await)
                },
                Err(err) => err.into(),
            },
            cmd::GET_PERSONS_BY_NAME => match decode::<PersonQuery>(payload) {
                Ok(q) => Reply::from_result(self.directory.persons_by_name(&q).await),
                Err(err) => err.into(),
            },
            cmd::GET_FILMS_BY_PERSON => match decode::<PersonQuery>(payload) {
                Ok(q) => Reply::from_result(self.directory.films_by_person(&q).await),
                Err(err) => err.into(),
            },
            cmd::ADD_PERSON => match decode::<AddPersons>(payload) {
                Ok(add) => Reply::from_result(self.writer.add_persons(&add.persons, &add.film_id).await),
                Err(err) => err.into(),
            },
            other => unknown(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::{
        db,
        error::ErrorKind,
        entities::country,
        lookup::RpcPersonLookup,
        transport::{self, RpcClient, serve},
    };

    /// Both services on one in-memory store, the film service resolving
    /// persons through the person queue.
    async fn services() -> (RpcClient, RpcClient) {
        let db = db::memory().await;

        let (person_client, person_consumer) = transport::queue("person_queue", 16);
        tokio::spawn(serve(person_consumer, Arc::new(PersonService::new(db.clone(), 4, 100))));

        let lookup = Arc::new(RpcPersonLookup::new(
            person_client.clone().with_timeout(Duration::from_secs(2)),
        ));
        let (film_client, film_consumer) = transport::queue("film_queue", 16);
        tokio::spawn(serve(
            film_consumer,
            Arc::new(FilmService::new(db, lookup, RoleTokens::default(), 4, 100)),
        ));

        (film_client, person_client)
    }

    fn data<T: DeserializeOwned>(reply: Reply) -> T {
        match reply {
            Reply::Ok { data } => serde_json::from_value(data).unwrap(),
            other => panic!("expected ok, got {other:?}"),
        }
    }

    fn heat() -> Value {
        json!({
            "name_primary": "Heat",
            "year": 1995,
            "country": "USA",
            "rating": 8.3,
            "assessments": 500,
            "genres": [{"name_primary": "crime"}],
            "trailers": [{"url": "https://example.test/heat.mp4"}]
        })
    }

    #[tokio::test]
    async fn add_then_get_film() {
        let (films, _) = services().await;

        let added: FilmView = data(films.call(cmd::ADD_FILM, &heat()).await.unwrap());
        let fetched: FilmView = data(films.call(cmd::GET_FILM, &added.film.id).await.unwrap());
        assert_eq!(fetched, added);

        let again = films.call(cmd::ADD_FILM, &heat()).await.unwrap();
        assert!(matches!(again, Reply::Conflict { .. }));

        let missing = films.call(cmd::GET_FILM, "nope").await.unwrap();
        assert_eq!(missing, Reply::NotFound);
    }

    #[tokio::test]
    async fn malformed_payload_is_a_validation_failure() {
        let (films, _) = services().await;

        let reply = films.call(cmd::ADD_FILM, &json!({"year": "soon"})).await.unwrap();
        assert!(matches!(reply, Reply::Error { kind: ErrorKind::ValidationFailure, .. }));

        let reply = films.call("launch_rockets", &json!(null)).await.unwrap();
        assert!(matches!(reply, Reply::Error { kind: ErrorKind::ValidationFailure, .. }));
    }

    #[tokio::test]
    async fn filmmaker_filter_goes_through_person_queue() {
        let (films, persons) = services().await;
        let added: FilmView = data(films.call(cmd::ADD_FILM, &heat()).await.unwrap());
        let mut other = heat();
        other["name_primary"] = json!("Thief");
        other["year"] = json!(1981);
        let _: FilmView = data(films.call(cmd::ADD_FILM, &other).await.unwrap());

        let roster: Vec<PersonView> = data(
            persons
                .call(
                    cmd::ADD_PERSON,
                    &json!({
                        "film_id": added.film.id,
                        "persons": [{
                            "film_role": "Director",
                            "first_name_primary": "Michael",
                            "last_name_primary": "Mann"
                        }]
                    }),
                )
                .await
                .unwrap(),
        );
        assert_eq!(roster.len(), 1);

        let found: Vec<FilmView> = data(
            films
                .call(cmd::GET_FILTERED_FILMS, &json!({"filmmaker": ["michael", "mann"]}))
                .await
                .unwrap(),
        );
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].film.id, added.film.id);

        let nobody: Vec<FilmView> = data(
            films
                .call(cmd::GET_FILTERED_FILMS, &json!({"actor": ["michael", "mann"]}))
                .await
                .unwrap(),
        );
        assert!(nobody.is_empty());
    }

    #[tokio::test]
    async fn rename_and_delete_report_absence() {
        let (films, _) = services().await;
        let added: FilmView = data(films.call(cmd::ADD_FILM, &heat()).await.unwrap());

        let renamed: FilmView = data(
            films
                .call(
                    cmd::UPDATE_FILM_NAME,
                    &json!({"film_id": added.film.id, "name_primary": "Схватка", "name_secondary": "Heat"}),
                )
                .await
                .unwrap(),
        );
        assert_eq!(renamed.film.name_primary, "Схватка");

        let deleted: FilmView = data(films.call(cmd::DELETE_FILM, &added.film.id).await.unwrap());
        assert_eq!(deleted.film.id, added.film.id);

        let gone = films.call(cmd::DELETE_FILM, &added.film.id).await.unwrap();
        assert_eq!(gone, Reply::NotFound);
        let gone = films
            .call(cmd::UPDATE_FILM_NAME, &json!({"film_id": added.film.id, "name_primary": "X"}))
            .await
            .unwrap();
        assert_eq!(gone, Reply::NotFound);
    }

    #[tokio::test]
    async fn countries_and_genres_are_listed() {
        let (films, _) = services().await;
        let _: FilmView = data(films.call(cmd::ADD_FILM, &heat()).await.unwrap());

        let countries: Vec<country::Model> =
            data(films.call(cmd::GET_COUNTRIES_BY_NAME, "us").await.unwrap());
        assert_eq!(countries.len(), 1);

        let genres: Vec<genre::Model> =
            data(films.call(cmd::GET_ALL_GENRES, &json!(null)).await.unwrap());
        assert_eq!(genres[0].name_primary, "crime");

        let zero = films.call(cmd::GET_ALL_FILMS, &json!({"limit": 0})).await.unwrap();
        assert!(matches!(zero, Reply::Error { kind: ErrorKind::ValidationFailure, .. }));
    }
}
