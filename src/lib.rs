//! Film and person catalog services behind in-process request/reply queues.
//!
//! The `filmgraph` binary only hosts the services. A gateway embeds this
//! library, calls [`spawn_services`] and sends commands (see
//! [`handlers::cmd`]) through the returned clients.

pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod handlers;
pub mod lookup;
pub mod models;
pub mod people;
pub mod query;
pub mod reader;
pub mod reference;
pub mod slug;
pub mod transport;
pub mod writer;

use std::sync::Arc;

use tracing::info;

use crate::{
    config::Config,
    error::CatalogResult,
    handlers::{FilmService, PersonService},
    lookup::RpcPersonLookup,
    query::RoleTokens,
    transport::RpcClient,
};

pub const FILM_QUEUE: &str = "film_queue";
pub const PERSON_QUEUE: &str = "person_queue";

/// Clients for both running services. A service stops once every client of
/// its queue is dropped.
#[derive(Clone, Debug)]
pub struct Services {
    pub films: RpcClient,
    pub persons: RpcClient,
}

pub async fn spawn_services(config: &Config) -> CatalogResult<Services> {
    let film_db = db::connect_and_migrate(&config.film_database_url).await?;
    let person_db = if config.person_database_url == config.film_database_url {
        film_db.clone()
    } else {
        db::connect_and_migrate(&config.person_database_url).await?
    };

    let (person_client, person_consumer) = transport::queue(PERSON_QUEUE, config.queue_capacity);
    let (film_client, film_consumer) = transport::queue(FILM_QUEUE, config.queue_capacity);
    let person_client = person_client.with_timeout(config.rpc_timeout);
    let film_client = film_client.with_timeout(config.rpc_timeout);

    let people = PersonService::new(person_db, config.fanout_concurrency, config.default_limit);
    let films = FilmService::new(
        film_db,
        Arc::new(RpcPersonLookup::new(person_client.clone())),
        RoleTokens { director: config.director_role.clone(), actor: config.actor_role.clone() },
        config.fanout_concurrency,
        config.default_limit,
    );

    tokio::spawn(transport::serve(person_consumer, Arc::new(people)));
    tokio::spawn(transport::serve(film_consumer, Arc::new(films)));

    info!(
        film_queue = FILM_QUEUE,
        person_queue = PERSON_QUEUE,
        timeout_ms = config.rpc_timeout.as_millis() as u64,
        "services ready"
    );

    Ok(Services { films: film_client, persons: person_client })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::{
        handlers::cmd,
        models::{FilmView, PersonView},
        transport::Reply,
    };

    fn config(dir: &tempfile::TempDir) -> Config {
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("catalog.db").display());
        Config {
            film_database_url: url.clone(),
            person_database_url: url,
            rpc_timeout: Duration::from_secs(5),
            queue_capacity: 16,
            fanout_concurrency: 4,
            default_limit: 100,
            director_role: "director".to_string(),
            actor_role: "actor".to_string(),
        }
    }

    fn ok<T: serde::de::DeserializeOwned>(reply: Reply) -> T {
        match reply {
            Reply::Ok { data } => serde_json::from_value(data).unwrap(),
            other => panic!("expected ok, got {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn gateway_reaches_both_services() {
        let dir = tempfile::TempDir::new().unwrap();
        let services = spawn_services(&config(&dir)).await.unwrap();
        assert_eq!(services.films.queue(), FILM_QUEUE);
        assert_eq!(services.persons.queue(), PERSON_QUEUE);

        let film: FilmView = ok(services
            .films
            .call(cmd::ADD_FILM, &json!({"name_primary": "Solaris", "year": 1972, "country": "СССР"}))
            .await
            .unwrap());
        assert_eq!(film.countries[0].slug, "sssr");

        let roster: Vec<PersonView> = ok(services
            .persons
            .call(
                cmd::ADD_PERSON,
                &json!({
                    "film_id": film.id(),
                    "persons": [{
                        "film_role": "director",
                        "first_name_primary": "Andrei",
                        "last_name_primary": "Tarkovsky"
                    }]
                }),
            )
            .await
            .unwrap());
        assert_eq!(roster.len(), 1);

        let found: Vec<FilmView> = ok(services
            .films
            .call(cmd::GET_FILTERED_FILMS, &json!({"filmmaker": ["andrei", "tarkovsky"]}))
            .await
            .unwrap());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id(), film.id());
    }
}
