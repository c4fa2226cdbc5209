use async_trait::async_trait;
use tracing::debug;

use crate::{
    error::{CatalogError, CatalogResult},
    handlers::cmd,
    models::{FilmsByPerson, NamePair, PersonQuery},
    transport::{Reply, RpcClient, TransportError},
};

/// Asks the person service which films a person worked on in a given role.
#[async_trait]
pub trait PersonLookup: Send + Sync {
    /// Film ids for anyone matching `name` in `role`. A timeout or transport
    /// failure is an error, never an empty list.
    async fn films_by_person(&self, name: &NamePair, role: &str) -> CatalogResult<Vec<String>>;
}

/// Single request/reply round trip over the person queue; no retries.
#[derive(Clone, Debug)]
pub struct RpcPersonLookup {
    client: RpcClient,
}

impl RpcPersonLookup {
    pub fn new(client: RpcClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PersonLookup for RpcPersonLookup {
    async fn films_by_person(&self, name: &NamePair, role: &str) -> CatalogResult<Vec<String>> {
        let query = PersonQuery {
            first_name: Some(name.first().to_string()),
            last_name: Some(name.last().to_string()),
            film_role: role.to_string(),
        };

        let reply = self.client.call(cmd::GET_FILMS_BY_PERSON, &query).await?;
        let found: FilmsByPerson = match reply {
            Reply::Ok { data } => serde_json::from_value(data).map_err(TransportError::from)?,
            Reply::NotFound => FilmsByPerson::default(),
            Reply::Conflict { message } | Reply::Error { message, .. } => {
                return Err(CatalogError::RemoteUnavailable(TransportError::Rejected {
                    queue: self.client.queue().to_string(),
                    cmd: cmd::GET_FILMS_BY_PERSON.to_string(),
                    message,
                }));
            },
        };

        debug!(role = %role, films = found.films.len(), "person lookup answered");
        Ok(found.films.into_iter().map(|f| f.film_id).collect())
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use serde_json::{Value, json};

    use super::*;
    use crate::transport::{self, Handler};

    struct FixedPeople;

    #[async_trait]
    impl Handler for FixedPeople {
        async fn handle(&self, cmd: &str, payload: Value) -> Reply {
            assert_eq!(cmd, cmd::GET_FILMS_BY_PERSON);
            assert_eq!(payload["film_role"], "director");
            Reply::Ok { data: json!({"films": [{"film_id": "f1"}, {"film_id": "f2"}]}) }
        }
    }

    #[tokio::test]
    async fn returns_film_ids_from_reply() {
        let (client, consumer) = transport::queue("person_queue", 4);
        tokio::spawn(transport::serve(consumer, Arc::new(FixedPeople)));

        let lookup = RpcPersonLookup::new(client);
        let ids = lookup.films_by_person(&NamePair::new("Alex", "Smith"), "director").await.unwrap();
        assert_eq!(ids, ["f1", "f2"]);
    }

    #[tokio::test]
    async fn timeout_is_an_error_not_an_empty_list() {
        let (client, _consumer) = transport::queue("person_queue", 4);
        let lookup = RpcPersonLookup::new(client.with_timeout(Duration::from_millis(50)));

        let err = lookup.films_by_person(&NamePair::new("Alex", "Smith"), "actor").await.unwrap_err();
        assert!(matches!(err, CatalogError::RemoteUnavailable(TransportError::Timeout { .. })));
    }
}
