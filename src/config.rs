use std::time::Duration;

use anyhow::Context;

#[derive(Clone, Debug)]
pub struct Config {
    pub film_database_url: String,
    pub person_database_url: String,
    pub rpc_timeout: Duration,
    pub queue_capacity: usize,
    pub fanout_concurrency: usize,
    pub default_limit: u64,
    pub director_role: String,
    pub actor_role: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let film_database_url = std::env::var("FILM_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://filmgraph.db?mode=rwc".to_string());
        let person_database_url =
            std::env::var("PERSON_DATABASE_URL").unwrap_or_else(|_| film_database_url.clone());

        let rpc_timeout_ms: u64 = std::env::var("RPC_TIMEOUT_MS")
            .unwrap_or_else(|_| "5000".to_string())
            .parse()
            .context("RPC_TIMEOUT_MS")?;

        let queue_capacity: usize =
            std::env::var("QUEUE_CAPACITY").ok().and_then(|s| s.parse().ok()).unwrap_or(256);

        let fanout_concurrency: usize =
            std::env::var("FANOUT_CONCURRENCY").ok().and_then(|s| s.parse().ok()).unwrap_or(8);

        let default_limit: u64 =
            std::env::var("DEFAULT_LIMIT").ok().and_then(|s| s.parse().ok()).unwrap_or(100);

        let director_role =
            std::env::var("DIRECTOR_ROLE").unwrap_or_else(|_| "director".to_string());
        let actor_role = std::env::var("ACTOR_ROLE").unwrap_or_else(|_| "actor".to_string());

        Ok(Self {
            film_database_url,
            person_database_url,
            rpc_timeout: Duration::from_millis(rpc_timeout_ms),
            queue_capacity: queue_capacity.max(1),
            fanout_concurrency: fanout_concurrency.max(1),
            default_limit: default_limit.max(1),
            director_role: director_role.to_lowercase(),
            actor_role: actor_role.to_lowercase(),
        })
    }
}
