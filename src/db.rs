use migration::Migrator;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use sea_orm_migration::MigratorTrait;

use crate::error::CatalogResult;

const PRAGMAS: [&str; 3] =
    ["PRAGMA journal_mode=WAL", "PRAGMA synchronous=NORMAL", "PRAGMA cache_size=-64000"];

pub async fn connect_and_migrate(database_url: &str) -> CatalogResult<DatabaseConnection> {
    let mut options = ConnectOptions::new(database_url);
    options.sqlx_logging(false);
    connect_with(options).await
}

pub async fn connect_with(options: ConnectOptions) -> CatalogResult<DatabaseConnection> {
    let db = Database::connect(options).await?;

    for pragma in PRAGMAS {
        db.execute(Statement::from_string(db.get_database_backend(), pragma.to_string())).await?;
    }

    Migrator::up(&db, None).await?;
    Ok(db)
}

#[cfg(test)]
pub async fn memory() -> DatabaseConnection {
    let mut options = ConnectOptions::new("sqlite::memory:");
    // Every pooled connection to `:memory:` opens its own database.
    options.max_connections(1).min_connections(1).sqlx_logging(false);
    connect_with(options).await.expect("in-memory database")
}

/// A migrated database file inside `dir`, served by a pool of
/// `connections` so writers genuinely race.
#[cfg(test)]
pub async fn file_backed(dir: &tempfile::TempDir, connections: u32) -> DatabaseConnection {
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("catalog.db").display());
    let mut options = ConnectOptions::new(url);
    options.max_connections(connections).min_connections(connections).sqlx_logging(false);
    connect_with(options).await.expect("file-backed database")
}
