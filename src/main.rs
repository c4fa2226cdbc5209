use filmgraph::{config::Config, spawn_services};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,filmgraph=debug,sqlx=warn".to_string()),
        )
        .init();

    let config = Config::from_env()?;
    let services = spawn_services(&config).await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    drop(services);

    Ok(())
}
