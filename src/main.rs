use tracing_subscriber::EnvFilter;

use todo_api::config::Config;
use todo_api::db::Store;
use todo_api::{app, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();
    let store = Store::open(&config.database_path)?;
    let state = AppState { store };

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, db = %config.database_path, "Listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}
