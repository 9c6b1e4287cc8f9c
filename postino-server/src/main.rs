use anyhow::Context;
use std::sync::Arc;

use postino_server::{
    build_sqlite_url, cache, config::ServerConfig, connect_pool, routes, run_migrations, AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    // configurazione dalle variabili d'ambiente
    let config = ServerConfig::from_env().context("load configuration")?;

    let db_url = build_sqlite_url(&config.database_url).context("build sqlite DATABASE_URL")?;
    tracing::info!(%db_url, "opening database");
    let pool = connect_pool(&db_url).await.context("connect to sqlite")?;
    // schema setup happens here only, never on the request path
    run_migrations(&pool).await.context("run migrations")?;

    // redis se CACHE_URL è impostata, altrimenti cache in memoria
    let recency = cache::connect(&config.cache)
        .await
        .context("connect recency cache")?;

    // stato condiviso e rotte dell'applicazione
    let state = Arc::new(AppState::new(pool, recency, &config));
    let app = routes::router(state);

    tracing::info!(addr = %config.bind_addr, "listening");
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .context("bind tcp listener")?;
    axum::serve(listener, app.into_make_service())
        .await
        .context("server shutdown")?;

    Ok(())
}
