//! Example consumer: serves two related collections through persistence-endpoints.
//!
//! Run from repo root: `cargo run -p example-consumer`
//! With `DATABASE_URL` set the PostgreSQL backend is used, otherwise records live in memory.

use persistence_endpoints::{
    build_router, load_from_path, load_from_str, resolve, AppState, Authorizer, InMemoryCollection,
    InMemoryStore, PgStore, Settings, StaticTokenAuthorizer, Store,
};
use std::sync::Arc;
use tokio::net::TcpListener;

const DEFAULT_ENDPOINTS: &str = include_str!("../endpoints.json");

async fn open_store(settings: &Settings) -> Result<Arc<dyn Store>, Box<dyn std::error::Error>> {
    match &settings.database_url {
        Some(url) => {
            let mut store = PgStore::connect(url, settings.db_schema.clone()).await?;
            let test1 = store.collection_builder("Test1").await?;
            let test2 = store
                .collection_builder("Test2")
                .await?
                .with_relation("test1", "Test1")
                .with_relation("manyTest1", "Test1");
            store.register(test1);
            store.register(test2);
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using the in-memory store");
            let store = InMemoryStore::new();
            store.register(InMemoryCollection::new("Test1"));
            store.register(
                InMemoryCollection::new("Test2")
                    .with_relation("test1", "Test1")
                    .with_relation("manyTest1", "Test1"),
            );
            Ok(Arc::new(store))
        }
    }
}

async fn open_authorizer(settings: &Settings) -> Result<Arc<dyn Authorizer>, Box<dyn std::error::Error>> {
    let authorizer = match &settings.auth_tokens_path {
        Some(path) => StaticTokenAuthorizer::from_json_str(&tokio::fs::read_to_string(path).await?)?,
        None => StaticTokenAuthorizer::new(),
    };
    tracing::info!(tokens = authorizer.len(), "static authorizer loaded");
    Ok(Arc::new(authorizer))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("persistence_endpoints=info")),
        )
        .init();

    let settings = Settings::from_env()?;
    let store = open_store(&settings).await?;
    let authorizer = open_authorizer(&settings).await?;
    let configs = match &settings.endpoints_path {
        Some(path) => load_from_path(path).await?,
        None => load_from_str(DEFAULT_ENDPOINTS)?,
    };
    let endpoints = resolve(&configs, store.as_ref())?;

    let state = AppState::new(store, authorizer);
    let app = build_router(state, endpoints, settings.body_limit_bytes);
    let listener = TcpListener::bind(&settings.bind_addr).await?;
    tracing::info!("Example consumer listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
