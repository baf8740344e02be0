use anyhow::Result;
use axum::Router;
use movie_catalog::{
    config::AppConfig,
    routes::routes::routes,
    services::{
        movie_service::MovieService, object_store::DiskObjectStore,
        record_store::SqliteRecordStore,
    },
    state::AppState,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{fs, io::ErrorKind, path::Path, str::FromStr, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting movie-catalog with config: {:?}", cfg);

    // --- Ensure storage directory exists ---
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    // --- Initialize SQLite connection ---
    let connect_options = SqliteConnectOptions::from_str(&cfg.database_url)?.create_if_missing(true);
    if let Some(parent) = connect_options.get_filename().parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    let db = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?,
    );
    let records = SqliteRecordStore::new(db, cfg.table_name.clone())?;

    // --- Handle migration mode ---
    if migrate {
        records.migrate().await?;
        tracing::info!("Database migration complete for table {}.", records.table());
        return Ok(()); // exit after migration
    }

    // --- Initialize stores and service ---
    let objects = Arc::new(DiskObjectStore::new(
        &cfg.storage_dir,
        cfg.bucket_name.clone(),
        cfg.region.clone(),
        &cfg.public_url,
        cfg.signing_secret.clone(),
    )?);
    let movies = MovieService::new(Arc::new(records), objects.clone(), cfg.delivery_base());
    let state = AppState::new(movies, objects);

    // --- Build router ---
    let app: Router = routes().with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
