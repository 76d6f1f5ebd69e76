use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use exam_attempt_backend::{
    config::{get_config, init_config, LogFormat, StorageBackend},
    database::pool::{create_pool, run_migrations},
    routes::{self, RouterLimits},
    store::{AttemptStore, MemoryAttemptStore, PgAttemptStore},
    AppState,
};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_config()?;
    let config = get_config();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,tower_http=info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }

    let store: Arc<dyn AttemptStore> = match config.storage_backend {
        StorageBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required for the postgres backend"))?;
            let pool = create_pool(url).await?;
            run_migrations(&pool).await?;
            info!("Connected to PostgreSQL, migrations applied");
            Arc::new(PgAttemptStore::new(pool))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using the in-memory store; attempts are lost on restart");
            Arc::new(MemoryAttemptStore::new())
        }
    };

    let app_state = AppState::new(store, config);

    tokio::spawn(app_state.grading_worker(config).run());
    tokio::spawn(app_state.sweep_service(config).run(Duration::from_secs(60)));

    let app = routes::router(
        app_state,
        RouterLimits {
            public_rps: config.public_rps,
            admin_rps: config.admin_rps,
        },
    );

    let addr: SocketAddr = config.server_address.parse()?;
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
