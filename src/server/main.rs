use std::process::ExitCode;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use regserver::config::get_config;
use regserver::errors::{LicenseError, LicenseResult};
use regserver::server::{build_router, ensure_schema, AppState, Database};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("regserver exited: {e}");
            eprintln!("regserver: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> LicenseResult<()> {
    let config = get_config()?;

    let filter = if config.logging.enabled {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.logging.level.to_lowercase()))
    } else {
        EnvFilter::new("off")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let db = Database::connect(&config.database).await?;
    ensure_schema(&db).await?;

    let app = build_router(AppState::new(db, config.registration.secret.clone()));

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{addr}");

    axum::serve(listener, app)
        .await
        .map_err(|e| LicenseError::ServerError(format!("server failed: {e}")))
}
