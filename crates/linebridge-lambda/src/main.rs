use std::sync::Arc;

use lambda_http::{run, Error};
use tracing::info;

use linebridge_core::config;
use linebridge_core::service::http::{create_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("linebridge=info".parse()?),
        )
        .with_ansi(false)
        .init();

    info!("linebridge Lambda starting...");

    let cfg = config::load_config_from_env(None);
    if cfg.line.channel_secret.is_empty() {
        tracing::warn!("LINE_CHANNEL_SECRET is not set; every webhook will be rejected");
    }

    let state = Arc::new(AppState::from_config(cfg));
    let router = create_router(state);

    info!("linebridge Lambda ready");
    run(router).await
}
