pub mod api;
pub mod config;
pub mod pipeline;

use tracing_subscriber::EnvFilter;

use crate::api::{ocr_api_router, start_server, ApiContext};
use crate::config::ServiceConfig;

/// Start the OCR service and serve until Ctrl-C.
pub async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = ServiceConfig::from_env()?;
    tracing::info!(
        language = %config.language,
        dpi = config.pdf_dpi,
        rasterizer = ?config.rasterizer,
        allowed = config.allowed_codes.len(),
        body_limit = config.json_limit_bytes,
        "Configuration loaded"
    );

    let pipeline = config.build_pipeline()?;
    let app = ocr_api_router(ApiContext::new(pipeline, config.json_limit_bytes));

    let mut server = start_server(config.socket_addr(), app).await?;
    tracing::info!(addr = %server.addr, "Listening");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Ctrl-C received");

    server.shutdown();
    server.wait().await;
    Ok(())
}
