use std::sync::Arc;

use rainfall_api::config::Config;
use rainfall_api::http::{router, AppState};
use rainfall_api::pipeline::ModelService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    let service = ModelService::startup(&config)?;
    service.warmup()?;

    let state = AppState {
        service: Arc::new(service),
    };
    let app = router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
