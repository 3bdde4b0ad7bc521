//! Transit Pulse relay server binary.

use std::sync::Arc;
use std::time::Duration;

use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use transit_pulse::adapters::relay::{
    realtime_router, InMemoryActivationTokens, RelayState, RoomRegistry,
};
use transit_pulse::config::AppConfig;
use transit_pulse::ports::ActivationTokenValidator;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.validate()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.server.log_level.clone())),
        )
        .init();

    let registry = Arc::new(RoomRegistry::new(config.realtime.room_channel_capacity));
    let tokens = Arc::new(InMemoryActivationTokens::new());
    let state = RelayState::new(
        registry,
        Arc::clone(&tokens) as Arc<dyn ActivationTokenValidator>,
    );

    let cors = if config.server.cors_origins_list().is_empty() {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<http::HeaderValue> = config
            .server
            .cors_origins_list()
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new().allow_origin(origins)
    };

    let app = realtime_router()
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(TimeoutLayer::new(Duration::from_secs(
                    config.server.request_timeout_secs,
                ))),
        )
        .with_state(state);

    let addr = config.server.socket_addr();
    tracing::info!(%addr, "transit-pulse relay listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
