use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::{self, TraceLayer};
use tracing::{Level, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use appointment_cell::{AppointmentBookingService, InMemoryOutbox, OutboxQueue, OutboxWorker, RedisOutbox};
use shared_config::{AppConfig, SideEffectMode};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting vet scheduling API server");

    // Load configuration
    let config = Arc::new(AppConfig::from_env());

    let outbox: Option<Arc<dyn OutboxQueue>> = match config.side_effect_mode {
        SideEffectMode::Outbox => Some(match &config.redis_url {
            Some(url) => {
                let redis = RedisOutbox::new(url).await?;
                redis.requeue_in_flight().await?;
                Arc::new(redis) as Arc<dyn OutboxQueue>
            }
            None => {
                warn!("No REDIS_URL, using in-memory outbox");
                Arc::new(InMemoryOutbox::new()) as Arc<dyn OutboxQueue>
            }
        }),
        SideEffectMode::Inline => None,
    };

    let booking = Arc::new(AppointmentBookingService::from_config(&config, outbox.clone()));

    if let Some(queue) = outbox {
        let worker = OutboxWorker::new(queue, booking.dispatcher(), config.outbox_max_retries)
            .with_retry_delay(Duration::from_secs(config.outbox_retry_delay_seconds));
        tokio::spawn(async move { worker.run().await });
    }

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the application router
    let app = router::create_router(config.clone(), booking)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new()
                    .level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new()
                    .level(Level::INFO)),
        )
        .layer(cors);

    // Run the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.api_port));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
