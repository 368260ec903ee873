use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use notify_gateway::{
    handlers::{
        notifications::register_routes as register_notifications,
        websocket::register_routes as register_websocket,
    },
    metrics, Config, ConnectionRegistry, NotificationQueue,
};
use std::io;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting notify gateway");

    let config = Config::from_env()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("invalid configuration: {e}")))?;

    let registry = ConnectionRegistry::new();
    let queue = NotificationQueue::new(registry.clone(), config.queue.clone());
    tracing::info!(
        max_queue_size = config.queue.max_queue_size,
        dedup_window_secs = config.queue.dedup_window_secs,
        "notification queue initialized"
    );

    let addr = format!("0.0.0.0:{}", config.app.port);
    tracing::info!("Starting HTTP server on {}", addr);

    let app_config = config.clone();
    let app_registry = registry.clone();
    let app_queue = queue.clone();

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_config.clone()))
            .app_data(web::Data::new(app_registry.clone()))
            .app_data(web::Data::new(app_queue.clone()))
            .wrap(middleware::Logger::default())
            .wrap(Cors::permissive())
            .route("/health", web::get().to(|| async { "OK" }))
            .route("/metrics", web::get().to(metrics::serve_metrics))
            .route("/", web::get().to(|| async { "Notify Gateway v1.0" }))
            .configure(|cfg| {
                register_notifications(cfg);
                register_websocket(cfg);
            })
    })
    .bind(&addr)?
    .run()
    .await?;

    // Server stopped; tear the queue down so timers and pending state go too
    queue.destroy().await;
    registry.clear().await;

    Ok(())
}
