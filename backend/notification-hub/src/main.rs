use actix_web::{middleware, web, App, HttpServer};
use anyhow::{anyhow, Context};
use notification_hub::{
    handlers, metrics,
    store::{MemoryNotificationStore, NotificationStore, PgNotificationStore},
    AppState, Config,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,actix_web=info".into());
    if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let config = Config::from_env().map_err(|e| anyhow!("invalid configuration: {}", e))?;
    tracing::info!(env = %config.app.env, "Starting notification hub");

    let store: Arc<dyn NotificationStore> = match &config.database.url {
        Some(url) => {
            let store = PgNotificationStore::connect(url, config.database.max_connections)
                .await
                .context("failed to connect to database")?;
            tracing::info!("Successfully connected to database");
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, notifications are kept in memory");
            Arc::new(MemoryNotificationStore::new())
        }
    };

    let addr = format!("{}:{}", config.app.host, config.app.port);
    let state = AppState::new(store, config);

    tracing::info!("Starting HTTP server on {}", addr);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(middleware::Logger::default())
            .wrap(metrics::MetricsMiddleware)
            .route("/health", web::get().to(|| async { "OK" }))
            .route("/metrics", web::get().to(metrics::serve_metrics))
            .configure(handlers::register_routes)
    })
    .bind(&addr)
    .with_context(|| format!("failed to bind {}", addr))?
    .run()
    .await?;

    Ok(())
}
