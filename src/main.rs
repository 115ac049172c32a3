use library_lending::{
    adapters::{
        memory::FixedPolicySource, postgres::PostgresLendingStore, rbac::RoleCapabilities,
    },
    api::{handlers::AppState, router::create_router},
    application::lending::ServiceDependencies,
    config::AppConfig,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "library_lending=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!(
        port = config.port,
        loan_period_days = config.policy.loan_period_days,
        daily_rate = %config.policy.daily_rate,
        max_fine = %config.policy.max_fine,
        max_active_borrowings = config.policy.max_active_borrowings,
        "configuration loaded"
    );

    // Initialize database connection pool
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    // Create service dependencies
    let service_deps = ServiceDependencies {
        store: Arc::new(PostgresLendingStore::new(pool)),
        capabilities: Arc::new(RoleCapabilities::new()),
        policy: Arc::new(FixedPolicySource::new(config.policy.clone())),
    };

    // Create application state
    let app_state = Arc::new(AppState { service_deps });

    // Create router
    let app = create_router(app_state);

    // Server configuration
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);

    // Start server
    axum::serve(listener, app).await?;

    Ok(())
}
