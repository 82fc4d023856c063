use study_flow_server::{ServerSettings, create_app};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize structured JSON tracing based on environment variables
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "study_flow=debug,study_flow_server=debug,tower_http=debug".into()
    });

    match log_format.as_str() {
        "pretty" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_level(true),
                )
                .init();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let settings = ServerSettings::load()?;
    if settings.api_key().is_err() {
        error!("OPENROUTER_API_KEY not set");
        std::process::exit(1);
    }

    let app = create_app(&settings)?;
    let listener = TcpListener::bind(format!("0.0.0.0:{}", settings.port)).await?;
    let addr = listener.local_addr()?;

    info!(model = %settings.model, "Study Flow Service starting on {}", addr);
    info!("Health check endpoint: http://{}/health", addr);
    info!("Generation endpoint: POST http://{}/api/{{feature}}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
