use article_notion::api::{router, AppState};
use article_notion::config::ServiceConfig;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = match ServiceConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };

    let state = match AppState::new(&config) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "cannot build HTTP clients");
            std::process::exit(1);
        }
    };
    match &state.publisher {
        Some(publisher) => {
            if let Err(e) = publisher.check_access().await {
                tracing::warn!(error = %e, "Notion database is not reachable");
            }
        }
        None => tracing::info!("Notion credentials not set, publishing disabled"),
    }

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await.unwrap();
    tracing::info!("listening on {}", listener.local_addr().unwrap());
    axum::serve(listener, app).await.unwrap();
}
