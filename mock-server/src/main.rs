use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,mock_server=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("127.0.0.1:{port}");

    let state = mock_server::MockState::new();
    state.add_user("demo@example.com", "password", "Demo", "User").await;

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("listening on {addr} (demo@example.com / password)");
    mock_server::run_with(listener, state).await
}
