use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let user = std::env::var("MOCK_JENKINS_USER").unwrap_or_else(|_| mock_server::DEFAULT_USER.to_string());
    let token = std::env::var("MOCK_JENKINS_API_TOKEN")
        .unwrap_or_else(|_| mock_server::DEFAULT_API_TOKEN.to_string());

    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, %user, "mock jenkins listening");
    mock_server::run(listener, mock_server::MockJenkins::new(&user, &token)).await
}
