use mock_server::{AuthMode, ServerConfig};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let mode = std::env::var("AUTH_MODE")
        .ok()
        .and_then(|name| AuthMode::parse(&name))
        .unwrap_or(AuthMode::Digest);
    let config = ServerConfig {
        mode,
        ..ServerConfig::default()
    };

    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    println!("listening on {addr} ({mode:?} auth, user {})", config.username);
    mock_server::run(listener, config).await
}
