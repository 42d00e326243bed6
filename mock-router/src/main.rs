use std::sync::Arc;

use mock_router::Device;
use tokio::{net::TcpListener, sync::RwLock};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,mock_router=debug"));
    fmt().with_env_filter(filter).with_target(true).init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let username = std::env::var("ROUTER_USERNAME").unwrap_or_else(|_| "admin".to_string());
    let password = std::env::var("ROUTER_PASSWORD").unwrap_or_else(|_| "admin".to_string());

    let mut device = Device::new(&username, &password);
    device.configure(
        "IGD_DEV_INFO",
        &[
            ("modelName", "Archer C6"),
            ("description", "AC1200 Wireless MU-MIMO Gigabit Router"),
            ("X_TP_isFD", "0"),
            ("X_TP_ProductVersion", "v3.20"),
        ],
    );

    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("mock router listening on {addr} (user {username})");
    mock_router::run_with(listener, Arc::new(RwLock::new(device))).await
}
