//! `rt-tail`: connect to the push channel with the configured settings and
//! print every received envelope as a JSON line. Development tool for
//! inspecting the realtime feed.

use anyhow::Result;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use talentlink_realtime::config::Settings;
use talentlink_realtime::RealtimeClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    init_tracing();

    // Load configuration
    let settings = Settings::new()?;
    tracing::info!("Configuration loaded");

    let client = RealtimeClient::new(settings);
    client.connect().await?;

    let mut messages = client.message_watch();
    let mut status = client.status_watch();

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, disconnecting");
                break;
            }
            changed = messages.changed() => {
                if changed.is_err() {
                    break;
                }
                let envelope = messages.borrow_and_update().clone();
                if let Some(envelope) = envelope {
                    println!("{}", serde_json::to_string(&envelope)?);
                }
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                tracing::info!(status = %current, "Connection status changed");
            }
        }
    }

    client.disconnect().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
