//! Example: probe a control port
//!
//! Connects, authenticates, and prints what the server reports about
//! itself: protocol info, a few GETINFO keys, and a few settings.
//!
//! Run with: cargo run --example probe -- [host:port | unix:/path]
//!
//! Set `TOR_PASSWORD` for password authentication and `TORC_LOG_COMMS=1`
//! (with `RUST_LOG=torc=debug`) to see the raw wire traffic.

use torc::{ConnectionAddress, ControlError, Controller, ControllerConfig, Reply, Result};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let target = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:9051".to_string());
    let address = ConnectionAddress::parse(&target).map_err(ControlError::ConfigurationError)?;

    let mut config = ControllerConfig::new().address(address).with_env();
    if let Ok(password) = std::env::var("TOR_PASSWORD") {
        config = config.password(password);
    }

    let mut controller = Controller::new(config);
    println!("Connecting to {}...", target);
    controller.connect().await?;
    println!(
        "Authenticated with {}",
        controller.authenticator().map(|m| m.method_name()).unwrap_or("-")
    );

    let info = controller.protocol_info().await?;
    println!("\nPROTOCOLINFO {}", info.protocol().unwrap_or_default());
    println!("  Auth methods: {:?}", info.auth_methods());
    if let Some(cookie) = info.auth_cookie_file() {
        println!("  Cookie file:  {}", cookie);
    }
    if let Some(version) = info.version().get("Tor") {
        println!("  Tor version:  {}", version);
    }

    let names = controller
        .get_info(["version", "info/names", "events/names"])
        .await?;
    if names.is_success() {
        println!("\nversion = {}", names.value_of("version").unwrap_or_default());
        let info_names = names.value_of("info/names").unwrap_or_default();
        println!("info/names: {} entries", info_names.lines().count());
        println!("events/names = {}", names.value_of("events/names").unwrap_or_default());
    } else {
        println!("GETINFO failed: {} {}", names.status(), names.status_text());
    }

    let conf = controller
        .get_conf(["SocksPort", "ControlPort", "CookieAuthentication"])
        .await?;
    println!("\nConfiguration:");
    let mut settings: Vec<_> = conf.values().into_iter().collect();
    settings.sort();
    for (key, value) in settings {
        println!("  {} = {}", key, value);
    }

    let events = controller.take_events();
    if !events.is_empty() {
        println!("\n{} unsolicited events received", events.len());
    }

    controller.close().await;
    println!("\nDisconnected.");
    Ok(())
}
