//! Connect, print the routing table and optionally route one zone
//!
//! ```text
//! ACM200_HOST=192.168.1.50 ACM200_ZONE=2 ACM200_INPUT=3 cargo run --example route_zone
//! ```

use std::env;

use acm200::{Matrix, MatrixConfig};
use tracing_subscriber::EnvFilter;

fn env_u16(name: &str) -> Option<u16> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

#[tokio::main]
async fn main() -> acm200::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let host = env::var("ACM200_HOST").unwrap_or_else(|_| "192.168.1.50".to_string());
    let mut config = MatrixConfig::new(host);
    if let Some(port) = env_u16("ACM200_PORT") {
        config = config.with_port(port);
    }
    if let Some(zones) = env_u16("ACM200_ZONES") {
        config = config.with_zones(zones);
    }
    if let Some(inputs) = env_u16("ACM200_INPUTS") {
        config = config.with_inputs(inputs);
    }

    let matrix = Matrix::new(config)?;
    println!("{}", matrix.device_info());

    matrix.connect().await?;
    let outcome = matrix.refresh().await;
    if !outcome.is_complete() {
        println!("No answer for zones {:?}", outcome.failed);
    }

    for zone in &matrix.snapshot().zones {
        println!(
            "{:<24} route {:<10} power {:<10}",
            zone.display_name(),
            zone.route
                .value()
                .map(|i| format!("IN{:03} ({})", i.get(), zone.route.freshness()))
                .unwrap_or_else(|| "?".to_string()),
            zone.power
                .value()
                .map(|p| format!("{} ({})", p, zone.power.freshness()))
                .unwrap_or_else(|| "?".to_string()),
        );
    }

    if let (Some(zone), Some(input)) = (env_u16("ACM200_ZONE"), env_u16("ACM200_INPUT")) {
        println!("Routing input {} to zone {}...", input, zone);
        matrix.set_route(zone, input).await?;
        println!("{}", matrix.entities().routing_overview(&matrix.snapshot()).value);
    }

    matrix.shutdown().await;
    Ok(())
}
