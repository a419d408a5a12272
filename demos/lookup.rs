//! Look up the domains given on the command line using the rules in `tlds/`.
//!
//! Run with: cargo run --example lookup -- google.com example.nl

use multiwhois::{Config, WhoisClient};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "multiwhois=info".into()),
        )
        .init();

    let domains: Vec<String> = std::env::args().skip(1).collect();
    if domains.is_empty() {
        anyhow::bail!("usage: lookup <domain> [<domain>...]");
    }

    let config = Arc::new(Config::load()?);
    let client = WhoisClient::new_with_config(config)?;
    println!("Supported TLDs: {}", client.registry().tlds().join(", "));

    for (domain, result) in domains.iter().zip(client.query_many(&domains).await) {
        match result {
            Ok(info) => {
                let summary = serde_json::json!({
                    "domain": info.domain,
                    "is_available": info.is_available,
                    "expiration": info.expiration,
                    "warnings": info.warnings,
                });
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
            Err(e) => println!("{}: {}", domain, e),
        }
    }

    Ok(())
}
