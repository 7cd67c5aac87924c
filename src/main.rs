//! Provider balancer demo.
//!
//! Usage: `provider-balancer [config.toml]`

use provider_balancer::config::{BasicValidator, ConfigLoader};
use provider_balancer::{LoadBalancer, Provider, StaticProvider};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const PROVIDERS: usize = 5;
const ROUNDS: usize = 6;
const CALLS_PER_ROUND: usize = 4;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("provider_balancer=info".parse()?),
        )
        .init();

    if let Err(e) = run().await {
        error!(error = %e, "Demo failed");
        return Err(e.into());
    }
    Ok(())
}

async fn run() -> provider_balancer::LoadBalancerResult<()> {
    let loader = ConfigLoader::new().with_validator(BasicValidator::new());
    let config = match std::env::args().nth(1) {
        Some(path) => loader.load(path)?,
        None => loader.load_or_default("provider-balancer.toml")?,
    };
    let interval = config.heartbeat.interval;
    let settle = config.heartbeat.initial_delay + interval / 2;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        capacity = config.capacity,
        scheduler = %config.scheduler,
        "Starting provider balancer demo"
    );

    let lb = LoadBalancer::new(config)?;

    let providers: Vec<Arc<StaticProvider>> = (0..PROVIDERS)
        .map(|_| Arc::new(StaticProvider::new()))
        .collect();
    lb.register_all(
        providers
            .iter()
            .map(|p| Arc::clone(p) as Arc<dyn Provider>),
    )?;

    lb.exclude(providers[0].id())?;
    lb.exclude(providers[1].id())?;
    providers[2].set_healthy(false);

    tokio::time::sleep(settle).await;

    for round in 0..ROUNDS {
        for _ in 0..CALLS_PER_ROUND {
            match lb.get() {
                Some(response) => info!(round, response = %response, "Dispatched"),
                None => warn!(round, "No provider available"),
            }
        }
        tokio::time::sleep(interval).await;
    }

    for provider in &providers {
        info!(
            provider = provider.id(),
            served = provider.served_count(),
            checks = provider.check_count(),
            excluded = lb.is_excluded(provider.id())?,
            "Provider summary"
        );
    }

    Ok(())
}
