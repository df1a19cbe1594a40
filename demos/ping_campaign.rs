//! Run one request/response campaign against a nearby peripheral
//!
//! Run with: cargo run --example ping_campaign

use std::time::Duration;
use timer_central::{Central, CentralConfig, Result, SessionState};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("timer_central=info".parse().unwrap()),
        )
        .init();

    println!("Request/Response Campaign");
    println!("=========================\n");

    let config = CentralConfig::default();
    println!(
        "Service {}, up to {} requests, {:?} scan timeout\n",
        config.identities.service, config.max_requests, config.scan_timeout
    );

    let central = Central::new(config).await?;

    println!("Waiting for Bluetooth to power on...");
    central.wait_until_ready(Duration::from_secs(10)).await?;

    let mut updates = central.subscribe();
    central.go()?;

    let mut last_state = SessionState::Idle;
    let mut started = false;
    loop {
        let status = match tokio::time::timeout(Duration::from_secs(60), updates.recv()).await {
            Ok(Ok(status)) => status,
            Ok(Err(_)) => central.status(),
            Err(_) => {
                println!("No progress for 60s, giving up.");
                break;
            }
        };

        if status.state != last_state {
            println!(
                "[{}/{}] {} -> {}",
                status.campaign.request_count,
                status.campaign.max_requests,
                last_state,
                status.state
            );
            last_state = status.state;
        }

        if status.is_busy() {
            started = true;
        } else if started {
            break;
        }
    }

    let status = central.status();
    println!("\nCampaign finished");
    println!("  Requests:  {}", status.campaign.request_count);
    println!("  Responses: {}", status.campaign.response_count);
    if let Some(response) = &status.campaign.last_response {
        println!("  Last response: {}", response);
    }
    if let Some(error) = &status.campaign.last_error {
        println!("  Last error: {}", error);
    }

    central.shutdown().await?;
    Ok(())
}
