//! Example: Mirror full-depth books and print the top of book
//!
//! Needs REST credentials in `KUCOIN_API_KEY`, `KUCOIN_API_SECRET` and
//! `KUCOIN_API_PASSPHRASE`; the full-depth snapshot endpoint is private.
//!
//! Run with: cargo run --example mirror_books -- BTC-USDT ETH-USDT
//!
//! Press Ctrl+C to stop.

use kucoin_sdk::prelude::*;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut instruments: Vec<String> = std::env::args().skip(1).collect();
    if instruments.is_empty() {
        instruments.push("BTC-USDT".to_string());
    }

    println!("=== KuCoin Book Mirror ===\n");
    println!("Instruments: {}", instruments.join(", "));

    let mut mirror = BookMirror::builder(instruments)
        .with_snapshot_dir("./books")
        .with_restart_delay(Duration::from_secs(5))
        .start()?;

    let mut events = mirror.events().expect("events() already called");
    let mut report = tokio::time::interval(Duration::from_secs(5));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\nShutting down...");
                break;
            }
            event = events.recv() => {
                match event {
                    Some(FeedEvent::Connection(ConnectionEvent::Streaming)) => {
                        println!("[CONNECTION] Streaming");
                    }
                    Some(FeedEvent::Connection(ConnectionEvent::Disconnected { reason })) => {
                        println!("[CONNECTION] Disconnected: {:?}", reason);
                    }
                    Some(FeedEvent::Connection(ConnectionEvent::Restarting { attempt, delay })) => {
                        println!("[CONNECTION] Restart #{} in {:?}", attempt, delay);
                    }
                    Some(FeedEvent::Book(BookEvent::VerificationConfirmed { instrument, sequence })) => {
                        println!("[VERIFY] {} matched at {}", instrument, sequence);
                    }
                    Some(FeedEvent::Book(BookEvent::Persisted { paths })) => {
                        println!("[PERSIST] {} file(s) written", paths.len());
                    }
                    Some(_) => {}
                    None => {
                        println!("Event channel closed");
                        break;
                    }
                }
            }
            _ = report.tick() => {
                for instrument in mirror.instruments() {
                    let symbol = instrument.as_str();
                    if let Some(top) = mirror.best_bid_ask(symbol) {
                        println!(
                            "{:<10} bid {:>14} ask {:>14} spread {:?} seq {:?}",
                            symbol,
                            top.bid.map(|l| l.price.to_string()).unwrap_or_default(),
                            top.ask.map(|l| l.price.to_string()).unwrap_or_default(),
                            mirror.spread(symbol),
                            mirror.sequence(symbol),
                        );
                    }
                }
            }
        }
    }

    let stats = mirror.stats();
    mirror.shutdown();
    mirror.join().await?;

    println!("\n--- Final Statistics ---");
    println!("Frames:        {}", stats.frames);
    println!("Verified:      {}", stats.verifications_confirmed);
    println!("Mismatches:    {}", stats.verification_failures);
    println!("Restarts:      {}", stats.restarts);

    Ok(())
}
