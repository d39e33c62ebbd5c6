//! Keeps the first price page live and prints every snapshot.
//!
//! The list policy refetches every 60 seconds. Press Ctrl-C to stop; dropping
//! the observer stops its timers.
//!
//! Run:
//!   NEXT_PUBLIC_API_BASE_URL=http://localhost:8000 \
//!     cargo run -p coinwatch-demos --example watch

use std::sync::Arc;

use coinwatch::{CryptoQueries, QueryClient, QueryStatus};
use coinwatch_client::ApiClient;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,coinwatch=debug")),
        )
        .init();

    let api = Arc::new(ApiClient::from_env()?);
    let crypto = CryptoQueries::new(api, QueryClient::default());
    let mut observer = crypto.watch_list(1, None);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            snapshot = observer.changed() => {
                let Some(snapshot) = snapshot else { break };
                match snapshot.status {
                    QueryStatus::Loading => println!("loading..."),
                    QueryStatus::Error => println!(
                        "error: {}",
                        snapshot.error.map(|error| error.message()).unwrap_or_default()
                    ),
                    QueryStatus::Success => {
                        let coins = snapshot.data.map_or(0, |page| page.items.len());
                        println!(
                            "{coins} coins, updated {:?}, fetching: {}",
                            snapshot.updated_at, snapshot.is_fetching
                        );
                    }
                }
            }
        }
    }

    drop(observer);
    println!("stopped");
    Ok(())
}
