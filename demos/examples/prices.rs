//! Reads one page of prices with history, then runs a debounced search.
//!
//! Run:
//!   NEXT_PUBLIC_API_BASE_URL=http://localhost:8000 \
//!     cargo run -p coinwatch-demos --example prices -- 2 eth

use std::sync::Arc;

use coinwatch::search::SEARCH_DEBOUNCE;
use coinwatch::{CryptoQueries, DebouncedSearch, QueryClient};
use coinwatch_client::ApiClient;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("coinwatch=debug")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let page = args.next().and_then(|arg| arg.parse().ok()).unwrap_or(1);
    let query = args.next().unwrap_or_else(|| "btc".to_owned());

    let api = Arc::new(ApiClient::from_env()?);
    let crypto = CryptoQueries::new(api, QueryClient::default());

    println!("=== Page {page} ===");
    let view = crypto.with_history(page).await?;
    for coin in &view.coins.items {
        let symbol = coin.symbol.to_ascii_uppercase();
        let points = view.history.get(symbol.as_str()).map_or(0, Vec::len);
        println!(
            "{symbol:<8} {:>14} ({points} history points)",
            coin.price_usd
                .map_or_else(|| "-".to_owned(), |price| format!("${price:.2}"))
        );
    }
    match view.total_pages {
        Some(total) => println!("page {page} of {total}"),
        None => println!("page {page}"),
    }

    println!("\n=== Same page again (served from cache) ===");
    let again = crypto.with_history(page).await?;
    println!("same data: {}", Arc::ptr_eq(&view.coins, &again.coins));

    println!("\n=== Search {query:?} ===");
    let search = DebouncedSearch::new(crypto.clone());
    let mut updates = search.subscribe();
    for end in 1..=query.len() {
        if let Some(prefix) = query.get(..end) {
            search.input(prefix);
        }
        tokio::time::sleep(SEARCH_DEBOUNCE / 3).await;
    }
    let state = updates
        .wait_for(|state| !state.is_searching)
        .await?
        .clone();
    match (state.results, state.error) {
        (_, Some(error)) => println!("search failed: {}", error.message()),
        (Some(results), None) => {
            for coin in results.iter() {
                println!("{} {:?}", coin.symbol, coin.price_usd);
            }
        }
        (None, None) => println!("nothing to search"),
    }

    crypto.queries().tasks().wait_all().await;
    Ok(())
}
