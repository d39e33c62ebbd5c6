//! Market queries against a wiremock backend.

use std::sync::Arc;
use std::time::Duration;

use coinwatch::crypto::symbol_history_key;
use coinwatch::{CryptoQueries, Freshness, QueryClient, QueryKey, QueryPolicy};
use coinwatch_client::{ApiClient, ClientConfig};
use coinwatch_core::{HistorySeries, Page};
use serde_json::{Value, json};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LATEST: &str = "/api/crypto/prices/latest/";
const HISTORY: &str = "/api/crypto/prices/history/";

fn crypto(server: &MockServer) -> CryptoQueries<ApiClient> {
    let api = ApiClient::new(ClientConfig::new(server.uri())).unwrap();
    CryptoQueries::new(Arc::new(api), QueryClient::default())
}

fn listing(count: u64, symbols: &[&str]) -> Value {
    let results: Vec<Value> = symbols
        .iter()
        .map(|symbol| json!({"symbol": symbol, "price_usd": 1.5}))
        .collect();
    json!({"count": count, "results": results})
}

#[tokio::test]
async fn concurrent_page_requests_share_one_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LATEST))
        .and(query_param("page", "1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(listing(2, &["BTC", "ETH"]))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let crypto = crypto(&server);
    let (first, second) = tokio::join!(crypto.list(1), crypto.list(1));
    let (first, second) = (first.unwrap(), second.unwrap());

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.items.len(), 2);
}

#[tokio::test]
async fn next_page_is_prefetched_once_total_is_known() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LATEST))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(60, &["BTC"])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(LATEST))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(60, &["SOL"])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(LATEST))
        .and(query_param("page", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(60, &["ADA"])))
        .expect(0)
        .mount(&server)
        .await;

    let crypto = crypto(&server);
    crypto.list(1).await.unwrap();
    crypto.queries().tasks().wait_all().await;

    let cached = crypto
        .queries()
        .get_query_data::<Page<coinwatch_core::Coin>>(&QueryKey::list(2))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cached.items[0].symbol, "SOL");
}

#[tokio::test]
async fn failed_symbol_history_is_empty_and_not_stored() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LATEST))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(2, &["btc", "DOGE"])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(HISTORY))
        .and(query_param("symbols", "BTC"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"symbol": "BTC", "points": [["2025-01-02T00:00:00Z", 2], ["2025-01-01T00:00:00Z", 1]]}
        ])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(HISTORY))
        .and(query_param("symbols", "DOGE"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "unknown symbol"})))
        .expect(1)
        .mount(&server)
        .await;

    let crypto = crypto(&server);
    let view = crypto.with_history(1).await.unwrap();

    assert_eq!(view.total_pages, Some(1));
    assert_eq!(view.history["BTC"], vec![1.0, 2.0]);
    assert!(view.history["DOGE"].is_empty());

    let queries = crypto.queries();
    assert!(queries
        .get_query_data::<HistorySeries>(&symbol_history_key("doge"))
        .await
        .unwrap()
        .is_none());
    assert!(queries
        .get_query_data::<HistorySeries>(&symbol_history_key("btc"))
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn refresh_list_forces_the_next_read_to_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LATEST))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(1, &["BTC"])))
        .expect(2)
        .mount(&server)
        .await;

    let crypto = crypto(&server);
    crypto.list(1).await.unwrap();
    crypto.list(1).await.unwrap();

    let refreshed = crypto.refresh_list(Some(1)).await;
    assert_eq!(refreshed, vec![QueryKey::list(1)]);
    crypto.list(1).await.unwrap();
}

#[tokio::test]
async fn refresh_history_reaches_every_series_of_the_symbol() {
    let server = MockServer::start().await;
    let crypto = crypto(&server);
    let queries = crypto.queries();
    let policy = QueryPolicy::history();

    let btc = symbol_history_key("btc");
    let btc_week = QueryKey::coin_history("BTC", "7d");
    let pair = QueryKey::history(["BTC", "ETH"]);
    let eth = symbol_history_key("eth");
    for key in [&btc, &btc_week, &eth] {
        queries
            .set_query_data(key, HistorySeries::new(key.to_string(), Vec::new()), &policy)
            .await;
    }
    queries.set_query_data(&pair, Vec::<HistorySeries>::new(), &policy).await;

    let mut refreshed: Vec<String> = crypto
        .refresh_history(Some(&["btc"][..]))
        .await
        .iter()
        .map(ToString::to_string)
        .collect();
    refreshed.sort();
    let mut expected: Vec<String> = [&btc, &btc_week, &pair].iter().map(|key| key.to_string()).collect();
    expected.sort();
    assert_eq!(refreshed, expected);

    for key in [&btc, &btc_week] {
        let value = queries.get_query_value::<HistorySeries>(key).await.unwrap().unwrap();
        assert_eq!(value.freshness(), Freshness::Stale);
    }
    let untouched = queries.get_query_value::<HistorySeries>(&eth).await.unwrap().unwrap();
    assert_eq!(untouched.freshness(), Freshness::Fresh);
}

#[tokio::test]
async fn empty_symbol_sets_and_blank_searches_skip_the_network() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let crypto = crypto(&server);
    assert!(crypto.history(&[" ", ""]).await.unwrap().is_empty());
    assert!(crypto.search("   ").await.unwrap().is_empty());
}

#[tokio::test]
async fn observer_refetches_after_invalidation() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LATEST))
        .and(query_param("symbols", "ETH"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"results": [{"symbol": "ETH", "price_usd": "3100"}]})),
        )
        .expect(2)
        .mount(&server)
        .await;

    let crypto = crypto(&server);
    let mut observer = crypto.watch_coin("eth");
    let first = observer
        .wait_for(|snapshot| snapshot.is_success())
        .await
        .unwrap();
    let first_update = first.updated_at.unwrap();
    assert_eq!(
        first.data.as_deref().cloned().flatten().unwrap().price_usd,
        Some(3100.0)
    );

    crypto.refresh_all().await;
    let second = observer
        .wait_for(|snapshot| snapshot.updated_at.is_some_and(|at| at > first_update))
        .await
        .unwrap();
    assert!(second.is_success());
    assert!(!second.is_placeholder);
}

#[tokio::test]
async fn next_page_observer_shows_previous_page_until_loaded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LATEST))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(50, &["BTC"])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(LATEST))
        .and(query_param("page", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(listing(50, &["XRP"]))
                .set_delay(Duration::from_millis(100)),
        )
        .mount(&server)
        .await;

    let crypto = crypto(&server);
    let mut first = crypto.watch_list(1, None);
    first.wait_for(|snapshot| snapshot.is_success()).await.unwrap();

    let mut second = crypto.watch_list(2, Some(&first));
    let shown = second.current();
    assert!(shown.is_placeholder);
    assert_eq!(shown.data.unwrap().items[0].symbol, "BTC");

    let loaded = second
        .wait_for(|snapshot| snapshot.is_success())
        .await
        .unwrap();
    assert!(!loaded.is_placeholder);
    assert_eq!(loaded.data.unwrap().items[0].symbol, "XRP");
}
