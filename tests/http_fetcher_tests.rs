use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::get;
use axum::Router;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nft_ingest::etl::error::FetchError;
use nft_ingest::etl::extractor::{Credentials, FetcherConfig, HttpTransferFetcher, TransferFetcher};
use nft_ingest::etl::transfer::QueryScope;

const PAGE: &str = r#"{
    "pageSize": 1,
    "pageNumber": 1,
    "cursor": "eyJwYWdlIjoyfQ",
    "transfers": [{
        "tokenAddress": "0x06012c8cf97bead5deae237070f9587f8e7a266d",
        "tokenId": "1337",
        "fromAddress": "0x0000000000000000000000000000000000000000",
        "toAddress": "0x2bd2326c993dfaef84f696526064ff22eba5b362",
        "contractType": "ERC721",
        "price": "0",
        "quantity": "1",
        "blockNumber": "15000000",
        "blockTimestamp": "2022-06-21T02:28:43.000Z",
        "blockHash": "0x9a71a95be3fe957457b11817587e5af4c7e24836d5b383c430ff25b9286a457f",
        "transactionHash": "0x5dbbc3c4f9b8bb3d8d25c4c0bd1e20c5a0c63f5c2d0a9d0d9a1f1a0e0e0e0e0e",
        "transactionType": "Single"
    }]
}"#;

#[derive(Debug, Clone)]
struct Recorded {
    path: String,
    query: HashMap<String, String>,
    authorization: Option<String>,
    content_type: Option<String>,
}

type Log = Arc<Mutex<Vec<Recorded>>>;

fn header_value(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn range_transfers(
    State(log): State<Log>,
    Path(network): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> (StatusCode, String) {
    log.lock().unwrap().push(Recorded {
        path: format!("/networks/{network}/nfts/transfers"),
        query,
        authorization: header_value(&headers, header::AUTHORIZATION),
        content_type: header_value(&headers, header::CONTENT_TYPE),
    });

    // The network segment selects the upstream behavior.
    match network.as_str() {
        "400" => (StatusCode::BAD_REQUEST, "rate limited".to_string()),
        "500" => (StatusCode::INTERNAL_SERVER_ERROR, "boom".to_string()),
        "garbage" => (StatusCode::OK, "<html>not json</html>".to_string()),
        "slow" => {
            tokio::time::sleep(Duration::from_secs(5)).await;
            (StatusCode::OK, PAGE.to_string())
        }
        _ => (StatusCode::OK, PAGE.to_string()),
    }
}

async fn block_transfers(
    State(log): State<Log>,
    Path(network): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> (StatusCode, String) {
    log.lock().unwrap().push(Recorded {
        path: format!("/networks/{network}/nfts/block/transfers"),
        query,
        authorization: header_value(&headers, header::AUTHORIZATION),
        content_type: header_value(&headers, header::CONTENT_TYPE),
    });
    (StatusCode::OK, PAGE.replace("eyJwYWdlIjoyfQ", ""))
}

async fn spawn_upstream() -> (String, Log) {
    let log: Log = Arc::default();
    let app = Router::new()
        .route("/networks/:network/nfts/transfers", get(range_transfers))
        .route("/networks/:network/nfts/block/transfers", get(block_transfers))
        .with_state(log.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), log)
}

fn fetcher(api_url: &str, network: &str) -> HttpTransferFetcher {
    let config = FetcherConfig::new(network, Credentials::new("key-1", "secret-1"))
        .with_api_url(api_url)
        .with_request_timeout(Duration::from_millis(500));
    HttpTransferFetcher::new(config).unwrap()
}

#[tokio::test]
async fn test_range_request_shape() {
    let (url, log) = spawn_upstream().await;

    let page = fetcher(&url, "1")
        .fetch(&QueryScope::range(100, 200), None)
        .await
        .unwrap();

    assert_eq!(page.cursor, "eyJwYWdlIjoyfQ");
    assert_eq!(page.transfers.len(), 1);
    assert_eq!(page.transfers[0].token_id, "1337");
    assert_eq!(page.transfers[0].block_timestamp.timestamp(), 1_655_778_523);

    let requests = log.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.path, "/networks/1/nfts/transfers");
    assert_eq!(request.query.get("fromBlock").map(String::as_str), Some("100"));
    assert_eq!(request.query.get("toBlock").map(String::as_str), Some("200"));
    assert!(!request.query.contains_key("cursor"));
    assert_eq!(
        request.authorization.as_deref(),
        Some("Basic a2V5LTE6c2VjcmV0LTE=")
    );
    assert_eq!(request.content_type.as_deref(), Some("application/json"));
}

#[tokio::test]
async fn test_block_request_with_cursor() {
    let (url, log) = spawn_upstream().await;

    let page = fetcher(&url, "137")
        .fetch(&QueryScope::block(15_000_000), Some("abc"))
        .await
        .unwrap();
    assert!(!page.has_next());

    let request = log.lock().unwrap()[0].clone();
    assert_eq!(request.path, "/networks/137/nfts/block/transfers");
    assert_eq!(
        request.query.get("blockHashNumber").map(String::as_str),
        Some("15000000")
    );
    assert_eq!(request.query.get("cursor").map(String::as_str), Some("abc"));
}

#[tokio::test]
async fn test_status_classification() {
    let (url, _log) = spawn_upstream().await;
    let scope = QueryScope::range(1, 2);

    let err = fetcher(&url, "400").fetch(&scope, None).await.unwrap_err();
    assert_eq!(
        err,
        FetchError::RetryableStatus {
            status: 400,
            body: "rate limited".to_string()
        }
    );

    let err = fetcher(&url, "500").fetch(&scope, None).await.unwrap_err();
    assert_eq!(
        err,
        FetchError::FatalStatus {
            status: 500,
            body: "boom".to_string()
        }
    );

    let err = fetcher(&url, "garbage").fetch(&scope, None).await.unwrap_err();
    assert!(matches!(err, FetchError::Decode(_)));
}

#[tokio::test]
async fn test_timeout_is_a_transport_error() {
    let (url, _log) = spawn_upstream().await;

    let err = fetcher(&url, "slow")
        .fetch(&QueryScope::range(1, 2), None)
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Transport(_)));
}

#[tokio::test]
async fn test_connection_refused_is_a_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = fetcher(&format!("http://{addr}"), "1")
        .fetch(&QueryScope::range(1, 2), None)
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Transport(_)));
}
