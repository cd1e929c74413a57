//! DirectFetcher against a local HTTP server

use axum::Router;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use badevand::config::SourceConfig;
use badevand::fetch::{BeachSource, DirectFetcher, FetchError};
use tokio::net::TcpListener;

const BEACHES: &str = r#"[
  {"id": 1, "beachName": "Bellevue Strand", "latitude": 55.777, "longitude": 12.594,
   "municipalityName": "Gentofte", "municipalityUrl": "https://gentofte.dk",
   "data": [{"date": "2024-07-01", "waterQuality": 2, "waterTemperature": 18.6}]},
  {"id": 2, "beachName": "Amager Strand", "latitude": 55.655, "longitude": 12.649,
   "data": []}
]"#;

async fn serve(router: Router) -> SourceConfig {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    SourceConfig {
        api_url: format!("http://{addr}/api/next/beaches"),
        timeout_seconds: 5,
        ..SourceConfig::default()
    }
}

async fn beaches_for_phones(headers: HeaderMap) -> impl IntoResponse {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let accept = headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if user_agent.contains("iPhone") && accept == "application/json" {
        (StatusCode::OK, BEACHES).into_response()
    } else {
        StatusCode::BAD_REQUEST.into_response()
    }
}

fn endpoint<H, T>(handler: H) -> Router
where
    H: axum::handler::Handler<T, ()>,
    T: 'static,
{
    Router::new().route("/api/next/beaches", get(handler))
}

#[tokio::test]
async fn test_fetch_sends_browser_headers_and_parses_beaches() {
    let config = serve(endpoint(beaches_for_phones)).await;
    let fetcher = DirectFetcher::new(&config).unwrap();

    let beaches = fetcher.fetch().await.unwrap();
    assert_eq!(beaches.len(), 2);
    assert_eq!(beaches[0].beach_name.as_deref(), Some("Bellevue Strand"));
    assert_eq!(beaches[0].numeric_id(), Some(1));
    assert_eq!(beaches[0].data[0].water_quality, Some(2.0));
}

#[tokio::test]
async fn test_forbidden_status_is_a_failure() {
    let config = serve(endpoint(|| async { (StatusCode::FORBIDDEN, "blocked") })).await;
    let fetcher = DirectFetcher::new(&config).unwrap();

    match fetcher.fetch().await {
        Err(FetchError::Status(status)) => assert_eq!(status.as_u16(), 403),
        other => panic!("expected status failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_challenge_page_is_a_parse_failure() {
    let challenge = || async { Html("<html><title>Just a moment...</title></html>") };
    let config = serve(endpoint(challenge)).await;
    let fetcher = DirectFetcher::new(&config).unwrap();

    assert!(matches!(fetcher.fetch().await, Err(FetchError::Parse(_))));
}

#[tokio::test]
async fn test_unexpected_shape_is_rejected() {
    let config = serve(endpoint(|| async { r#"[{"id": 1, "latitude": 55.0}]"# })).await;
    let fetcher = DirectFetcher::new(&config).unwrap();

    assert!(matches!(fetcher.fetch().await, Err(FetchError::Shape(_))));
}

#[tokio::test]
async fn test_empty_list_is_rejected() {
    let config = serve(endpoint(|| async { "[]" })).await;
    let fetcher = DirectFetcher::new(&config).unwrap();

    assert!(matches!(fetcher.fetch().await, Err(FetchError::Shape(_))));
}

#[tokio::test]
async fn test_unreachable_server_is_a_transport_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = SourceConfig {
        api_url: format!("http://{addr}/api/next/beaches"),
        timeout_seconds: 5,
        ..SourceConfig::default()
    };
    let fetcher = DirectFetcher::new(&config).unwrap();
    assert!(matches!(fetcher.fetch().await, Err(FetchError::Transport(_))));
}
