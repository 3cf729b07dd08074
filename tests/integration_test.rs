use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use snapshot_cache::cache::{RefreshPolicy, RefreshingSnapshotCache, Validity};
use snapshot_cache::fetchers::fetcher::ErrorKind;
use snapshot_cache::fetchers::http::serde_decoder::JsonDecoder;
use snapshot_cache::fetchers::http::HttpFetcher;

#[derive(Debug, Serialize, Deserialize, Eq, PartialEq)]
struct MockData {
    test_number: u32,
}

type SnapCache = RefreshingSnapshotCache<MockData, HttpFetcher<MockData, JsonDecoder<MockData>>>;

fn init_cache(url: &str, policy: RefreshPolicy) -> SnapCache {
    let client = reqwest::Client::default();
    let fetcher = HttpFetcher::new(client, Url::parse(url).unwrap(), JsonDecoder::default())
        .with_timeout(Duration::from_secs(2));
    RefreshingSnapshotCache::new(
        "Test cache".to_string(),
        MockData { test_number: 0 },
        fetcher,
        policy,
    )
}

#[tokio::test]
async fn refresh_decodes_json_into_fresh_snapshot() {
    static MOCK_DATA: MockData = MockData { test_number: 999 };

    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/mock")
        .with_header("Content-Type", "application/json")
        .with_body(serde_json::to_string(&MOCK_DATA).unwrap())
        .expect(1)
        .create_async()
        .await;

    let cache = init_cache(&(server.url() + "/mock"), RefreshPolicy::Never);
    assert_eq!(cache.current().validity(), Validity::Placeholder);

    let snapshot = cache.refresh().await;
    assert_eq!(snapshot.value(), &MOCK_DATA);
    assert_eq!(snapshot.validity(), Validity::Fresh);

    mock.assert_async().await;
}

#[tokio::test]
async fn query_parameters_are_sent_with_each_request() {
    static MOCK_DATA: MockData = MockData { test_number: 7 };

    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/lottery")
        .match_query(mockito::Matcher::AllOf(vec![
            mockito::Matcher::UrlEncoded("lottery_id".into(), "ssq".into()),
            mockito::Matcher::UrlEncoded("lottery_no".into(), "".into()),
        ]))
        .with_header("Content-Type", "application/json")
        .with_body(serde_json::to_string(&MOCK_DATA).unwrap())
        .expect(1)
        .create_async()
        .await;

    let client = reqwest::Client::default();
    let fetcher = HttpFetcher::new(
        client,
        Url::parse(&(server.url() + "/lottery")).unwrap(),
        JsonDecoder::default(),
    )
    .with_query([
        ("lottery_id".to_string(), "ssq".to_string()),
        ("lottery_no".to_string(), String::new()),
    ]);
    let cache = RefreshingSnapshotCache::new(
        "Lottery".to_string(),
        MockData { test_number: 0 },
        fetcher,
        RefreshPolicy::Never,
    );

    let snapshot = cache.refresh().await;
    assert_eq!(snapshot.value(), &MOCK_DATA);
    mock.assert_async().await;
}

#[tokio::test]
async fn server_error_degrades_fresh_snapshot_to_stale() {
    static MOCK_DATA: MockData = MockData { test_number: 123 };

    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/mock")
        .with_header("Content-Type", "application/json")
        .with_body(serde_json::to_string(&MOCK_DATA).unwrap())
        .expect(1)
        .create_async()
        .await;

    let cache = init_cache(&(server.url() + "/mock"), RefreshPolicy::Never);
    let fresh = cache.refresh().await;
    assert_eq!(fresh.validity(), Validity::Fresh);
    mock.assert_async().await;

    // Remote starts failing; the cached value must survive.
    server.reset();
    let _failing = server
        .mock("GET", "/mock")
        .with_status(500)
        .create_async()
        .await;

    let degraded = cache.refresh().await;
    assert_eq!(degraded.value(), &MOCK_DATA);
    assert_eq!(degraded.validity(), Validity::Stale);
    assert_eq!(degraded.captured_at(), fresh.captured_at());
    assert_eq!(cache.failure_count(), 1);
    assert_eq!(cache.last_failure().unwrap().kind(), ErrorKind::Transport);
}

#[tokio::test]
async fn malformed_body_is_recorded_as_decode_failure() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/mock")
        .with_header("Content-Type", "application/json")
        .with_body("not json at all")
        .create_async()
        .await;

    let cache = init_cache(&(server.url() + "/mock"), RefreshPolicy::Never);
    let snapshot = cache.refresh().await;

    // No successful fetch yet, so the placeholder is all we have.
    assert_eq!(snapshot.validity(), Validity::Placeholder);
    assert_eq!(snapshot.value(), &MockData { test_number: 0 });
    assert_eq!(cache.last_failure().unwrap().kind(), ErrorKind::Decode);
}

#[tokio::test]
async fn slow_response_is_recorded_as_timeout() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/mock")
        .with_header("Content-Type", "application/json")
        .with_chunked_body(|writer| {
            std::thread::sleep(Duration::from_millis(500));
            writer.write_all(b"{\"test_number\": 1}")
        })
        .create_async()
        .await;

    let client = reqwest::Client::default();
    let fetcher = HttpFetcher::new(
        client,
        Url::parse(&(server.url() + "/mock")).unwrap(),
        JsonDecoder::default(),
    )
    .with_timeout(Duration::from_millis(100));
    let cache = RefreshingSnapshotCache::new(
        "Slow".to_string(),
        MockData { test_number: 0 },
        fetcher,
        RefreshPolicy::Never,
    );

    let snapshot = cache.refresh().await;
    assert_eq!(snapshot.validity(), Validity::Placeholder);
    assert_eq!(cache.last_failure().unwrap().kind(), ErrorKind::Timeout);
}

#[tokio::test]
async fn scheduler_refreshes_at_policy_instants() {
    static MOCK_DATA: MockData = MockData { test_number: 55 };

    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/mock")
        .with_header("Content-Type", "application/json")
        .with_body(serde_json::to_string(&MOCK_DATA).unwrap())
        .expect_at_least(1)
        .create_async()
        .await;

    let cache = init_cache(
        &(server.url() + "/mock"),
        RefreshPolicy::After(Duration::from_millis(100)),
    );

    // After(d) re-arms on every completed refresh, so the loop runs until we
    // stop driving it.
    let _ = tokio::time::timeout(Duration::from_millis(400), cache.run_scheduled()).await;

    assert_eq!(cache.current().value(), &MOCK_DATA);
    assert_eq!(cache.current().validity(), Validity::Fresh);
    mock.assert_async().await;
}
