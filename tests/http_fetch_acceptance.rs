/// Acceptance tests for HTTP fetching: status handling, landing page indirection and the
/// persistent HTTP cache, against a local mock server
mod common;

use common::{blocking, TestHome};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use yas::fetch::{CachingTransport, ContentFetcher, ReqwestTransport, SourceFetcher};
use yas::{CacheStore, Error, LoadContext, MemoryStore, RocksStore};

const JS: &str = "application/javascript";

fn transport() -> ReqwestTransport {
    ReqwestTransport::new("yas-test", Duration::from_secs(10)).unwrap()
}

fn uncached() -> ContentFetcher {
    ContentFetcher::new(Box::new(transport()))
}

fn cached(store: Arc<dyn CacheStore>) -> ContentFetcher {
    ContentFetcher::new(Box::new(CachingTransport::new(transport(), store)))
}

fn url(server: &MockServer, path: &str) -> Url {
    Url::parse(&format!("{}{}", server.uri(), path)).unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_not_found_is_fetch_error_with_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing.js"))
        .respond_with(
            ResponseTemplate::new(404).set_body_raw("<html>not here</html>", "text/html"),
        )
        .mount(&server)
        .await;

    let uri = url(&server, "/missing.js");
    let err = blocking(move || uncached().fetch_source(&uri, &LoadContext::new()))
        .await
        .unwrap_err();

    match err {
        Error::Fetch { uri, cause } => {
            assert!(uri.ends_with("/missing.js"));
            assert!(cause.contains("404"), "cause: {cause}");
        }
        other => panic!("expected fetch error, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_landing_page_is_followed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"<html><head><link rel="yas" href="/real.js"></head><body>docs</body></html>"#,
            "text/html; charset=utf-8",
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/real.js"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("print('real')", JS))
        .expect(1)
        .mount(&server)
        .await;

    let uri = url(&server, "/a");
    let source = blocking(move || uncached().fetch_source(&uri, &LoadContext::new()))
        .await
        .unwrap();

    assert_eq!(source, "print('real')");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_chained_landing_pages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/first"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"<html><head><link rel="yas" href="docs/second"></head></html>"#,
            "text/html",
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/docs/second"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"<html><body><link rel="yas" href="../tool.js"></body></html>"#,
            "text/html",
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tool.js"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("exports.ok = 1;", JS))
        .mount(&server)
        .await;

    let uri = url(&server, "/first");
    let source = blocking(move || uncached().fetch_source(&uri, &LoadContext::new()))
        .await
        .unwrap();

    assert_eq!(source, "exports.ok = 1;");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_redirected_landing_page_resolves_against_final_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/docs/tools/page"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/docs/tools/page"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"<html><head><link rel="yas" href="tool.js"></head></html>"#,
            "text/html",
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/docs/tools/tool.js"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("exports.moved = true;", JS))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tool.js"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("exports.moved = false;", JS))
        .expect(0)
        .mount(&server)
        .await;

    let uri = url(&server, "/old");
    let source = blocking(move || uncached().fetch_source(&uri, &LoadContext::new()))
        .await
        .unwrap();

    assert_eq!(source, "exports.moved = true;");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_landing_page_without_link_is_indirection_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/docs"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("<html><body>Just docs</body></html>", "text/html"),
        )
        .mount(&server)
        .await;

    let uri = url(&server, "/docs");
    let err = blocking(move || uncached().fetch_source(&uri, &LoadContext::new()))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Indirection { .. }), "got {err:?}");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_indirection_loop_is_detected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"<html><head><link rel="yas" href="/pong"></head></html>"#,
            "text/html",
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/pong"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"<html><head><link rel="yas" href="/ping"></head></html>"#,
            "text/html",
        ))
        .mount(&server)
        .await;

    let uri = url(&server, "/ping");
    let err = blocking(move || uncached().fetch_source(&uri, &LoadContext::new()))
        .await
        .unwrap_err();

    match err {
        Error::Indirection { reason, .. } => assert!(reason.contains("loop")),
        other => panic!("expected indirection error, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fresh_cache_entry_skips_network() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tool.js"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("cache-control", "max-age=3600")
                .set_body_raw("print('cached')", JS),
        )
        .expect(1)
        .mount(&server)
        .await;

    let uri = url(&server, "/tool.js");
    let (first, second) = blocking(move || {
        let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
        let first = cached(store.clone()).fetch_source(&uri, &LoadContext::new());
        let second = cached(store).fetch_source(&uri, &LoadContext::new());
        (first, second)
    })
    .await;

    assert_eq!(first.unwrap(), "print('cached')");
    assert_eq!(second.unwrap(), "print('cached')");
}

/// Fetch `uri` twice through one cache
async fn fetch_twice_cached(uri: Url) -> (Result<String, Error>, Result<String, Error>) {
    blocking(move || {
        let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
        let fetcher = cached(store);
        let first = fetcher.fetch_source(&uri, &LoadContext::new());
        let second = fetcher.fetch_source(&uri, &LoadContext::new());
        (first, second)
    })
    .await
}

#[tokio::test(flavor = "multi_thread")]
async fn test_age_beyond_max_age_is_refetched() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/aged.js"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("cache-control", "max-age=60")
                .insert_header("age", "3600")
                .set_body_raw("print('aged')", JS),
        )
        .expect(2)
        .mount(&server)
        .await;

    let (first, second) = fetch_twice_cached(url(&server, "/aged.js")).await;

    assert_eq!(first.unwrap(), "print('aged')");
    assert_eq!(second.unwrap(), "print('aged')");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_expired_response_is_refetched() {
    let server = MockServer::start().await;
    let now = SystemTime::now();
    Mock::given(method("GET"))
        .and(path("/expired.js"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("date", httpdate::fmt_http_date(now).as_str())
                .insert_header(
                    "expires",
                    httpdate::fmt_http_date(now - Duration::from_secs(3600)).as_str(),
                )
                .set_body_raw("print('expired')", JS),
        )
        .expect(2)
        .mount(&server)
        .await;

    let (first, second) = fetch_twice_cached(url(&server, "/expired.js")).await;

    assert_eq!(first.unwrap(), "print('expired')");
    assert_eq!(second.unwrap(), "print('expired')");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_etag_revalidation_keeps_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tool.js"))
        .and(header("if-none-match", "\"v1\""))
        .respond_with(ResponseTemplate::new(304).insert_header("etag", "\"v1\""))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tool.js"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("etag", "\"v1\"")
                .insert_header("cache-control", "no-cache")
                .set_body_raw("print('v1')", JS),
        )
        .expect(1)
        .mount(&server)
        .await;

    let uri = url(&server, "/tool.js");
    let (first, second) = blocking(move || {
        let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
        let fetcher = cached(store);
        let first = fetcher.fetch_source(&uri, &LoadContext::new());
        let second = fetcher.fetch_source(&uri, &LoadContext::new());
        (first, second)
    })
    .await;

    assert_eq!(first.unwrap(), "print('v1')");
    assert_eq!(second.unwrap(), "print('v1')");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_error_responses_are_not_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky.js"))
        .respond_with(
            ResponseTemplate::new(500)
                .insert_header("cache-control", "max-age=3600")
                .set_body_raw("oops", "text/plain"),
        )
        .expect(2)
        .mount(&server)
        .await;

    let uri = url(&server, "/flaky.js");
    let (first, second) = blocking(move || {
        let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
        let fetcher = cached(store);
        let first = fetcher.fetch_source(&uri, &LoadContext::new());
        let second = fetcher.fetch_source(&uri, &LoadContext::new());
        (first, second)
    })
    .await;

    assert!(matches!(first, Err(Error::Fetch { .. })));
    assert!(matches!(second, Err(Error::Fetch { .. })));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cache_survives_store_reopen() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/persistent.js"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("cache-control", "max-age=3600")
                .set_body_raw("print('persisted')", JS),
        )
        .expect(1)
        .mount(&server)
        .await;

    let home = TestHome::new();
    let db = home.path().join("db");
    let uri = url(&server, "/persistent.js");

    let second = blocking(move || {
        {
            let store: Arc<dyn CacheStore> = Arc::new(RocksStore::open(&db).unwrap());
            let first = cached(store).fetch_source(&uri, &LoadContext::new()).unwrap();
            assert_eq!(first, "print('persisted')");
        }

        let store: Arc<dyn CacheStore> = Arc::new(RocksStore::open(&db).unwrap());
        cached(store).fetch_source(&uri, &LoadContext::new())
    })
    .await;

    assert_eq!(second.unwrap(), "print('persisted')");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_slow_origin_hits_deadline() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow.js"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(5))
                .set_body_raw("print('late')", JS),
        )
        .mount(&server)
        .await;

    let uri = url(&server, "/slow.js");
    let err = blocking(move || {
        let ctx = LoadContext::with_timeout(Duration::from_millis(300));
        uncached().fetch_source(&uri, &ctx)
    })
    .await
    .unwrap_err();

    assert!(matches!(err, Error::Timeout { .. }), "got {err:?}");
}
