//! End-to-end pipeline tests: rule dispatch, storage, freshness, and the
//! fallback strategies, against the in-memory store and a scripted fetcher.

mod common;

use bytes::Bytes;
use common::{build, harness, make_record};
use http::Method;
use sirocco::{
    CacheRule, CacheStatus, Command, CommandReply, EngineConfig, EngineError, FallbackStrategy,
    FetchRequest,
};
use sirocco_backend::RecordStore;
use sirocco_core::now_ms;

fn jpg_config() -> EngineConfig {
    EngineConfig {
        rules: vec![CacheRule::new(r".*\.jpg$", 60)],
        ..Default::default()
    }
}

fn config_with_strategy(strategy: FallbackStrategy) -> EngineConfig {
    let mut rule = CacheRule::new(r".*\.jpg$", 60);
    rule.fallback.strategy = strategy;
    EngineConfig {
        rules: vec![rule],
        ..Default::default()
    }
}

#[tokio::test]
async fn miss_fetches_and_stores_with_rule_ttl() {
    let h = harness(jpg_config()).await;
    h.fetcher.respond("https://cdn.x/a.jpg", 200, &[], b"img");

    let before = now_ms();
    let response = h
        .engine
        .handle(FetchRequest::get("https://cdn.x/a.jpg"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response.cache_status, CacheStatus::Miss);
    assert_eq!(response.body, Bytes::from_static(b"img"));

    let record = h.store.get("https://cdn.x/a.jpg").await.unwrap().unwrap();
    assert_eq!(record.size, 3);
    assert_eq!(record.pattern, r".*\.jpg$");
    // No cache headers: the rule's 60 minutes apply.
    let expected = before + 3_600_000;
    assert!((record.valid_until - expected).abs() < 5_000);
    // No content-type from the origin: guessed from the extension.
    assert_eq!(
        record.headers.get("content-type").unwrap(),
        "image/jpeg"
    );
    assert_eq!(h.engine.stats().misses(), 1);
}

#[tokio::test]
async fn second_request_is_served_from_cache() {
    let h = harness(jpg_config()).await;
    h.fetcher.respond("https://cdn.x/a.jpg", 200, &[], b"img");

    h.engine
        .handle(FetchRequest::get("https://cdn.x/a.jpg"))
        .await
        .unwrap()
        .unwrap();
    let second = h
        .engine
        .handle(FetchRequest::get("https://cdn.x/a.jpg"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(second.cache_status, CacheStatus::Hit);
    assert_eq!(second.body, Bytes::from_static(b"img"));
    assert_eq!(h.fetcher.call_count("https://cdn.x/a.jpg"), 1);
    assert_eq!(h.engine.stats().hits(), 1);
    assert_eq!(h.engine.stats().misses(), 1);
}

#[tokio::test]
async fn post_bodies_occupy_distinct_slots() {
    let mut rule = CacheRule::new(r".*/api/getProducts$", 60);
    rule.method = Some(Method::POST);
    let h = harness(EngineConfig {
        rules: vec![rule],
        ..Default::default()
    })
    .await;
    h.fetcher
        .respond("https://x/api/getProducts", 200, &[], b"page");

    let request_a =
        FetchRequest::new(Method::POST, "https://x/api/getProducts").with_body(&b"A"[..]);
    let request_b =
        FetchRequest::new(Method::POST, "https://x/api/getProducts").with_body(&b"B"[..]);
    h.engine.handle(request_a).await.unwrap().unwrap();
    h.engine.handle(request_b).await.unwrap().unwrap();

    assert_eq!(h.store.count().await.unwrap(), 2);
    let mut keys: Vec<String> = h
        .store
        .snapshot()
        .await
        .unwrap()
        .into_iter()
        .map(|record| record.key.to_string())
        .collect();
    keys.sort();
    assert_ne!(keys[0], keys[1]);
    for key in &keys {
        assert!(key.starts_with("https://x/api/getProducts-"));
    }
}

#[tokio::test]
async fn no_store_responses_are_never_persisted() {
    let h = harness(jpg_config()).await;
    h.fetcher.respond(
        "https://cdn.x/a.jpg",
        200,
        &[("cache-control", "no-store")],
        b"img",
    );

    let response = h
        .engine
        .handle(FetchRequest::get("https://cdn.x/a.jpg"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response.body, Bytes::from_static(b"img"));
    assert_eq!(h.store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn set_cookie_responses_are_never_persisted() {
    let h = harness(jpg_config()).await;
    h.fetcher.respond(
        "https://cdn.x/a.jpg",
        200,
        &[("set-cookie", "session=abc")],
        b"img",
    );

    h.engine
        .handle(FetchRequest::get("https://cdn.x/a.jpg"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(h.store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn s_maxage_outranks_max_age_for_ttl() {
    let h = harness(jpg_config()).await;
    h.fetcher.respond(
        "https://cdn.x/a.jpg",
        200,
        &[("cache-control", "max-age=3600, s-maxage=7200")],
        b"img",
    );

    let before = now_ms();
    h.engine
        .handle(FetchRequest::get("https://cdn.x/a.jpg"))
        .await
        .unwrap()
        .unwrap();

    let record = h.store.get("https://cdn.x/a.jpg").await.unwrap().unwrap();
    // 7200 seconds = 120 minutes, not max-age's 60.
    let expected = before + 7_200_000;
    assert!((record.valid_until - expected).abs() < 5_000);
}

#[tokio::test]
async fn not_modified_extends_validity_without_touching_the_body() {
    let h = harness(jpg_config()).await;
    let now = now_ms();
    let mut record = make_record(
        "https://cdn.x/a.jpg",
        b"cached-img",
        r".*\.jpg$",
        now - 1_000,
        now - 1_000,
        now - 600_000,
    );
    record.etag = Some("\"v1\"".to_owned());
    h.store.put(record).await.unwrap();
    h.fetcher.respond("https://cdn.x/a.jpg", 304, &[], b"");

    let response = h
        .engine
        .handle(FetchRequest::get("https://cdn.x/a.jpg"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(response.cache_status, CacheStatus::Hit);
    assert_eq!(response.body, Bytes::from_static(b"cached-img"));
    assert_eq!(h.engine.stats().hits(), 1);
    assert_eq!(h.engine.stats().revalidations(), 1);

    // The conditional request carried the validator.
    let calls = h.fetcher.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].headers.get("if-none-match").unwrap(), "\"v1\"");

    // Validity moved forward by the rule's TTL; body untouched.
    let stored = h.store.get("https://cdn.x/a.jpg").await.unwrap().unwrap();
    assert_eq!(stored.body, Bytes::from_static(b"cached-img"));
    let expected = now_ms() + 3_600_000;
    assert!((stored.valid_until - expected).abs() < 5_000);
}

#[tokio::test]
async fn changed_resource_replaces_the_record() {
    let h = harness(jpg_config()).await;
    let now = now_ms();
    let mut record = make_record(
        "https://cdn.x/a.jpg",
        b"old",
        r".*\.jpg$",
        now - 1_000,
        now - 1_000,
        now - 600_000,
    );
    record.etag = Some("\"v1\"".to_owned());
    h.store.put(record).await.unwrap();
    h.fetcher.respond("https://cdn.x/a.jpg", 200, &[], b"new");

    let response = h
        .engine
        .handle(FetchRequest::get("https://cdn.x/a.jpg"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(response.cache_status, CacheStatus::Miss);
    assert_eq!(response.body, Bytes::from_static(b"new"));
    assert_eq!(h.engine.stats().misses(), 1);
    let stored = h.store.get("https://cdn.x/a.jpg").await.unwrap().unwrap();
    assert_eq!(stored.body, Bytes::from_static(b"new"));
}

#[tokio::test]
async fn revalidation_failure_serves_the_stale_record() {
    let h = harness(jpg_config()).await;
    let now = now_ms();
    let mut record = make_record(
        "https://cdn.x/a.jpg",
        b"stale-img",
        r".*\.jpg$",
        now - 60_000,
        now - 60_000,
        now - 600_000,
    );
    record.etag = Some("\"v1\"".to_owned());
    h.store.put(record).await.unwrap();
    h.fetcher.fail("https://cdn.x/a.jpg");

    let response = h
        .engine
        .handle(FetchRequest::get("https://cdn.x/a.jpg"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(response.cache_status, CacheStatus::Stale);
    assert_eq!(response.body, Bytes::from_static(b"stale-img"));
    assert_eq!(h.engine.stats().errors(), 1);
}

#[tokio::test]
async fn too_stale_records_yield_the_unavailable_payload() {
    let h = harness(jpg_config()).await;
    let now = now_ms();
    // Default max stale age is 1440 minutes; this record expired two days
    // ago and carries no validators.
    h.store
        .put(make_record(
            "https://cdn.x/a.jpg",
            b"ancient",
            r".*\.jpg$",
            now - 2 * 1_440 * 60_000,
            now - 2 * 1_440 * 60_000,
            now - 3 * 1_440 * 60_000,
        ))
        .await
        .unwrap();
    h.fetcher.fail("https://cdn.x/a.jpg");

    let response = h
        .engine
        .handle(FetchRequest::get("https://cdn.x/a.jpg"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(response.status, http::StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        response.headers.get("content-type").unwrap(),
        "application/json"
    );
    let body = String::from_utf8(response.body.to_vec()).unwrap();
    assert!(body.contains("Network request failed"));
}

#[tokio::test]
async fn network_only_propagates_failure_despite_a_fresh_record() {
    let h = harness(config_with_strategy(FallbackStrategy::NetworkOnly)).await;
    let now = now_ms();
    h.store
        .put(make_record(
            "https://cdn.x/a.jpg",
            b"fresh-img",
            r".*\.jpg$",
            now + 3_600_000,
            now,
            now,
        ))
        .await
        .unwrap();
    h.fetcher.fail("https://cdn.x/a.jpg");

    let result = h.engine.handle(FetchRequest::get("https://cdn.x/a.jpg")).await;
    assert!(matches!(result, Err(EngineError::Fetch(_))));
    assert_eq!(h.engine.stats().errors(), 1);
}

#[tokio::test]
async fn network_only_always_goes_to_the_network() {
    let h = harness(config_with_strategy(FallbackStrategy::NetworkOnly)).await;
    let now = now_ms();
    h.store
        .put(make_record(
            "https://cdn.x/a.jpg",
            b"cached-img",
            r".*\.jpg$",
            now + 3_600_000,
            now,
            now,
        ))
        .await
        .unwrap();
    h.fetcher.respond("https://cdn.x/a.jpg", 200, &[], b"network-img");

    let response = h
        .engine
        .handle(FetchRequest::get("https://cdn.x/a.jpg"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(response.body, Bytes::from_static(b"network-img"));
    assert_eq!(h.fetcher.call_count("https://cdn.x/a.jpg"), 1);
}

#[tokio::test]
async fn stale_while_revalidate_serves_then_refreshes() {
    let h = harness(config_with_strategy(FallbackStrategy::StaleWhileRevalidate)).await;
    let now = now_ms();
    h.store
        .put(make_record(
            "https://cdn.x/a.jpg",
            b"old",
            r".*\.jpg$",
            now - 60_000,
            now - 60_000,
            now - 600_000,
        ))
        .await
        .unwrap();
    h.fetcher.respond("https://cdn.x/a.jpg", 200, &[], b"new");

    let response = h
        .engine
        .handle(FetchRequest::get("https://cdn.x/a.jpg"))
        .await
        .unwrap()
        .unwrap();

    // Expired record still served immediately, counted as a hit.
    assert_eq!(response.cache_status, CacheStatus::Stale);
    assert_eq!(response.body, Bytes::from_static(b"old"));
    assert_eq!(h.engine.stats().hits(), 1);

    h.engine.wait_background().await;
    let refreshed = h.store.get("https://cdn.x/a.jpg").await.unwrap().unwrap();
    assert_eq!(refreshed.body, Bytes::from_static(b"new"));
    assert_eq!(h.fetcher.call_count("https://cdn.x/a.jpg"), 1);
}

#[tokio::test]
async fn stale_while_revalidate_fresh_record_skips_the_network() {
    let h = harness(config_with_strategy(FallbackStrategy::StaleWhileRevalidate)).await;
    let now = now_ms();
    h.store
        .put(make_record(
            "https://cdn.x/a.jpg",
            b"fresh-img",
            r".*\.jpg$",
            now + 3_600_000,
            now,
            now,
        ))
        .await
        .unwrap();

    let response = h
        .engine
        .handle(FetchRequest::get("https://cdn.x/a.jpg"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(response.cache_status, CacheStatus::Hit);
    h.engine.wait_background().await;
    assert_eq!(h.fetcher.call_count("https://cdn.x/a.jpg"), 0);
}

#[tokio::test]
async fn stale_while_revalidate_swallows_background_failures() {
    let h = harness(config_with_strategy(FallbackStrategy::StaleWhileRevalidate)).await;
    let now = now_ms();
    h.store
        .put(make_record(
            "https://cdn.x/a.jpg",
            b"old",
            r".*\.jpg$",
            now - 60_000,
            now - 60_000,
            now - 600_000,
        ))
        .await
        .unwrap();
    h.fetcher.fail("https://cdn.x/a.jpg");

    let response = h
        .engine
        .handle(FetchRequest::get("https://cdn.x/a.jpg"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response.body, Bytes::from_static(b"old"));

    h.engine.wait_background().await;
    // Background failure is logged only; the record and counters are as
    // they were.
    let record = h.store.get("https://cdn.x/a.jpg").await.unwrap().unwrap();
    assert_eq!(record.body, Bytes::from_static(b"old"));
    assert_eq!(h.engine.stats().errors(), 0);
}

#[tokio::test]
async fn unmatched_requests_are_declined() {
    let h = harness(jpg_config()).await;
    let result = h
        .engine
        .handle(FetchRequest::get("https://cdn.x/data.json"))
        .await
        .unwrap();
    assert!(result.is_none());
    assert!(h.fetcher.calls().is_empty());
}

#[tokio::test]
async fn uninitialized_engine_declines() {
    let h = build(jpg_config());
    let result = h
        .engine
        .handle(FetchRequest::get("https://cdn.x/a.jpg"))
        .await
        .unwrap();
    assert!(result.is_none());
}

#[tokio::test(start_paused = true)]
async fn timeout_counts_as_network_failure() {
    let mut rule = CacheRule::new(r".*\.jpg$", 60);
    rule.timeout_ms = 50;
    let h = harness(EngineConfig {
        rules: vec![rule],
        ..Default::default()
    })
    .await;
    h.fetcher.hang("https://cdn.x/a.jpg");

    let response = h
        .engine
        .handle(FetchRequest::get("https://cdn.x/a.jpg"))
        .await
        .unwrap()
        .unwrap();

    // No record to fall back to: the structured unavailable payload.
    assert_eq!(response.status, http::StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(h.engine.stats().errors(), 1);
}

#[tokio::test]
async fn invalid_rule_patterns_degrade_without_blocking_later_rules() {
    let h = harness(EngineConfig {
        rules: vec![
            CacheRule::new(r"[unclosed", 60),
            CacheRule::new(r".*\.css$", 30),
        ],
        ..Default::default()
    })
    .await;
    h.fetcher.respond("https://cdn.x/site.css", 200, &[], b"body{}");

    let response = h
        .engine
        .handle(FetchRequest::get("https://cdn.x/site.css"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response.body, Bytes::from_static(b"body{}"));

    // And the stats command still works end to end.
    match h.engine.execute(Command::Stats).await {
        CommandReply::Stats(snapshot) => assert_eq!(snapshot.misses, 1),
        other => panic!("unexpected reply: {other:?}"),
    }
}
