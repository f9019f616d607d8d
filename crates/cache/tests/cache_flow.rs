use bytes::{BufMut, Bytes, BytesMut};
use chrono::{TimeZone, Utc};
use http::header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderValue, StatusCode};
use micro_cache::codec::EntryFormatter;
use micro_cache::entry::CacheEntry;
use micro_cache::output::CachingWriter;
use micro_cache::store::{MemoryStore, OutputCacheStore};
use micro_cache::{CacheError, CacheOptions};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const TTL: Duration = Duration::from_secs(60);

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn response_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("public, max-age=60"));
    headers.append("x-served-by", HeaderValue::from_static("node-a"));
    headers.append("x-served-by", HeaderValue::from_static("node-b"));
    headers.insert(CONTENT_LENGTH, HeaderValue::from(1024));
    headers
}

fn capture(body: &[u8], options: &CacheOptions) -> Result<CacheEntry, CacheError> {
    let mut writer = CachingWriter::with_options(BytesMut::new(), options, || {})?;
    for chunk in body.chunks(100) {
        writer.put_slice(chunk);
    }
    assert_eq!(&writer.get_ref()[..], body);

    let created = Utc.with_ymd_and_hms(2024, 6, 1, 8, 30, 0).unwrap().fixed_offset();
    let mut entry = CacheEntry::new(created, StatusCode::OK);
    entry.copy_headers_from(&response_headers());
    entry.copy_tags_from(["products", "catalog", "products"]);
    entry.set_body(writer.cached_body()?, true);
    Ok(entry)
}

fn body_of(len: usize) -> Vec<u8> {
    (0..len).map(|i| b'a' + (i % 26) as u8).collect()
}

#[tokio::test]
async fn test_capture_store_and_replay() {
    init_tracing();
    let options = CacheOptions::from_json(r#"{ "segment_size": 256, "interned_headers": ["content-type", "cache-control"] }"#).unwrap();
    let formatter = EntryFormatter::from_options(&options);
    let store = MemoryStore::new();
    let cancel = CancellationToken::new();

    let body = body_of(1000);
    let entry = capture(&body, &options).unwrap();
    assert_eq!(entry.body().segment_count(), 4);
    assert_eq!(entry.tags(), ["products", "catalog"]);

    formatter.store("/products?page=1", entry, TTL, &store, &cancel).await.unwrap();
    assert_eq!(store.len(), 1);

    let cached = formatter.get("/products?page=1", &store, &cancel).await.unwrap().expect("entry should be cached");
    assert_eq!(cached.status(), StatusCode::OK);
    assert_eq!(cached.body().segment_count(), 4);
    assert_eq!(cached.find_header("x-served-by"), Some(&["node-a".to_string(), "node-b".to_string()][..]));
    assert_eq!(cached.find_header("content-length"), None);
    assert_eq!(cached.tags(), ["products", "catalog"]);

    let mut replayed = HeaderMap::new();
    cached.copy_headers_to(&mut replayed);
    assert_eq!(replayed[CONTENT_LENGTH], "1000");
    assert_eq!(replayed[CONTENT_TYPE], "application/json");
    assert_eq!(replayed.get_all("x-served-by").iter().count(), 2);

    let mut out = Vec::new();
    cached.copy_body_to(&mut out).await.unwrap();
    assert_eq!(out, body);
}

#[tokio::test]
async fn test_chunked_response_keeps_transfer_encoding() {
    let formatter = EntryFormatter::default();
    let store = MemoryStore::new();
    let cancel = CancellationToken::new();

    let mut entry = CacheEntry::new(Utc::now().fixed_offset(), StatusCode::OK);
    let mut headers = HeaderMap::new();
    headers.insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
    entry.copy_headers_from(&headers);
    entry.set_body(Bytes::from_static(b"chunked body").into(), false);
    formatter.store("chunked", entry, TTL, &store, &cancel).await.unwrap();

    let cached = formatter.get("chunked", &store, &cancel).await.unwrap().unwrap();
    let mut replayed = HeaderMap::new();
    cached.copy_headers_to(&mut replayed);
    assert!(replayed.get(CONTENT_LENGTH).is_none());
    assert_eq!(replayed[TRANSFER_ENCODING], "chunked");
}

#[test]
fn test_oversized_body_is_not_cached() {
    let options = CacheOptions { max_body_size: 512, segment_size: 128, ..CacheOptions::default() };
    let result = capture(&body_of(600), &options);
    assert!(matches!(result, Err(CacheError::BufferingDisabled)));
}

#[tokio::test]
async fn test_evict_by_tag() {
    let options = CacheOptions::default();
    let formatter = EntryFormatter::from_options(&options);
    let store = Arc::new(MemoryStore::new());
    let cancel = CancellationToken::new();

    formatter.store("/a", capture(b"first", &options).unwrap(), TTL, &store, &cancel).await.unwrap();
    let mut other = CacheEntry::new(Utc::now().fixed_offset(), StatusCode::NOT_FOUND);
    other.copy_tags_from(["errors"]);
    formatter.store("/b", other, TTL, &store, &cancel).await.unwrap();
    assert_eq!(store.len(), 2);

    store.evict_by_tag("catalog", &cancel).await.unwrap();
    assert!(formatter.get("/a", &store, &cancel).await.unwrap().is_none());

    let remaining = formatter.get("/b", &store, &cancel).await.unwrap().unwrap();
    assert_eq!(remaining.status(), StatusCode::NOT_FOUND);
    assert!(remaining.body().is_empty());
}

#[tokio::test]
async fn test_unknown_revision_is_a_miss() {
    let formatter = EntryFormatter::default();
    let store = MemoryStore::new();
    let cancel = CancellationToken::new();

    store.set("future", Some(Bytes::from_static(&[0x7f, 0x00, 0x00])), &[], TTL, &cancel).await.unwrap();
    assert!(formatter.get("future", &store, &cancel).await.unwrap().is_none());
}

#[tokio::test]
async fn test_corrupted_payload_is_reported() {
    init_tracing();
    let formatter = EntryFormatter::default();
    let store = MemoryStore::new();
    let cancel = CancellationToken::new();

    store.set("broken", Some(Bytes::from_static(&[0x02, 0x01])), &[], TTL, &cancel).await.unwrap();
    let err = formatter.get("broken", &store, &cancel).await.unwrap_err();
    assert!(matches!(err, CacheError::Format { .. }));
}

#[tokio::test]
async fn test_canceled_store_write() {
    let formatter = EntryFormatter::default();
    let store = MemoryStore::new();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let entry = CacheEntry::new(Utc::now().fixed_offset(), StatusCode::OK);
    let err = formatter.store("key", entry, TTL, &store, &cancel).await.unwrap_err();
    assert!(matches!(err, CacheError::Store { .. }));
    assert!(store.is_empty());
}
