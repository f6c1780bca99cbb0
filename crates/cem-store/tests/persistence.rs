//! On-disk behavior: entries survive reopening the database file.

use serde_json::json;

use cem_store::cache::{TTL_PRODUCT_SECS, product_key};
use cem_store::{CacheBackend, CacheMeta, CacheStore, MemoryCache, Store};

#[test]
fn cache_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");
    let key = product_key("MG996R", 1);
    let now = cem_core::time::now_unix_secs();

    {
        let mut store = Store::open(&path).unwrap();
        store
            .set_at(
                &key,
                &json!({"status": "success", "best_price": 8.49}),
                TTL_PRODUCT_SECS,
                &CacheMeta::new("product_price", "web_search", "medium"),
                now,
            )
            .unwrap();
    }

    let mut reopened = Store::open(&path).unwrap();
    let hit = reopened.get_at(&key, now + 10).unwrap().unwrap();
    assert_eq!(hit.value["best_price"], 8.49);
    assert_eq!(hit.hits, 1);
    assert!(reopened.get_at(&key, now + TTL_PRODUCT_SECS).unwrap().is_none());
}

#[test]
fn memory_layer_over_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("layered.db");
    let meta = CacheMeta::new("currency", "static_rates", "high");

    {
        let mut layered = CacheStore::with_fallback(
            Box::new(MemoryCache::new()),
            Box::new(Store::open(&path).unwrap()),
        );
        assert!(layered.set("currency:USD:EUR", &json!({"rate": 0.85}), 600, &meta));
    }

    // A fresh process starts with an empty memory layer and reads through.
    let mut layered = CacheStore::with_fallback(
        Box::new(MemoryCache::new()),
        Box::new(Store::open(&path).unwrap()),
    );
    let hit = layered.get("currency:USD:EUR").unwrap();
    assert_eq!(hit.value["rate"], 0.85);
    assert_eq!(layered.stats().unwrap().primary.total_entries, 1);
}

#[test]
fn jobs_and_parts_share_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cem.db");
    let id = {
        let store = Store::open(&path).unwrap();
        store.seed_parts_from_catalog().unwrap();
        let job = store.create_job("pan tilt mount").unwrap();
        store.fail_job(job.id, "no dotnet").unwrap();
        job.id
    };

    let store = Store::open_url(path.to_str().unwrap()).unwrap();
    assert!(store.get_part("MG996R").unwrap().is_some());
    assert_eq!(
        store.get_job(id).unwrap().unwrap().error.as_deref(),
        Some("no dotnet")
    );
}
