//! Tests for Store
//!
//! These tests verify:
//! - add/get round trips values, dtypes, shapes and attributes
//! - Duplicate keys, overwrite and remove semantics
//! - Persistence across close/reopen and drop
//! - Cache behavior with and without capacity
//! - Read-only and closed stores reject mutation
//! - Lazy fields read only what is sliced and outlive the store when read
//! - KeyMap / recorded key consistency checks

use std::collections::HashSet;
use std::ops::Range;
use std::path::PathBuf;

use hexstash::container::{Container, KEY_ATTR};
use hexstash::{
    Array, Attrs, Config, DType, EagerField, Entity, OpenMode, StashError, Store, SyncStrategy,
    Value,
};
use proptest::prelude::*;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

// =============================================================================
// Helper Functions
// =============================================================================

/// Route store logs to the test harness (RUST_LOG=hexstash=debug to see them)
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn store_path(dir: &TempDir) -> PathBuf {
    dir.path().join("store.hxs")
}

fn open_store(dir: &TempDir) -> Store {
    init_tracing();
    Store::open_path(store_path(dir), OpenMode::Append, 0).unwrap()
}

fn open_cached_store(dir: &TempDir, capacity: usize) -> Store {
    init_tracing();
    Store::open_path(store_path(dir), OpenMode::Append, capacity).unwrap()
}

/// 64x64 f32 image where pixel (r, c) = r * 64 + c
fn image() -> Array {
    let data: Vec<f32> = (0..64 * 64).map(|i| i as f32).collect();
    Array::from_shape_vec(vec![64, 64], data).unwrap()
}

fn sample_entity(id: i64) -> Entity {
    Entity::builder()
        .field("id", id)
        .field("name", format!("entity-{}", id))
        .field("image", image())
        .build()
}

// =============================================================================
// Round Trip Tests
// =============================================================================

#[test]
fn test_add_then_get() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir);

    store.add("alpha", &sample_entity(1), false).unwrap();
    let loaded = store.get("alpha").unwrap();

    assert_eq!(loaded.names().collect::<Vec<_>>(), vec!["id", "name", "image"]);
    assert_eq!(loaded.get("id").unwrap(), &Value::Int(1));
    assert_eq!(loaded.get("name").unwrap().as_text(), Some("entity-1"));

    let pixels = loaded.get("image").unwrap().as_array().unwrap();
    assert_eq!(pixels.dtype(), DType::F32);
    assert_eq!(pixels.shape(), &[64, 64]);
    assert_eq!(pixels, &image());
}

#[test]
fn test_field_attrs_survive_storage() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir);
    let field = EagerField::new(vec![0.1f64, 0.2, 0.3])
        .with_attr("sample_rate", 44100)
        .with_attr("calibrated", true);
    let entity = Entity::builder().field_with("signal", field).build();

    store.add("rec", &entity, false).unwrap();
    let loaded = store.get("rec").unwrap();

    let attrs = loaded["signal"].attrs().unwrap();
    assert_eq!(attrs["sample_rate"], Value::Int(44100));
    assert_eq!(attrs["calibrated"], Value::Bool(true));
}

#[test]
fn test_loaded_fields_are_lazy() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir);
    store.add("alpha", &sample_entity(1), false).unwrap();

    let loaded = store.get("alpha").unwrap();

    assert!(loaded["image"].is_lazy());
    assert!(!loaded["image"].is_materialized());
    assert_eq!(loaded["image"].shape(), vec![64, 64]);
    assert!(!loaded["image"].is_materialized());
}

#[test]
fn test_store_loaded_entity_under_new_key() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir);
    store.add("alpha", &sample_entity(7), false).unwrap();
    let loaded = store.get("alpha").unwrap();

    store.add("beta", &loaded, false).unwrap();

    let copy = store.get("beta").unwrap();
    assert_eq!(copy.get("id").unwrap(), &Value::Int(7));
    assert_eq!(copy.get("image").unwrap().as_array().unwrap(), &image());
}

// =============================================================================
// Key Management Tests
// =============================================================================

#[test]
fn test_add_existing_key_fails() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir);
    store.add("alpha", &sample_entity(1), false).unwrap();

    let result = store.add("alpha", &sample_entity(2), false);

    assert!(matches!(result, Err(StashError::AlreadyExists(_))));
    assert_eq!(store.get("alpha").unwrap().get("id").unwrap(), &Value::Int(1));
}

#[test]
fn test_overwrite_replaces_all_fields() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir);
    store.add("alpha", &sample_entity(1), false).unwrap();
    let first_address: Vec<String> = store.addresses().map(str::to_string).collect();

    let replacement = Entity::builder().field("only", "this").build();
    store.add("alpha", &replacement, true).unwrap();

    let loaded = store.get("alpha").unwrap();
    assert_eq!(loaded.names().collect::<Vec<_>>(), vec!["only"]);
    assert_eq!(store.len(), 1);

    // A fresh address is drawn; the freed one is not reused in-session
    let second_address: Vec<String> = store.addresses().map(str::to_string).collect();
    assert_ne!(first_address, second_address);
    let container = store.container().unwrap();
    assert!(!container.contains(&first_address[0]));
}

#[test]
fn test_failed_overwrite_keeps_old_entry_on_unreadable_field() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir);
    store.add("alpha", &sample_entity(1), false).unwrap();

    // Lazy entity whose backing store is already closed
    let other_dir = TempDir::new().unwrap();
    let mut other = open_store(&other_dir);
    other.add("src", &sample_entity(2), false).unwrap();
    let stale = other.get("src").unwrap();
    other.close().unwrap();

    let result = store.add("alpha", &stale, true);

    assert!(matches!(result, Err(StashError::Closed)));
    assert!(store.contains_key("alpha"));
    assert_eq!(store.get("alpha").unwrap().get("id").unwrap(), &Value::Int(1));
    assert_eq!(store.container().unwrap().group_count(), 1);
}

#[test]
fn test_failed_overwrite_keeps_old_entry_on_exhaustion() {
    let dir = TempDir::new().unwrap();
    let config = Config::builder()
        .path(store_path(&dir))
        .depth(1)
        .width(2)
        .build();
    let mut store = Store::open(config).unwrap();
    store.add("a", &sample_entity(1), false).unwrap();
    store.add("b", &sample_entity(2), false).unwrap();

    let result = store.add("a", &sample_entity(3), true);

    assert!(matches!(result, Err(StashError::Exhaustion { capacity: 2 })));
    assert!(store.contains_key("a"));
    assert_eq!(store.get("a").unwrap().get("id").unwrap(), &Value::Int(1));
}

#[test]
fn test_remove() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir);
    store.add("alpha", &sample_entity(1), false).unwrap();

    let freed = store.remove("alpha").unwrap();

    assert_eq!(freed, "00/00/00");
    assert!(matches!(store.get("alpha"), Err(StashError::NotFound(_))));
    assert!(!store.contains_key("alpha"));
    assert!(store.is_empty());
}

#[test]
fn test_remove_unknown_key() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir);

    assert!(matches!(store.remove("ghost"), Err(StashError::NotFound(_))));
}

#[test]
fn test_get_unknown_key() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir);

    assert!(matches!(store.get("ghost"), Err(StashError::NotFound(_))));
}

#[test]
fn test_keys_after_adds_and_removes() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir);
    for i in 0..20 {
        store.add(&format!("key{}", i), &sample_entity(i), false).unwrap();
    }
    for i in 0..5 {
        store.remove(&format!("key{}", i)).unwrap();
    }

    let keys: HashSet<String> = store.keys().map(str::to_string).collect();
    let expected: HashSet<String> = (5..20).map(|i| format!("key{}", i)).collect();

    assert_eq!(keys, expected);
    assert_eq!(store.len(), 15);
}

#[test]
fn test_addresses_follow_generator_order() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir);
    for i in 0..3 {
        store.add(&format!("key{}", i), &sample_entity(i), false).unwrap();
    }

    let mut addresses: Vec<&str> = store.addresses().collect();
    addresses.sort();

    assert_eq!(addresses, vec!["00/00/00", "01/00/00", "02/00/00"]);
}

#[test]
fn test_custom_address_shape() {
    let dir = TempDir::new().unwrap();
    let config = Config::builder()
        .path(store_path(&dir))
        .depth(2)
        .width(16)
        .sync_strategy(SyncStrategy::EveryWrite)
        .build();
    let mut store = Store::open(config).unwrap();

    store.add("a", &sample_entity(1), false).unwrap();
    store.add("b", &sample_entity(2), false).unwrap();

    let mut addresses: Vec<&str> = store.addresses().collect();
    addresses.sort();
    assert_eq!(addresses, vec!["00/00", "01/00"]);
}

#[test]
fn test_exhausted_store_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let config = Config::builder()
        .path(store_path(&dir))
        .depth(1)
        .width(2)
        .build();
    let mut store = Store::open(config).unwrap();
    store.add("a", &sample_entity(1), false).unwrap();
    store.add("b", &sample_entity(2), false).unwrap();

    let result = store.add("c", &sample_entity(3), false);

    assert!(matches!(result, Err(StashError::Exhaustion { capacity: 2 })));
    assert!(!store.contains_key("c"));
    assert_eq!(store.container().unwrap().group_count(), 2);
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_close_and_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let mut store = open_store(&dir);
        for i in 0..10 {
            store.add(&format!("key{}", i), &sample_entity(i), false).unwrap();
        }
        store.remove("key3").unwrap();
        store.close().unwrap();
    }

    let mut store = open_store(&dir);

    assert_eq!(store.len(), 9);
    assert!(!store.contains_key("key3"));
    let loaded = store.get("key7").unwrap();
    assert_eq!(loaded.get("id").unwrap(), &Value::Int(7));
    assert_eq!(loaded.get("image").unwrap().as_array().unwrap(), &image());
}

#[test]
fn test_drop_persists_keymap() {
    let dir = TempDir::new().unwrap();
    {
        let mut store = open_store(&dir);
        store.add("alpha", &sample_entity(1), false).unwrap();
    }

    let mut store = open_store(&dir);

    assert!(store.contains_key("alpha"));
    assert_eq!(store.get("alpha").unwrap().get("id").unwrap(), &Value::Int(1));
}

#[test]
fn test_reopen_skips_occupied_addresses() {
    let dir = TempDir::new().unwrap();
    {
        let mut store = open_store(&dir);
        for i in 0..3 {
            store.add(&format!("key{}", i), &sample_entity(i), false).unwrap();
        }
    }

    let mut store = open_store(&dir);
    store.add("late", &sample_entity(99), false).unwrap();

    let addresses: HashSet<&str> = store.addresses().collect();
    assert_eq!(addresses.len(), 4);
    assert!(addresses.contains("03/00/00"));
}

#[test]
fn test_flush_makes_keys_visible_to_readers() {
    let dir = TempDir::new().unwrap();
    let mut writer = open_store(&dir);
    writer.add("alpha", &sample_entity(1), false).unwrap();
    writer.flush().unwrap();

    let mut reader = Store::open_path(store_path(&dir), OpenMode::Read, 0).unwrap();

    assert!(reader.contains_key("alpha"));
    assert_eq!(reader.get("alpha").unwrap().get("id").unwrap(), &Value::Int(1));
}

#[test]
fn test_torn_tail_recovered_on_open() {
    let dir = TempDir::new().unwrap();
    {
        let mut store = open_store(&dir);
        store.add("alpha", &sample_entity(1), false).unwrap();
    }
    {
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(store_path(&dir))
            .unwrap();
        file.write_all(&[0u8; 5]).unwrap();
    }

    let mut store = open_store(&dir);

    let report = store.scan_report().unwrap();
    assert!(report.was_truncated);
    assert_eq!(report.bytes_discarded, 5);
    assert!(store.get("alpha").is_ok());
}

// =============================================================================
// Cache Tests
// =============================================================================

#[test]
fn test_cache_serves_repeat_gets() {
    let dir = TempDir::new().unwrap();
    let mut store = open_cached_store(&dir, 100);
    store.add("alpha", &sample_entity(1), false).unwrap();

    store.get("alpha").unwrap();
    assert!(store.is_cached("alpha"));
    store.get("alpha").unwrap();

    let stats = store.stats();
    assert_eq!(stats.group_loads, 1);
    assert_eq!(stats.cache_misses, 1);
    assert_eq!(stats.cache_hits, 1);
    assert_eq!(store.cache_len(), 1);
}

#[test]
fn test_zero_capacity_disables_cache() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir);
    store.add("alpha", &sample_entity(1), false).unwrap();

    store.get("alpha").unwrap();
    store.get("alpha").unwrap();

    assert!(!store.is_cached("alpha"));
    assert_eq!(store.cache_len(), 0);
    assert_eq!(store.stats().group_loads, 2);
    assert_eq!(store.stats().cache_hits, 0);
}

#[test]
fn test_overwrite_and_remove_invalidate_cache() {
    let dir = TempDir::new().unwrap();
    let mut store = open_cached_store(&dir, 100);
    store.add("alpha", &sample_entity(1), false).unwrap();
    store.get("alpha").unwrap();

    store.add("alpha", &sample_entity(2), true).unwrap();
    assert!(!store.is_cached("alpha"));
    assert_eq!(store.get("alpha").unwrap().get("id").unwrap(), &Value::Int(2));

    store.remove("alpha").unwrap();
    assert!(!store.is_cached("alpha"));
    assert!(matches!(store.get("alpha"), Err(StashError::NotFound(_))));
}

// =============================================================================
// Mode and Lifecycle Tests
// =============================================================================

#[test]
fn test_read_mode_rejects_mutation() {
    let dir = TempDir::new().unwrap();
    {
        let mut store = open_store(&dir);
        store.add("alpha", &sample_entity(1), false).unwrap();
    }

    let mut store = Store::open_path(store_path(&dir), OpenMode::Read, 0).unwrap();

    assert!(matches!(
        store.add("beta", &sample_entity(2), false),
        Err(StashError::ReadOnly)
    ));
    assert!(matches!(store.remove("alpha"), Err(StashError::ReadOnly)));
    assert!(store.get("alpha").is_ok());
    store.close().unwrap();
}

#[test]
fn test_read_mode_missing_file() {
    let dir = TempDir::new().unwrap();
    let result = Store::open_path(store_path(&dir), OpenMode::Read, 0);
    assert!(matches!(result, Err(StashError::Io(_))));
}

#[test]
fn test_close_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir);
    store.add("alpha", &sample_entity(1), false).unwrap();

    store.close().unwrap();
    store.close().unwrap();

    assert!(store.is_closed());
    assert!(store.scan_report().is_none());
    assert!(matches!(store.get("alpha"), Err(StashError::Closed)));
    assert!(matches!(
        store.add("beta", &sample_entity(2), false),
        Err(StashError::Closed)
    ));
    assert!(matches!(store.flush(), Err(StashError::Closed)));
}

// =============================================================================
// Lazy Read Tests
// =============================================================================

#[test]
fn test_lazy_slice_reads_only_window() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir);
    store.add("alpha", &sample_entity(1), false).unwrap();
    let loaded = store.get("alpha").unwrap();
    let before = store.container().unwrap().stats();

    let window = loaded["image"].slice(&[0..2, 0..3]).unwrap();

    assert_eq!(window.to_vec::<f32>().unwrap(), vec![0.0, 1.0, 2.0, 64.0, 65.0, 66.0]);
    let after = store.container().unwrap().stats();
    assert_eq!(after.bytes_read - before.bytes_read, 6 * 4);
    assert_eq!(after.full_reads, before.full_reads);
    assert!(!loaded["image"].is_materialized());
}

#[test]
fn test_materialized_value_is_read_once() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir);
    store.add("alpha", &sample_entity(1), false).unwrap();
    let loaded = store.get("alpha").unwrap();

    loaded.get("image").unwrap();
    let clone = loaded.clone();
    clone.get("image").unwrap();
    loaded["image"].slice(&[0..1]).unwrap();

    assert_eq!(store.container().unwrap().stats().full_reads, 1);
}

#[test]
fn test_values_outlive_closed_store() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir);
    store.add("alpha", &sample_entity(1), false).unwrap();
    let loaded = store.get("alpha").unwrap();
    loaded.get("image").unwrap();

    store.close().unwrap();

    assert_eq!(loaded.get("image").unwrap().as_array().unwrap(), &image());
    assert!(matches!(loaded.get("name"), Err(StashError::Closed)));
    assert!(matches!(loaded["name"].slice(&[0..1]), Err(StashError::TypeMismatch { .. })));
    assert!(matches!(loaded["image"].slice(&[0..1]), Ok(_)));
}

#[test]
fn test_materialize_detaches_entity() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir);
    store.add("alpha", &sample_entity(1), false).unwrap();
    let detached = store.get("alpha").unwrap().materialize().unwrap();

    drop(store);

    assert!(!detached["image"].is_lazy());
    assert_eq!(detached.get("name").unwrap().as_text(), Some("entity-1"));
}

// =============================================================================
// Consistency Tests
// =============================================================================

/// Write a container whose keymap points `key` at `address` directly
fn write_raw_store(dir: &TempDir, key: &str, address: &str, recorded_key: Option<&str>) {
    let mut container = Container::open(&store_path(dir), OpenMode::Write).unwrap();
    if let Some(recorded) = recorded_key {
        let mut attrs = Attrs::new();
        attrs.insert(KEY_ATTR.to_string(), Value::from(recorded));
        container.create_group(address, attrs).unwrap();
    }
    let keymap = format!(r#"{{"{}":"{}"}}"#, key, address);
    container.put_blob("__KEYMAP__", keymap.as_bytes()).unwrap();
    container.close().unwrap();
}

#[test]
fn test_recorded_key_mismatch() {
    let dir = TempDir::new().unwrap();
    write_raw_store(&dir, "alpha", "00/00/00", Some("beta"));

    let mut store = open_store(&dir);

    match store.get("alpha") {
        Err(StashError::Consistency {
            address,
            expected,
            found,
        }) => {
            assert_eq!(address, "00/00/00");
            assert_eq!(expected, "alpha");
            assert_eq!(found.as_deref(), Some("beta"));
        }
        other => panic!("expected Consistency, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_keymap_points_at_missing_group() {
    let dir = TempDir::new().unwrap();
    write_raw_store(&dir, "alpha", "05/00/00", None);

    let mut store = open_store(&dir);

    assert!(matches!(
        store.get("alpha"),
        Err(StashError::Consistency { found: None, .. })
    ));
}

// =============================================================================
// Property Tests
// =============================================================================

fn shape_and_window() -> impl Strategy<Value = (usize, usize, Range<usize>, Range<usize>)> {
    (1usize..8, 1usize..8)
        .prop_flat_map(|(rows, cols)| {
            (Just(rows), Just(cols), 0..=rows, 0..=rows, 0..=cols, 0..=cols)
        })
        .prop_map(|(rows, cols, a, b, c, d)| {
            (rows, cols, a.min(b)..a.max(b), c.min(d)..c.max(d))
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_lazy_slice_matches_eager((rows, cols, r, c) in shape_and_window()) {
        let dir = TempDir::new().unwrap();
        let mut store = Store::open_path(store_path(&dir), OpenMode::Append, 0).unwrap();
        let data: Vec<i32> = (0..(rows * cols) as i32).collect();
        let array = Array::from_shape_vec(vec![rows, cols], data).unwrap();
        let entity = Entity::builder().field("m", array.clone()).build();
        store.add("k", &entity, false).unwrap();

        let lazy = store.get("k").unwrap();
        let from_store = lazy["m"].slice(&[r.clone(), c.clone()]).unwrap();
        let in_memory = array.slice(&[r, c]).unwrap();

        prop_assert_eq!(from_store, in_memory);
    }
}
