//! Shared helpers for blob store integration tests
#![allow(dead_code)]

use hs_store::{ShardedBlobStore, StoreConfig};
use tempfile::TempDir;

/// Route `tracing` output through the test harness. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A store with default settings in a fresh temp directory.
pub fn setup_store() -> (ShardedBlobStore, TempDir) {
    setup_store_with(|_| {})
}

/// A store in a fresh temp directory, with `tweak` applied to the config.
pub fn setup_store_with(tweak: impl FnOnce(&mut StoreConfig)) -> (ShardedBlobStore, TempDir) {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let mut config = StoreConfig::new(dir.path().join("store"));
    tweak(&mut config);
    let store = ShardedBlobStore::open(config).unwrap();
    (store, dir)
}

/// Deterministic, non-repeating test content.
pub fn content(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| ((i as u32).wrapping_mul(31).wrapping_add(seed as u32) % 251) as u8)
        .collect()
}
