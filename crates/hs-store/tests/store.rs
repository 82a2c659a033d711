mod common;

use std::fs;
use std::io::Read;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::{content, setup_store, setup_store_with};
use hs_store::{BlobStore, ShardedBlobStore, StoreConfig, Tier, WriterPhase};
use hs_types::{is_valid_shard_name, ContentAddress, Key, Role};

// ---- layout ----

#[test]
fn blob_lands_in_expected_shard() {
    let (store, _dir) = setup_store();
    let address = store.store_bytes(&[b'a'; 46]).unwrap();
    assert_eq!(address.to_string(), "2jr7e7m1dz6uky4soq7eaflekjlgzwsvech6skma3ojl4tc0zv");
    assert_eq!(address.shard_name(), "18j");
    assert!(store.root().join("18j").join("blob.db").is_file());
    let key = Key::from_bytes(&[b'a'; 46], Role::Leaf);
    assert_eq!(ContentAddress::from_key(&key).unwrap(), address);
}

#[test]
fn tier_boundary_is_max_embedded_size() {
    let (store, _dir) = setup_store();
    let below = content(65_535, 1);
    let at = content(65_536, 2);

    let below_addr = store.store_bytes(&below).unwrap();
    let at_addr = store.store_bytes(&at).unwrap();

    assert!(!store.blob_path(&below_addr).exists());
    assert_eq!(store.lookup(&below_addr).unwrap().unwrap().tier(), Tier::EmbeddedRow);

    assert!(store.blob_path(&at_addr).is_file());
    assert_eq!(fs::metadata(store.blob_path(&at_addr)).unwrap().len(), 65_536);
    assert_eq!(store.lookup(&at_addr).unwrap().unwrap().tier(), Tier::FileOnDisk);

    assert_eq!(store.get(&below_addr).unwrap(), below);
    assert_eq!(store.get(&at_addr).unwrap(), at);
}

#[test]
fn incoming_dir_is_not_a_shard() {
    let (store, _dir) = setup_store();
    store.store_bytes(&content(100_000, 3)).unwrap();
    let mut names: Vec<String> = fs::read_dir(store.root())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert!(names.contains(&"incoming".to_string()));
    assert!(names.contains(&"incoming.db".to_string()));
    assert!(!is_valid_shard_name("incoming"));
    let shards: Vec<_> = names.iter().filter(|n| is_valid_shard_name(n)).collect();
    assert_eq!(shards.len(), 1);
}

// ---- dedup ----

#[test]
fn same_content_stored_once_in_each_tier() {
    let (store, _dir) = setup_store();
    let small = content(1000, 4);
    let large = content(200_000, 5);
    for _ in 0..3 {
        store.store_bytes(&small).unwrap();
        store.store_bytes(&large).unwrap();
    }
    assert_eq!(store.addresses().unwrap().len(), 2);
    let staged: Vec<_> = fs::read_dir(store.staging_ledger().dir()).unwrap().collect();
    assert!(staged.is_empty());
    assert!(store.staging_ledger().unresolved().unwrap().is_empty());
}

#[test]
fn chunking_does_not_change_address() {
    let (store, _dir) = setup_store();
    let data = content(150_000, 6);
    let whole = store.store_bytes(&data).unwrap();
    let mut writer = store.writer();
    for chunk in data.chunks(4096) {
        writer.write(chunk).unwrap();
    }
    assert_eq!(writer.done().unwrap(), whole);
    assert_eq!(store.store_stream(&data[..], 333).unwrap(), whole);
}

#[test]
fn concurrent_writers_converge() {
    let (store, _dir) = setup_store();
    let store = Arc::new(store);
    let data = Arc::new(content(120_000, 7));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            let data = Arc::clone(&data);
            thread::spawn(move || store.store_bytes(&data).unwrap())
        })
        .collect();
    let addresses: Vec<ContentAddress> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(addresses.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(store.get(&addresses[0]).unwrap(), *data);
    assert_eq!(store.addresses().unwrap(), vec![addresses[0]]);
}

// ---- writer ----

#[test]
fn writer_phases() {
    let (store, _dir) = setup_store();
    let mut writer = store.writer();
    assert_eq!(writer.phase(), WriterPhase::Accumulating);
    writer.write(&content(60_000, 8)).unwrap();
    assert_eq!(writer.phase(), WriterPhase::Buffered);
    assert!(writer.staging_file().is_none());
    writer.write(&content(10_000, 9)).unwrap();
    assert_eq!(writer.phase(), WriterPhase::Staged);
    assert_eq!(writer.len(), 70_000);
    let staged = writer.staging_file().unwrap().clone();
    assert!(staged.temp_path.starts_with(store.staging_ledger().dir()));
    let address = writer.done().unwrap();
    assert_eq!(writer.phase(), WriterPhase::Committed);
    assert!(!staged.temp_path.exists());
    assert_eq!(writer.done().unwrap(), address);
}

#[test]
fn writer_works_as_io_write() {
    let (store, _dir) = setup_store();
    let data = content(90_000, 10);
    let mut writer = store.writer();
    std::io::copy(&mut &data[..], &mut writer).unwrap();
    let address = writer.done().unwrap();
    let mut read_back = Vec::new();
    store
        .lookup(&address)
        .unwrap()
        .unwrap()
        .open()
        .unwrap()
        .read_to_end(&mut read_back)
        .unwrap();
    assert_eq!(read_back, data);
}

#[test]
fn dropped_writer_leaves_orphan_for_sweep() {
    let (store, _dir) = setup_store_with(|c| c.staging_grace = Duration::ZERO);
    let temp_path = {
        let mut writer = store.writer();
        writer.write(&content(100_000, 11)).unwrap();
        let path = writer.staging_file().unwrap().temp_path.clone();
        path
    };
    assert!(temp_path.exists());
    assert_eq!(store.staging_ledger().unresolved().unwrap().len(), 1);

    let report = store.sweep_orphans().unwrap();
    assert_eq!(report.entries_removed, 1);
    assert_eq!(report.files_removed, 1);
    assert!(!temp_path.exists());
    assert!(store.addresses().unwrap().is_empty());
}

#[test]
fn failed_commit_keeps_staging_for_retry() {
    let (store, _dir) = setup_store();
    let data = content(100_000, 20);
    let address = ContentAddress::from_key(&Key::from_bytes(&data, Role::Leaf)).unwrap();
    let shard_dir = store.root().join(address.shard_name());
    fs::write(&shard_dir, b"not a directory").unwrap();

    let mut writer = store.writer();
    writer.write(&data).unwrap();
    let temp_path = writer.staging_file().unwrap().temp_path.clone();
    assert!(writer.done().is_err());
    assert_eq!(writer.phase(), WriterPhase::Staged);
    assert!(temp_path.is_file());
    assert_eq!(store.staging_ledger().unresolved().unwrap().len(), 1);

    fs::remove_file(&shard_dir).unwrap();
    assert_eq!(writer.done().unwrap(), address);
    assert_eq!(writer.phase(), WriterPhase::Committed);
    assert!(!temp_path.exists());
    assert!(store.staging_ledger().unresolved().unwrap().is_empty());
    assert_eq!(store.get(&address).unwrap(), data);
}

#[test]
fn sweep_keeps_recent_staging_files() {
    let (store, _dir) = setup_store();
    let mut writer = store.writer();
    writer.write(&content(100_000, 12)).unwrap();
    let report = store.sweep_orphans().unwrap();
    assert_eq!(report.entries_removed, 0);
    writer.done().unwrap();
}

// ---- cache ----

#[test]
fn cache_holds_only_small_blobs() {
    let (store, _dir) = setup_store();
    let small = store.store_bytes(&content(2000, 13)).unwrap();
    let mid = store.store_bytes(&content(85_000, 14)).unwrap();
    let medium = store.store_bytes(&content(70_000, 15)).unwrap();

    assert!(store.lookup(&small).unwrap().unwrap().is_loaded());
    assert!(store.cache().contains(&small));

    let handle = store.lookup(&mid).unwrap().unwrap();
    assert!(!handle.is_loaded());
    assert!(!store.cache().contains(&mid));

    assert!(store.lookup(&medium).unwrap().unwrap().is_loaded());
    assert!(store.cache().contains(&medium));
    assert_eq!(store.cache().len(), 2);
}

#[test]
fn cache_capacity_is_bounded() {
    let (store, _dir) = setup_store_with(|c| c.cache_entries = 3);
    let addresses: Vec<_> = (0..5u8)
        .map(|i| store.store_bytes(&content(10, i)).unwrap())
        .collect();
    for address in &addresses {
        store.lookup(address).unwrap().unwrap();
    }
    assert_eq!(store.cache().len(), 3);
    assert!(!store.cache().contains(&addresses[0]));
    assert!(store.cache().contains(&addresses[4]));
}

// ---- persistence ----

#[test]
fn blobs_survive_reopen() {
    let (store, dir) = setup_store();
    let small = content(500, 16);
    let large = content(300_000, 17);
    let a = store.store_bytes(&small).unwrap();
    let b = store.store_bytes(&large).unwrap();
    drop(store);

    let reopened = ShardedBlobStore::open(StoreConfig::new(dir.path().join("store"))).unwrap();
    assert_eq!(reopened.get(&a).unwrap(), small);
    assert_eq!(reopened.get(&b).unwrap(), large);
    let mut found = reopened.addresses().unwrap();
    found.sort();
    let mut expected = vec![a, b];
    expected.sort();
    assert_eq!(found, expected);
}

#[test]
fn config_round_trips_through_toml_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = StoreConfig::new(dir.path().join("store"));
    config.max_embedded_size = 1024;
    let path = dir.path().join("store.toml");
    fs::write(&path, config.to_toml_string().unwrap()).unwrap();
    let loaded = StoreConfig::load(&path).unwrap();
    assert_eq!(loaded, config);

    let store = ShardedBlobStore::open(loaded).unwrap();
    let address = store.store_bytes(&content(1024, 18)).unwrap();
    assert!(store.blob_path(&address).is_file());
}

#[test]
fn delete_then_store_again() {
    let (store, _dir) = setup_store();
    let data = content(100_000, 19);
    let address = store.store_bytes(&data).unwrap();
    assert!(store.delete(&address).unwrap());
    assert!(!store.contains(&address).unwrap());
    assert_eq!(store.store_bytes(&data).unwrap(), address);
    assert_eq!(store.get(&address).unwrap(), data);
}
