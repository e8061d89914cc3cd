use object_store::memory::InMemory;
use std::io::Cursor;
use std::sync::Arc;
use stowage_core::{BlobError, BlobStorage, MemoryBlobStorage, ObjectStoreBlobStorage};

fn writes_and_reads(storage: &dyn BlobStorage) {
    storage
        .write("docs/readme.txt", &mut Cursor::new(b"hello".to_vec()))
        .unwrap();
    assert_eq!(storage.read("docs/readme.txt").unwrap().as_ref(), b"hello");
    assert!(storage.exists("docs/readme.txt").unwrap());
}

fn overwrites(storage: &dyn BlobStorage) {
    storage.write_bytes("k", b"first").unwrap();
    storage.write_bytes("k", b"second, longer").unwrap();
    assert_eq!(storage.read("k").unwrap().as_ref(), b"second, longer");
}

fn deletes(storage: &dyn BlobStorage) {
    storage.write_bytes("gone", b"x").unwrap();
    storage.delete("gone").unwrap();
    assert!(matches!(storage.read("gone"), Err(BlobError::NotFound(key)) if key == "gone"));
    assert!(!storage.exists("gone").unwrap());
}

fn deleting_absent_key_is_a_no_op(storage: &dyn BlobStorage) {
    storage.delete("never-written").unwrap();
}

fn reading_absent_key_is_not_found(storage: &dyn BlobStorage) {
    assert!(matches!(storage.read("missing"), Err(BlobError::NotFound(_))));
}

fn streams_large_payloads(storage: &dyn BlobStorage) {
    let payload = (0..256 * 1024).map(|i| (i % 251) as u8).collect::<Vec<_>>();
    storage
        .write("large.bin", &mut Cursor::new(payload.clone()))
        .unwrap();
    assert_eq!(storage.read("large.bin").unwrap().as_ref(), payload.as_slice());
}

fn run_all(storage: &dyn BlobStorage) {
    writes_and_reads(storage);
    overwrites(storage);
    deletes(storage);
    deleting_absent_key_is_a_no_op(storage);
    reading_absent_key_is_not_found(storage);
    streams_large_payloads(storage);
}

#[test]
fn memory_blob_storage_honors_the_contract() {
    run_all(&MemoryBlobStorage::new());
}

#[test]
fn object_store_blob_storage_honors_the_contract() {
    run_all(&ObjectStoreBlobStorage::new(Arc::new(InMemory::new())));
}

#[test]
fn prefixed_object_store_honors_the_contract() {
    run_all(&ObjectStoreBlobStorage::new(Arc::new(InMemory::new())).with_prefix("tenant"));
}

#[test]
fn adapters_reject_empty_keys() {
    let adapters: Vec<Box<dyn BlobStorage>> = vec![
        Box::new(MemoryBlobStorage::new()),
        Box::new(ObjectStoreBlobStorage::new(Arc::new(InMemory::new()))),
    ];
    for storage in adapters {
        assert!(matches!(storage.read(""), Err(BlobError::InvalidKey { .. })));
    }
}
