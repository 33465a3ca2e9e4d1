//! Consistent Index Concurrency Tests
//!
//! Writers on many threads share one store while readers poll the recovery
//! accessor. Every read must decode to a whole 8-byte index that was stamped
//! by a committed transaction.

use aerokv::consistent::{ConsistentIndexGetter, ConsistentStore};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

// =============================================================================
// Test Utilities
// =============================================================================

const WRITERS: u64 = 4;
const TXNS_PER_WRITER: u64 = 50;

/// Hands out the next log index on every read. Reads happen under the
/// transaction lock, so each transaction stamps a distinct, larger index.
#[derive(Default)]
struct NextIndex(AtomicU64);

impl ConsistentIndexGetter for NextIndex {
    fn consistent_index(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

fn create_temp_data_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp dir")
}

// =============================================================================
// Concurrent Writers and Readers
// =============================================================================

#[test]
fn test_concurrent_writers_never_expose_partial_stamp() {
    let temp_dir = create_temp_data_dir();
    let store = ConsistentStore::new(temp_dir.path().join("aerokv.db"), NextIndex::default())
        .expect("Failed to open store");
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        let reader = s.spawn(|| {
            let mut last = 0u64;
            let mut reads = 0u64;
            loop {
                let finished = done.load(Ordering::SeqCst);
                let index = store
                    .consistent_index()
                    .expect("Stamp must always decode mid-test");
                assert!(index >= last, "Recovered index went backwards");
                last = index;
                reads += 1;
                if finished {
                    break;
                }
            }
            reads
        });

        let writers: Vec<_> = (0..WRITERS)
            .map(|w| {
                let store = &store;
                s.spawn(move || {
                    for i in 0..TXNS_PER_WRITER {
                        let key = format!("w{}/k{}", w, i % 5);
                        if i % 3 == 2 {
                            store.delete_range(key.as_bytes(), None).unwrap();
                        } else {
                            store.put(key.as_bytes(), i.to_string().as_bytes()).unwrap();
                        }
                    }
                })
            })
            .collect();

        for writer in writers {
            writer.join().expect("Writer panicked");
        }
        done.store(true, Ordering::SeqCst);
        assert!(reader.join().expect("Reader panicked") > 0);
    });

    let total = WRITERS * TXNS_PER_WRITER;
    assert_eq!(store.consistent_index().unwrap(), total);
    assert_eq!(store.getter().0.load(Ordering::SeqCst), total);
}

#[test]
fn test_concurrent_history_survives_reopen() {
    let temp_dir = create_temp_data_dir();
    let path = temp_dir.path().join("aerokv.db");
    let applied = Arc::new(NextIndex::default());

    {
        let store = ConsistentStore::new(&path, applied.clone()).unwrap();
        thread::scope(|s| {
            for w in 0..WRITERS {
                let store = &store;
                s.spawn(move || {
                    for i in 0..10u64 {
                        store
                            .put(format!("w{}", w).as_bytes(), i.to_string().as_bytes())
                            .unwrap();
                    }
                });
            }
        });
    }

    let store = ConsistentStore::new(&path, applied.clone()).unwrap();
    assert_eq!(store.consistent_index().unwrap(), WRITERS * 10);
    assert_eq!(store.current_revision().unwrap(), (WRITERS * 10) as i64);

    let result = store.range(b"w", Some(b"x"), 0, 0).unwrap();
    assert_eq!(result.count, WRITERS as usize);
    for kv in &result.kvs {
        assert_eq!(kv.value, b"9");
        assert_eq!(kv.version, 10);
    }
}
