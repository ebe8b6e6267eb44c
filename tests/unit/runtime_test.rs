//! Tests for runtime adapters

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fleet_coordination::core::Spawn;
use fleet_coordination::runtime::TokioSpawner;

#[tokio::test]
async fn test_tokio_spawner_runs_future() {
    let spawner = TokioSpawner::current().unwrap();
    let counter = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = tokio::sync::oneshot::channel();

    let c = Arc::clone(&counter);
    spawner.spawn(async move {
        c.fetch_add(1, Ordering::SeqCst);
        let _ = tx.send(());
    });

    tokio::time::timeout(Duration::from_secs(1), rx).await.unwrap().unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn test_current_outside_runtime_fails() {
    assert!(TokioSpawner::current().is_err());
}

#[test]
fn test_spawner_from_explicit_handle() {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
    let spawner = TokioSpawner::new(runtime.handle().clone());
    let (tx, rx) = tokio::sync::oneshot::channel();
    spawner.spawn(async move {
        let _ = tx.send(42);
    });
    assert_eq!(runtime.block_on(rx).unwrap(), 42);
}
