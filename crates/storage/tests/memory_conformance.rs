use steriflow_storage::conformance::run_conformance_suite;
use steriflow_storage::MemoryStorage;

#[tokio::test]
async fn memory_backend_passes_conformance() {
    let report = run_conformance_suite(|| async { MemoryStorage::new() }).await;
    assert!(report.failed == 0, "{report}");
    assert!(report.total > 40, "suite unexpectedly small: {}", report.total);
}

#[tokio::test]
async fn file_backend_passes_conformance() {
    let dir = tempfile::tempdir().unwrap();
    let counter = std::sync::atomic::AtomicUsize::new(0);
    let report = run_conformance_suite(|| {
        let n = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let path = dir.path().join(format!("store-{n}.json"));
        async move { MemoryStorage::open(path).await.unwrap() }
    })
    .await;
    assert!(report.failed == 0, "{report}");
}
