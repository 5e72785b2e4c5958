use std::sync::atomic::{AtomicUsize, Ordering};

mod torn_read_tests;

/// A shared memory name no other test, or test process, is using.
pub(crate) fn unique_name(tag: &str) -> String {
    static SHMEM_ID_COUNTER: AtomicUsize = AtomicUsize::new(0);
    format!(
        "/shmem-{}-{}-{}",
        tag,
        std::process::id(),
        SHMEM_ID_COUNTER.fetch_add(1, Ordering::SeqCst)
    )
}
