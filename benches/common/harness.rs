//! Benchmark harness utilities.

/// Create a multi-threaded Tokio runtime that drives heartbeat tasks.
pub fn bench_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build Tokio runtime for benchmarks")
}
