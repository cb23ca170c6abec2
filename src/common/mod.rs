pub mod errors;

pub const PHOTOSTRIP_FILE_NAME: &'static str = "photostrip.png";

pub const DEFAULT_BATCH_SIZE: usize = 4;

pub const DEFAULT_THUMBNAIL_SIZE: u32 = 120;

/// Finished batches kept around so their status can still be queried.
pub const FINISHED_BATCH_HISTORY: usize = 32;

/// Batches still collecting slots before new batch ids are turned away.
pub const DEFAULT_MAX_OPEN_BATCHES: usize = 64;

/// Largest photostrip canvas, in pixels, that will be allocated.
pub const DEFAULT_MAX_CANVAS_PIXELS: u64 = 64 * 1024 * 1024;

use std::sync::LazyLock;

use rayon::{ThreadPool, ThreadPoolBuilder};
use tokio::runtime::{Builder, Runtime};

pub static CURRENT_NUM_THREADS: LazyLock<usize> = LazyLock::new(|| rayon::current_num_threads());

// Rocket-specific Tokio Runtime
// This runtime is dedicated to handling network requests, with thread names clearly labeled.
pub static ROCKET_RUNTIME: LazyLock<Runtime> = LazyLock::new(|| {
    Builder::new_multi_thread()
        .worker_threads(*CURRENT_NUM_THREADS)
        .thread_name("rocket-io-worker")
        .enable_all()
        .build()
        .expect("Failed to build Rocket Tokio runtime")
});

// Background batch runtime
// Persisting, measuring and composing uploaded images all run here, so a slow
// decode never starves request handling.
pub static BATCH_RUNTIME: LazyLock<Runtime> = LazyLock::new(|| {
    Builder::new_multi_thread()
        .worker_threads(*CURRENT_NUM_THREADS)
        .thread_name("batch-worker")
        .enable_all()
        .build()
        .expect("Failed to build Batch Tokio runtime")
});

// Rayon thread pool for compute-intensive tasks
// Tile decoding during composition is spread over this pool.
// It does not create a global Rayon pool, so it does not interfere with other threads.
pub static WORKER_RAYON_POOL: LazyLock<ThreadPool> = LazyLock::new(|| {
    ThreadPoolBuilder::new()
        .num_threads(*CURRENT_NUM_THREADS)
        .thread_name(|i| format!("cpu-intensive-worker-{}", i))
        .build()
        .expect("Failed to build Worker Rayon pool")
});
