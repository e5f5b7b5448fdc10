use once_cell::sync::Lazy;
use tokio::runtime::{Builder, Runtime};

/// Shared runtime for network work started from the GTK main thread.
static RUNTIME: Lazy<Runtime> = Lazy::new(|| {
    Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("photoport-net")
        .enable_all()
        .build()
        .expect("Failed to build tokio runtime")
});

pub fn handle() -> tokio::runtime::Handle {
    RUNTIME.handle().clone()
}
