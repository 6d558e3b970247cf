pub mod fixture;
pub mod recording;

pub use fixture::{TestApiary, TestSession, TestStore};
pub use recording::{FaultOp, RecordingStore, StoreCall};

/// Route `tracing` output to the test writer. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}
