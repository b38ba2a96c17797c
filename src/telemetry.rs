//! Tracing setup, lifted from the teacher's `init_tracing` in `main.rs`.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initializes a `tracing` subscriber that prints to stdout and honours
/// `RUST_LOG`. Call once at process startup.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();
}
