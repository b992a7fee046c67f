/*!
Logging setup for the runner.

`RUST_LOG` defaults to `debug` in debug builds and `info` in release builds. With the
`profiling` feature, the library's instrumented functions emit tracing spans that show up in
the same output.
*/

use tracing_subscriber::prelude::*;

/// Install the global subscriber. Must be called once, before any other thread starts.
pub fn setup_logging() {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::fmt;

    if std::env::var("RUST_LOG").is_err() {
        // Safety: single-threaded at startup
        unsafe {
            if cfg!(debug_assertions) {
                std::env::set_var("RUST_LOG", "debug");
            } else {
                std::env::set_var("RUST_LOG", "info");
            }
        }
    }

    let fmt_layer = fmt::layer().with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(fmt_layer).init();

    if cfg!(feature = "profiling") {
        tracing::info!("Logging initialized (profiling spans enabled)");
    } else {
        tracing::info!("Logging initialized");
    }
}
