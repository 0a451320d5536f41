//! Tracing Setup
//!
//! Configures the tracing subscriber with an environment filter and a
//! formatted console layer.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Log level directives (default: `tick_relay=info` plus
//!   noisy-dependency suppression)
//!
//! # Usage
//!
//! ```ignore
//! use tick_relay::infrastructure::telemetry;
//!
//! telemetry::init();
//!
//! #[tracing::instrument]
//! fn process_message() {
//!     tracing::info!("Processing message");
//! }
//! ```

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize the tracing subscriber.
///
/// Must be called exactly once at startup; a second call panics inside
/// `tracing-subscriber`.
#[allow(clippy::expect_used)]
pub fn init() {
    let env_filter = EnvFilter::from_default_env()
        .add_directive(
            "tick_relay=info"
                .parse()
                .expect("static directive 'tick_relay=info' is valid"),
        )
        .add_directive(
            "tungstenite=warn"
                .parse()
                .expect("static directive 'tungstenite=warn' is valid"),
        )
        .add_directive(
            "hyper=warn"
                .parse()
                .expect("static directive 'hyper=warn' is valid"),
        )
        .add_directive(
            "reqwest=warn"
                .parse()
                .expect("static directive 'reqwest=warn' is valid"),
        );

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
