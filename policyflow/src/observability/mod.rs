//! Observability utilities.
//!
//! Policies log through [`tracing`]; this module only installs a
//! subscriber for binaries and tests that want one.

mod subscriber;

pub use subscriber::{init_tracing, TracingConfig};
