//! Logging conventions for resocket.
//!
//! resocket uses the `tracing` crate for instrumentation and never installs a
//! subscriber itself. To see logs, install one in your application:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("resocket=debug")
//!     .init();
//! ```
//!
//! Every log statement names one of the [`targets`] explicitly, so output can
//! be filtered per subsystem. Spans are created through [`connection_span`]
//! and [`transport_span`] so their names and fields stay uniform.

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Client façade target.
    pub const CLIENT: &str = "resocket::client";
    /// Connection lifecycle and reconnection target.
    pub const CONNECTION: &str = "resocket::connection";
    /// Inbound message multiplexing target.
    pub const MULTIPLEXER: &str = "resocket::multiplexer";
    /// Transport (socket) target.
    pub const TRANSPORT: &str = "resocket::transport";
    /// Signal/slot system target.
    pub const SIGNAL: &str = "resocket_core::signal";
}

/// Create the span under which a client's connection manager runs.
pub fn connection_span(url: &str) -> tracing::Span {
    tracing::info_span!(target: targets::CONNECTION, "connection", url = %url)
}

/// Create the span under which a single transport task runs.
pub fn transport_span(url: &str, generation: u64) -> tracing::Span {
    tracing::debug_span!(target: targets::TRANSPORT, "transport", url = %url, generation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_targets_share_crate_prefix() {
        for target in [
            targets::CLIENT,
            targets::CONNECTION,
            targets::MULTIPLEXER,
            targets::TRANSPORT,
        ] {
            assert!(target.starts_with("resocket::"), "{target}");
        }
        assert!(targets::SIGNAL.starts_with("resocket_core"));
    }

    #[test]
    fn test_spans_build_without_subscriber() {
        let _connection = connection_span("ws://localhost:9000").entered();
        let _transport = transport_span("ws://localhost:9000", 3).entered();
    }
}
