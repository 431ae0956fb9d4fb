// Telemetry initialization
//
// Structured logging via tracing-subscriber. Configure with:
// - RUST_LOG or LOG_LEVEL: log filter (default: "info")
// - LOG_FORMAT: "json" for machine-readable output, anything else for text

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Configuration for logging
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name, attached to the startup log line
    pub service_name: String,
    /// Service version
    pub service_version: Option<String>,
    /// Log filter (e.g., "info", "debug", "vigil_control_plane=debug")
    pub log_filter: Option<String>,
    /// Emit JSON lines instead of human-readable text
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "vigil".to_string(),
            service_version: None,
            log_filter: None,
            json: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            service_name: std::env::var("SERVICE_NAME").unwrap_or_else(|_| "vigil".to_string()),
            service_version: None,
            log_filter: std::env::var("RUST_LOG")
                .ok()
                .or_else(|| std::env::var("LOG_LEVEL").ok()),
            json: std::env::var("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        }
    }

    fn filter(&self) -> EnvFilter {
        self.log_filter
            .as_ref()
            .and_then(|f| EnvFilter::try_new(f).ok())
            .unwrap_or_else(|| EnvFilter::new("info"))
    }
}

/// Install the global tracing subscriber.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_telemetry(config: &TelemetryConfig) {
    let fmt_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_filter(config.filter())
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_filter(config.filter())
            .boxed()
    };

    if tracing_subscriber::registry()
        .with(fmt_layer)
        .try_init()
        .is_ok()
    {
        tracing::info!(
            service = %config.service_name,
            version = config.service_version.as_deref().unwrap_or("unknown"),
            "Telemetry initialized"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_filter_defaults_to_info() {
        let config = TelemetryConfig::default();
        assert_eq!(config.filter().to_string(), "info");
    }

    #[test]
    fn test_init_twice_does_not_panic() {
        let config = TelemetryConfig::default();
        init_telemetry(&config);
        init_telemetry(&config);
    }
}
