//! Tracing configuration for structured logging
//!
//! The library only emits events and spans; binaries pick a subscriber here.

#[cfg(feature = "cli")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Environment variable that overrides the verbosity-derived filter
pub const LOG_ENV_VAR: &str = "RUST_LOG";

/// Configuration for tracing output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable console output with colors (default for CLI)
    Console,
    /// Compact console output without colors for CI and containers
    Compact,
    /// JSON structured logging for production environments
    #[cfg(feature = "tracing-json")]
    Json,
}

/// Tracing configuration builder
#[derive(Debug)]
pub struct TracingConfig {
    /// Verbosity level (maps to log levels)
    pub verbosity: u8,
    pub format: TracingFormat,
    /// Environment filter string (overrides verbosity if set)
    pub env_filter: Option<String>,
    /// Session ID for correlation
    pub session_id: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            format: TracingFormat::Console,
            env_filter: None,
            session_id: None,
        }
    }
}

impl TracingConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set verbosity level (0-3+)
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    /// Set custom environment filter
    #[must_use]
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Take the filter from `RUST_LOG` when it is set and non-empty
    #[must_use]
    pub fn with_env_override(self) -> Self {
        match std::env::var(LOG_ENV_VAR) {
            Ok(filter) if !filter.trim().is_empty() => self.with_env_filter(filter),
            _ => self,
        }
    }

    /// Set session ID for request correlation
    #[must_use]
    pub fn with_session_id<S: Into<String>>(mut self, session_id: S) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Convert verbosity level to tracing filter string
    #[must_use]
    pub fn verbosity_to_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }

    /// Filter directive actually applied by [`Self::init`]
    #[must_use]
    pub fn effective_filter(&self) -> &str {
        self.env_filter
            .as_deref()
            .unwrap_or_else(|| self.verbosity_to_filter())
    }

    /// Install the global subscriber
    ///
    /// # Errors
    /// - Invalid filter directive
    /// - A global subscriber is already set
    #[cfg(feature = "cli")]
    pub fn init(self) -> anyhow::Result<()> {
        use tracing_subscriber::fmt;

        let filter = EnvFilter::try_new(self.effective_filter())?;
        let registry = Registry::default().with(filter);

        match self.format {
            TracingFormat::Console => {
                let fmt_layer = fmt::layer()
                    .with_ansi(true)
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false)
                    .with_level(true)
                    .compact();

                registry.with(fmt_layer).try_init()?;
            },

            TracingFormat::Compact => {
                let fmt_layer = fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_thread_ids(false)
                    .compact();

                registry.with(fmt_layer).try_init()?;
            },

            #[cfg(feature = "tracing-json")]
            TracingFormat::Json => {
                let fmt_layer = fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true);

                registry.with(fmt_layer).try_init()?;
            },
        }

        if let Some(session_id) = &self.session_id {
            tracing::debug!(session_id = %session_id, "🚀 boxcut session started");
        }

        Ok(())
    }
}

/// Initialize tracing with CLI-friendly defaults
///
/// # Errors
/// - Invalid `RUST_LOG` directive
/// - A global subscriber is already set
#[cfg(feature = "cli")]
pub fn init_cli_tracing(verbosity: u8, format: TracingFormat) -> anyhow::Result<()> {
    TracingConfig::new()
        .with_verbosity(verbosity)
        .with_format(format)
        .with_env_override()
        .with_session_id(uuid::Uuid::new_v4().to_string())
        .init()
}

/// Span creation helpers for common operations
pub mod spans {
    use tracing::{Level, Span};

    /// Span for a whole CLI invocation
    #[must_use]
    pub fn session(command: &str, backend: &str) -> Span {
        tracing::span!(Level::INFO, "session", command = %command, backend = %backend)
    }

    /// Span for one HTTP cutout request
    #[must_use]
    pub fn request(request_id: &str) -> Span {
        tracing::span!(Level::INFO, "request", request_id = %request_id)
    }

    /// Span for reading and decoding an input image
    #[must_use]
    pub fn image_loading(source: &str, bytes: usize) -> Span {
        tracing::span!(Level::DEBUG, "image_loading", source = %source, bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_mapping() {
        assert_eq!(TracingConfig::new().with_verbosity(0).verbosity_to_filter(), "info");
        assert_eq!(TracingConfig::new().with_verbosity(1).verbosity_to_filter(), "debug");
        assert_eq!(TracingConfig::new().with_verbosity(2).verbosity_to_filter(), "trace");
        assert_eq!(TracingConfig::new().with_verbosity(10).verbosity_to_filter(), "trace");
    }

    #[test]
    fn test_env_filter_overrides_verbosity() {
        let config = TracingConfig::new()
            .with_verbosity(2)
            .with_env_filter("boxcut=debug,tower_http=info");
        assert_eq!(config.effective_filter(), "boxcut=debug,tower_http=info");

        let config = TracingConfig::new().with_verbosity(1);
        assert_eq!(config.effective_filter(), "debug");
    }

    #[test]
    fn test_config_builder() {
        let config = TracingConfig::new()
            .with_verbosity(2)
            .with_format(TracingFormat::Compact)
            .with_session_id("test-session");

        assert_eq!(config.verbosity, 2);
        assert_eq!(config.format, TracingFormat::Compact);
        assert_eq!(config.session_id.as_deref(), Some("test-session"));
    }

    #[test]
    fn test_default_config() {
        let config = TracingConfig::default();
        assert_eq!(config.verbosity, 0);
        assert_eq!(config.format, TracingFormat::Console);
        assert!(config.env_filter.is_none());
        assert!(config.session_id.is_none());
    }
}
