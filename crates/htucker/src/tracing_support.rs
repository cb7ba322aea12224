//! Structured logging for HT computations
//!
//! The engine crates only emit `tracing` spans and events: compression entry
//! points open a span with the tensor shape and rank ceiling, every node-wise
//! rank decision is a `debug` event carrying the node id, chosen rank,
//! realized error and whether the accuracy target was met, and restructuring
//! logs its case selection at `debug`/`trace`. This module installs a
//! `tracing-subscriber` to print them.
//!
//! # Example
//!
//! ```no_run
//! use htucker::tracing_support::{init_tracing, TracingConfig, TracingFormat};
//!
//! init_tracing(
//!     TracingConfig::new()
//!         .filter("htucker_tensor=debug")
//!         .format(TracingFormat::Compact),
//! )?;
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: filter directive used by [`TracingConfig::default`]
//! - `HTUCKER_LOG_FORMAT`: `pretty`, `compact` or `json` (default: `pretty`)

use anyhow::Result;
#[cfg(feature = "tracing")]
use tracing_subscriber::{
    fmt, fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

const DEFAULT_FILTER: &str = "htucker_tensor=info,htucker_core=info,warn";

/// Tracing output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TracingFormat {
    /// Multi-line human-readable output
    #[default]
    Pretty,
    /// One line per event
    Compact,
    /// One JSON object per event
    Json,
}

impl TracingFormat {
    /// Parse a format name, falling back to [`TracingFormat::Pretty`]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => TracingFormat::Json,
            "compact" => TracingFormat::Compact,
            _ => TracingFormat::Pretty,
        }
    }
}

/// Subscriber configuration
#[derive(Debug, Clone)]
pub struct TracingConfig {
    pub format: TracingFormat,
    /// `EnvFilter` directive, e.g. `"htucker_tensor=debug,warn"`
    pub filter: String,
    pub with_ansi: bool,
    pub with_target: bool,
    pub with_thread_ids: bool,
    pub with_file: bool,
    pub with_line_number: bool,
    /// Emit an event when a span closes, with its busy/idle time
    pub with_span_events: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        let format = std::env::var("HTUCKER_LOG_FORMAT")
            .map(|s| TracingFormat::parse(&s))
            .unwrap_or_default();
        let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_FILTER.to_string());

        Self {
            format,
            filter,
            with_ansi: true,
            with_target: true,
            with_thread_ids: false,
            with_file: false,
            with_line_number: false,
            with_span_events: false,
        }
    }
}

impl TracingConfig {
    /// Configuration from the environment, see [`TracingConfig::default`]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn with_ansi(mut self, yes: bool) -> Self {
        self.with_ansi = yes;
        self
    }

    pub fn with_target(mut self, yes: bool) -> Self {
        self.with_target = yes;
        self
    }

    pub fn with_thread_ids(mut self, yes: bool) -> Self {
        self.with_thread_ids = yes;
        self
    }

    pub fn with_span_events(mut self, yes: bool) -> Self {
        self.with_span_events = yes;
        self
    }
}

/// Install a global subscriber
///
/// # Errors
///
/// Fails for an unparsable filter directive and when a global subscriber is
/// already installed, including by an earlier call.
#[cfg(feature = "tracing")]
pub fn init_tracing(config: TracingConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.filter)?;
    let spans = if config.with_span_events {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let layer = fmt::layer()
        .with_target(config.with_target)
        .with_thread_ids(config.with_thread_ids)
        .with_file(config.with_file)
        .with_line_number(config.with_line_number)
        .with_span_events(spans);

    match config.format {
        TracingFormat::Pretty => tracing_subscriber::registry()
            .with(layer.pretty().with_ansi(config.with_ansi).with_filter(filter))
            .try_init()?,
        TracingFormat::Compact => tracing_subscriber::registry()
            .with(layer.compact().with_ansi(config.with_ansi).with_filter(filter))
            .try_init()?,
        TracingFormat::Json => tracing_subscriber::registry()
            .with(layer.json().with_filter(filter))
            .try_init()?,
    }

    tracing::debug!(format = ?config.format, filter = %config.filter, "tracing initialized");
    Ok(())
}

/// Without the `tracing` feature no subscriber is installed
#[cfg(not(feature = "tracing"))]
pub fn init_tracing(_config: TracingConfig) -> Result<()> {
    Ok(())
}

/// [`init_tracing`] with [`TracingConfig::default`]
pub fn init_default_tracing() -> Result<()> {
    init_tracing(TracingConfig::default())
}
