//! Structured logging setup.
//!
//! The crate only emits `tracing` events; installing a subscriber is left to
//! the binary or test harness. [`init`] installs a `tracing-subscriber`
//! registry with an `EnvFilter` and one `fmt` layer.
//!
//! Targets emitted by the crate:
//!
//! | Target | Content |
//! |--------|---------|
//! | `pic_scheduler::events` | issue, inserted waits, `finish_all` |
//! | `pic_scheduler::queue` | queue start and drain, task failures |
//! | `pic_scheduler::environment` | environment construction, halo exchange |
//! | `pic_scheduler::contract` | contract violations, right before the panic |
//! | `pic_scheduler::profiling` | timeline export |
//!
//! ```no_run
//! pic_scheduler::logging::init(pic_scheduler::logging::LoggingConfig::from_env()).ok();
//! ```

use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter};

/// Output format of the `fmt` layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, human oriented.
    Pretty,
    /// Single line per event.
    #[default]
    Compact,
    /// Newline-delimited JSON.
    Json,
}

/// Subscriber settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Filter directives (`EnvFilter` syntax). `None` falls back to
    /// `RUST_LOG`, then to `default_level`.
    pub directives: Option<String>,
    /// Level used when no directive is available.
    pub default_level: String,
    /// Output format.
    pub format: LogFormat,
    /// ANSI colors.
    pub ansi: bool,
    /// Include thread names (the queue workers are named after their queue).
    pub thread_names: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::for_local()
    }
}

impl LoggingConfig {
    /// Colored compact output at `info`.
    pub fn for_local() -> Self {
        Self {
            directives: None,
            default_level: "info".to_string(),
            format: LogFormat::Compact,
            ansi: true,
            thread_names: true,
        }
    }

    /// JSON output without colors, `debug` for the crate.
    pub fn for_ci() -> Self {
        Self {
            directives: None,
            default_level: "warn,pic_scheduler=debug".to_string(),
            format: LogFormat::Json,
            ansi: false,
            thread_names: true,
        }
    }

    /// Local defaults overridden by `PIC_LOG` (directives) and
    /// `PIC_LOG_FORMAT` (`pretty`, `compact` or `json`).
    pub fn from_env() -> Self {
        let mut config = Self::for_local();
        config.directives = std::env::var("PIC_LOG").ok().filter(|d| !d.trim().is_empty());
        if let Ok(format) = std::env::var("PIC_LOG_FORMAT") {
            config.format = match format.trim().to_ascii_lowercase().as_str() {
                "pretty" => LogFormat::Pretty,
                "json" => LogFormat::Json,
                _ => LogFormat::Compact,
            };
            config.ansi = config.format != LogFormat::Json;
        }
        config
    }

    fn filter(&self) -> EnvFilter {
        self.directives
            .as_deref()
            .and_then(|d| EnvFilter::try_new(d).ok())
            .or_else(|| EnvFilter::try_from_default_env().ok())
            .unwrap_or_else(|| EnvFilter::new(&self.default_level))
    }
}

/// Installs the global subscriber. Fails if one is already installed.
pub fn init(config: LoggingConfig) -> Result<(), TryInitError> {
    let filter = config.filter();
    let layer = fmt::layer().with_target(true).with_thread_names(config.thread_names).with_ansi(config.ansi);

    match config.format {
        LogFormat::Pretty => tracing_subscriber::registry().with(filter).with(layer.pretty()).try_init(),
        LogFormat::Compact => tracing_subscriber::registry().with(filter).with(layer.compact()).try_init(),
        LogFormat::Json => tracing_subscriber::registry().with(filter).with(layer.json()).try_init(),
    }
}
