//! Logging setup and the component-tagged event macros.
//!
//! Quiet by default (`warn`); levels come from [`LoggingConfig`], with the
//! `RUST_LOG` environment variable taking precedence:
//!
//! ```toml
//! [logging]
//! default = "warn"
//!
//! [logging.modules]
//! monitor = "debug"
//! ```

use std::sync::Once;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

/// Compact time format: HH:MM:SS.mmm
struct CompactTime;

impl FormatTime for CompactTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// Initialize logging with configuration.
///
/// Safe to call multiple times; only the first call takes effect.
pub fn init_with_config(config: &LoggingConfig) {
    INIT.call_once(|| {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            let mut spec = config.default.clone();
            for (module, level) in &config.modules {
                spec.push_str(&format!(",{module}={level}"));
            }
            EnvFilter::new(&spec)
        };

        // try_init so an embedding application that already installed a
        // subscriber keeps its own.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_timer(CompactTime)
            .with_target(true)
            .try_init();
    });
}

/// Initialize logging with the default (quiet) configuration.
pub fn init() {
    init_with_config(&LoggingConfig::default());
}

/// Log an engine event with component context.
///
/// # Examples
/// ```ignore
/// log_event!("monitor", "watching", "{}", path.display());
/// log_event!("monitor", "unwatched");
/// ```
#[macro_export]
macro_rules! log_event {
    ($component:expr, $event:expr) => {
        tracing::info!("[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::info!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}

/// Debug-only event logging.
///
/// # Examples
/// ```ignore
/// debug_event!("poll", "read retry", "{reason}");
/// ```
#[macro_export]
macro_rules! debug_event {
    ($component:expr, $event:expr) => {
        tracing::debug!("[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::debug!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}
