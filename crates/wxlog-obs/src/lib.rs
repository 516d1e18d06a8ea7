use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset: debug for the `wxlog` binary and
/// every workspace crate, info for dependencies
pub const DEFAULT_FILTER: &str = "info,wxlog=debug,wxlog_core=debug,wxlog_config=debug,\
wxlog_ingest=debug,wxlog_merge=debug,wxlog_db=debug,wxlog_sinks=debug,wxlog_runner=debug";

/// Log line layout, picked by `WXLOG_LOG_FORMAT`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    /// `json` selects JSON lines; anything else, or nothing, is text
    pub fn from_env() -> Self {
        Self::parse(std::env::var("WXLOG_LOG_FORMAT").ok().as_deref())
    }

    fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }
}

/// Initialize logging to stderr.
/// - RUST_LOG respected; default to [`DEFAULT_FILTER`]
/// - JSON lines when WXLOG_LOG_FORMAT=json
///
/// A second call is a no-op, so tests and binaries can both call it.
pub fn init(service_name: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let format = LogFormat::from_env();

    let registry = tracing_subscriber::registry().with(env_filter);
    let installed = match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    };

    if installed.is_ok() {
        tracing::info!(service = %service_name, ?format, "Logging initialized");
    }
}
