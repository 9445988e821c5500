use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Output shape of the global subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines with file and line numbers.
    Pretty,
    /// One JSON object per event, for log shippers.
    Json,
}

impl LogFormat {
    /// `VIDHUB_LOG_FORMAT` (`json` or `pretty`) wins; otherwise JSON when
    /// `VIDHUB_ENV=production`.
    pub fn from_env() -> Self {
        let format = std::env::var("VIDHUB_LOG_FORMAT").ok();
        let environment = std::env::var("VIDHUB_ENV").ok();
        Self::resolve(format.as_deref(), environment.as_deref())
    }

    fn resolve(format: Option<&str>, environment: Option<&str>) -> Self {
        match format.map(str::trim) {
            Some(f) if f.eq_ignore_ascii_case("json") => Self::Json,
            Some(f) if f.eq_ignore_ascii_case("pretty") => Self::Pretty,
            _ if environment == Some("production") => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Directives used when `RUST_LOG` is unset: the service's own crate at
/// debug, request spans from tower-http at debug, everything else at info.
fn default_directives(service_name: &str) -> String {
    let crate_target = service_name.replace('-', "_");
    format!("info,{crate_target}=debug,tower_http=debug")
}

pub fn init_tracing(service_name: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(service_name)));
    let format = LogFormat::from_env();

    match format {
        LogFormat::Json => {
            let json_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_target(true);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(json_layer)
                .init();
        }
        LogFormat::Pretty => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_file(true)
                .with_line_number(true);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .init();
        }
    }

    tracing::info!(service = service_name, ?format, "tracing initialized");
}
