use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_ENV: &str = "SENTVEC_LOG";

/// Installs the stderr subscriber. Stdout stays reserved for data and the
/// success marker. Calling this twice is harmless.
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_writer(std::io::stderr).with_target(false).try_init();
}
