use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

const LOG_FILTER_ENV: &str = "LXSH_LOG";

/// Default level for a `-v` count; `LXSH_LOG` directives still win.
pub(crate) fn default_log_level(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

pub(crate) fn init_tracing(verbosity: u8) {
    let env_filter = EnvFilter::builder()
        .with_env_var(LOG_FILTER_ENV)
        .with_default_directive(default_log_level(verbosity).into())
        .from_env_lossy();

    // stdout carries command output; diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(verbosity >= 3)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
