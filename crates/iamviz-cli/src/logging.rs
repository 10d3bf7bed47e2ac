use iamviz_core::LoggingConfig;
use tracing::Subscriber;
use tracing_subscriber::{filter::EnvFilter, fmt, fmt::MakeWriter, layer::SubscriberExt, Registry};

/// Filter used while the configuration itself is loading: `RUST_LOG`,
/// otherwise warnings only (debug with `-v`).
pub fn bootstrap_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }))
}

/// Scoped subscriber for configuration loading, before `init` can read the
/// configured level and format.
pub fn bootstrap_subscriber<W>(
    filter: EnvFilter,
    writer: W,
) -> impl Subscriber + Send + Sync + 'static
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    Registry::default().with(filter).with(
        fmt::layer()
            .compact()
            .with_target(false)
            .with_ansi(false)
            .with_writer(writer),
    )
}

/// Fallback directive when `RUST_LOG` is unset: `-v` means debug,
/// otherwise the configured level.
pub fn filter_directive(config: &LoggingConfig, verbose: bool) -> String {
    if verbose {
        "debug".to_string()
    } else {
        config.level.clone()
    }
}

/// Install the global subscriber. Logs go to stderr so stdout only carries
/// command output.
pub fn init(config: &LoggingConfig, verbose: bool) {
    let directive = filter_directive(config, verbose);
    let env_filter = || {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&directive))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    };

    match config.format.as_str() {
        "json" => {
            let subscriber = Registry::default()
                .with(env_filter())
                .with(fmt::layer().json().with_writer(std::io::stderr));
            tracing::subscriber::set_global_default(subscriber).ok();
        }
        "pretty" => {
            let subscriber = Registry::default()
                .with(env_filter())
                .with(fmt::layer().pretty().with_writer(std::io::stderr));
            tracing::subscriber::set_global_default(subscriber).ok();
        }
        _ => {
            let subscriber = Registry::default().with(env_filter()).with(
                fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            );
            tracing::subscriber::set_global_default(subscriber).ok();
        }
    }
}
