use tracing_log::LogTracer;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use abscissa_core::{Component, FrameworkError, FrameworkErrorKind, terminal::ColorChoice};

/// Abscissa component for initializing the `tracing` subsystem
#[derive(Component, Debug)]
#[component(core)]
pub(crate) struct Tracing {}

impl Tracing {
    /// Installs the global subscriber.
    ///
    /// `RUST_LOG` takes precedence; otherwise replay progress is logged at `info`, or at
    /// `debug` for `--verbose`.
    pub(crate) fn new(color_choice: ColorChoice, verbose: bool) -> Result<Self, FrameworkError> {
        let filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
            Ok(filter) => EnvFilter::new(filter),
            Err(_) if verbose => EnvFilter::new("rewind=debug,info"),
            Err(_) => EnvFilter::new("info"),
        };

        // Forward records from the `log` crate as tracing events.
        LogTracer::init().map_err(|e| FrameworkErrorKind::ComponentError.context(e))?;

        let subscriber = FmtSubscriber::builder()
            .with_ansi(!matches!(color_choice, ColorChoice::Never))
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|e| FrameworkErrorKind::ComponentError.context(e))?;

        Ok(Self {})
    }
}
