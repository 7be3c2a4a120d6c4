//! Rewind Subcommands

use std::path::{Path, PathBuf};

use abscissa_core::{
    Application, Configurable, FrameworkError, FrameworkErrorKind, Runnable, Shutdown,
};
use home::home_dir;
use tracing::info;

use crate::{
    cli::EntryPoint,
    config::RewindConfig,
    error::{Error, ErrorKind},
    fl,
    prelude::APP,
};

mod checkpoint;
mod example_config;

/// Rewind Configuration Filename
pub const CONFIG_FILE: &str = "rewind.toml";

/// Resolves the requested path relative to the Rewind data directory.
pub(crate) fn resolve_datadir_path(datadir: &Path, path: &Path) -> PathBuf {
    datadir.join(path)
}

impl EntryPoint {
    /// Returns the data directory to use for this Rewind command.
    fn datadir(&self) -> Result<PathBuf, FrameworkError> {
        if let Some(datadir) = &self.datadir {
            Ok(datadir.clone())
        } else {
            home_dir()
                .ok_or_else(|| {
                    FrameworkErrorKind::ComponentError
                        .context(fl!("err-init-cannot-find-home-dir"))
                        .into()
                })
                .map(|base| base.join(".rewind"))
        }
    }
}

impl Runnable for EntryPoint {
    fn run(&self) {
        self.cmd.run()
    }
}

impl Configurable<RewindConfig> for EntryPoint {
    fn config_path(&self) -> Option<PathBuf> {
        let filename = resolve_datadir_path(
            &self.datadir().ok()?,
            self.config
                .as_deref()
                .unwrap_or_else(|| Path::new(CONFIG_FILE)),
        );

        // A missing default config file is fine, but an explicitly requested one is
        // handed to the loader so that it reports the error.
        if filename.exists() || self.config.is_some() {
            Some(filename)
        } else {
            None
        }
    }

    fn process_config(&self, mut config: RewindConfig) -> Result<RewindConfig, FrameworkError> {
        // Without a config file, Abscissa hands us the defaults; environment overrides
        // still apply.
        if self.config_path().is_none() {
            config = RewindConfig::load(None)
                .map_err(|e| FrameworkErrorKind::ConfigError.context(e))?;
        }

        // Components access top-level CLI settings solely through `RewindConfig`.
        config.datadir = Some(self.datadir()?);

        Ok(config)
    }
}

/// An async version of the [`Runnable`] trait.
pub(crate) trait AsyncRunnable {
    /// Runs this `AsyncRunnable`.
    async fn run(&self) -> Result<(), Error>;

    /// Runs this `AsyncRunnable` using the `abscissa_tokio` runtime.
    ///
    /// Interrupts (Ctrl-C, or `SIGINT` on Unix) and `SIGTERM` cancel
    /// [`AsyncRunnable::run`] at its next `.await`.
    ///
    /// This should be called from [`Runnable::run`].
    fn run_on_runtime(&self) {
        let result = abscissa_tokio::run(&APP, async move {
            tokio::select! {
                biased;
                signal = shutdown() => signal,
                result = self.run() => result,
            }
        });

        let e = match result {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e.to_string(),
            Err(e) => e.to_string(),
        };
        eprintln!("{e}");
        APP.shutdown_with_exitcode(Shutdown::Forced, 1);
    }
}

async fn shutdown() -> Result<(), Error> {
    let signal_error = |e: std::io::Error| ErrorKind::Init.context(e);

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint = signal(SignalKind::interrupt()).map_err(signal_error)?;
        let mut sigterm = signal(SignalKind::terminate()).map_err(signal_error)?;

        let signal = tokio::select! {
            _ = sigint.recv() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        };

        info!("Received {signal}, starting shutdown");
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.map_err(signal_error)?;

        info!("Received Ctrl-C, starting shutdown");
    }

    Ok(())
}
