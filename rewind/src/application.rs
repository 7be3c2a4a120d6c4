//! Rewind Abscissa Application

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use abscissa_core::{
    Application, Component, FrameworkError, FrameworkErrorKind, StandardPaths,
    application::{self, AppCell},
    config::{self, CfgCell},
    terminal::component::Terminal,
};
use abscissa_tokio::TokioComponent;
use i18n_embed::unic_langid::LanguageIdentifier;

use crate::{cli::EntryPoint, components::tracing::Tracing, config::RewindConfig, i18n};

/// Application state
pub static APP: AppCell<RewindApp> = AppCell::new();

/// Rewind Application
#[derive(Debug)]
pub struct RewindApp {
    /// Application configuration.
    config: CfgCell<RewindConfig>,

    /// Application state.
    state: application::State<Self>,
}

/// Initializes a new application instance.
///
/// By default no configuration is loaded, and the framework state is initialized to a
/// default, empty state (no components, threads, etc).
impl Default for RewindApp {
    fn default() -> Self {
        Self {
            config: CfgCell::default(),
            state: application::State::default(),
        }
    }
}

impl Application for RewindApp {
    type Cmd = EntryPoint;
    type Cfg = RewindConfig;
    type Paths = StandardPaths;

    fn config(&self) -> config::Reader<RewindConfig> {
        self.config.read()
    }

    fn state(&self) -> &application::State<Self> {
        &self.state
    }

    fn register_components(&mut self, command: &Self::Cmd) -> Result<(), FrameworkError> {
        // Abscissa's own tracing component would claim the global subscriber first, so
        // the framework components are assembled by hand.
        let color_choice = self.term_colors(command);
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name_fn(|| {
                static ATOMIC_ID: AtomicUsize = AtomicUsize::new(0);
                let id = ATOMIC_ID.fetch_add(1, Ordering::SeqCst);
                format!("tokio-worker-{id}")
            })
            .build()
            .map_err(|e| FrameworkErrorKind::ComponentError.context(e))?;

        let components: Vec<Box<dyn Component<Self>>> = vec![
            Box::new(Terminal::new(color_choice)),
            Box::new(Tracing::new(color_choice, command.verbose)?),
            Box::new(TokioComponent::from(runtime)),
        ];
        self.state.components_mut().register(components)
    }

    fn load_config(&mut self, path: &Path) -> Result<Self::Cfg, FrameworkError> {
        RewindConfig::load(Some(path))
            .map_err(|e| FrameworkErrorKind::ConfigError.context(e).into())
    }

    fn after_config(&mut self, config: Self::Cfg) -> Result<(), FrameworkError> {
        // Configure components
        let mut components = self.state.components_mut();
        components.after_config(&config)?;
        self.config.set_once(config);
        Ok(())
    }
}

/// Boots the Rewind application, parsing subcommand and options from command-line
/// arguments, and terminating when complete.
pub fn boot(requested_languages: Vec<LanguageIdentifier>) {
    // We load languages here so that the app's CLI usage text can be localized.
    i18n::load_languages(&requested_languages);

    // Now do the normal Abscissa boot.
    abscissa_core::boot(&APP);
}
