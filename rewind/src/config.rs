//! Rewind Config

use std::collections::HashMap;
use std::fmt::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use documented::{Documented, DocumentedFields};
use serde::{Deserialize, Serialize};
use zcash_protocol::consensus::NetworkType;

use crate::commands::resolve_datadir_path;
use crate::components::replay::RetryPolicy;

/// Prefix of environment variables that override config file settings.
const ENV_PREFIX: &str = "REWIND";

/// Rewind Configuration
///
/// Most fields are `Option<T>` to enable distinguishing between a user relying on a
/// default value (which may change over time), and a user explicitly configuring an
/// option with the current default value (which should be preserved). The sole exception
/// to this is `consensus.network`, which cannot change for the lifetime of the chain
/// data directory.
#[derive(Clone, Debug, Default, Deserialize, Serialize, DocumentedFields)]
#[serde(deny_unknown_fields)]
pub struct RewindConfig {
    /// Rewind's data directory.
    ///
    /// This cannot be set in a config file; it must be provided on the command line, and
    /// is set to `None` until `EntryPoint::process_config` is called.
    #[serde(skip)]
    pub(crate) datadir: Option<PathBuf>,

    /// Where checkpoints used to seed replays are loaded from.
    #[serde(default)]
    pub checkpoints: CheckpointsSection,

    /// Rewind's understanding of the consensus rules.
    #[serde(default)]
    pub consensus: ConsensusSection,

    /// Settings for how replays are scheduled.
    #[serde(default)]
    pub replay: ReplaySection,
}

impl RewindConfig {
    /// Loads the configuration from an optional TOML file, overridden by any `REWIND_*`
    /// environment variables.
    ///
    /// Environment variables name a section and field separated by a double underscore,
    /// for example `REWIND_REPLAY__MAX_RETRIES=5`.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).format(config::FileFormat::Toml));
        }
        builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Returns the data directory to use.
    ///
    /// Falls back to the current directory if no data directory has been set, which only
    /// happens when the config is used outside of a command.
    pub(crate) fn datadir(&self) -> &Path {
        self.datadir.as_deref().unwrap_or_else(|| Path::new("."))
    }

    /// Returns the path to the checkpoint file.
    pub fn checkpoints_path(&self) -> PathBuf {
        resolve_datadir_path(
            self.datadir(),
            &self.checkpoints.path(self.consensus.network),
        )
    }
}

/// Where checkpoints used to seed replays are loaded from.
#[derive(Clone, Debug, Default, Deserialize, Serialize, Documented, DocumentedFields)]
#[serde(deny_unknown_fields)]
pub struct CheckpointsSection {
    /// Path to the checkpoint file.
    ///
    /// This can be either an absolute path, or a path relative to the data directory.
    /// Each line of the file holds a block height, its Unix timestamp, and its hash in
    /// hex, separated by whitespace. If the file cannot be read, every replay starts from
    /// genesis.
    pub path: Option<PathBuf>,
}

impl CheckpointsSection {
    /// Path to the checkpoint file.
    ///
    /// Default is `checkpoints-<network>.txt`.
    fn path(&self, network: NetworkType) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| PathBuf::from(crate::network::checkpoints_file(network)))
    }
}

/// Rewind's understanding of the consensus rules.
///
/// This MUST match the network of the chain client that replays are driven through.
#[derive(Clone, Debug, Deserialize, Serialize, Documented, DocumentedFields)]
#[serde(deny_unknown_fields)]
pub struct ConsensusSection {
    /// Network type.
    #[serde(with = "crate::network::kind")]
    pub network: NetworkType,
}

impl Default for ConsensusSection {
    fn default() -> Self {
        Self {
            network: NetworkType::Main,
        }
    }
}

/// Settings for how replays are scheduled.
#[derive(Clone, Debug, Default, Deserialize, Serialize, Documented, DocumentedFields)]
#[serde(deny_unknown_fields)]
pub struct ReplaySection {
    /// How often, in milliseconds, the scheduler checks for replays to start or retire.
    ///
    /// The scheduler is also woken immediately whenever a replay is offered or completes.
    pub tick_interval_ms: Option<u64>,

    /// The number of times a failed replay is retried before it is left stalled.
    ///
    /// A stalled replay keeps its wallets busy and blocks the replays queued behind it
    /// until it completes or Rewind is restarted. If unset, failed replays are retried
    /// indefinitely.
    pub max_retries: Option<u32>,

    /// How long, in milliseconds, to wait before retrying a failed replay.
    pub retry_backoff_ms: Option<u64>,
}

impl ReplaySection {
    /// How often the scheduler checks for replays to start or retire.
    ///
    /// Default is 200 milliseconds.
    pub fn tick_interval(&self) -> Duration {
        // A zero period would make `tokio::time::interval` panic.
        Duration::from_millis(self.tick_interval_ms.unwrap_or(200).max(1))
    }

    /// How long to wait before retrying a failed replay.
    ///
    /// Default is zero, retrying on the next tick.
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.unwrap_or(0))
    }

    pub(crate) fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff: self.retry_backoff(),
        }
    }
}

impl RewindConfig {
    /// Generates an example config file, with all default values included as comments.
    pub fn generate_example() -> String {
        // This needs to be kept in sync with the config structure by hand.
        let conf = RewindConfig::default();
        let field_defaults = [
            checkpoints("path", conf.checkpoints.path(conf.consensus.network)),
            consensus(
                "network",
                crate::network::kind::Serializable(conf.consensus.network),
            ),
            replay("tick_interval_ms", conf.replay.tick_interval().as_millis() as u64),
            replay("max_retries", conf.replay.max_retries),
            replay(
                "retry_backoff_ms",
                conf.replay.retry_backoff().as_millis() as u64,
            ),
        ]
        .into_iter()
        .collect::<HashMap<_, _>>();

        const CHECKPOINTS: &str = "checkpoints";
        const CONSENSUS: &str = "consensus";
        const REPLAY: &str = "replay";
        fn checkpoints<T: Serialize>(
            f: &'static str,
            d: T,
        ) -> ((&'static str, &'static str), Option<toml::Value>) {
            field(CHECKPOINTS, f, d)
        }
        fn consensus<T: Serialize>(
            f: &'static str,
            d: T,
        ) -> ((&'static str, &'static str), Option<toml::Value>) {
            field(CONSENSUS, f, d)
        }
        fn replay<T: Serialize>(
            f: &'static str,
            d: T,
        ) -> ((&'static str, &'static str), Option<toml::Value>) {
            field(REPLAY, f, d)
        }
        fn field<T: Serialize>(
            s: &'static str,
            f: &'static str,
            d: T,
        ) -> ((&'static str, &'static str), Option<toml::Value>) {
            // `None` has no TOML representation; it is rendered as `UNSET`.
            ((s, f), toml::Value::try_from(d).ok())
        }

        let sec_def = |section_name, field_name| {
            field_defaults
                .get(&(section_name, field_name))
                .and_then(|v| v.as_ref())
        };

        let mut config = r"# Default configuration for Rewind.
#
# This file is generated as an example using Rewind's current defaults. It can
# be used as a skeleton for custom configs.
#
# Fields that are required to be set are uncommented, and set to an example
# value. Every other field is commented out, and set to the current default
# value that Rewind will use for it (or `UNSET` if the field has no default).
#
# Every field can also be set with an environment variable named after its
# section and field, e.g. `REWIND_REPLAY__MAX_RETRIES`.
"
        .to_owned();

        fn write_section<'a, T: Documented + DocumentedFields>(
            config: &mut String,
            section_name: &'static str,
            sec_def: &impl Fn(&'static str, &'static str) -> Option<&'a toml::Value>,
        ) {
            writeln!(config).unwrap();
            writeln!(config, "#").unwrap();
            for line in T::DOCS.lines() {
                if line.is_empty() {
                    writeln!(config, "#").unwrap();
                } else {
                    writeln!(config, "# {line}").unwrap();
                }
            }
            writeln!(config, "#").unwrap();
            writeln!(config, "[{section_name}]").unwrap();
            writeln!(config).unwrap();

            for field_name in T::FIELD_NAMES {
                write_field::<T>(
                    config,
                    field_name,
                    section_name == CONSENSUS && *field_name == "network",
                    sec_def(section_name, field_name),
                );
            }
        }

        fn write_field<T: DocumentedFields>(
            config: &mut String,
            field_name: &str,
            required: bool,
            field_default: Option<&toml::Value>,
        ) {
            let field_doc = T::get_field_docs(field_name).unwrap_or_default();
            for line in field_doc.lines() {
                if line.is_empty() {
                    writeln!(config, "#").unwrap();
                } else {
                    writeln!(config, "# {line}").unwrap();
                }
            }

            write!(
                config,
                "{}{} = ",
                if required { "" } else { "#" },
                field_name
            )
            .unwrap();
            match field_default {
                Some(present) => write!(config, "{present}").unwrap(),
                None => write!(config, "UNSET").unwrap(),
            }

            writeln!(config).unwrap();
            writeln!(config).unwrap();
        }

        for field_name in Self::FIELD_NAMES {
            match *field_name {
                CHECKPOINTS => {
                    write_section::<CheckpointsSection>(&mut config, field_name, &sec_def)
                }
                CONSENSUS => write_section::<ConsensusSection>(&mut config, field_name, &sec_def),
                REPLAY => write_section::<ReplaySection>(&mut config, field_name, &sec_def),
                // Top-level fields correspond to CLI settings, and cannot be configured
                // via a file.
                _ => (),
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    use zcash_protocol::consensus::NetworkType;

    use super::{ReplaySection, RewindConfig};

    #[test]
    fn example_config_parses_to_defaults() {
        let example = RewindConfig::generate_example();
        assert!(example.contains("[replay]"));
        assert!(example.contains("#tick_interval_ms = 200"));
        assert!(example.contains("#max_retries = UNSET"));
        assert!(example.contains("network = \"main\""));

        let parsed: RewindConfig = toml::from_str(&example).unwrap();
        assert_eq!(parsed.consensus.network, NetworkType::Main);
        assert_eq!(parsed.replay.max_retries, None);
    }

    #[test]
    fn replay_defaults() {
        let replay = ReplaySection::default();
        assert_eq!(replay.tick_interval(), Duration::from_millis(200));
        let policy = replay.retry_policy();
        assert_eq!(policy.max_retries, None);
        assert_eq!(policy.backoff, Duration::ZERO);

        let zero = ReplaySection {
            tick_interval_ms: Some(0),
            ..Default::default()
        };
        assert_eq!(zero.tick_interval(), Duration::from_millis(1));
    }

    #[test]
    fn checkpoints_path_follows_network_and_datadir() {
        let mut config = RewindConfig {
            datadir: Some(PathBuf::from("/data")),
            ..Default::default()
        };
        assert_eq!(
            config.checkpoints_path(),
            Path::new("/data/checkpoints-main.txt")
        );

        config.consensus.network = NetworkType::Test;
        assert_eq!(
            config.checkpoints_path(),
            Path::new("/data/checkpoints-test.txt")
        );

        config.checkpoints.path = Some(PathBuf::from("/etc/rewind/checkpoints.txt"));
        assert_eq!(
            config.checkpoints_path(),
            Path::new("/etc/rewind/checkpoints.txt")
        );
    }
}
