//! Zcash network selection.

use zcash_protocol::consensus::NetworkType;

/// The default name of the checkpoint file for a network.
pub fn checkpoints_file(network: NetworkType) -> String {
    format!("checkpoints-{}.txt", kind::name(network))
}

pub(crate) mod kind {
    use std::fmt;

    use serde::{Deserializer, Serializer, de::Visitor};
    use zcash_protocol::consensus::NetworkType;

    pub(crate) fn name(network_type: NetworkType) -> &'static str {
        match network_type {
            NetworkType::Main => "main",
            NetworkType::Test => "test",
            NetworkType::Regtest => "regtest",
        }
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<NetworkType, D::Error> {
        struct NetworkTypeVisitor;
        impl Visitor<'_> for NetworkTypeVisitor {
            type Value = NetworkType;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(formatter, "one of 'main', 'test', or 'regtest'")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                match v {
                    "main" => Ok(NetworkType::Main),
                    "test" => Ok(NetworkType::Test),
                    "regtest" => Ok(NetworkType::Regtest),
                    _ => Err(serde::de::Error::invalid_value(
                        serde::de::Unexpected::Str(v),
                        &self,
                    )),
                }
            }
        }

        deserializer.deserialize_str(NetworkTypeVisitor)
    }

    pub(crate) fn serialize<S: Serializer>(
        network_type: &NetworkType,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(name(*network_type))
    }

    #[derive(serde::Serialize)]
    pub(crate) struct Serializable(#[serde(with = "crate::network::kind")] pub(crate) NetworkType);
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use zcash_protocol::consensus::NetworkType;

    use super::checkpoints_file;

    #[derive(Debug, Deserialize, Serialize)]
    struct Consensus {
        #[serde(with = "super::kind")]
        network: NetworkType,
    }

    #[test]
    fn network_kind_round_trips_through_toml() {
        let parsed: Consensus = toml::from_str("network = \"regtest\"").unwrap();
        assert_eq!(parsed.network, NetworkType::Regtest);
        assert_eq!(
            toml::to_string(&parsed).unwrap().trim(),
            "network = \"regtest\""
        );
        assert!(toml::from_str::<Consensus>("network = \"mainnet\"").is_err());
    }

    #[test]
    fn checkpoint_file_names() {
        assert_eq!(checkpoints_file(NetworkType::Main), "checkpoints-main.txt");
        assert_eq!(checkpoints_file(NetworkType::Test), "checkpoints-test.txt");
    }
}
