//! Runtime configuration for a BACnet device or router.
//!
//! [`Config`] collects every tunable a device or router needs into one
//! struct that an embedder can build by hand or deserialize from
//! TOML/JSON/YAML via `serde`. [`Config::validate`] catches the
//! combinations that would otherwise fail much later, deep inside a
//! transport port.

#[cfg(not(feature = "std"))]
use alloc::{string::String, vec::Vec};

#[cfg(feature = "serde")]
use serde::Deserialize;

use crate::datalink::bip::BdtEntry;

/// Errors surfaced by [`Config::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(thiserror::Error))]
pub enum ConfigError {
    #[cfg_attr(feature = "std", error("instance number {0} exceeds the 22-bit object instance range"))]
    InstanceNumberOutOfRange(u32),

    #[cfg_attr(feature = "std", error("port {0} is not a usable UDP port"))]
    InvalidPort(u16),

    #[cfg_attr(feature = "std", error("ipv6 and an ethernet-only configuration were both requested"))]
    Ipv6EthernetConflict,

    #[cfg_attr(feature = "std", error("BBMD TTL must be nonzero when a BBMD address is configured"))]
    ZeroBbmdTtl,

    #[cfg_attr(
        feature = "std",
        error("BACnet/SC hub URI is required when sc_config is present")
    )]
    MissingScHubUri,
}

#[cfg(not(feature = "std"))]
impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// BACnet/SC (Annex AB) hub connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ScConfig {
    pub primary_hub_uri: String,
    pub failover_hub_uri: Option<String>,
    pub tls_key_path: Option<String>,
    pub tls_cert_path: Option<String>,
    pub tls_ca_path: Option<String>,
    /// Accept `ws://` in addition to `wss://`. Off by default; BACnet/SC
    /// requires TLS except in lab setups.
    pub allow_plaintext: bool,
}

impl Default for ScConfig {
    fn default() -> Self {
        Self {
            primary_hub_uri: String::new(),
            failover_hub_uri: None,
            tls_key_path: None,
            tls_cert_path: None,
            tls_ca_path: None,
            allow_plaintext: false,
        }
    }
}

/// Top-level device/router configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    /// This device's Device object instance number (0..=4194303).
    pub instance_number: u32,
    /// Local interface to bind, e.g. `"0.0.0.0"` or an interface name.
    pub interface: String,
    /// BACnet/IP UDP port. 0xBAC0 (47808) unless the site reassigns it.
    pub port: u16,
    pub max_apdu_length_accepted: u16,
    pub segmentation_supported: bool,
    pub apdu_timeout_ms: u32,
    pub number_of_apdu_retries: u8,

    /// Address of this site's BBMD, if this device registers as a foreign
    /// device rather than running its own BBMD.
    pub bbmd_address: Option<String>,
    pub bbmd_ttl_seconds: u16,
    /// Broadcast Distribution Table entries, if this device runs a BBMD.
    pub bbmd_bdt: Vec<BdtEntry>,

    /// Present only when BACnet/SC is in use.
    pub sc_config: Option<ScConfig>,

    /// Bind a BACnet/IPv6 (Annex U) port in addition to / instead of IPv4.
    pub ipv6: bool,

    pub ethernet_interface: Option<String>,
    pub ethernet_mac: Option<[u8; 6]>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            instance_number: 0,
            interface: String::from("0.0.0.0"),
            port: 0xBAC0,
            max_apdu_length_accepted: 1476,
            segmentation_supported: true,
            apdu_timeout_ms: 3_000,
            number_of_apdu_retries: 3,
            bbmd_address: None,
            bbmd_ttl_seconds: 300,
            bbmd_bdt: Vec::new(),
            sc_config: None,
            ipv6: false,
            ethernet_interface: None,
            ethernet_mac: None,
        }
    }
}

/// Largest legal BACnet object instance number (22 bits, ASHRAE 135 Clause
/// 12.11.20).
const MAX_INSTANCE_NUMBER: u32 = 0x3F_FFFF;

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instance_number > MAX_INSTANCE_NUMBER {
            return Err(ConfigError::InstanceNumberOutOfRange(self.instance_number));
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }
        if self.ipv6 && self.ethernet_interface.is_some() && self.ethernet_mac.is_some() {
            return Err(ConfigError::Ipv6EthernetConflict);
        }
        if self.bbmd_address.is_some() && self.bbmd_ttl_seconds == 0 {
            return Err(ConfigError::ZeroBbmdTtl);
        }
        if let Some(sc) = &self.sc_config {
            if sc.primary_hub_uri.is_empty() {
                return Err(ConfigError::MissingScHubUri);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn rejects_oversized_instance_number() {
        let cfg = Config {
            instance_number: MAX_INSTANCE_NUMBER + 1,
            ..Config::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::InstanceNumberOutOfRange(MAX_INSTANCE_NUMBER + 1))
        );
    }

    #[test]
    fn rejects_zero_port() {
        let cfg = Config {
            port: 0,
            ..Config::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::InvalidPort(0)));
    }

    #[test]
    fn rejects_bbmd_without_ttl() {
        let cfg = Config {
            bbmd_address: Some("192.0.2.1:47808".into()),
            bbmd_ttl_seconds: 0,
            ..Config::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroBbmdTtl));
    }

    #[test]
    fn rejects_sc_config_without_hub_uri() {
        let cfg = Config {
            sc_config: Some(ScConfig::default()),
            ..Config::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::MissingScHubUri));
    }

    #[test]
    fn accepts_populated_sc_config() {
        let cfg = Config {
            sc_config: Some(ScConfig {
                primary_hub_uri: "wss://hub.example.com/bacnet".into(),
                ..ScConfig::default()
            }),
            ..Config::default()
        };
        assert!(cfg.validate().is_ok());
    }
}
