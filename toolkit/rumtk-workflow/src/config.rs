/*
 * rumtk attempts to implement HL7 and medical protocols for interoperability in medicine.
 * This toolkit aims to be reliable, simple, performant, and standards compliant.
 * Copyright (C) 2025  Luis M. Santos, M.D.
 *
 * This library is free software; you can redistribute it and/or
 * modify it under the terms of the GNU Lesser General Public
 * License as published by the Free Software Foundation; either
 * version 2.1 of the License, or (at your option) any later version.
 *
 * This library is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
 * Lesser General Public License for more details.
 *
 * You should have received a copy of the GNU Lesser General Public
 * License along with this library; if not, write to the Free Software
 * Foundation, Inc., 51 Franklin Street, Fifth Floor, Boston, MA  02110-1301  USA
 */

///
/// The gateway's configuration surface: a `serde::Deserialize`-only struct tree. This module does
/// no file I/O, argv parsing, or env var reads -- a caller (the `rumtk-v2-interface` binary, or a
/// test) reads bytes from wherever it likes and hands them to `serde_json`/`serde_yaml` to produce
/// a [GatewayConfig]. That keeps the validated shape of configuration identical across a YAML
/// file, a JSON file, or a value built up in a test, with no parsing logic duplicated between them.
///
pub mod config {
    use crate::router::router::TransportKind;
    use rumtk_core::core::{GatewayError, RUMResult};
    use rumtk_core::strings::RUMString;
    use rumtk_core::queue::queue::RetryPolicy;
    use serde::Deserialize;

    #[derive(Debug, Clone, Deserialize)]
    pub struct DestinationConfig {
        pub id: RUMString,
        pub host: RUMString,
        pub port: u16,
        #[serde(default)]
        pub tls: bool,
    }

    impl DestinationConfig {
        pub fn transport(&self) -> TransportKind {
            if self.tls {
                TransportKind::Tls
            } else {
                TransportKind::Plain
            }
        }
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct GroupConfig {
        pub name: RUMString,
        /// Destination ids in priority order, highest priority first.
        pub destinations: Vec<RUMString>,
    }

    fn default_backoff_base_ms() -> u64 {
        500
    }
    fn default_backoff_multiplier() -> f64 {
        2.0
    }
    fn default_backoff_cap_ms() -> u64 {
        60_000
    }
    fn default_max_attempts() -> u32 {
        10
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct RetryConfig {
        #[serde(default = "default_backoff_base_ms")]
        pub backoff_base_ms: u64,
        #[serde(default = "default_backoff_multiplier")]
        pub backoff_multiplier: f64,
        #[serde(default = "default_backoff_cap_ms")]
        pub backoff_cap_ms: u64,
        #[serde(default = "default_max_attempts")]
        pub max_attempts: u32,
    }

    impl Default for RetryConfig {
        fn default() -> Self {
            RetryConfig {
                backoff_base_ms: default_backoff_base_ms(),
                backoff_multiplier: default_backoff_multiplier(),
                backoff_cap_ms: default_backoff_cap_ms(),
                max_attempts: default_max_attempts(),
            }
        }
    }

    impl From<&RetryConfig> for RetryPolicy {
        fn from(c: &RetryConfig) -> Self {
            RetryPolicy {
                base: c.backoff_base_ms,
                multiplier: c.backoff_multiplier,
                cap: c.backoff_cap_ms,
                max_attempts: c.max_attempts,
            }
        }
    }

    fn default_bind_address() -> RUMString {
        RUMString::from("0.0.0.0:2575")
    }
    fn default_sending_application() -> RUMString {
        RUMString::from("RUMTK-BRIDGE")
    }
    fn default_sending_facility() -> RUMString {
        RUMString::from("RUMTK")
    }
    fn default_high_water_mark() -> usize {
        100_000
    }
    fn default_queue_workers() -> usize {
        4
    }
    fn default_send_timeout_ms() -> u64 {
        10_000
    }
    fn default_claim_grace_ms() -> i64 {
        30_000
    }
    fn default_mwl_backend() -> RUMString {
        RUMString::from("memory")
    }

    /// Everything the gateway binary needs to stand itself up, read once at startup from a config
    /// file and optionally refreshed on SIGHUP (§6's "reload on config-only signal").
    #[derive(Debug, Clone, Deserialize)]
    pub struct GatewayConfig {
        /// Address the inbound MLLP server binds, e.g. `"0.0.0.0:2575"`.
        #[serde(default = "default_bind_address")]
        pub bind_address: RUMString,
        #[serde(default = "default_sending_application")]
        pub sending_application: RUMString,
        #[serde(default = "default_sending_facility")]
        pub sending_facility: RUMString,
        pub destinations: Vec<DestinationConfig>,
        pub groups: Vec<GroupConfig>,
        /// Failover groups the MPPS workflow notifies for every accession by default.
        #[serde(default)]
        pub mpps_notification_groups: Vec<RUMString>,
        #[serde(default)]
        pub retry: RetryConfig,
        #[serde(default = "default_high_water_mark")]
        pub queue_high_water_mark: usize,
        #[serde(default = "default_queue_workers")]
        pub queue_workers: usize,
        #[serde(default = "default_send_timeout_ms")]
        pub send_timeout_ms: u64,
        #[serde(default = "default_claim_grace_ms")]
        pub claim_grace_ms: i64,
        /// `"memory"` or a SQLite file path; any value other than `"memory"` is treated as a path.
        #[serde(default = "default_mwl_backend")]
        pub mwl_backend: RUMString,
        #[serde(default = "default_mwl_backend")]
        pub mpps_backend: RUMString,
        #[serde(default = "default_mwl_backend")]
        pub queue_backend: RUMString,
    }

    impl GatewayConfig {
        /// Cross-checks that every group references only registered destinations, catching a
        /// typo'd destination id at startup instead of at first failover.
        pub fn validate(&self) -> RUMResult<()> {
            let known: std::collections::HashSet<&str> =
                self.destinations.iter().map(|d| d.id.as_str()).collect();
            for group in &self.groups {
                if group.destinations.is_empty() {
                    return Err(GatewayError::validation(format!(
                        "group \"{}\" has no destinations",
                        group.name
                    )));
                }
                for id in &group.destinations {
                    if !known.contains(id.as_str()) {
                        return Err(GatewayError::validation(format!(
                            "group \"{}\" references unknown destination \"{}\"",
                            group.name, id
                        )));
                    }
                }
            }
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        const YAML: &str = r#"
bind_address: "127.0.0.1:2575"
destinations:
  - id: ris-1
    host: 10.0.0.5
    port: 2575
groups:
  - name: ris
    destinations: ["ris-1"]
mpps_notification_groups: ["ris"]
"#;

        #[test]
        fn test_parses_minimal_yaml_with_defaults() {
            let config: GatewayConfig = serde_yaml::from_str(YAML).unwrap();
            assert_eq!(config.bind_address, "127.0.0.1:2575");
            assert_eq!(config.retry.max_attempts, 10);
            assert_eq!(config.queue_workers, 4);
            assert!(config.validate().is_ok());
        }

        #[test]
        fn test_validate_rejects_unknown_destination_in_group() {
            const BAD_YAML: &str = r#"
destinations:
  - id: ris-1
    host: 10.0.0.5
    port: 2575
groups:
  - name: ris
    destinations: ["ris-nonexistent"]
"#;
            let config: GatewayConfig = serde_yaml::from_str(BAD_YAML).unwrap();
            assert!(config.validate().is_err());
        }

        #[test]
        fn test_retry_config_converts_to_retry_policy() {
            let retry = RetryConfig {
                backoff_base_ms: 100,
                backoff_multiplier: 3.0,
                backoff_cap_ms: 5_000,
                max_attempts: 4,
            };
            let policy: RetryPolicy = (&retry).into();
            assert_eq!(policy.base, 100);
            assert_eq!(policy.max_attempts, 4);
        }
    }
}
