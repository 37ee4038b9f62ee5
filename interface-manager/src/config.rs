// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use std::collections::BTreeMap;
use std::fmt::Display;
use std::time::Duration;

use derive_builder::Builder;

use crate::SlotIndex;

/// Default maximum number of buffers moved per burst.
pub const DEFAULT_BURST: usize = 512;
/// Default number of interface slots.
pub const DEFAULT_CAPACITY: usize = 1000;
/// Default pattern mapping a slot index to an interface name.
pub const DEFAULT_IFNAME_FORMAT: &str = "eth{index}";

/// Tunables of the relay. N.B we derive a builder type `RelayConfigBuilder`
/// and provide defaults for each field.
#[derive(Builder, Clone, Debug, PartialEq, Eq)]
pub struct RelayConfig {
    /// Largest number of buffers a transmit worker pops from the bus at once
    #[builder(default = DEFAULT_BURST)]
    pub burst: usize,

    /// Bound on every readiness wait, and so on the latency to observe cancellation
    #[builder(default = Duration::from_secs(1))]
    pub poll_timeout: Duration,

    /// Period of the reap pass
    #[builder(default = Duration::from_secs(2))]
    pub reap_interval: Duration,

    /// Sleep between checks while waiting for the hardware to send what was written
    #[builder(default = Duration::from_micros(1))]
    pub drain_interval: Duration,

    /// Time workers let a freshly opened interface settle before relaying
    #[builder(default = Duration::from_secs(2))]
    pub phy_reset_wait: Duration,

    /// Number of interface slots; valid indices are `0..capacity`
    #[builder(default = DEFAULT_CAPACITY)]
    pub capacity: usize,

    #[builder(setter(into), default = DEFAULT_IFNAME_FORMAT.to_string())]
    pub ifname_format: String,

    /// Explicit interface names, taking precedence over `ifname_format`
    #[builder(default)]
    pub interface_names: BTreeMap<u32, String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            burst: DEFAULT_BURST,
            poll_timeout: Duration::from_secs(1),
            reap_interval: Duration::from_secs(2),
            drain_interval: Duration::from_micros(1),
            phy_reset_wait: Duration::from_secs(2),
            capacity: DEFAULT_CAPACITY,
            ifname_format: DEFAULT_IFNAME_FORMAT.to_string(),
            interface_names: BTreeMap::new(),
        }
    }
}

impl RelayConfig {
    /// Name of the interface backing slot `index`.
    #[must_use]
    pub fn interface_name(&self, index: SlotIndex) -> String {
        match self.interface_names.get(&index.as_u32()) {
            Some(name) => name.clone(),
            None => self
                .ifname_format
                .replace("{index}", &index.as_u32().to_string()),
        }
    }
}

impl Display for RelayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Relay config")?;
        writeln!(f, "  burst          : {}", self.burst)?;
        writeln!(f, "  poll timeout   : {:?}", self.poll_timeout)?;
        writeln!(f, "  reap interval  : {:?}", self.reap_interval)?;
        writeln!(f, "  drain interval : {:?}", self.drain_interval)?;
        writeln!(f, "  phy reset wait : {:?}", self.phy_reset_wait)?;
        writeln!(f, "  capacity       : {}", self.capacity)?;
        writeln!(f, "  ifname format  : {}", self.ifname_format)?;
        for (index, name) in &self.interface_names {
            writeln!(f, "  interface {index:>4} : {name}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn builder_defaults_match_default() {
        let built = RelayConfigBuilder::default().build().unwrap();
        assert_eq!(built, RelayConfig::default());
        assert_eq!(built.burst, 512);
        assert_eq!(built.capacity, 1000);
    }

    #[test]
    fn interface_names() {
        let config = RelayConfigBuilder::default()
            .ifname_format("veth{index}p")
            .interface_names(BTreeMap::from([(7, "uplink".to_string())]))
            .build()
            .unwrap();
        assert_eq!(config.interface_name(SlotIndex(3)), "veth3p");
        assert_eq!(config.interface_name(SlotIndex(7)), "uplink");
        assert_eq!(
            RelayConfig::default().interface_name(SlotIndex(12)),
            "eth12"
        );
    }
}
