// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Command line of the relay.

pub use clap::Parser;
use clap::builder::TypedValueParser;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use interface_manager::{
    DEFAULT_BURST, DEFAULT_CAPACITY, DEFAULT_IFNAME_FORMAT, RelayConfig, RelayConfigBuilder,
    RelayConfigBuilderError,
};

/// Default path of the control socket.
pub const DEFAULT_CONTROL_PATH: &str = "/var/run/ringbus/control.sock";

/// Longest kernel interface name.
const MAX_IFNAME_LEN: usize = 15;

/// Explicit name of the interface backing a slot, as `INDEX=NAME`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceArg {
    pub index: u32,
    pub name: String,
}

fn check_ifname(name: &str) -> Result<(), String> {
    if name.is_empty() || name.len() > MAX_IFNAME_LEN {
        return Err(format!(
            "Bad interface name '{name}': length must be in [1..{MAX_IFNAME_LEN}]"
        ));
    }
    if name == "." || name == ".." || name.contains(['/', ':']) || name.contains(char::is_whitespace)
    {
        return Err(format!("Bad interface name '{name}'"));
    }
    Ok(())
}

impl FromStr for InterfaceArg {
    type Err = String;
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (index, name) = input
            .split_once('=')
            .ok_or("Bad syntax: expected INDEX=NAME".to_string())?;
        let index = index
            .parse::<u32>()
            .map_err(|e| format!("Bad interface index '{index}': {e}"))?;
        check_ifname(name)?;
        Ok(InterfaceArg {
            index,
            name: name.to_string(),
        })
    }
}

impl Display for InterfaceArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.index, self.name)
    }
}

fn parse_ifname_format(input: &str) -> Result<String, String> {
    if input.contains("{index}") {
        Ok(input.to_string())
    } else {
        Err(format!("Bad interface name format '{input}': missing {{index}}"))
    }
}

#[derive(Parser, Debug)]
#[command(name = "ringbus")]
#[command(version)]
#[command(about = "A userspace packet relay between network interfaces", long_about = None)]
#[allow(clippy::struct_excessive_bools)]
pub struct CmdArgs {
    #[arg(
        long,
        value_name = "PATH",
        default_value = DEFAULT_CONTROL_PATH,
        help = "Unix socket to listen for control commands"
    )]
    control_path: PathBuf,

    #[arg(
        short = 'b',
        long,
        value_name = "N",
        default_value_t = DEFAULT_BURST as u32,
        value_parser = clap::value_parser!(u32).range(1..=65535),
        help = "Maximum number of frames moved from the bus to a transmit ring at once, in [1..65535]"
    )]
    burst: u32,

    #[arg(
        long,
        value_name = "MILLISECONDS",
        default_value_t = 1000,
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Bound on every ring readiness wait"
    )]
    poll_timeout_ms: u64,

    #[arg(
        long,
        value_name = "MILLISECONDS",
        default_value_t = 2000,
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Interval between passes releasing stopped interfaces"
    )]
    reap_interval_ms: u64,

    #[arg(
        long,
        value_name = "MICROSECONDS",
        default_value_t = 1,
        help = "Sleep between checks while waiting for a transmit ring to drain"
    )]
    drain_interval_us: u64,

    #[arg(
        long,
        value_name = "MILLISECONDS",
        default_value_t = 2000,
        help = "Time given to a freshly opened interface to settle before relaying"
    )]
    phy_reset_wait_ms: u64,

    #[arg(
        long,
        value_name = "N",
        default_value_t = DEFAULT_CAPACITY,
        value_parser = clap::value_parser!(u32).range(1..=65536).map(|n| n as usize),
        help = "Number of interface slots; valid indices are 0..N"
    )]
    capacity: usize,

    #[arg(
        long,
        value_name = "FORMAT",
        default_value = DEFAULT_IFNAME_FORMAT,
        value_parser = parse_ifname_format,
        help = "Name of the interface of a slot, where {index} is replaced by the slot index"
    )]
    ifname_format: String,

    #[arg(
        long,
        value_name = "INDEX=NAME",
        value_parser = InterfaceArg::from_str,
        value_delimiter = ',',
        help = "Interface of a slot, overriding --ifname-format.
Examples:
   --interface 1=enp2s0
   --interface 1=enp2s0,2=enp2s1
Note: multiple interfaces can be specified separated by commas and no spaces"
    )]
    interface: Vec<InterfaceArg>,

    #[arg(
        long,
        default_value_t = false,
        help = "Show the available tracing tags and exit"
    )]
    show_tracing_tags: bool,

    #[arg(
        long,
        default_value_t = false,
        help = "Show configurable tracing targets and exit"
    )]
    show_tracing_targets: bool,

    #[arg(
        long,
        value_name = "tracing configuration",
        help = "Tracing config string as comma-separated sequence of tag=level, with level one in [off,error,warn,info,debug,trace].
Passing default=level sets the default log-level.
Passing all=level allows setting the log-level of all targets to level.
E.g. default=error,all=info,relay=debug will set the default target to error, and all the registered targets to info, but enable debug for the relay"
    )]
    tracing: Option<String>,
}

impl CmdArgs {
    pub fn control_path(&self) -> &PathBuf {
        &self.control_path
    }

    pub fn burst(&self) -> usize {
        self.burst as usize
    }
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
    pub fn reap_interval(&self) -> Duration {
        Duration::from_millis(self.reap_interval_ms)
    }
    pub fn drain_interval(&self) -> Duration {
        Duration::from_micros(self.drain_interval_us)
    }
    pub fn phy_reset_wait(&self) -> Duration {
        Duration::from_millis(self.phy_reset_wait_ms)
    }
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn interfaces(&self) -> impl Iterator<Item = &InterfaceArg> {
        self.interface.iter()
    }

    pub fn show_tracing_tags(&self) -> bool {
        self.show_tracing_tags
    }
    pub fn show_tracing_targets(&self) -> bool {
        self.show_tracing_targets
    }
    pub fn tracing(&self) -> Option<&String> {
        self.tracing.as_ref()
    }

    /// Relay configuration from the command line. A later `--interface` for the same
    /// index overrides earlier ones.
    pub fn relay_config(&self) -> Result<RelayConfig, RelayConfigBuilderError> {
        let names: BTreeMap<u32, String> = self
            .interfaces()
            .map(|arg| (arg.index, arg.name.clone()))
            .collect();
        RelayConfigBuilder::default()
            .burst(self.burst())
            .poll_timeout(self.poll_timeout())
            .reap_interval(self.reap_interval())
            .drain_interval(self.drain_interval())
            .phy_reset_wait(self.phy_reset_wait())
            .capacity(self.capacity)
            .ifname_format(self.ifname_format.clone())
            .interface_names(names)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use interface_manager::SlotIndex;

    #[test]
    fn test_parse_interface() {
        let arg = InterfaceArg::from_str("3=enp2s1").unwrap();
        assert_eq!(arg.index, 3);
        assert_eq!(arg.name, "enp2s1");
        assert_eq!(arg.to_string(), "3=enp2s1");

        assert!(InterfaceArg::from_str("enp2s1").is_err());
        assert!(InterfaceArg::from_str("-1=enp2s1").is_err());
        assert!(InterfaceArg::from_str("x=enp2s1").is_err());
        assert!(InterfaceArg::from_str("1=").is_err());
        assert!(InterfaceArg::from_str("1=a-very-long-interface-name").is_err());
        assert!(InterfaceArg::from_str("1=en p").is_err());
        assert!(InterfaceArg::from_str("1=en/p").is_err());
    }

    #[test]
    fn test_defaults() {
        let args = CmdArgs::try_parse_from(["ringbus"]).unwrap();
        assert_eq!(args.control_path(), &PathBuf::from(DEFAULT_CONTROL_PATH));
        let config = args.relay_config().unwrap();
        assert_eq!(config, RelayConfig::default());
        assert!(args.tracing().is_none());
        assert!(!args.show_tracing_tags());
    }

    #[test]
    fn test_relay_config() {
        let args = CmdArgs::try_parse_from([
            "ringbus",
            "-b",
            "64",
            "--poll-timeout-ms",
            "50",
            "--reap-interval-ms",
            "100",
            "--capacity",
            "16",
            "--ifname-format",
            "veth{index}",
            "--interface",
            "1=uplink,2=downlink",
            "--interface",
            "2=mirror",
        ])
        .unwrap();
        let config = args.relay_config().unwrap();
        assert_eq!(config.burst, 64);
        assert_eq!(config.poll_timeout, Duration::from_millis(50));
        assert_eq!(config.reap_interval, Duration::from_millis(100));
        assert_eq!(config.capacity, 16);
        assert_eq!(config.interface_name(SlotIndex(1)), "uplink");
        assert_eq!(config.interface_name(SlotIndex(2)), "mirror");
        assert_eq!(config.interface_name(SlotIndex(3)), "veth3");
    }

    #[test]
    fn test_bad_values() {
        assert!(CmdArgs::try_parse_from(["ringbus", "--burst", "0"]).is_err());
        assert!(CmdArgs::try_parse_from(["ringbus", "--burst", "65536"]).is_err());
        assert!(CmdArgs::try_parse_from(["ringbus", "--poll-timeout-ms", "0"]).is_err());
        assert!(CmdArgs::try_parse_from(["ringbus", "--capacity", "0"]).is_err());
        assert!(CmdArgs::try_parse_from(["ringbus", "--capacity", "65537"]).is_err());
        assert!(CmdArgs::try_parse_from(["ringbus", "--ifname-format", "eth"]).is_err());
        assert!(CmdArgs::try_parse_from(["ringbus", "--interface", "eth0"]).is_err());
    }
}
