//! Firewall rule data structures
//!
//! This module defines the entities exchanged with the remote authority and
//! staged locally by the editor.
//!
//! # Rule Structure
//!
//! A [`Rule`] is one ordered match/action entry:
//! - Direction (`mode`): inbound, outbound or forwarded traffic
//! - Protocol filtering (TCP, UDP, or any)
//! - Source and destination address specifiers (see [`AddressSpec`])
//! - Source and destination port ranges (ignored for [`Protocol::Any`])
//! - Action (Accept/Drop/Reject) and an activation flag
//!
//! Rules carry no identity of their own. The working copy wraps each one in a
//! [`StagedRule`](crate::core::staging::StagedRule) with an ephemeral id that
//! never leaves the client.
//!
//! # Ordering
//!
//! Order is significant: evaluation runs top to bottom and the first active
//! matching rule decides. The policy applies only when nothing matches. See
//! [`evaluate`](crate::core::evaluate::evaluate).
//!
//! # Example
//!
//! ```
//! use fwstage::core::ruleset::{Action, PortRange, Protocol, Rule};
//!
//! let mut rule = Rule::template();
//! rule.name = "Allow proxy".to_string();
//! rule.protocol = Protocol::Tcp;
//! rule.destination_ports = PortRange::single(8080);
//! assert_eq!(rule.action, Action::Accept);
//! assert_eq!(rule.to_string(), "[on] in tcp any:* -> any:8080 accept \"Allow proxy\"");
//! ```

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Maximum number of rules allowed in a single working copy
///
/// Limit prevents memory exhaustion from malformed snapshots or imports.
pub const MAX_RULES: usize = 1000;

/// Sentinel matching every address of every family
pub const ANY: &str = "any";
/// Sentinel matching every IPv4 address
pub const ANY_IPV4: &str = "any-ipv4";
/// Sentinel matching every IPv6 address
pub const ANY_IPV6: &str = "any-ipv6";

/// Network protocol type for firewall rules
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    Default,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum Protocol {
    /// Transmission Control Protocol
    #[default]
    #[strum(serialize = "tcp")]
    Tcp,
    /// User Datagram Protocol
    #[strum(serialize = "udp")]
    Udp,
    /// Match all protocols (port ranges are ignored)
    #[strum(serialize = "any")]
    Any,
}

impl Protocol {
    pub const fn as_str(self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Any => "any",
        }
    }

    /// Returns display name for UI rendering
    pub const fn display_name(self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
            Protocol::Any => "ANY",
        }
    }

    /// Returns `true` if port ranges take part in matching for this protocol.
    ///
    /// ```
    /// use fwstage::core::ruleset::Protocol;
    ///
    /// assert!(Protocol::Tcp.supports_ports());
    /// assert!(!Protocol::Any.supports_ports());
    /// ```
    #[inline]
    pub const fn supports_ports(self) -> bool {
        matches!(self, Protocol::Tcp | Protocol::Udp)
    }
}

/// Rule action (Accept, Drop, or Reject)
///
/// Also used as the default policy of the whole ruleset.
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    Default,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum Action {
    /// Accept the packet (allow it through)
    #[default]
    #[strum(serialize = "accept")]
    Accept,
    /// Drop the packet silently (no response sent)
    #[strum(serialize = "drop")]
    Drop,
    /// Reject the packet and notify the sender
    #[strum(serialize = "reject")]
    Reject,
}

impl Action {
    pub const fn as_str(self) -> &'static str {
        match self {
            Action::Accept => "accept",
            Action::Drop => "drop",
            Action::Reject => "reject",
        }
    }

    pub const fn display_name(self) -> &'static str {
        match self {
            Action::Accept => "Accept",
            Action::Drop => "Drop",
            Action::Reject => "Reject",
        }
    }

    /// Returns `true` for actions that stop traffic (Drop or Reject)
    #[inline]
    pub const fn is_restrictive(self) -> bool {
        matches!(self, Action::Drop | Action::Reject)
    }
}

/// Default action applied when no active rule matches
pub type Policy = Action;

/// Traffic direction a rule applies to
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    Default,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum Mode {
    /// Traffic addressed to the appliance
    #[default]
    #[strum(serialize = "in")]
    In,
    /// Traffic originating from the appliance
    #[strum(serialize = "out")]
    Out,
    /// Traffic routed through the appliance
    #[strum(serialize = "forward")]
    Forward,
}

/// Inclusive port range. `1-65535` is the canonical "any port" value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    pub const ANY: PortRange = PortRange {
        start: 1,
        end: 65535,
    };

    pub const fn single(port: u16) -> Self {
        Self {
            start: port,
            end: port,
        }
    }

    /// Builds a range without validating it; see
    /// [`validate_port_range`](crate::validators::validate_port_range).
    pub const fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    pub const fn is_any(self) -> bool {
        self.start == 1 && self.end == 65535
    }

    pub const fn contains(self, port: u16) -> bool {
        self.start <= port && port <= self.end
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self::ANY
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// Classified source/destination specifier
///
/// Rules store specifiers as text so that an invalid entry can sit in the
/// working copy while the user fixes it. Parsing yields one of these variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressSpec {
    Any,
    AnyIpv4,
    AnyIpv6,
    /// Single address (host prefix) or CIDR block
    Network(IpNetwork),
    /// Named network interface of the appliance
    Interface(String),
}

impl AddressSpec {
    /// Returns `true` if the packet endpoint matches this specifier.
    ///
    /// `interface` is the interface the packet entered (source side) or
    /// leaves through (destination side), when known.
    pub fn matches(&self, addr: IpAddr, interface: Option<&str>) -> bool {
        match self {
            AddressSpec::Any => true,
            AddressSpec::AnyIpv4 => addr.is_ipv4(),
            AddressSpec::AnyIpv6 => addr.is_ipv6(),
            AddressSpec::Network(net) => net.contains(addr),
            AddressSpec::Interface(name) => interface == Some(name.as_str()),
        }
    }

    pub const fn is_interface(&self) -> bool {
        matches!(self, AddressSpec::Interface(_))
    }
}

impl FromStr for AddressSpec {
    type Err = String;

    /// Classifies text as sentinel, address/CIDR, or interface name (in that order).
    ///
    /// Interface names are only checked for kernel naming rules here; whether
    /// the interface exists is the validator's concern.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("Address cannot be empty".to_string());
        }

        if s.eq_ignore_ascii_case(ANY) {
            return Ok(AddressSpec::Any);
        }
        if s.eq_ignore_ascii_case(ANY_IPV4) || s == "0.0.0.0/0" {
            return Ok(AddressSpec::AnyIpv4);
        }
        if s.eq_ignore_ascii_case(ANY_IPV6) || s == "::/0" {
            return Ok(AddressSpec::AnyIpv6);
        }

        if let Ok(net) = s.parse::<IpNetwork>() {
            return Ok(AddressSpec::Network(net));
        }

        // Looks like an address attempt (digits and dots/colons/slash only) but failed to parse
        if s.chars()
            .all(|c| c.is_ascii_hexdigit() || matches!(c, '.' | ':' | '/'))
            && s.chars().any(|c| matches!(c, '.' | ':' | '/'))
        {
            return Err(format!("Invalid IP address or CIDR block: {s}"));
        }

        crate::validators::validate_interface(s)
            .map(AddressSpec::Interface)
            .map_err(|_| format!("Not an address, CIDR block, interface or sentinel: {s}"))
    }
}

impl fmt::Display for AddressSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressSpec::Any => f.write_str(ANY),
            AddressSpec::AnyIpv4 => f.write_str(ANY_IPV4),
            AddressSpec::AnyIpv6 => f.write_str(ANY_IPV6),
            AddressSpec::Network(net) => write!(f, "{net}"),
            AddressSpec::Interface(name) => f.write_str(name),
        }
    }
}

/// One ordered match/action entry of a ruleset
///
/// Serializes to the flat wire shape used by the remote authority
/// (`proto`, `src`, `dst`, `port_src_from`, ...). Equality is semantic
/// equality: it is what the diff engine compares.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "WireRule", into = "WireRule")]
pub struct Rule {
    pub name: String,
    pub protocol: Protocol,
    pub mode: Mode,
    pub action: Action,
    /// Source specifier text, see [`AddressSpec`]
    pub source: String,
    /// Destination specifier text, see [`AddressSpec`]
    pub destination: String,
    pub source_ports: PortRange,
    pub destination_ports: PortRange,
    pub active: bool,
}

impl Rule {
    /// The template used for freshly inserted rules.
    ///
    /// Accepts TCP traffic in any direction-compatible form: inbound, any
    /// address on both sides, full port ranges, active.
    pub fn template() -> Self {
        Self {
            name: "Rule name".to_string(),
            protocol: Protocol::Tcp,
            mode: Mode::In,
            action: Action::Accept,
            source: ANY.to_string(),
            destination: ANY.to_string(),
            source_ports: PortRange::ANY,
            destination_ports: PortRange::ANY,
            active: true,
        }
    }

    /// Source ports as seen by matching (`ANY` protocol ignores stored ports)
    pub fn effective_source_ports(&self) -> PortRange {
        if self.protocol.supports_ports() {
            self.source_ports
        } else {
            PortRange::ANY
        }
    }

    /// Destination ports as seen by matching (`ANY` protocol ignores stored ports)
    pub fn effective_destination_ports(&self) -> PortRange {
        if self.protocol.supports_ports() {
            self.destination_ports
        } else {
            PortRange::ANY
        }
    }

    fn port_display(&self, range: PortRange) -> String {
        if !self.protocol.supports_ports() || range.is_any() {
            "*".to_string()
        } else {
            range.to_string()
        }
    }
}

impl Default for Rule {
    fn default() -> Self {
        Self::template()
    }
}

/// One-line summary used by listings and the review diff
impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} {}:{} -> {}:{} {} {:?}",
            if self.active { "on" } else { "off" },
            self.mode,
            self.protocol,
            self.source,
            self.port_display(self.source_ports),
            self.destination,
            self.port_display(self.destination_ports),
            self.action,
            self.name,
        )
    }
}

/// Flat wire representation of a [`Rule`]
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireRule {
    name: String,
    proto: Protocol,
    #[serde(default = "default_any")]
    src: String,
    #[serde(default = "default_any")]
    dst: String,
    port_src_from: u16,
    port_src_to: u16,
    port_dst_from: u16,
    port_dst_to: u16,
    action: Action,
    #[serde(default)]
    mode: Mode,
    #[serde(default = "default_true")]
    active: bool,
}

fn default_any() -> String {
    ANY.to_string()
}

fn default_true() -> bool {
    true
}

impl From<WireRule> for Rule {
    fn from(w: WireRule) -> Self {
        Self {
            name: w.name,
            protocol: w.proto,
            mode: w.mode,
            action: w.action,
            source: w.src,
            destination: w.dst,
            source_ports: PortRange::new(w.port_src_from, w.port_src_to),
            destination_ports: PortRange::new(w.port_dst_from, w.port_dst_to),
            active: w.active,
        }
    }
}

impl From<Rule> for WireRule {
    fn from(r: Rule) -> Self {
        Self {
            name: r.name,
            proto: r.protocol,
            src: r.source,
            dst: r.destination,
            port_src_from: r.source_ports.start,
            port_src_to: r.source_ports.end,
            port_dst_from: r.destination_ports.start,
            port_dst_to: r.destination_ports.end,
            action: r.action,
            mode: r.mode,
            active: r.active,
        }
    }
}

/// Last ruleset state confirmed by the remote authority
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulesetSnapshot {
    pub rules: Vec<Rule>,
    pub policy: Policy,
    #[serde(default)]
    pub enabled: bool,
}

impl RulesetSnapshot {
    /// Snapshot of an authority with no rules, ACCEPT policy, and the firewall off
    pub fn empty() -> Self {
        Self {
            rules: Vec::new(),
            policy: Action::Accept,
            enabled: false,
        }
    }

    pub fn active_rule_count(&self) -> usize {
        self.rules.iter().filter(|r| r.active).count()
    }
}

impl Default for RulesetSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

/// Body of an atomic ruleset replace (ids stripped)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulesetUpdate {
    pub rules: Vec<Rule>,
    pub policy: Policy,
}
