//! First-match evaluation of an ordered ruleset
//!
//! The remote authority is what actually filters traffic. This evaluator
//! reproduces the same contract locally so a staged ruleset can be checked
//! ("which rule would handle this packet?") before it is pushed, and so the
//! ordering operations of the staging store can be tested against it.

use crate::core::ruleset::{Action, AddressSpec, Mode, Policy, Protocol, Rule};
use std::net::IpAddr;

/// Transport protocol of a hypothetical packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Tcp,
    Udp,
    /// Anything without ports (ICMP, GRE, ...)
    Other,
}

/// Packet description used for evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub direction: Mode,
    pub transport: Transport,
    pub source: IpAddr,
    pub destination: IpAddr,
    /// Ignored for [`Transport::Other`]
    pub source_port: u16,
    /// Ignored for [`Transport::Other`]
    pub destination_port: u16,
    pub in_interface: Option<String>,
    pub out_interface: Option<String>,
}

/// Outcome of evaluating a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Decided by the rule at this position
    Rule { index: usize, action: Action },
    /// No active rule matched
    Policy(Action),
}

impl Verdict {
    pub const fn action(self) -> Action {
        match self {
            Verdict::Rule { action, .. } | Verdict::Policy(action) => action,
        }
    }
}

/// Returns the action of the first active rule matching `packet`, else `policy`.
///
/// Rules whose source or destination specifier does not parse never match.
pub fn evaluate<'a, I>(rules: I, policy: Policy, packet: &Packet) -> Verdict
where
    I: IntoIterator<Item = &'a Rule>,
{
    rules
        .into_iter()
        .enumerate()
        .find(|(_, rule)| rule_matches(rule, packet))
        .map_or(Verdict::Policy(policy), |(index, rule)| Verdict::Rule {
            index,
            action: rule.action,
        })
}

/// Returns `true` if an active `rule` matches `packet`
pub fn rule_matches(rule: &Rule, packet: &Packet) -> bool {
    if !rule.active || rule.mode != packet.direction {
        return false;
    }

    let protocol_ok = match rule.protocol {
        Protocol::Any => true,
        Protocol::Tcp => packet.transport == Transport::Tcp,
        Protocol::Udp => packet.transport == Transport::Udp,
    };
    if !protocol_ok {
        return false;
    }

    let (Ok(source), Ok(destination)) = (
        rule.source.parse::<AddressSpec>(),
        rule.destination.parse::<AddressSpec>(),
    ) else {
        return false;
    };

    if !source.matches(packet.source, packet.in_interface.as_deref())
        || !destination.matches(packet.destination, packet.out_interface.as_deref())
    {
        return false;
    }

    // Port-less rules and packets match on addresses alone
    if !rule.protocol.supports_ports() || packet.transport == Transport::Other {
        return true;
    }

    rule.effective_source_ports().contains(packet.source_port)
        && rule
            .effective_destination_ports()
            .contains(packet.destination_port)
}
