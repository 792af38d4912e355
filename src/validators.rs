//! Input validation for staged firewall rules
//!
//! Every predicate here is pure: it inspects a value and reports what is
//! wrong with it. Staging operations decide what to do with the answer
//! (reject the edit, or store it and surface the issue).

use crate::core::error::Field;
use crate::core::ruleset::{AddressSpec, PortRange, Rule};
use ipnetwork::IpNetwork;
use std::collections::BTreeSet;
use std::net::IpAddr;

/// Validates a rule name.
///
/// # Errors
///
/// Returns `Err` if the name is empty or whitespace only.
pub fn validate_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        Err("Name cannot be empty".to_string())
    } else {
        Ok(())
    }
}

/// Validates a single port number.
///
/// # Errors
///
/// Returns `Err` if port is 0 (reserved).
pub fn validate_port(port: u16) -> Result<u16, String> {
    if port == 0 {
        Err("Port must be between 1 and 65535".to_string())
    } else {
        Ok(port)
    }
}

/// Validates a port range.
///
/// # Errors
///
/// Returns `Err` if:
/// - Either port is 0
/// - Start port is greater than end port
pub fn validate_port_range(start: u16, end: u16) -> Result<PortRange, String> {
    validate_port(start)?;
    validate_port(end)?;

    if start > end {
        Err("Start port must be less than or equal to end port".to_string())
    } else {
        Ok(PortRange::new(start, end))
    }
}

/// Parses user port input: `"N"` or `"A-B"`.
///
/// Tokens that do not parse as a port are rejected, never coerced.
///
/// # Examples
///
/// ```
/// use fwstage::core::ruleset::PortRange;
/// use fwstage::validators::parse_port_range;
///
/// assert_eq!(parse_port_range("8080"), Ok(PortRange::single(8080)));
/// assert_eq!(parse_port_range(" 1000 - 2000 "), Ok(PortRange::new(1000, 2000)));
/// assert!(parse_port_range("80-70").is_err());
/// assert!(parse_port_range("80-").is_err());
/// assert!(parse_port_range("http").is_err());
/// ```
///
/// # Errors
///
/// Returns `Err` for empty input, malformed tokens, out-of-range ports, or
/// an inverted range.
pub fn parse_port_range(input: &str) -> Result<PortRange, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("Port range cannot be empty".to_string());
    }

    let (start, end) = match input.split_once('-') {
        Some((start, end)) => (parse_port_token(start)?, parse_port_token(end)?),
        None => {
            let port = parse_port_token(input)?;
            (port, port)
        }
    };

    validate_port_range(start, end)
}

fn parse_port_token(token: &str) -> Result<u16, String> {
    let token = token.trim();
    if token.is_empty() {
        return Err("Missing port number".to_string());
    }
    token
        .parse::<u16>()
        .map_err(|_| format!("Invalid port number: {token}"))
        .and_then(validate_port)
}

/// Validates a network interface name.
///
/// Linux kernel interface name rules:
/// - Max 15 characters (IFNAMSIZ - 1)
/// - Alphanumeric, dot, dash, underscore only
/// - Cannot be "." or ".."
///
/// # Errors
///
/// Returns `Err` if interface name violates kernel constraints.
pub fn validate_interface(name: &str) -> Result<String, String> {
    if name.is_empty() {
        return Err("Interface name cannot be empty".to_string());
    }

    if name.len() > 15 {
        return Err("Interface name too long (max 15 characters)".to_string());
    }

    if name == "." || name == ".." {
        return Err("Invalid interface name".to_string());
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
    {
        return Err("Interface name contains invalid characters".to_string());
    }

    Ok(name.to_string())
}

/// Interface names reported by the remote authority
///
/// Before the catalog is loaded every well-formed interface name is
/// accepted; afterwards only catalogued names are.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownInterfaces {
    names: Option<BTreeSet<String>>,
}

impl KnownInterfaces {
    /// Catalog not loaded yet
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: Some(names.into_iter().map(Into::into).collect()),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.names.is_some()
    }

    pub fn allows(&self, name: &str) -> bool {
        self.names.as_ref().is_none_or(|names| names.contains(name))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().flatten().map(String::as_str)
    }
}

/// Validates a source/destination specifier.
///
/// # Errors
///
/// Returns `Err` if the text is not a sentinel, an address, a CIDR block, or
/// a known interface name.
pub fn validate_address(input: &str, interfaces: &KnownInterfaces) -> Result<AddressSpec, String> {
    let spec = input.parse::<AddressSpec>()?;
    if let AddressSpec::Interface(name) = &spec
        && !interfaces.allows(name)
    {
        return Err(format!("Unknown interface: {name}"));
    }
    Ok(spec)
}

/// Validation errors for individual fields of one rule
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleErrors {
    pub name: Option<String>,
    pub source: Option<String>,
    pub destination: Option<String>,
    pub source_ports: Option<String>,
    pub destination_ports: Option<String>,
}

impl RuleErrors {
    /// Failed fields with their messages, in display order
    pub fn iter(&self) -> impl Iterator<Item = (Field, &str)> {
        [
            (Field::Name, &self.name),
            (Field::Source, &self.source),
            (Field::Destination, &self.destination),
            (Field::SourcePorts, &self.source_ports),
            (Field::DestinationPorts, &self.destination_ports),
        ]
        .into_iter()
        .filter_map(|(field, msg)| msg.as_deref().map(|m| (field, m)))
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        self.iter().find(|(f, _)| *f == field).map(|(_, m)| m)
    }
}

/// Validates every field of a rule.
///
/// Port ranges are only checked for protocols that use them: an `ANY` rule
/// keeps whatever stale ports it had without failing.
///
/// Returns `None` if validation passed.
pub fn validate_rule(rule: &Rule, interfaces: &KnownInterfaces) -> Option<RuleErrors> {
    let errors = RuleErrors {
        name: validate_name(&rule.name).err(),
        source: validate_address(&rule.source, interfaces).err(),
        destination: validate_address(&rule.destination, interfaces).err(),
        source_ports: rule
            .protocol
            .supports_ports()
            .then(|| validate_port_range(rule.source_ports.start, rule.source_ports.end).err())
            .flatten(),
        destination_ports: rule
            .protocol
            .supports_ports()
            .then(|| {
                validate_port_range(rule.destination_ports.start, rule.destination_ports.end)
                    .err()
            })
            .flatten(),
    };

    if errors.is_empty() { None } else { Some(errors) }
}

/// Checks if a port is well-known and returns informational message.
///
/// This is informational only and does not block saving.
pub fn check_well_known_port(port: u16) -> Option<String> {
    let name = match port {
        22 => "SSH",
        80 => "HTTP",
        443 => "HTTPS",
        53 => "DNS",
        25 => "SMTP",
        21 => "FTP",
        3389 => "RDP",
        1..=1024 => return Some(format!("Privileged port {port}")),
        _ => return None,
    };
    Some(format!("Port {port}: {name}"))
}

/// Classifies an address into a reserved range, if it falls in one.
///
/// Informational only. Useful on rules whose source is supposed to be remote:
/// a private source there usually means the rule targets the LAN.
pub fn check_reserved_ip(net: IpNetwork) -> Option<&'static str> {
    match net.ip() {
        IpAddr::V4(ip) if ip.is_private() => Some("private range (RFC 1918)"),
        IpAddr::V4(ip) if ip.is_loopback() => Some("loopback range (127.0.0.0/8)"),
        IpAddr::V4(ip) if ip.is_link_local() => Some("link-local range (169.254.0.0/16)"),
        IpAddr::V6(ip) if ip.is_loopback() => Some("IPv6 loopback (::1)"),
        IpAddr::V6(ip) if ip.segments()[0] & 0xffc0 == 0xfe80 => {
            Some("IPv6 link-local (fe80::/10)")
        }
        IpAddr::V6(ip) if ip.segments()[0] & 0xfe00 == 0xfc00 => {
            Some("IPv6 unique local (fc00::/7)")
        }
        _ => None,
    }
}

/// Informational hints for a rule that already passed validation.
///
/// Flags rules that may cut off remote administration (dropping SSH or all
/// inbound TCP) and rules that can never match because they are disabled.
pub fn rule_hints(rule: &Rule) -> Vec<String> {
    use crate::core::ruleset::{Mode, Protocol};

    let mut hints = Vec::new();

    if !rule.active {
        hints.push("Rule is inactive and never matches".to_string());
        return hints;
    }

    let ports = rule.effective_destination_ports();
    if rule.action.is_restrictive() && rule.mode == Mode::In {
        if ports.contains(22) && rule.protocol != Protocol::Udp {
            hints.push("Blocks inbound SSH (port 22) - check you keep another way in".to_string());
        } else if ports.is_any() && rule.protocol != Protocol::Udp {
            hints.push("Blocks all inbound TCP ports".to_string());
        }
    }

    if rule.protocol.supports_ports() && ports.start == ports.end {
        hints.extend(check_well_known_port(ports.start));
    }

    for (side, text) in [("Source", &rule.source), ("Destination", &rule.destination)] {
        if let Ok(AddressSpec::Network(net)) = text.parse::<AddressSpec>()
            && let Some(range) = check_reserved_ip(net)
        {
            hints.push(format!("{side} {net} is in the {range}"));
        }
    }

    hints
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ruleset::{Action, Protocol};

    #[test]
    fn test_validate_name() {
        assert!(validate_name("SSH").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("   ").is_err());
    }

    #[test]
    fn test_parse_single_port() {
        assert_eq!(parse_port_range("22"), Ok(PortRange::single(22)));
        assert_eq!(parse_port_range("65535"), Ok(PortRange::single(65535)));
    }

    #[test]
    fn test_parse_range() {
        assert_eq!(parse_port_range("1-65535"), Ok(PortRange::ANY));
        assert_eq!(parse_port_range("8000-8080"), Ok(PortRange::new(8000, 8080)));
    }

    #[test]
    fn test_parse_rejects_inverted_range() {
        let err = parse_port_range("80-70").unwrap_err();
        assert!(err.contains("less than or equal"));
    }

    #[test]
    fn test_parse_rejects_unparseable_tokens() {
        for input in ["", "-", "80-", "-80", "abc", "80-abc", "1-2-3", "0", "65536", "-5"] {
            assert!(parse_port_range(input).is_err(), "accepted {input:?}");
        }
    }

    #[test]
    fn test_validate_interface() {
        assert!(validate_interface("eth0").is_ok());
        assert!(validate_interface("br-lan.10").is_ok());
        assert!(validate_interface("").is_err());
        assert!(validate_interface("..").is_err());
        assert!(validate_interface("eth0;rm").is_err());
        assert!(validate_interface("abcdefghijklmnop").is_err());
    }

    #[test]
    fn test_known_interfaces_unloaded_accepts_wellformed() {
        let known = KnownInterfaces::unknown();
        assert!(!known.is_loaded());
        assert!(validate_address("wg0", &known).is_ok());
    }

    #[test]
    fn test_known_interfaces_loaded_rejects_unknown() {
        let known = KnownInterfaces::from_names(["eth0", "lo"]);
        assert!(validate_address("eth0", &known).is_ok());
        let err = validate_address("eth9", &known).unwrap_err();
        assert!(err.contains("Unknown interface"));
        // Addresses and sentinels are unaffected by the catalog
        assert!(validate_address("192.168.0.0/16", &known).is_ok());
        assert!(validate_address("any-ipv6", &known).is_ok());
    }

    #[test]
    fn test_validate_rule_reports_each_field() {
        let mut rule = Rule::template();
        rule.name = String::new();
        rule.source = "bogus address!".to_string();
        rule.destination_ports = PortRange::new(90, 80);

        let errors = validate_rule(&rule, &KnownInterfaces::unknown()).unwrap();
        let fields: Vec<Field> = errors.iter().map(|(f, _)| f).collect();
        assert_eq!(
            fields,
            vec![Field::Name, Field::Source, Field::DestinationPorts]
        );
        assert!(errors.get(Field::Destination).is_none());
    }

    #[test]
    fn test_validate_rule_template_is_valid() {
        assert!(validate_rule(&Rule::template(), &KnownInterfaces::unknown()).is_none());
    }

    #[test]
    fn test_any_protocol_skips_port_validation() {
        let mut rule = Rule::template();
        rule.source_ports = PortRange::new(0, 0);
        rule.destination_ports = PortRange::new(500, 100);
        assert!(validate_rule(&rule, &KnownInterfaces::unknown()).is_some());

        rule.protocol = Protocol::Any;
        assert!(validate_rule(&rule, &KnownInterfaces::unknown()).is_none());
    }

    #[test]
    fn test_check_well_known_port() {
        assert_eq!(check_well_known_port(22).unwrap(), "Port 22: SSH");
        assert!(check_well_known_port(900).unwrap().contains("Privileged"));
        assert!(check_well_known_port(8080).is_none());
    }

    #[test]
    fn test_rule_hints_flag_ssh_lockout() {
        let mut rule = Rule::template();
        rule.action = Action::Drop;
        rule.destination_ports = PortRange::single(22);
        let hints = rule_hints(&rule);
        assert!(hints.iter().any(|h| h.contains("SSH")));
    }

    #[test]
    fn test_check_reserved_ip() {
        let net = |s: &str| s.parse::<IpNetwork>().unwrap();
        assert!(check_reserved_ip(net("10.1.2.3/32")).unwrap().contains("RFC 1918"));
        assert!(check_reserved_ip(net("172.20.0.0/16")).is_some());
        assert!(check_reserved_ip(net("127.0.0.1/32")).unwrap().contains("loopback"));
        assert!(check_reserved_ip(net("169.254.1.1/32")).unwrap().contains("link-local"));
        assert!(check_reserved_ip(net("fe80::1/128")).unwrap().contains("link-local"));
        assert!(check_reserved_ip(net("fd00::/8")).unwrap().contains("unique local"));
        assert_eq!(check_reserved_ip(net("8.8.8.8/32")), None);
        assert_eq!(check_reserved_ip(net("2001:db8::/32")), None);
    }

    #[test]
    fn test_rule_hints_mention_private_source() {
        let mut rule = Rule::template();
        rule.source = "192.168.1.0/24".to_string();
        let hints = rule_hints(&rule);
        assert!(hints.iter().any(|h| h.starts_with("Source 192.168.1.0/24")));
    }

    #[test]
    fn test_rule_hints_inactive() {
        let mut rule = Rule::template();
        rule.active = false;
        assert_eq!(rule_hints(&rule), vec!["Rule is inactive and never matches"]);
    }
}
