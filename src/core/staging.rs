//! Working copy of the ruleset
//!
//! The staging store owns the locally editable, ordered list of rules and the
//! candidate policy. It is seeded from a snapshot and then changed only
//! through the operations below:
//!
//! - [`StagingStore::insert`] / [`StagingStore::insert_default`]
//! - [`StagingStore::remove`]
//! - [`StagingStore::reorder`]
//! - [`StagingStore::edit_field`]
//! - [`StagingStore::set_policy`]
//! - [`StagingStore::import`] / [`StagingStore::load`]
//!
//! Each staged rule carries an ephemeral [`Uuid`] that exists only for the
//! lifetime of the working copy. It is stripped before anything is sent to
//! the remote authority.
//!
//! The store does not know about the snapshot it was seeded from; dirty
//! tracking lives in [`Workspace`](crate::core::workspace::Workspace), which
//! wraps every call here.

use crate::core::error::{Error, Field, Result, RuleIssue};
use crate::core::ruleset::{
    Action, MAX_RULES, Mode, Policy, PortRange, Protocol, Rule, RulesetSnapshot, RulesetUpdate,
};
use crate::validators;
use uuid::Uuid;

/// A rule in the working copy together with its ephemeral id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedRule {
    id: Uuid,
    rule: Rule,
}

impl StagedRule {
    fn new(rule: Rule) -> Self {
        Self {
            id: Uuid::new_v4(),
            rule,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn rule(&self) -> &Rule {
        &self.rule
    }
}

/// A single-field change to a staged rule
///
/// Port ranges are carried as the raw text the user typed so the parse
/// happens here, under the validator, and nothing unparsed is ever stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleEdit {
    Name(String),
    Protocol(Protocol),
    Mode(Mode),
    Action(Action),
    Source(String),
    Destination(String),
    SourcePorts(String),
    DestinationPorts(String),
    Active(bool),
}

impl RuleEdit {
    pub fn field(&self) -> Field {
        match self {
            RuleEdit::Name(_) => Field::Name,
            RuleEdit::Protocol(_) => Field::Protocol,
            RuleEdit::Mode(_) => Field::Mode,
            RuleEdit::Action(_) => Field::Action,
            RuleEdit::Source(_) => Field::Source,
            RuleEdit::Destination(_) => Field::Destination,
            RuleEdit::SourcePorts(_) => Field::SourcePorts,
            RuleEdit::DestinationPorts(_) => Field::DestinationPorts,
            RuleEdit::Active(_) => Field::Active,
        }
    }

    /// Builds an edit from textual input, e.g. `("proto", "udp")`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for enumerated fields whose value is not
    /// one of the allowed variants, and for `policy`, which is not a rule field.
    pub fn parse(field: Field, value: &str) -> Result<Self> {
        let value = value.trim();
        let invalid = |allowed: &str| {
            Error::validation(field, format!("Expected one of {allowed}, got {value:?}"))
        };

        Ok(match field {
            Field::Name => RuleEdit::Name(value.to_string()),
            Field::Protocol => {
                RuleEdit::Protocol(value.parse().map_err(|_| invalid("tcp, udp, any"))?)
            }
            Field::Mode => RuleEdit::Mode(value.parse().map_err(|_| invalid("in, out, forward"))?),
            Field::Action => {
                RuleEdit::Action(value.parse().map_err(|_| invalid("accept, drop, reject"))?)
            }
            Field::Source => RuleEdit::Source(value.to_string()),
            Field::Destination => RuleEdit::Destination(value.to_string()),
            Field::SourcePorts => RuleEdit::SourcePorts(value.to_string()),
            Field::DestinationPorts => RuleEdit::DestinationPorts(value.to_string()),
            Field::Active => RuleEdit::Active(match value.to_ascii_lowercase().as_str() {
                "true" | "on" | "yes" | "1" => true,
                "false" | "off" | "no" | "0" => false,
                _ => return Err(invalid("true, false")),
            }),
            Field::Policy => {
                return Err(Error::validation(
                    field,
                    "Policy belongs to the ruleset, not to a rule",
                ));
            }
        })
    }
}

/// The locally editable ruleset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingStore {
    rules: Vec<StagedRule>,
    policy: Policy,
}

impl Default for StagingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StagingStore {
    /// Empty working copy with an ACCEPT policy
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            policy: Action::Accept,
        }
    }

    pub fn from_snapshot(snapshot: &RulesetSnapshot) -> Self {
        let mut store = Self::new();
        store.load(snapshot);
        store
    }

    /// Replaces the working copy with a clone of the snapshot, assigning fresh ids
    pub fn load(&mut self, snapshot: &RulesetSnapshot) {
        self.rules = snapshot.rules.iter().cloned().map(StagedRule::new).collect();
        self.policy = snapshot.policy;
    }

    /// Replaces the working copy content with externally supplied rules.
    ///
    /// Stored port ranges are checked whatever the protocol, as for
    /// [`StagingStore::insert`]. Other field problems surface through
    /// validation like any other edit. On error the working copy is unchanged.
    ///
    /// # Errors
    ///
    /// - [`Error::TooManyRules`] above [`MAX_RULES`]
    /// - [`Error::InvalidRuleset`] naming every rule with an invalid port range
    pub fn import(&mut self, rules: Vec<Rule>, policy: Policy) -> Result<()> {
        if rules.len() > MAX_RULES {
            return Err(Error::TooManyRules(MAX_RULES));
        }

        let staged: Vec<StagedRule> = rules.into_iter().map(StagedRule::new).collect();
        let issues: Vec<RuleIssue> = staged
            .iter()
            .enumerate()
            .flat_map(|(index, s)| {
                port_range_errors(&s.rule)
                    .into_iter()
                    .map(move |(field, message)| RuleIssue {
                        index,
                        rule_id: s.id,
                        field,
                        message,
                    })
            })
            .collect();
        if !issues.is_empty() {
            return Err(Error::InvalidRuleset { issues });
        }

        self.rules = staged;
        self.policy = policy;
        Ok(())
    }

    /// Inserts `rule` at `index` and returns its ephemeral id.
    ///
    /// Index 0 is the front of the chain: the rule is evaluated before all
    /// existing rules.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] if a port range of the rule is invalid
    /// - [`Error::IndexOutOfRange`] if `index > len`
    /// - [`Error::TooManyRules`] if the working copy is full
    pub fn insert(&mut self, rule: Rule, index: usize) -> Result<Uuid> {
        if index > self.rules.len() {
            return Err(Error::IndexOutOfRange {
                index,
                len: self.rules.len(),
            });
        }
        if self.rules.len() >= MAX_RULES {
            return Err(Error::TooManyRules(MAX_RULES));
        }

        if let Some((field, message)) = port_range_errors(&rule).into_iter().next() {
            return Err(Error::validation(field, message));
        }

        let staged = StagedRule::new(rule);
        let id = staged.id;
        self.rules.insert(index, staged);
        Ok(id)
    }

    /// Inserts [`Rule::template`] at the front of the chain.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TooManyRules`] if the working copy is full.
    pub fn insert_default(&mut self) -> Result<Uuid> {
        self.insert(Rule::template(), 0)
    }

    /// Removes a rule and returns it. Other ids are unaffected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownRule`] if no rule has this id.
    pub fn remove(&mut self, id: Uuid) -> Result<Rule> {
        let pos = self.position(id).ok_or(Error::UnknownRule(id))?;
        Ok(self.rules.remove(pos).rule)
    }

    /// Moves the rule at `from` to `to`, shifting the rules in between.
    ///
    /// After the call the moved rule sits at index `to`; every other rule
    /// keeps its relative order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if either index is not a valid position.
    pub fn reorder(&mut self, from: usize, to: usize) -> Result<()> {
        let len = self.rules.len();
        for index in [from, to] {
            if index >= len {
                return Err(Error::IndexOutOfRange { index, len });
            }
        }
        if from != to {
            let rule = self.rules.remove(from);
            self.rules.insert(to, rule);
        }
        Ok(())
    }

    /// Applies a single-field edit in place.
    ///
    /// Port edits are parsed first and rejected without touching the rule if
    /// they do not form a valid range. They are also rejected while the rule's
    /// protocol is `ANY`, where port fields are disabled.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownRule`] if no rule has this id
    /// - [`Error::Validation`] for rejected port input
    pub fn edit_field(&mut self, id: Uuid, edit: RuleEdit) -> Result<()> {
        let pos = self.position(id).ok_or(Error::UnknownRule(id))?;
        let rule = &mut self.rules[pos].rule;

        match edit {
            RuleEdit::Name(name) => rule.name = name,
            RuleEdit::Protocol(protocol) => rule.protocol = protocol,
            RuleEdit::Mode(mode) => rule.mode = mode,
            RuleEdit::Action(action) => rule.action = action,
            RuleEdit::Source(source) => rule.source = source,
            RuleEdit::Destination(destination) => rule.destination = destination,
            RuleEdit::SourcePorts(text) => {
                rule.source_ports = parse_ports_for(rule, Field::SourcePorts, &text)?;
            }
            RuleEdit::DestinationPorts(text) => {
                rule.destination_ports = parse_ports_for(rule, Field::DestinationPorts, &text)?;
            }
            RuleEdit::Active(active) => rule.active = active,
        }
        Ok(())
    }

    /// Sets the candidate policy
    pub fn set_policy(&mut self, policy: Policy) {
        self.policy = policy;
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    pub fn rules(&self) -> &[StagedRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, id: Uuid) -> Option<&StagedRule> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn position(&self, id: Uuid) -> Option<usize> {
        self.rules.iter().position(|r| r.id == id)
    }

    /// Rules with ids stripped, in order
    pub fn semantic_rules(&self) -> impl ExactSizeIterator<Item = &Rule> {
        self.rules.iter().map(StagedRule::rule)
    }

    /// Payload for an atomic replace on the remote authority
    pub fn to_update(&self) -> RulesetUpdate {
        RulesetUpdate {
            rules: self.semantic_rules().cloned().collect(),
            policy: self.policy,
        }
    }
}

fn parse_ports_for(rule: &Rule, field: Field, text: &str) -> Result<PortRange> {
    if !rule.protocol.supports_ports() {
        return Err(Error::validation(
            field,
            "Port ranges are disabled while protocol is any",
        ));
    }
    validators::parse_port_range(text).map_err(|msg| Error::validation(field, msg))
}

/// Stored port ranges that are out of domain or inverted, protocol regardless
fn port_range_errors(rule: &Rule) -> Vec<(Field, String)> {
    [
        (Field::SourcePorts, rule.source_ports),
        (Field::DestinationPorts, rule.destination_ports),
    ]
    .into_iter()
    .filter_map(|(field, ports)| {
        validators::validate_port_range(ports.start, ports.end)
            .err()
            .map(|message| (field, message))
    })
    .collect()
}
