//! Snapshot, working copy and derived state
//!
//! [`Workspace`] is the only owner of the working copy. Every mutation goes
//! through it and is followed by the same pipeline:
//!
//! 1. apply the staging operation
//! 2. recompute the [`Diff`] against the snapshot
//! 3. re-validate every rule into a flat list of [`RuleIssue`]s
//!
//! The snapshot itself is only replaced by the sync controller, through
//! [`Workspace::accept_snapshot`], [`Workspace::commit_pushed`] and
//! [`Workspace::set_enabled`].

use crate::core::diff::{self, Diff};
use crate::core::error::{Error, Result, RuleIssue};
use crate::core::evaluate::{self, Packet, Verdict};
use crate::core::ruleset::{Policy, Rule, RulesetSnapshot, RulesetUpdate};
use crate::core::staging::{RuleEdit, StagedRule, StagingStore};
use crate::validators::{self, KnownInterfaces};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct Workspace {
    snapshot: Option<RulesetSnapshot>,
    staging: StagingStore,
    diff: Diff,
    issues: Vec<RuleIssue>,
    interfaces: KnownInterfaces,
}

impl Workspace {
    /// Workspace with no snapshot yet: empty and clean
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Option<&RulesetSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn staging(&self) -> &StagingStore {
        &self.staging
    }

    pub fn rules(&self) -> &[StagedRule] {
        self.staging.rules()
    }

    pub fn policy(&self) -> Policy {
        self.staging.policy()
    }

    pub fn diff(&self) -> Diff {
        self.diff
    }

    pub fn is_dirty(&self) -> bool {
        self.diff.is_dirty()
    }

    /// Remote enabled flag as last acknowledged; `false` before the first fetch
    pub fn is_enabled(&self) -> bool {
        self.snapshot.as_ref().is_some_and(|s| s.enabled)
    }

    /// Validation issues of the working copy, in rule order
    pub fn issues(&self) -> &[RuleIssue] {
        &self.issues
    }

    pub fn issues_for(&self, id: Uuid) -> impl Iterator<Item = &RuleIssue> {
        self.issues.iter().filter(move |issue| issue.rule_id == id)
    }

    pub fn interfaces(&self) -> &KnownInterfaces {
        &self.interfaces
    }

    // --- Snapshot transitions (sync controller only) ---

    /// Installs a freshly fetched snapshot and reseeds the working copy from it.
    ///
    /// Pending edits are discarded.
    pub(crate) fn accept_snapshot(&mut self, snapshot: RulesetSnapshot) {
        self.staging.load(&snapshot);
        self.snapshot = Some(snapshot);
        self.recompute();
    }

    /// Records a successful push: the pushed content becomes the snapshot.
    ///
    /// The working copy and its ids are kept, so edits made while the push was
    /// in flight stay staged (and keep the workspace dirty).
    pub(crate) fn commit_pushed(&mut self, update: RulesetUpdate) {
        let enabled = self.is_enabled();
        self.snapshot = Some(RulesetSnapshot {
            rules: update.rules,
            policy: update.policy,
            enabled,
        });
        self.recompute();
    }

    /// Records an acknowledged enable/disable
    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        if let Some(snapshot) = &mut self.snapshot {
            snapshot.enabled = enabled;
        }
    }

    /// Replaces the interface catalog and re-validates
    pub fn set_interfaces(&mut self, interfaces: KnownInterfaces) {
        self.interfaces = interfaces;
        self.recompute();
    }

    // --- Staging operations ---

    /// Reverts the working copy to the snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSnapshot`] before the first accepted fetch.
    pub fn reset(&mut self) -> Result<()> {
        let snapshot = self.snapshot.as_ref().ok_or(Error::NoSnapshot)?;
        self.staging.load(snapshot);
        self.recompute();
        Ok(())
    }

    /// See [`StagingStore::insert`].
    ///
    /// # Errors
    ///
    /// [`Error::NoSnapshot`] before the first fetch, otherwise as the store.
    pub fn insert(&mut self, rule: Rule, index: usize) -> Result<Uuid> {
        self.mutate(|store| store.insert(rule, index))
    }

    /// See [`StagingStore::insert_default`].
    ///
    /// # Errors
    ///
    /// [`Error::NoSnapshot`] before the first fetch, otherwise as the store.
    pub fn insert_default(&mut self) -> Result<Uuid> {
        self.mutate(StagingStore::insert_default)
    }

    /// See [`StagingStore::remove`].
    ///
    /// # Errors
    ///
    /// [`Error::NoSnapshot`] before the first fetch, otherwise as the store.
    pub fn remove(&mut self, id: Uuid) -> Result<Rule> {
        self.mutate(|store| store.remove(id))
    }

    /// See [`StagingStore::reorder`].
    ///
    /// # Errors
    ///
    /// [`Error::NoSnapshot`] before the first fetch, otherwise as the store.
    pub fn reorder(&mut self, from: usize, to: usize) -> Result<()> {
        self.mutate(|store| store.reorder(from, to))
    }

    /// See [`StagingStore::edit_field`].
    ///
    /// # Errors
    ///
    /// [`Error::NoSnapshot`] before the first fetch, otherwise as the store.
    pub fn edit_field(&mut self, id: Uuid, edit: RuleEdit) -> Result<()> {
        self.mutate(|store| store.edit_field(id, edit))
    }

    /// See [`StagingStore::set_policy`].
    ///
    /// # Errors
    ///
    /// [`Error::NoSnapshot`] before the first fetch.
    pub fn set_policy(&mut self, policy: Policy) -> Result<()> {
        self.mutate(|store| {
            store.set_policy(policy);
            Ok(())
        })
    }

    /// See [`StagingStore::import`].
    ///
    /// # Errors
    ///
    /// [`Error::NoSnapshot`] before the first fetch, otherwise as the store.
    pub fn import(&mut self, rules: Vec<Rule>, policy: Policy) -> Result<()> {
        self.mutate(|store| store.import(rules, policy))
    }

    fn mutate<T>(&mut self, op: impl FnOnce(&mut StagingStore) -> Result<T>) -> Result<T> {
        if self.snapshot.is_none() {
            return Err(Error::NoSnapshot);
        }
        let result = op(&mut self.staging);
        if result.is_ok() {
            self.recompute();
        }
        result
    }

    fn recompute(&mut self) {
        self.diff = match &self.snapshot {
            Some(snapshot) => Diff::compute(
                self.staging.semantic_rules(),
                self.staging.policy(),
                &snapshot.rules,
                snapshot.policy,
            ),
            None => Diff::CLEAN,
        };

        self.issues = self
            .staging
            .rules()
            .iter()
            .enumerate()
            .filter_map(|(index, staged)| {
                validators::validate_rule(staged.rule(), &self.interfaces)
                    .map(|errors| (index, staged.id(), errors))
            })
            .flat_map(|(index, rule_id, errors)| {
                errors
                    .iter()
                    .map(|(field, message)| RuleIssue {
                        index,
                        rule_id,
                        field,
                        message: message.to_string(),
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
    }

    // --- Queries ---

    /// Record-level check used before any push.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRuleset`] listing every failing rule and field.
    pub fn validate_all(&self) -> Result<()> {
        if self.issues.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidRuleset {
                issues: self.issues.clone(),
            })
        }
    }

    /// Payload that an apply would push
    pub fn to_update(&self) -> RulesetUpdate {
        self.staging.to_update()
    }

    /// Review diff of the pending changes, `None` when clean
    pub fn render_diff(&self) -> Option<String> {
        let snapshot = self.snapshot.as_ref()?;
        diff::render(
            &snapshot.rules,
            snapshot.policy,
            self.staging.semantic_rules(),
            self.staging.policy(),
        )
    }

    /// Which staged rule (or the candidate policy) would decide `packet`
    pub fn explain(&self, packet: &Packet) -> Verdict {
        evaluate::evaluate(self.staging.semantic_rules(), self.staging.policy(), packet)
    }

    /// Informational hints per rule: `(index, hint)`
    pub fn hints(&self) -> Vec<(usize, String)> {
        self.staging
            .semantic_rules()
            .enumerate()
            .flat_map(|(index, rule)| {
                validators::rule_hints(rule)
                    .into_iter()
                    .map(move |hint| (index, hint))
            })
            .collect()
    }
}
