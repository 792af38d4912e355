//! Shared test utilities for core module tests
//!
//! Provides rule/snapshot builders and [`MockAuthority`], an in-memory
//! [`RemoteAuthority`] whose answers can be scripted per call.
//! This module is only compiled in test mode.

use crate::core::error::{Error, Result};
use crate::core::ruleset::{Action, PortRange, Rule, RulesetSnapshot, RulesetUpdate};
use crate::remote::{FirewallSettings, InterfaceInfo, RemoteAuthority};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Creates an active inbound TCP ACCEPT rule for one destination port.
///
/// This is the canonical helper for creating test rules.
pub fn create_test_rule(name: &str, port: u16) -> Rule {
    Rule {
        name: name.to_string(),
        destination_ports: PortRange::single(port),
        ..Rule::template()
    }
}

/// Creates a disabled, ACCEPT-policy snapshot with one SSH rule per name.
pub fn create_test_snapshot(names: &[&str]) -> RulesetSnapshot {
    RulesetSnapshot {
        rules: names.iter().map(|name| create_test_rule(name, 22)).collect(),
        policy: Action::Accept,
        enabled: false,
    }
}

/// A call received by [`MockAuthority`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Fetch,
    Push(RulesetUpdate),
    Enable,
    Disable,
    Interfaces,
    Settings,
    UpdateSettings(FirewallSettings),
}

#[derive(Debug, Default)]
struct MockState {
    snapshot: RulesetSnapshot,
    fetch_queue: VecDeque<Result<RulesetSnapshot>>,
    push_failures: VecDeque<Error>,
    toggle_failures: VecDeque<Error>,
    interfaces: Vec<InterfaceInfo>,
    settings: FirewallSettings,
    calls: Vec<Call>,
}

/// Scripted in-memory authority.
///
/// Without scripting it behaves like a well-mannered appliance: fetch returns
/// the current state, push/enable/disable succeed and update it. Queued
/// fetch results and failures are consumed one per call.
#[derive(Debug, Default)]
pub struct MockAuthority {
    state: Mutex<MockState>,
}

impl MockAuthority {
    pub fn new(snapshot: RulesetSnapshot) -> Self {
        Self {
            state: Mutex::new(MockState {
                snapshot,
                ..MockState::default()
            }),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MockState) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    /// Next fetch returns `result` instead of the current state
    pub fn queue_fetch(&self, result: Result<RulesetSnapshot>) {
        self.with_state(|s| s.fetch_queue.push_back(result));
    }

    pub fn fail_next_push(&self, error: Error) {
        self.with_state(|s| s.push_failures.push_back(error));
    }

    /// Next enable or disable fails with `error`
    pub fn fail_next_toggle(&self, error: Error) {
        self.with_state(|s| s.toggle_failures.push_back(error));
    }

    pub fn set_interfaces(&self, names: &[&str]) {
        self.with_state(|s| {
            s.interfaces = names
                .iter()
                .enumerate()
                .map(|(i, name)| InterfaceInfo {
                    name: (*name).to_string(),
                    addr: format!("10.0.{i}.1"),
                })
                .collect();
        });
    }

    pub fn calls(&self) -> Vec<Call> {
        self.with_state(|s| s.calls.clone())
    }

    pub fn push_count(&self) -> usize {
        self.with_state(|s| s.calls.iter().filter(|c| matches!(c, Call::Push(_))).count())
    }

    pub fn remote_snapshot(&self) -> RulesetSnapshot {
        self.with_state(|s| s.snapshot.clone())
    }

    pub fn current_settings(&self) -> FirewallSettings {
        self.with_state(|s| s.settings)
    }

    fn toggle(&self, call: Call, enabled: bool) -> Result<()> {
        self.with_state(|s| {
            s.calls.push(call);
            match s.toggle_failures.pop_front() {
                Some(err) => Err(err),
                None => {
                    s.snapshot.enabled = enabled;
                    Ok(())
                }
            }
        })
    }
}

impl RemoteAuthority for MockAuthority {
    async fn fetch_ruleset(&self) -> Result<RulesetSnapshot> {
        self.with_state(|s| {
            s.calls.push(Call::Fetch);
            s.fetch_queue
                .pop_front()
                .unwrap_or_else(|| Ok(s.snapshot.clone()))
        })
    }

    async fn push_ruleset(&self, update: &RulesetUpdate) -> Result<()> {
        self.with_state(|s| {
            s.calls.push(Call::Push(update.clone()));
            match s.push_failures.pop_front() {
                Some(err) => Err(err),
                None => {
                    s.snapshot.rules.clone_from(&update.rules);
                    s.snapshot.policy = update.policy;
                    Ok(())
                }
            }
        })
    }

    async fn enable(&self) -> Result<()> {
        self.toggle(Call::Enable, true)
    }

    async fn disable(&self) -> Result<()> {
        self.toggle(Call::Disable, false)
    }

    async fn interfaces(&self) -> Result<Vec<InterfaceInfo>> {
        self.with_state(|s| {
            s.calls.push(Call::Interfaces);
            Ok(s.interfaces.clone())
        })
    }

    async fn settings(&self) -> Result<FirewallSettings> {
        self.with_state(|s| {
            s.calls.push(Call::Settings);
            Ok(s.settings)
        })
    }

    async fn update_settings(&self, settings: &FirewallSettings) -> Result<()> {
        self.with_state(|s| {
            s.calls.push(Call::UpdateSettings(*settings));
            s.settings = *settings;
            Ok(())
        })
    }
}
