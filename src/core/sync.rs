//! Synchronisation with the remote authority
//!
//! [`SyncController`] owns the [`Workspace`] and is the only code that talks
//! to the authority. It provides:
//!
//! - Fetching, split into [`SyncController::begin_fetch`],
//!   [`PendingFetch::run`] and [`SyncController::complete_fetch`] so several
//!   fetches can be in flight. Each carries a sequence number and only the
//!   response to the most recently issued one is applied.
//! - Gated operations: [`SyncController::request`] runs an enable, disable or
//!   apply through the safety gate and either executes it or parks it behind
//!   a [`ConfirmationToken`] for [`SyncController::confirm`] /
//!   [`SyncController::decline`].
//! - Interface catalog and appliance settings, which are not staged.
//!
//! Acknowledged changes (push, enable, disable) supersede every fetch issued
//! before them, since that data predates the change.

use crate::audit::{AuditEvent, AuditLog, EventType};
use crate::core::error::{Error, Result};
use crate::core::gate::{self, Decision, GateInput, Hazard, Plan, Request, Step};
use crate::core::ruleset::RulesetSnapshot;
use crate::core::workspace::Workspace;
use crate::remote::{FirewallSettings, InterfaceInfo, RemoteAuthority};
use crate::validators::KnownInterfaces;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A fetch that has been issued but not yet sent
///
/// Owns what it needs, so it can be run without borrowing the controller.
#[derive(Debug)]
pub struct PendingFetch<A> {
    seq: u64,
    authority: Arc<A>,
}

impl<A: RemoteAuthority> PendingFetch<A> {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Performs the network call
    pub async fn run(self) -> FetchResponse {
        let result = self.authority.fetch_ruleset().await;
        FetchResponse {
            seq: self.seq,
            result,
        }
    }
}

/// Response of a [`PendingFetch`], to be handed to [`SyncController::complete_fetch`]
#[derive(Debug)]
pub struct FetchResponse {
    seq: u64,
    result: Result<RulesetSnapshot>,
}

impl FetchResponse {
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// What happened to a completed fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The snapshot was installed and the working copy reseeded
    Applied,
    /// A newer fetch or an acknowledged change superseded it; nothing changed
    Stale,
}

/// Handle for a parked, hazardous request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConfirmationToken(u64);

impl fmt::Display for ConfirmationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Result of a gated request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The plan ran and every step was acknowledged
    Completed(Plan),
    /// Nothing needed to be sent
    Unchanged,
    /// The plan is parked until confirmed or declined
    ConfirmationRequired {
        token: ConfirmationToken,
        plan: Plan,
        hazards: Vec<Hazard>,
    },
    /// The operator declined; nothing was sent
    Declined,
}

#[derive(Debug, Clone)]
struct PendingConfirmation {
    token: ConfirmationToken,
    request: Request,
    decision: Decision,
}

impl PendingConfirmation {
    /// Whether the operator's approval still covers `current`: no step and no
    /// hazard beyond what was shown.
    fn covers(&self, current: &Decision) -> bool {
        let approved_steps = self.decision.plan.steps();
        current.plan.steps().iter().all(|s| approved_steps.contains(s))
            && current
                .hazards
                .iter()
                .all(|h| self.decision.hazards.contains(h))
    }
}

/// Drives the workspace against a [`RemoteAuthority`]
#[derive(Debug)]
pub struct SyncController<A> {
    authority: Arc<A>,
    workspace: Workspace,
    /// Sequence number of the newest fetch or acknowledged change
    latest_seq: u64,
    pending: Option<PendingConfirmation>,
    next_token: u64,
    audit: Option<AuditLog>,
}

impl<A: RemoteAuthority> SyncController<A> {
    pub fn new(authority: A) -> Self {
        Self::from_arc(Arc::new(authority))
    }

    pub fn from_arc(authority: Arc<A>) -> Self {
        Self {
            authority,
            workspace: Workspace::new(),
            latest_seq: 0,
            pending: None,
            next_token: 1,
            audit: None,
        }
    }

    /// Records acknowledged and refused operations in `audit`
    #[must_use]
    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn authority(&self) -> &Arc<A> {
        &self.authority
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Mutable access for staging operations
    pub fn workspace_mut(&mut self) -> &mut Workspace {
        &mut self.workspace
    }

    pub fn pending_confirmation(&self) -> Option<ConfirmationToken> {
        self.pending.as_ref().map(|p| p.token)
    }

    // --- Fetch ---

    /// Issues a new fetch; every earlier one becomes stale
    pub fn begin_fetch(&mut self) -> PendingFetch<A> {
        let seq = self.supersede();
        debug!("Issued fetch #{seq}");
        PendingFetch {
            seq,
            authority: Arc::clone(&self.authority),
        }
    }

    /// Applies a fetch response unless it is stale.
    ///
    /// Stale responses are dropped, errors included.
    ///
    /// # Errors
    ///
    /// Returns the fetch error of a current response; the workspace is untouched.
    pub fn complete_fetch(&mut self, response: FetchResponse) -> Result<FetchOutcome> {
        if response.seq != self.latest_seq {
            debug!(
                "Discarding stale fetch #{} (latest #{})",
                response.seq, self.latest_seq
            );
            return Ok(FetchOutcome::Stale);
        }

        match response.result {
            Ok(snapshot) => {
                info!(
                    "Fetched ruleset: {} rules, policy {}, {}",
                    snapshot.rules.len(),
                    snapshot.policy,
                    if snapshot.enabled { "enabled" } else { "disabled" }
                );
                if self.workspace.is_dirty() {
                    warn!("Fetch replaced unapplied changes");
                }
                self.workspace.accept_snapshot(snapshot);
                self.pending = None;
                Ok(FetchOutcome::Applied)
            }
            Err(e) => {
                warn!("Fetch #{} failed: {e}", response.seq);
                Err(e)
            }
        }
    }

    /// Fetches and applies the remote ruleset in one go.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Request`] or [`Error::RemoteRejection`] on failure.
    pub async fn fetch(&mut self) -> Result<FetchOutcome> {
        let pending = self.begin_fetch();
        let response = pending.run().await;
        self.complete_fetch(response)
    }

    fn supersede(&mut self) -> u64 {
        self.latest_seq += 1;
        self.latest_seq
    }

    // --- Gated operations ---

    /// Runs `request` through the safety gate.
    ///
    /// Hazardous plans are parked and returned as
    /// [`Outcome::ConfirmationRequired`]; any previously parked plan is
    /// dropped. Everything else executes immediately.
    ///
    /// # Errors
    ///
    /// - [`Error::NoSnapshot`] before the first accepted fetch
    /// - [`Error::InvalidRuleset`] if the plan pushes an invalid working copy
    /// - remote errors of the first failing step
    pub async fn request(&mut self, request: Request) -> Result<Outcome> {
        let decision = self.decide(request)?;
        self.pending = None;
        info!(
            "Request {request}: plan {:?}, {} hazard(s)",
            decision.plan,
            decision.hazards.len()
        );

        if decision.plan == Plan::Nothing {
            return Ok(Outcome::Unchanged);
        }

        if decision.plan.steps().contains(&Step::Push) {
            self.check_valid().await?;
        }

        if decision.needs_confirmation() {
            return Ok(self.park(request, decision));
        }

        self.execute(decision.plan).await?;
        Ok(Outcome::Completed(decision.plan))
    }

    /// Runs the parked request if the gate, asked again, still agrees.
    ///
    /// The decision is recomputed against the current working copy. If edits
    /// since [`Self::request`] added a step or a hazard, nothing is sent and
    /// the new decision is parked under a fresh token. A request that no
    /// longer has anything to do returns [`Outcome::Unchanged`].
    ///
    /// # Errors
    ///
    /// - [`Error::NoPendingConfirmation`] if `token` is not the parked one
    /// - [`Error::InvalidRuleset`] and remote errors as for [`Self::request`]
    pub async fn confirm(&mut self, token: ConfirmationToken) -> Result<Outcome> {
        let pending = self.take_pending(token)?;
        let decision = self.decide(pending.request)?;

        if decision.plan == Plan::Nothing {
            info!("Confirmed {} {}: nothing left to do", pending.request, pending.token);
            return Ok(Outcome::Unchanged);
        }
        if decision.plan.steps().contains(&Step::Push) {
            self.check_valid().await?;
        }
        if !pending.covers(&decision) {
            info!(
                "Working copy changed since {} {}, asking again",
                pending.request, pending.token
            );
            return Ok(self.park(pending.request, decision));
        }

        info!("Confirmed {} {}", pending.request, pending.token);
        self.execute(decision.plan).await?;
        Ok(Outcome::Completed(decision.plan))
    }

    /// Drops the parked plan without sending anything.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoPendingConfirmation`] if `token` is not the parked one.
    pub fn decline(&mut self, token: ConfirmationToken) -> Result<Outcome> {
        let pending = self.take_pending(token)?;
        info!("Declined {} {}", pending.request, pending.token);
        Ok(Outcome::Declined)
    }

    /// Gate decision for `request` in the current state, without side effects.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSnapshot`] before the first accepted fetch.
    pub fn decide(&self, request: Request) -> Result<Decision> {
        let snapshot = self.workspace.snapshot().ok_or(Error::NoSnapshot)?;
        let input = GateInput {
            dirty: self.workspace.is_dirty(),
            enabled: snapshot.enabled,
            snapshot_policy: snapshot.policy,
            candidate_policy: self.workspace.policy(),
        };
        Ok(gate::decide(request, &input))
    }

    fn park(&mut self, request: Request, decision: Decision) -> Outcome {
        let token = ConfirmationToken(self.next_token);
        self.next_token += 1;
        for hazard in &decision.hazards {
            debug!("Confirmation {token} pending: {hazard}");
        }
        let outcome = Outcome::ConfirmationRequired {
            token,
            plan: decision.plan,
            hazards: decision.hazards.clone(),
        };
        self.pending = Some(PendingConfirmation {
            token,
            request,
            decision,
        });
        outcome
    }

    fn take_pending(&mut self, token: ConfirmationToken) -> Result<PendingConfirmation> {
        match self.pending.take() {
            Some(pending) if pending.token == token => Ok(pending),
            other => {
                self.pending = other;
                Err(Error::NoPendingConfirmation)
            }
        }
    }

    async fn check_valid(&self) -> Result<()> {
        if let Err(err) = self.workspace.validate_all() {
            warn!("Apply refused: {err}");
            self.record(AuditEvent::apply_refused(&err)).await;
            return Err(err);
        }
        Ok(())
    }

    async fn execute(&mut self, plan: Plan) -> Result<()> {
        for step in plan.steps() {
            match step {
                Step::Push => {
                    if self.workspace.is_dirty() {
                        self.push().await?;
                    } else {
                        debug!("Working copy clean, skipping push");
                    }
                }
                Step::Enable => self.toggle(true).await?,
                Step::Disable => self.toggle(false).await?,
            }
        }
        Ok(())
    }

    async fn push(&mut self) -> Result<()> {
        self.check_valid().await?;

        let update = self.workspace.to_update();
        info!(
            "Pushing {} rules with policy {}",
            update.rules.len(),
            update.policy
        );

        let result = self.authority.push_ruleset(&update).await;
        self.record(AuditEvent::apply(&update, result.as_ref().copied()))
            .await;

        match result {
            Ok(()) => {
                self.supersede();
                self.workspace.commit_pushed(update);
                info!("Ruleset applied");
                Ok(())
            }
            Err(e) => {
                warn!("Push failed: {e}");
                Err(e)
            }
        }
    }

    async fn toggle(&mut self, enable: bool) -> Result<()> {
        let result = if enable {
            self.authority.enable().await
        } else {
            self.authority.disable().await
        };
        let policy = self.workspace.snapshot().map(|s| s.policy);
        self.record(AuditEvent::toggle(enable, policy, result.as_ref().copied()))
            .await;

        match result {
            Ok(()) => {
                self.supersede();
                self.workspace.set_enabled(enable);
                info!("Firewall {}", if enable { "enabled" } else { "disabled" });
                Ok(())
            }
            Err(e) => {
                warn!(
                    "{} failed: {e}",
                    if enable { "Enable" } else { "Disable" }
                );
                Err(e)
            }
        }
    }

    // --- Unstaged remote state ---

    /// Loads the interface catalog and re-validates the working copy.
    ///
    /// # Errors
    ///
    /// Returns remote errors; the previous catalog stays in effect.
    pub async fn refresh_interfaces(&mut self) -> Result<Vec<InterfaceInfo>> {
        let interfaces = self.authority.interfaces().await?;
        debug!("Loaded {} interfaces", interfaces.len());
        self.workspace
            .set_interfaces(KnownInterfaces::from_names(
                interfaces.iter().map(|i| i.name.clone()),
            ));
        Ok(interfaces)
    }

    /// Reads the appliance settings.
    ///
    /// # Errors
    ///
    /// Returns remote errors.
    pub async fn settings(&self) -> Result<FirewallSettings> {
        self.authority.settings().await
    }

    /// Writes the appliance settings.
    ///
    /// # Errors
    ///
    /// Returns remote errors.
    pub async fn update_settings(&self, settings: &FirewallSettings) -> Result<()> {
        let result = self.authority.update_settings(settings).await;
        self.record(AuditEvent::new(
            EventType::UpdateSettings,
            result.is_ok(),
            serde_json::Value::Object(
                settings
                    .entries()
                    .into_iter()
                    .map(|(name, value)| (name.to_string(), value.into()))
                    .collect(),
            ),
            result.as_ref().err().map(ToString::to_string),
        ))
        .await;
        match &result {
            Ok(()) => info!("Firewall settings updated"),
            Err(e) => warn!("Settings update failed: {e}"),
        }
        result
    }

    async fn record(&self, event: AuditEvent) {
        if let Some(audit) = &self.audit {
            audit.record(event).await;
        }
    }
}
