//! Confirmation policy for state-changing requests
//!
//! Enabling a firewall with a restrictive default policy, or with staged
//! changes nobody has reviewed against the live box, can lock the operator
//! out of the appliance. So can tightening the policy of a running firewall.
//! [`decide`] maps a request and the current state to a [`Plan`] plus the
//! [`Hazard`]s that require explicit confirmation before the plan may run.
//!
//! | request | state                         | plan              | confirm when                               |
//! |---------|-------------------------------|-------------------|--------------------------------------------|
//! | enable  | disabled, dirty               | apply then enable | always                                     |
//! | enable  | disabled, clean               | enable            | candidate policy is DROP/REJECT            |
//! | enable  | enabled                       | enable            | never                                      |
//! | disable | any                           | disable           | never                                      |
//! | apply   | clean                         | nothing           | never                                      |
//! | apply   | dirty                         | apply             | enabled, ACCEPT -> DROP/REJECT             |

use crate::core::ruleset::Policy;
use std::fmt;

/// Operator request subject to the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Request {
    Enable,
    Disable,
    Apply,
}

/// State the decision is made on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateInput {
    pub dirty: bool,
    pub enabled: bool,
    pub snapshot_policy: Policy,
    pub candidate_policy: Policy,
}

/// Single network step of a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Push,
    Enable,
    Disable,
}

/// What running a request amounts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    /// Nothing to send
    Nothing,
    Apply,
    Enable,
    /// Push the working copy, then enable only if the push succeeded
    ApplyThenEnable,
    Disable,
}

impl Plan {
    pub const fn steps(self) -> &'static [Step] {
        match self {
            Plan::Nothing => &[],
            Plan::Apply => &[Step::Push],
            Plan::Enable => &[Step::Enable],
            Plan::ApplyThenEnable => &[Step::Push, Step::Enable],
            Plan::Disable => &[Step::Disable],
        }
    }
}

/// Reason a plan needs confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hazard {
    /// Enabling with a default policy that blocks unmatched traffic
    RestrictivePolicy(Policy),
    /// Enabling would also push staged, unapplied changes
    UnappliedChanges,
    /// Applying tightens the policy of a running firewall
    PolicyTightened { from: Policy, to: Policy },
}

impl fmt::Display for Hazard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hazard::RestrictivePolicy(policy) => write!(
                f,
                "default policy is {}: traffic not matched by a rule will be blocked",
                policy.display_name()
            ),
            Hazard::UnappliedChanges => {
                f.write_str("unapplied changes will be pushed before enabling")
            }
            Hazard::PolicyTightened { from, to } => write!(
                f,
                "default policy of the running firewall changes from {} to {}",
                from.display_name(),
                to.display_name()
            ),
        }
    }
}

/// Gate decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub plan: Plan,
    pub hazards: Vec<Hazard>,
}

impl Decision {
    pub fn needs_confirmation(&self) -> bool {
        !self.hazards.is_empty()
    }
}

/// Decides how a request runs and whether it needs confirmation. Pure.
pub fn decide(request: Request, input: &GateInput) -> Decision {
    let mut hazards = Vec::new();

    let plan = match request {
        Request::Enable if input.enabled => Plan::Enable,
        Request::Enable => {
            if input.candidate_policy.is_restrictive() {
                hazards.push(Hazard::RestrictivePolicy(input.candidate_policy));
            }
            if input.dirty {
                hazards.push(Hazard::UnappliedChanges);
                Plan::ApplyThenEnable
            } else {
                Plan::Enable
            }
        }
        Request::Disable => Plan::Disable,
        Request::Apply if !input.dirty => Plan::Nothing,
        Request::Apply => {
            if input.enabled
                && !input.snapshot_policy.is_restrictive()
                && input.candidate_policy.is_restrictive()
            {
                hazards.push(Hazard::PolicyTightened {
                    from: input.snapshot_policy,
                    to: input.candidate_policy,
                });
            }
            Plan::Apply
        }
    };

    Decision { plan, hazards }
}
