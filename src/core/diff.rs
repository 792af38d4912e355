//! Working copy vs. snapshot comparison
//!
//! Comparison is order-sensitive and ignores ephemeral ids: two rule lists are
//! equal only if they hold semantically equal rules at the same positions.

use crate::core::ruleset::{Policy, Rule};

/// How the rule list of the working copy differs from the snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RulesChange {
    #[default]
    Unchanged,
    /// Same rules (as a multiset), different order
    Reordered,
    /// Rules were added, removed or edited
    Modified,
}

/// Result of comparing a working copy with a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Diff {
    pub rules: RulesChange,
    /// `(snapshot, working)` when the policy differs
    pub policy: Option<(Policy, Policy)>,
}

impl Diff {
    /// No differences at all
    pub const CLEAN: Diff = Diff {
        rules: RulesChange::Unchanged,
        policy: None,
    };

    /// Compares an ordered working copy against an ordered snapshot.
    pub fn compute<'a, 'b, W, S>(
        working: W,
        working_policy: Policy,
        snapshot: S,
        snapshot_policy: Policy,
    ) -> Self
    where
        W: IntoIterator<Item = &'a Rule>,
        S: IntoIterator<Item = &'b Rule>,
    {
        let working: Vec<&Rule> = working.into_iter().collect();
        let snapshot: Vec<&Rule> = snapshot.into_iter().collect();

        let rules = if working == snapshot {
            RulesChange::Unchanged
        } else if is_permutation(&working, &snapshot) {
            RulesChange::Reordered
        } else {
            RulesChange::Modified
        };

        let policy = (working_policy != snapshot_policy).then_some((snapshot_policy, working_policy));

        Self { rules, policy }
    }

    /// `true` when applying the working copy would change the authority
    pub fn is_dirty(&self) -> bool {
        self.rules != RulesChange::Unchanged || self.policy.is_some()
    }

    pub fn summary(&self) -> String {
        let rules = match self.rules {
            RulesChange::Unchanged => None,
            RulesChange::Reordered => Some("rules reordered".to_string()),
            RulesChange::Modified => Some("rules modified".to_string()),
        };
        let policy = self.policy.map(|(from, to)| format!("policy {from} -> {to}"));

        match (rules, policy) {
            (None, None) => "no changes".to_string(),
            (Some(r), None) => r,
            (None, Some(p)) => p,
            (Some(r), Some(p)) => format!("{r}, {p}"),
        }
    }
}

// Rules are small and lists are bounded by MAX_RULES, so a quadratic match is fine.
fn is_permutation(a: &[&Rule], b: &[&Rule]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut used = vec![false; b.len()];
    a.iter().all(|rule| {
        b.iter()
            .enumerate()
            .find(|(i, other)| !used[*i] && *other == rule)
            .map(|(i, _)| used[i] = true)
            .is_some()
    })
}

fn ruleset_text<'a>(rules: impl IntoIterator<Item = &'a Rule>, policy: Policy) -> String {
    let mut text: String = rules.into_iter().map(|rule| format!("{rule}\n")).collect();
    text.push_str(&format!("policy {policy}\n"));
    text
}

/// Line-oriented review diff, one line per rule plus the policy line.
///
/// Returns `None` when there is nothing to show.
pub fn render<'a, 'b>(
    snapshot: impl IntoIterator<Item = &'a Rule>,
    snapshot_policy: Policy,
    working: impl IntoIterator<Item = &'b Rule>,
    working_policy: Policy,
) -> Option<String> {
    let old_text = ruleset_text(snapshot, snapshot_policy);
    let new_text = ruleset_text(working, working_policy);
    if old_text == new_text {
        return None;
    }

    let diff = similar::TextDiff::from_lines(&old_text, &new_text);
    let mut result = String::new();
    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            similar::ChangeTag::Delete => "- ",
            similar::ChangeTag::Insert => "+ ",
            similar::ChangeTag::Equal => "  ",
        };
        result.push_str(sign);
        result.push_str(change.value());
    }
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ruleset::{Action, PortRange};
    use crate::core::test_helpers::create_test_rule;

    #[test]
    fn test_identical_lists_are_clean() {
        let rules = vec![create_test_rule("a", 22), create_test_rule("b", 80)];
        let diff = Diff::compute(&rules, Action::Accept, &rules.clone(), Action::Accept);
        assert_eq!(diff, Diff::CLEAN);
        assert!(!diff.is_dirty());
    }

    #[test]
    fn test_reorder_is_detected() {
        let a = create_test_rule("a", 22);
        let b = create_test_rule("b", 80);
        let diff = Diff::compute([&b, &a], Action::Accept, [&a, &b], Action::Accept);
        assert_eq!(diff.rules, RulesChange::Reordered);
        assert!(diff.is_dirty());
    }

    #[test]
    fn test_duplicate_rules_are_not_a_permutation() {
        let a = create_test_rule("a", 22);
        let b = create_test_rule("b", 80);
        let diff = Diff::compute([&a, &a], Action::Accept, [&a, &b], Action::Accept);
        assert_eq!(diff.rules, RulesChange::Modified);
    }

    #[test]
    fn test_edit_is_modified() {
        let a = create_test_rule("a", 22);
        let mut edited = a.clone();
        edited.destination_ports = PortRange::single(2222);
        let diff = Diff::compute([&edited], Action::Accept, [&a], Action::Accept);
        assert_eq!(diff.rules, RulesChange::Modified);
    }

    #[test]
    fn test_policy_only_change() {
        let none: [&Rule; 0] = [];
        let diff = Diff::compute(none, Action::Drop, none, Action::Accept);
        assert_eq!(diff.rules, RulesChange::Unchanged);
        assert_eq!(diff.policy, Some((Action::Accept, Action::Drop)));
        assert_eq!(diff.summary(), "policy accept -> drop");
    }

    #[test]
    fn test_render_marks_changed_lines() {
        let a = create_test_rule("a", 22);
        let b = create_test_rule("b", 80);
        let text = render([&a], Action::Accept, [&a, &b], Action::Reject).unwrap();
        assert!(text.contains("+ [on] in tcp any:* -> any:80 accept \"b\""));
        assert!(text.contains("- policy accept"));
        assert!(text.contains("+ policy reject"));
        assert!(text.contains("  [on] in tcp any:* -> any:22 accept \"a\""));
    }

    #[test]
    fn test_render_exact_output() {
        let a = create_test_rule("a", 22);
        assert_eq!(
            render([&a], Action::Accept, [&a], Action::Drop).unwrap(),
            "  [on] in tcp any:* -> any:22 accept \"a\"\n- policy accept\n+ policy drop\n"
        );
    }

    #[test]
    fn test_render_none_when_equal() {
        let a = create_test_rule("a", 22);
        assert_eq!(render([&a], Action::Drop, [&a], Action::Drop), None);
    }
}
