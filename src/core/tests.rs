#[cfg(test)]
mod tests_impl {
    use crate::core::evaluate::{Packet, Transport, Verdict};
    use crate::core::ruleset::{Action, Mode, PortRange, Protocol, RulesetSnapshot};
    use crate::core::staging::RuleEdit;
    use crate::core::test_helpers::{create_test_rule, create_test_snapshot};
    use crate::core::workspace::Workspace;

    fn ssh_packet() -> Packet {
        Packet {
            direction: Mode::In,
            transport: Transport::Tcp,
            source: "198.51.100.4".parse().unwrap(),
            destination: "10.0.0.1".parse().unwrap(),
            source_port: 51000,
            destination_port: 22,
            in_interface: Some("eth0".to_string()),
            out_interface: None,
        }
    }

    #[test]
    fn test_explain_follows_staged_order() {
        let mut ws = Workspace::new();
        ws.accept_snapshot(RulesetSnapshot {
            rules: vec![create_test_rule("allow ssh", 22)],
            policy: Action::Drop,
            enabled: true,
        });
        assert_eq!(
            ws.explain(&ssh_packet()),
            Verdict::Rule {
                index: 0,
                action: Action::Accept
            }
        );

        let id = ws.insert_default().unwrap();
        ws.edit_field(id, RuleEdit::Action(Action::Reject)).unwrap();
        ws.edit_field(id, RuleEdit::DestinationPorts("20-25".to_string()))
            .unwrap();
        assert_eq!(ws.explain(&ssh_packet()).action(), Action::Reject);

        ws.reorder(0, 1).unwrap();
        assert_eq!(ws.explain(&ssh_packet()).action(), Action::Accept);
    }

    #[test]
    fn test_explain_falls_back_to_candidate_policy() {
        let mut ws = Workspace::new();
        ws.accept_snapshot(create_test_snapshot(&["ssh"]));
        let id = ws.rules()[0].id();
        ws.edit_field(id, RuleEdit::Active(false)).unwrap();
        ws.set_policy(Action::Reject).unwrap();
        assert_eq!(ws.explain(&ssh_packet()), Verdict::Policy(Action::Reject));
    }

    #[test]
    fn test_hints_point_at_rule_index() {
        let mut ws = Workspace::new();
        ws.accept_snapshot(create_test_snapshot(&["a"]));
        let id = ws.insert(create_test_rule("lockout", 22), 1).unwrap();
        ws.edit_field(id, RuleEdit::Action(Action::Drop)).unwrap();
        assert!(
            ws.hints()
                .iter()
                .any(|(index, hint)| *index == 1 && hint.contains("SSH"))
        );
    }

    #[test]
    fn test_protocol_switch_preserves_ports_in_wire_payload() {
        let mut ws = Workspace::new();
        ws.accept_snapshot(create_test_snapshot(&["a"]));
        let id = ws.rules()[0].id();
        ws.edit_field(id, RuleEdit::Protocol(Protocol::Any)).unwrap();
        let update = ws.to_update();
        assert_eq!(update.rules[0].destination_ports, PortRange::single(22));
        assert_eq!(update.rules[0].protocol, Protocol::Any);
    }
}

#[cfg(test)]
mod property_tests {
    use crate::core::gate::{self, GateInput, Hazard, Plan, Request};
    use crate::core::ruleset::{Action, Mode, PortRange, Protocol, Rule, RulesetSnapshot};
    use crate::core::staging::{RuleEdit, StagedRule};
    use crate::core::workspace::Workspace;
    use crate::validators::{KnownInterfaces, validate_rule};
    use proptest::prelude::*;
    use uuid::Uuid;

    prop_compose! {
        fn arb_port()(port in 1u16..=65535) -> u16 {
            port
        }
    }

    prop_compose! {
        fn arb_port_range()(start in arb_port(), end in arb_port()) -> PortRange {
            PortRange::new(start.min(end), start.max(end))
        }
    }

    fn arb_action() -> impl Strategy<Value = Action> {
        prop_oneof![Just(Action::Accept), Just(Action::Drop), Just(Action::Reject)]
    }

    fn arb_address() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("any".to_string()),
            Just("any-ipv4".to_string()),
            Just("any-ipv6".to_string()),
            Just("10.0.0.0/8".to_string()),
            Just("192.168.1.20".to_string()),
            Just("2001:db8::/32".to_string()),
            Just("eth0".to_string()),
        ]
    }

    prop_compose! {
        fn arb_rule()(
            name in "[a-zA-Z0-9 ]{1,24}",
            protocol in prop_oneof![
                Just(Protocol::Tcp),
                Just(Protocol::Udp),
                Just(Protocol::Any),
            ],
            mode in prop_oneof![Just(Mode::In), Just(Mode::Out), Just(Mode::Forward)],
            action in arb_action(),
            source in arb_address(),
            destination in arb_address(),
            source_ports in arb_port_range(),
            destination_ports in arb_port_range(),
            active in any::<bool>(),
        ) -> Rule {
            Rule {
                name,
                protocol,
                mode,
                action,
                source,
                destination,
                source_ports,
                destination_ports,
                active,
            }
        }
    }

    prop_compose! {
        fn arb_snapshot()(
            rules in prop::collection::vec(arb_rule(), 0..12),
            policy in arb_action(),
            enabled in any::<bool>(),
        ) -> RulesetSnapshot {
            RulesetSnapshot { rules, policy, enabled }
        }
    }

    fn loaded(snapshot: RulesetSnapshot) -> Workspace {
        let mut ws = Workspace::new();
        ws.accept_snapshot(snapshot);
        ws
    }

    fn ids(ws: &Workspace) -> Vec<Uuid> {
        ws.rules().iter().map(StagedRule::id).collect()
    }

    proptest! {
        #[test]
        fn test_clean_after_load(snapshot in arb_snapshot()) {
            let ws = loaded(snapshot);
            prop_assert!(!ws.is_dirty());
        }

        #[test]
        fn test_clean_after_successful_push(snapshot in arb_snapshot(), rule in arb_rule(), policy in arb_action()) {
            let mut ws = loaded(snapshot);
            ws.insert(rule, 0).unwrap();
            ws.set_policy(policy).unwrap();
            let update = ws.to_update();
            ws.commit_pushed(update);
            prop_assert!(!ws.is_dirty());
        }

        #[test]
        fn test_insert_then_remove_is_identity(
            snapshot in arb_snapshot(),
            rule in arb_rule(),
            at in any::<prop::sample::Index>(),
        ) {
            let mut ws = loaded(snapshot);
            let index = at.index(ws.rules().len() + 1);
            let id = ws.insert(rule, index).unwrap();
            ws.remove(id).unwrap();
            prop_assert!(!ws.is_dirty());
        }

        #[test]
        fn test_edit_and_revert_is_identity(
            snapshot in arb_snapshot().prop_filter("needs a rule", |s| !s.rules.is_empty()),
            at in any::<prop::sample::Index>(),
            name in "[a-z]{1,10}",
            action in arb_action(),
            policy in arb_action(),
        ) {
            let mut ws = loaded(snapshot);
            let staged = ws.rules()[at.index(ws.rules().len())].clone();
            let original = staged.rule().clone();
            let original_policy = ws.policy();

            ws.edit_field(staged.id(), RuleEdit::Name(name)).unwrap();
            ws.edit_field(staged.id(), RuleEdit::Action(action)).unwrap();
            ws.edit_field(staged.id(), RuleEdit::Active(!original.active)).unwrap();
            ws.set_policy(policy).unwrap();

            ws.edit_field(staged.id(), RuleEdit::Name(original.name.clone())).unwrap();
            ws.edit_field(staged.id(), RuleEdit::Action(original.action)).unwrap();
            ws.edit_field(staged.id(), RuleEdit::Active(original.active)).unwrap();
            ws.set_policy(original_policy).unwrap();

            prop_assert!(!ws.is_dirty());
        }

        #[test]
        fn test_reorder_is_self_inverse(
            snapshot in arb_snapshot().prop_filter("needs a rule", |s| !s.rules.is_empty()),
            from in any::<prop::sample::Index>(),
            to in any::<prop::sample::Index>(),
        ) {
            let mut ws = loaded(snapshot);
            let len = ws.rules().len();
            let (from, to) = (from.index(len), to.index(len));
            let before = ids(&ws);

            ws.reorder(from, to).unwrap();
            prop_assert_eq!(ws.rules()[to].id(), before[from]);
            ws.reorder(to, from).unwrap();

            prop_assert_eq!(ids(&ws), before);
            prop_assert!(!ws.is_dirty());
        }

        #[test]
        fn test_any_protocol_never_fails_port_validation(
            mut rule in arb_rule(),
            a in any::<u16>(),
            b in any::<u16>(),
            c in any::<u16>(),
            d in any::<u16>(),
        ) {
            rule.protocol = Protocol::Any;
            rule.source_ports = PortRange::new(a, b);
            rule.destination_ports = PortRange::new(c, d);

            let errors = validate_rule(&rule, &KnownInterfaces::unknown()).unwrap_or_default();
            prop_assert!(errors.source_ports.is_none());
            prop_assert!(errors.destination_ports.is_none());
        }

        #[test]
        fn test_rejected_port_text_never_changes_state(
            snapshot in arb_snapshot().prop_filter("needs a tcp rule", |s| {
                s.rules.first().is_some_and(|r| r.protocol.supports_ports())
            }),
            text in "[0-9a-z -]{0,12}",
        ) {
            let mut ws = loaded(snapshot);
            let id = ws.rules()[0].id();
            let before = ws.rules()[0].rule().clone();
            if ws.edit_field(id, RuleEdit::SourcePorts(text)).is_err() {
                prop_assert_eq!(ws.rules()[0].rule(), &before);
                prop_assert!(!ws.is_dirty());
            } else {
                let ports = ws.rules()[0].rule().source_ports;
                prop_assert!(ports.start >= 1 && ports.start <= ports.end);
            }
        }

        #[test]
        fn test_toggle_on_confirmation_truth_table(
            dirty in any::<bool>(),
            snapshot_policy in arb_action(),
            candidate_policy in arb_action(),
        ) {
            let input = GateInput { dirty, enabled: false, snapshot_policy, candidate_policy };
            let decision = gate::decide(Request::Enable, &input);

            prop_assert_eq!(
                decision.needs_confirmation(),
                candidate_policy.is_restrictive() || dirty
            );
            prop_assert_eq!(
                decision.plan,
                if dirty { Plan::ApplyThenEnable } else { Plan::Enable }
            );
            prop_assert_eq!(decision.hazards.contains(&Hazard::UnappliedChanges), dirty);
        }

        #[test]
        fn test_disable_and_enabled_toggle_never_confirm(
            dirty in any::<bool>(),
            snapshot_policy in arb_action(),
            candidate_policy in arb_action(),
        ) {
            let input = GateInput { dirty, enabled: true, snapshot_policy, candidate_policy };
            prop_assert!(!gate::decide(Request::Enable, &input).needs_confirmation());
            prop_assert!(!gate::decide(Request::Disable, &input).needs_confirmation());
            let disabled = GateInput { enabled: false, ..input };
            prop_assert!(!gate::decide(Request::Disable, &disabled).needs_confirmation());
        }
    }
}
