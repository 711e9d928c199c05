//! Trigger gate evaluation.

use capstan_domain::{EventContext, TriggerRule};
use tracing::debug;

/// Decide whether a pipeline run should start at all.
///
/// Returns true iff at least one rule matches the event and no rule's tag
/// veto applies. Pure and total: unmatched input simply yields false, so
/// the whole pipeline can be skipped before any resource is acquired.
pub fn should_run(event: &EventContext, rules: &[TriggerRule]) -> bool {
    if rules.iter().any(|r| r.denies(event)) {
        debug!(branch = %event.branch, tag = ?event.tag, "run vetoed by tag deny pattern");
        return false;
    }
    let allowed = rules.iter().any(|r| r.matches(event));
    debug!(kind = ?event.kind, branch = %event.branch, allowed, "trigger gate evaluated");
    allowed
}

#[cfg(test)]
mod tests {
    use super::*;
    use capstan_domain::EventKind;

    fn push_main_rules() -> Vec<TriggerRule> {
        vec![
            TriggerRule::for_kinds(&[EventKind::Push]).allow_branches(&["main"]),
            TriggerRule::for_kinds(&[EventKind::PullRequest]),
        ]
    }

    #[test]
    fn test_push_to_main_runs() {
        let event = EventContext::push("acme/widget", "main", None, "alice");
        assert!(should_run(&event, &push_main_rules()));
    }

    #[test]
    fn test_push_to_feature_branch_skipped() {
        let event = EventContext::push("acme/widget", "feature/x", None, "alice");
        assert!(!should_run(&event, &push_main_rules()));
    }

    #[test]
    fn test_pull_request_runs_regardless_of_branch_filter() {
        let event = EventContext::pull_request("bob/widget", "acme/widget", "develop", 5, "bob");
        assert!(should_run(&event, &push_main_rules()));
    }

    #[test]
    fn test_tag_deny_vetoes_even_when_branch_matches() {
        let rules = vec![TriggerRule::for_kinds(&[EventKind::Push])
            .allow_branches(&["main"])
            .deny_tags(&["v*"])];
        let tagged = EventContext::push("acme/widget", "main", Some("v2.0"), "alice");
        assert!(!should_run(&tagged, &rules));

        let untagged = EventContext::push("acme/widget", "main", None, "alice");
        assert!(should_run(&untagged, &rules));
    }

    #[test]
    fn test_empty_rule_set_never_runs() {
        let event = EventContext::push("acme/widget", "main", None, "alice");
        assert!(!should_run(&event, &[]));
    }

    #[test]
    fn test_deterministic() {
        let event = EventContext::manual("acme/widget", "main", "alice");
        let rules = vec![TriggerRule::for_kinds(&[EventKind::ManualDispatch])];
        let first = should_run(&event, &rules);
        let second = should_run(&event, &rules);
        assert_eq!(first, second);
        assert!(first);
    }
}
