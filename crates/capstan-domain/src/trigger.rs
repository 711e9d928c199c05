//! Declarative trigger rules.
//!
//! Rules are plain data; evaluation is a pure method so the whole pipeline
//! can be gated before any resource is acquired. Within one rule, filter
//! categories combine with AND and patterns within a category with OR.

use serde::{Deserialize, Serialize};

use crate::event::{EventContext, EventKind};

/// One declarative trigger rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TriggerRule {
    /// Event kinds this rule applies to. Empty means any kind.
    pub kinds: Vec<EventKind>,

    /// Branch patterns that allow a run. Empty means any branch.
    pub branch_allow: Vec<String>,

    /// Tag patterns that veto a run even when the branch matches. A push
    /// carrying an excluded tag must not start a redundant tag build.
    pub tag_deny: Vec<String>,
}

impl TriggerRule {
    /// Rule matching the given kinds on any branch.
    pub fn for_kinds(kinds: &[EventKind]) -> Self {
        Self {
            kinds: kinds.to_vec(),
            ..Self::default()
        }
    }

    /// Restrict the rule to branches matching one of `patterns`.
    pub fn allow_branches(mut self, patterns: &[&str]) -> Self {
        self.branch_allow = patterns.iter().map(|p| p.to_string()).collect();
        self
    }

    /// Veto events whose tag matches one of `patterns`.
    pub fn deny_tags(mut self, patterns: &[&str]) -> Self {
        self.tag_deny = patterns.iter().map(|p| p.to_string()).collect();
        self
    }

    /// Whether this rule allows the event. Pure and total.
    pub fn matches(&self, event: &EventContext) -> bool {
        if !self.kinds.is_empty() && !self.kinds.contains(&event.kind) {
            return false;
        }
        if !self.branch_allow.is_empty()
            && !self
                .branch_allow
                .iter()
                .any(|p| pattern_matches(p, &event.branch))
        {
            return false;
        }
        !self.denies(event)
    }

    /// Whether this rule's tag veto applies to the event.
    pub fn denies(&self, event: &EventContext) -> bool {
        match &event.tag {
            Some(tag) => self.tag_deny.iter().any(|p| pattern_matches(p, tag)),
            None => false,
        }
    }
}

/// Glob-style pattern match supporting `*` wildcards.
///
/// `*` matches any (possibly empty) substring; all other characters match
/// literally. Matching is case-sensitive.
pub fn pattern_matches(pattern: &str, value: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == value;
    }
    let parts: Vec<&str> = pattern.split('*').collect();
    let last = parts.len() - 1;
    let mut pos = 0;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            if !value.starts_with(part) {
                return false;
            }
            pos = part.len();
        } else if i == last {
            return value.len() >= pos + part.len() && value[pos..].ends_with(part);
        } else {
            match value[pos..].find(part) {
                Some(idx) => pos = pos + idx + part.len(),
                None => return false,
            }
        }
    }
    true
}
