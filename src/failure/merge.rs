//! Priority merge of failure policies across nesting levels.
//!
//! The three policy lists are folded least-specific first (stage, step
//! group, step), so a category configured at a deeper level replaces the
//! mapping inherited from above. The merged category map is then inverted into
//! one kind set per action. The catch-all category only receives kinds that no
//! other merged category claims.

use std::collections::{BTreeMap, BTreeSet};

use super::kind::{FailureCategory, FailureKind};
use super::policy::{FailureAction, FailurePolicy, PolicyLevel};
use crate::error::PolicyError;

/// Final action → kind-set mapping for one step.
///
/// Kind sets are pairwise disjoint and never empty. Entries are ordered by the
/// first category (in [`FailureCategory`] order) that maps to the action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedPolicy {
    entries: Vec<(FailureAction, BTreeSet<FailureKind>)>,
}

impl ResolvedPolicy {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FailureAction, &BTreeSet<FailureKind>)> {
        self.entries.iter().map(|(action, kinds)| (action, kinds))
    }

    pub fn kinds_for(&self, action: &FailureAction) -> Option<&BTreeSet<FailureKind>> {
        self.entries
            .iter()
            .find(|(candidate, _)| candidate == action)
            .map(|(_, kinds)| kinds)
    }

    pub fn action_for(&self, kind: FailureKind) -> Option<&FailureAction> {
        self.entries
            .iter()
            .find(|(_, kinds)| kinds.contains(&kind))
            .map(|(action, _)| action)
    }

    fn claim(&mut self, action: &FailureAction, kinds: impl IntoIterator<Item = FailureKind>) {
        match self.entries.iter_mut().find(|(candidate, _)| candidate == action) {
            Some((_, existing)) => existing.extend(kinds),
            None => self.entries.push((action.clone(), kinds.into_iter().collect())),
        }
    }
}

/// Merges the step, step-group and stage policies of one step.
pub fn merge(
    step: &FailurePolicy,
    step_group: &FailurePolicy,
    stage: &FailurePolicy,
) -> Result<ResolvedPolicy, PolicyError> {
    let mut by_category: BTreeMap<FailureCategory, FailureAction> = BTreeMap::new();

    for level in PolicyLevel::PRECEDENCE {
        let policy = match level {
            PolicyLevel::Stage => stage,
            PolicyLevel::StepGroup => step_group,
            PolicyLevel::Step => step,
        };
        for (category, action) in categories_of(level, policy)? {
            by_category.insert(category, action.clone());
        }
    }

    let claimed: BTreeSet<FailureKind> = by_category
        .keys()
        .flat_map(|category| category.kinds().iter().copied())
        .collect();

    let mut resolved = ResolvedPolicy::default();
    for (category, action) in &by_category {
        if category.is_catch_all() {
            let unclaimed = FailureKind::ALL
                .into_iter()
                .filter(|kind| !claimed.contains(kind));
            resolved.claim(action, unclaimed);
        } else {
            resolved.claim(action, category.kinds().iter().copied());
        }
    }
    // An empty kind set compiles to an adviser that matches any failure.
    resolved.entries.retain(|(_, kinds)| !kinds.is_empty());

    Ok(resolved)
}

/// Category → action map of a single level, rejecting ambiguous entries.
fn categories_of(
    level: PolicyLevel,
    policy: &FailurePolicy,
) -> Result<BTreeMap<FailureCategory, &FailureAction>, PolicyError> {
    let mut mapped: BTreeMap<FailureCategory, &FailureAction> = BTreeMap::new();
    for entry in policy.entries() {
        if entry.errors.is_empty() {
            return Err(PolicyError::EmptyCategories { level });
        }
        for &category in &entry.errors {
            if let Some(previous) = mapped.insert(category, &entry.action)
                && *previous != entry.action
            {
                return Err(PolicyError::AmbiguousCategory {
                    level,
                    category,
                    first: previous.name(),
                    second: entry.action.name(),
                });
            }
        }
    }
    Ok(mapped)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use proptest::prelude::*;

    use super::*;
    use crate::failure::policy::PolicyEntry;

    fn policy(entries: Vec<(Vec<FailureCategory>, FailureAction)>) -> FailurePolicy {
        entries
            .into_iter()
            .map(|(errors, action)| PolicyEntry::new(errors, action))
            .collect()
    }

    fn retry_twice() -> FailureAction {
        FailureAction::retry(2, vec![Duration::from_secs(5)], FailureAction::Abort)
    }

    #[test]
    fn no_policy_anywhere_resolves_to_empty() {
        let empty = FailurePolicy::default();
        let resolved = merge(&empty, &empty, &empty).unwrap();
        assert!(resolved.is_empty());
    }

    #[test]
    fn step_overrides_step_group_overrides_stage() {
        let stage = policy(vec![(vec![FailureCategory::Timeout], FailureAction::Abort)]);
        let group = policy(vec![(vec![FailureCategory::Timeout], FailureAction::Ignore)]);
        let step = policy(vec![(vec![FailureCategory::Timeout], FailureAction::MarkAsSuccess)]);

        let resolved = merge(&step, &group, &stage).unwrap();
        assert_eq!(
            resolved.action_for(FailureKind::Timeout),
            Some(&FailureAction::MarkAsSuccess)
        );
        assert_eq!(resolved.len(), 1);

        let resolved = merge(&FailurePolicy::default(), &group, &stage).unwrap();
        assert_eq!(
            resolved.action_for(FailureKind::Timeout),
            Some(&FailureAction::Ignore)
        );
    }

    #[test]
    fn inherited_categories_survive_when_not_overridden() {
        let stage = policy(vec![(
            vec![FailureCategory::Connectivity, FailureCategory::Timeout],
            FailureAction::Abort,
        )]);
        let step = policy(vec![(vec![FailureCategory::Timeout], retry_twice())]);

        let resolved = merge(&step, &FailurePolicy::default(), &stage).unwrap();
        assert_eq!(
            resolved.action_for(FailureKind::Connectivity),
            Some(&FailureAction::Abort)
        );
        assert_eq!(resolved.action_for(FailureKind::Timeout), Some(&retry_twice()));
    }

    #[test]
    fn catch_all_takes_only_unclaimed_kinds() {
        let stage = policy(vec![(vec![FailureCategory::AnyOther], FailureAction::Abort)]);
        let step = policy(vec![(vec![FailureCategory::Timeout], retry_twice())]);

        let resolved = merge(&step, &FailurePolicy::default(), &stage).unwrap();
        let abort_kinds = resolved.kinds_for(&FailureAction::Abort).unwrap();
        assert!(!abort_kinds.contains(&FailureKind::Timeout));
        assert!(abort_kinds.contains(&FailureKind::Application));
        assert_eq!(abort_kinds.len(), FailureKind::ALL.len() - 1);
        assert_eq!(
            resolved.kinds_for(&retry_twice()).unwrap(),
            &BTreeSet::from([FailureKind::Timeout])
        );
    }

    #[test]
    fn catch_all_shares_action_with_named_category() {
        let stage = policy(vec![
            (vec![FailureCategory::AnyOther], FailureAction::Abort),
            (vec![FailureCategory::Timeout], FailureAction::Abort),
        ]);
        let resolved = merge(&FailurePolicy::default(), &FailurePolicy::default(), &stage).unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(
            resolved.kinds_for(&FailureAction::Abort).unwrap().len(),
            FailureKind::ALL.len()
        );
    }

    #[test]
    fn ambiguous_category_within_one_level_is_rejected() {
        let step = policy(vec![
            (vec![FailureCategory::Timeout], FailureAction::Abort),
            (vec![FailureCategory::Timeout], FailureAction::Ignore),
        ]);
        let err = merge(&step, &FailurePolicy::default(), &FailurePolicy::default()).unwrap_err();
        assert!(matches!(
            err,
            PolicyError::AmbiguousCategory {
                level: PolicyLevel::Step,
                category: FailureCategory::Timeout,
                ..
            }
        ));
    }

    #[test]
    fn repeated_category_with_same_action_is_accepted() {
        let group = policy(vec![
            (vec![FailureCategory::Timeout], FailureAction::Ignore),
            (vec![FailureCategory::Timeout, FailureCategory::Unknown], FailureAction::Ignore),
        ]);
        let resolved = merge(&FailurePolicy::default(), &group, &FailurePolicy::default()).unwrap();
        assert_eq!(resolved.len(), 1);
    }

    #[test]
    fn empty_error_list_is_rejected() {
        let stage = policy(vec![(vec![], FailureAction::Abort)]);
        let err = merge(&FailurePolicy::default(), &FailurePolicy::default(), &stage).unwrap_err();
        assert!(matches!(
            err,
            PolicyError::EmptyCategories { level: PolicyLevel::Stage }
        ));
    }

    #[test]
    fn deeper_catch_all_replaces_inherited_one() {
        let named: Vec<FailureCategory> = FailureCategory::ALL
            .into_iter()
            .filter(|c| !c.is_catch_all())
            .collect();
        let stage = policy(vec![(vec![FailureCategory::AnyOther], FailureAction::Abort)]);
        let step = policy(vec![
            (named, FailureAction::Ignore),
            (vec![FailureCategory::AnyOther], FailureAction::MarkAsSuccess),
        ]);
        let resolved = merge(&step, &FailurePolicy::default(), &stage).unwrap();
        assert!(resolved.kinds_for(&FailureAction::Abort).is_none());
        assert_eq!(
            resolved.kinds_for(&FailureAction::MarkAsSuccess).unwrap(),
            &BTreeSet::from([FailureKind::Application])
        );
    }

    fn any_category() -> impl Strategy<Value = FailureCategory> {
        proptest::sample::select(FailureCategory::ALL.to_vec())
    }

    fn any_simple_action() -> impl Strategy<Value = FailureAction> {
        prop_oneof![
            Just(FailureAction::Ignore),
            Just(FailureAction::Abort),
            Just(FailureAction::MarkAsSuccess),
            Just(FailureAction::StageRollback),
            (1u32..4).prop_map(|n| FailureAction::retry(
                n,
                vec![Duration::from_secs(1)],
                FailureAction::Abort
            )),
        ]
    }

    /// One level's policy: each category appears under a single action.
    fn any_policy() -> impl Strategy<Value = FailurePolicy> {
        proptest::collection::btree_map(any_category(), any_simple_action(), 0..6).prop_map(
            |mapping| {
                mapping
                    .into_iter()
                    .map(|(category, action)| PolicyEntry::new([category], action))
                    .collect()
            },
        )
    }

    proptest! {
        #[test]
        fn prop_kind_sets_are_disjoint(step in any_policy(), group in any_policy(), stage in any_policy()) {
            let resolved = merge(&step, &group, &stage).unwrap();
            let mut seen = BTreeSet::new();
            for (_, kinds) in resolved.iter() {
                prop_assert!(!kinds.is_empty());
                for kind in kinds {
                    prop_assert!(seen.insert(*kind));
                }
            }
        }

        #[test]
        fn prop_most_specific_level_wins(
            category in any_category().prop_filter("named", |c| !c.is_catch_all()),
            step_action in any_simple_action(),
            group in any_policy(),
            stage in any_policy(),
        ) {
            let step = FailurePolicy::new(vec![PolicyEntry::new([category], step_action.clone())]);
            let resolved = merge(&step, &group, &stage).unwrap();
            for kind in category.kinds() {
                prop_assert_eq!(resolved.action_for(*kind), Some(&step_action));
            }
        }

        #[test]
        fn prop_catch_all_covers_every_unclaimed_kind(
            step in any_policy(),
            group in any_policy(),
            catch_all_action in any_simple_action(),
        ) {
            let stage = FailurePolicy::new(vec![PolicyEntry::new(
                [FailureCategory::AnyOther],
                catch_all_action,
            )]);
            let resolved = merge(&step, &group, &stage).unwrap();
            for kind in FailureKind::ALL {
                prop_assert!(resolved.action_for(kind).is_some(), "{kind} unhandled");
            }
        }
    }
}
