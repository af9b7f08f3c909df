//! Dependency closure resolution.
//!
//! Breadth-first walk over child references with an explicit queue, so deep
//! or irregular module graphs never hit a recursion limit. Every popped
//! identifier is marked visited before its lookup, which keeps the walk
//! finite even when dangling references repeat.

use crate::dataset::ModuleId;
use crate::store::{ModuleStore, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use thiserror::Error;

/// Resolution failures under the fail-fast policy
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// A reachable identifier is missing or ambiguous
    #[error("Dependency resolution aborted: {0}")]
    Lookup(#[from] StoreError),
}

/// How reachable modules are collapsed into code units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupPolicy {
    /// Identical source text from different modules is emitted once
    #[default]
    ByCode,
    /// Every distinct module contributes its source, even if identical
    ById,
}

/// Resolution policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveOptions {
    /// Skip missing or ambiguous references instead of aborting
    pub ignore_missing: bool,
    /// Code unit deduplication
    pub dedup: DedupPolicy,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            ignore_missing: true,
            dedup: DedupPolicy::ByCode,
        }
    }
}

impl ResolveOptions {
    /// Create default options (skip missing, dedup by code)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the missing-reference policy
    #[must_use]
    pub const fn with_ignore_missing(mut self, ignore_missing: bool) -> Self {
        self.ignore_missing = ignore_missing;
        self
    }

    /// Set the dedup policy
    #[must_use]
    pub const fn with_dedup(mut self, dedup: DedupPolicy) -> Self {
        self.dedup = dedup;
        self
    }
}

/// Closure of a set of roots
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// Distinct code units, in breadth-first discovery order
    pub code_units: Vec<String>,
    /// Modules that were looked up successfully, in visit order
    pub resolved: Vec<ModuleId>,
    /// Identifiers skipped because the lookup failed
    pub skipped: Vec<ModuleId>,
}

impl Resolution {
    /// Number of code units
    #[must_use]
    pub fn len(&self) -> usize {
        self.code_units.len()
    }

    /// Whether no module was resolved
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.code_units.is_empty()
    }

    /// Join code units into one compilation unit
    #[must_use]
    pub fn flatten(&self) -> String {
        self.code_units.join("\n\n")
    }
}

/// Compute the dependency closure of `roots` over `store`
pub fn resolve<I, S>(
    store: &ModuleStore,
    roots: I,
    options: ResolveOptions,
) -> Result<Resolution, ResolveError>
where
    I: IntoIterator<Item = S>,
    S: Into<ModuleId>,
{
    let mut queue: VecDeque<ModuleId> = roots.into_iter().map(Into::into).collect();
    let mut visited: HashSet<ModuleId> = HashSet::new();
    let mut seen_code: HashSet<&str> = HashSet::new();
    let mut resolution = Resolution::default();

    while let Some(id) = queue.pop_front() {
        if !visited.insert(id.clone()) {
            continue;
        }

        let record = match store.lookup(&id) {
            Ok(record) => record,
            Err(err) if options.ignore_missing => {
                tracing::debug!(module = %id, error = %err, "skipping unresolved module");
                resolution.skipped.push(id);
                continue;
            }
            Err(err) => return Err(err.into()),
        };

        let fresh = match options.dedup {
            DedupPolicy::ByCode => seen_code.insert(record.full_code.as_str()),
            DedupPolicy::ById => true,
        };
        if fresh {
            resolution.code_units.push(record.full_code.clone());
        }

        queue.extend(
            record
                .children
                .iter()
                .filter(|child| !visited.contains(*child))
                .cloned(),
        );
        resolution.resolved.push(id);
    }

    tracing::debug!(
        modules = resolution.resolved.len(),
        code_units = resolution.code_units.len(),
        skipped = resolution.skipped.len(),
        "resolved dependency closure"
    );
    Ok(resolution)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::dataset::ModuleRecord;
    use std::collections::BTreeSet;

    fn none() -> Vec<ModuleId> {
        Vec::new()
    }

    fn code_set(resolution: &Resolution) -> BTreeSet<&str> {
        resolution.code_units.iter().map(String::as_str).collect()
    }

    fn shared_code_store() -> ModuleStore {
        ModuleStore::new(vec![
            ModuleRecord::new("A", "a", ["B", "C"]),
            ModuleRecord::new("B", "b", none()),
            ModuleRecord::new("C", "a", ["B"]),
        ])
    }

    #[test]
    fn test_shared_code_collapses() {
        let res = resolve(&shared_code_store(), ["A"], ResolveOptions::new()).unwrap();
        assert_eq!(res.code_units, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(res.resolved.len(), 3);
    }

    #[test]
    fn test_dedup_by_id_keeps_identical_text() {
        let options = ResolveOptions::new().with_dedup(DedupPolicy::ById);
        let res = resolve(&shared_code_store(), ["A"], options).unwrap();
        assert_eq!(res.len(), 3);
        assert_eq!(res.code_units.iter().filter(|c| *c == "a").count(), 2);
    }

    #[test]
    fn test_cycle_terminates() {
        let store = ModuleStore::new(vec![
            ModuleRecord::new("A", "a", ["B"]),
            ModuleRecord::new("B", "b", ["A"]),
        ]);
        let res = resolve(&store, ["A"], ResolveOptions::new()).unwrap();
        assert_eq!(code_set(&res), BTreeSet::from(["a", "b"]));
        assert_eq!(res.resolved, vec![ModuleId::from("A"), ModuleId::from("B")]);
    }

    #[test]
    fn test_self_reference() {
        let store = ModuleStore::new(vec![ModuleRecord::new("A", "a", ["A", "A"])]);
        let res = resolve(&store, ["A"], ResolveOptions::new()).unwrap();
        assert_eq!(res.code_units, vec!["a".to_string()]);
    }

    #[test]
    fn test_fail_fast_on_missing() {
        let store = ModuleStore::new(vec![ModuleRecord::new("A", "a", ["missing"])]);
        let options = ResolveOptions::new().with_ignore_missing(false);
        let err = resolve(&store, ["A"], options).unwrap_err();
        assert_eq!(
            err,
            ResolveError::Lookup(StoreError::NotFound(ModuleId::from("missing")))
        );
    }

    #[test]
    fn test_fail_fast_on_ambiguous() {
        let store = ModuleStore::new(vec![
            ModuleRecord::new("A", "a", ["D"]),
            ModuleRecord::new("D", "d1", none()),
            ModuleRecord::new("D", "d2", none()),
        ]);
        let options = ResolveOptions::new().with_ignore_missing(false);
        let err = resolve(&store, ["A"], options).unwrap_err();
        assert!(matches!(
            err,
            ResolveError::Lookup(StoreError::Ambiguous { count: 2, .. })
        ));
    }

    #[test]
    fn test_skip_policy_drops_missing_subtree() {
        // B is ambiguous, so its child E is never discovered
        let store = ModuleStore::new(vec![
            ModuleRecord::new("A", "a", ["missing", "B", "C"]),
            ModuleRecord::new("B", "b1", ["E"]),
            ModuleRecord::new("B", "b2", ["E"]),
            ModuleRecord::new("C", "c", none()),
            ModuleRecord::new("E", "e", none()),
        ]);
        let res = resolve(&store, ["A"], ResolveOptions::new()).unwrap();
        assert_eq!(code_set(&res), BTreeSet::from(["a", "c"]));
        assert_eq!(res.skipped, vec![ModuleId::from("missing"), ModuleId::from("B")]);
    }

    #[test]
    fn test_missing_root_with_skip_returns_existing_roots() {
        let res = resolve(&shared_code_store(), ["nope", "B"], ResolveOptions::new()).unwrap();
        assert_eq!(res.code_units, vec!["b".to_string()]);
    }

    #[test]
    fn test_duplicate_roots_collapse() {
        let res = resolve(&shared_code_store(), ["B", "B", "B"], ResolveOptions::new()).unwrap();
        assert_eq!(res.resolved, vec![ModuleId::from("B")]);
    }

    #[test]
    fn test_integer_child_does_not_match_text_index() {
        let store = ModuleStore::new(vec![
            ModuleRecord::new("top", "top", [ModuleId::Int(7)]),
            ModuleRecord::new("7", "text seven", none()),
        ]);
        let res = resolve(&store, ["top"], ResolveOptions::new()).unwrap();
        assert_eq!(res.code_units, vec!["top".to_string()]);
        assert_eq!(res.skipped, vec![ModuleId::Int(7)]);
    }

    #[test]
    fn test_empty_roots() {
        let res = resolve(&shared_code_store(), none(), ResolveOptions::new()).unwrap();
        assert!(res.is_empty());
    }

    #[test]
    fn test_deep_chain_has_no_recursion_limit() {
        let depth: i64 = 50_000;
        let records = (0..depth)
            .map(|i| {
                let children = if i + 1 < depth { vec![i + 1] } else { vec![] };
                ModuleRecord::new(i, format!("module m{i}; endmodule"), children)
            })
            .collect();
        let res = resolve(&ModuleStore::new(records), [0i64], ResolveOptions::new()).unwrap();
        assert_eq!(res.len(), 50_000);
    }

    #[test]
    fn test_flatten_joins_with_blank_line() {
        let res = resolve(&shared_code_store(), ["A"], ResolveOptions::new()).unwrap();
        assert_eq!(res.flatten(), "a\n\nb");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod proptest_tests {
    use super::*;
    use crate::dataset::ModuleRecord;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    /// Random graph over ids 0..n with edges into 0..n+3 (so some dangle)
    /// and code text drawn from a small pool (so some collide).
    fn graph_strategy() -> impl Strategy<Value = Vec<ModuleRecord>> {
        (1usize..12).prop_flat_map(|n| {
            proptest::collection::vec(
                (0u8..4, proptest::collection::vec(0i64..(n as i64 + 3), 0..4)),
                n,
            )
            .prop_map(|nodes| {
                nodes
                    .into_iter()
                    .enumerate()
                    .map(|(i, (code, children))| {
                        ModuleRecord::new(i as i64, format!("code{code}"), children)
                    })
                    .collect()
            })
        })
    }

    /// Reachable-and-present identifiers computed by a naive fixpoint
    fn reachable(records: &[ModuleRecord], roots: &[i64]) -> BTreeSet<ModuleId> {
        let present: BTreeSet<ModuleId> = records.iter().map(|r| r.index.clone()).collect();
        let mut reach: BTreeSet<ModuleId> = roots
            .iter()
            .map(|&n| ModuleId::Int(n))
            .filter(|id| present.contains(id))
            .collect();
        loop {
            let before = reach.len();
            for record in records {
                if reach.contains(&record.index) {
                    for child in &record.children {
                        if present.contains(child) {
                            reach.insert(child.clone());
                        }
                    }
                }
            }
            if reach.len() == before {
                return reach;
            }
        }
    }

    proptest! {
        /// Closure equals the code bodies of every reachable, present module
        #[test]
        fn prop_closure_complete(records in graph_strategy(), roots in proptest::collection::vec(0i64..15, 0..3)) {
            let store = ModuleStore::new(records.clone());
            let res = resolve(&store, roots.clone(), ResolveOptions::new()).unwrap();

            let expected_ids = reachable(&records, &roots);
            let expected_code: BTreeSet<&str> = records
                .iter()
                .filter(|r| expected_ids.contains(&r.index))
                .map(|r| r.full_code.as_str())
                .collect();
            let actual: BTreeSet<&str> = res.code_units.iter().map(String::as_str).collect();
            prop_assert_eq!(actual, expected_code);

            let resolved: BTreeSet<ModuleId> = res.resolved.iter().cloned().collect();
            prop_assert_eq!(resolved, expected_ids);
        }

        /// Code units never repeat under the default policy
        #[test]
        fn prop_no_duplicate_code(records in graph_strategy(), roots in proptest::collection::vec(0i64..15, 0..3)) {
            let store = ModuleStore::new(records);
            let res = resolve(&store, roots, ResolveOptions::new()).unwrap();
            let distinct: BTreeSet<&String> = res.code_units.iter().collect();
            prop_assert_eq!(distinct.len(), res.code_units.len());
        }

        /// By-id dedup emits one unit per resolved module
        #[test]
        fn prop_by_id_matches_resolved(records in graph_strategy(), roots in proptest::collection::vec(0i64..15, 0..3)) {
            let store = ModuleStore::new(records);
            let options = ResolveOptions::new().with_dedup(DedupPolicy::ById);
            let res = resolve(&store, roots, options).unwrap();
            prop_assert_eq!(res.code_units.len(), res.resolved.len());
        }

        /// Fail-fast succeeds exactly when nothing reachable dangles
        #[test]
        fn prop_fail_fast_agrees_with_skip(records in graph_strategy(), roots in proptest::collection::vec(0i64..15, 0..3)) {
            let store = ModuleStore::new(records);
            let skip = resolve(&store, roots.clone(), ResolveOptions::new()).unwrap();
            let strict = resolve(&store, roots, ResolveOptions::new().with_ignore_missing(false));
            if skip.skipped.is_empty() {
                prop_assert_eq!(strict.unwrap(), skip);
            } else {
                prop_assert!(strict.is_err());
            }
        }
    }
}
