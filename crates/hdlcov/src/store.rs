//! Read-only module store with lookup by identifier.

use crate::dataset::{ModuleId, ModuleRecord};
use std::collections::HashMap;
use thiserror::Error;

/// Dataset integrity errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// No record carries the identifier
    #[error("Module not found: {0}")]
    NotFound(ModuleId),

    /// More than one record carries the identifier
    #[error("Module {id} is ambiguous: {count} records share this index")]
    Ambiguous {
        /// Shared identifier
        id: ModuleId,
        /// Number of records carrying it
        count: usize,
    },

    /// Strict construction found duplicated identifiers
    #[error("Dataset has {} duplicated module indices: {}", .0.len(), join_ids(.0))]
    Duplicates(Vec<ModuleId>),
}

fn join_ids(ids: &[ModuleId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Immutable index over a dataset's module records.
///
/// Construction never deduplicates: a duplicated identifier is reported by
/// [`ModuleStore::lookup`] as [`StoreError::Ambiguous`], or up front by
/// [`ModuleStore::into_strict`].
#[derive(Debug, Clone, Default)]
pub struct ModuleStore {
    records: Vec<ModuleRecord>,
    positions: HashMap<ModuleId, Vec<usize>>,
}

impl ModuleStore {
    /// Build a store from records, keeping duplicates for lazy detection
    #[must_use]
    pub fn new(records: Vec<ModuleRecord>) -> Self {
        let mut positions: HashMap<ModuleId, Vec<usize>> = HashMap::with_capacity(records.len());
        for (pos, record) in records.iter().enumerate() {
            positions.entry(record.index.clone()).or_default().push(pos);
        }
        Self { records, positions }
    }

    /// Keep the store only if no identifier appears more than once
    pub fn into_strict(self) -> Result<Self, StoreError> {
        let duplicates = self.duplicates();
        if duplicates.is_empty() {
            Ok(self)
        } else {
            Err(StoreError::Duplicates(duplicates))
        }
    }

    /// Look up the single record carrying `id`
    pub fn lookup(&self, id: &ModuleId) -> Result<&ModuleRecord, StoreError> {
        match self.positions.get(id).map(Vec::as_slice) {
            None | Some([]) => Err(StoreError::NotFound(id.clone())),
            Some([pos]) => Ok(&self.records[*pos]),
            Some(many) => Err(StoreError::Ambiguous {
                id: id.clone(),
                count: many.len(),
            }),
        }
    }

    /// Map a command-line identifier onto the dataset.
    ///
    /// A text index spelled exactly like `arg` wins. Otherwise a decimal
    /// `arg` names the integer index with that value when one exists. Any
    /// other argument stays text and fails lookup as not found.
    #[must_use]
    pub fn id_for(&self, arg: &str) -> ModuleId {
        let text = ModuleId::from(arg);
        if self.contains(&text) {
            return text;
        }
        match arg.parse::<i64>() {
            Ok(n) if self.contains(&ModuleId::Int(n)) => ModuleId::Int(n),
            _ => text,
        }
    }

    /// Identifiers carried by more than one record, sorted
    #[must_use]
    pub fn duplicates(&self) -> Vec<ModuleId> {
        let mut dups: Vec<ModuleId> = self
            .positions
            .iter()
            .filter(|(_, pos)| pos.len() > 1)
            .map(|(id, _)| id.clone())
            .collect();
        dups.sort();
        dups
    }

    /// Child references that name no record, as `(parent, child)` pairs
    #[must_use]
    pub fn dangling_children(&self) -> Vec<(ModuleId, ModuleId)> {
        let mut dangling = Vec::new();
        for record in &self.records {
            for child in &record.children {
                if !self.contains(child) {
                    dangling.push((record.index.clone(), child.clone()));
                }
            }
        }
        dangling
    }

    /// Whether any record carries `id`
    #[must_use]
    pub fn contains(&self, id: &ModuleId) -> bool {
        self.positions.contains_key(id)
    }

    /// Number of records (duplicates counted)
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct identifiers in dataset order
    pub fn ids(&self) -> impl Iterator<Item = &ModuleId> {
        self.records
            .iter()
            .enumerate()
            .filter(|(pos, r)| self.positions.get(&r.index).and_then(|p| p.first()) == Some(pos))
            .map(|(_, r)| &r.index)
    }

    /// All records in dataset order
    #[must_use]
    pub fn records(&self) -> &[ModuleRecord] {
        &self.records
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    fn sample() -> ModuleStore {
        ModuleStore::new(vec![
            ModuleRecord::new("a", "module a; endmodule", ["b", "ghost"]),
            ModuleRecord::new("b", "module b; endmodule", Vec::<ModuleId>::new()),
        ])
    }

    #[test]
    fn test_lookup_found() {
        let store = sample();
        assert_eq!(store.lookup(&"b".into()).unwrap().full_code, "module b; endmodule");
    }

    #[test]
    fn test_lookup_not_found() {
        let store = sample();
        assert_eq!(
            store.lookup(&"ghost".into()).unwrap_err(),
            StoreError::NotFound(ModuleId::from("ghost"))
        );
    }

    #[test]
    fn test_duplicates_are_reported_lazily() {
        let store = ModuleStore::new(vec![
            ModuleRecord::new("x", "one", Vec::<ModuleId>::new()),
            ModuleRecord::new("x", "two", Vec::<ModuleId>::new()),
            ModuleRecord::new("y", "three", Vec::<ModuleId>::new()),
        ]);
        assert_eq!(store.len(), 3);
        assert_eq!(
            store.lookup(&"x".into()).unwrap_err(),
            StoreError::Ambiguous {
                id: ModuleId::from("x"),
                count: 2
            }
        );
        assert!(store.lookup(&"y".into()).is_ok());
        assert_eq!(store.ids().count(), 2);
    }

    #[test]
    fn test_strict_fails_fast_on_duplicates() {
        let err = ModuleStore::new(vec![
            ModuleRecord::new("x", "one", Vec::<ModuleId>::new()),
            ModuleRecord::new("x", "two", Vec::<ModuleId>::new()),
        ])
        .into_strict()
        .unwrap_err();
        assert_eq!(err, StoreError::Duplicates(vec![ModuleId::from("x")]));
        assert!(err.to_string().contains("1 duplicated"));
    }

    #[test]
    fn test_strict_accepts_clean_dataset() {
        let store = sample().into_strict().unwrap();
        assert!(store.duplicates().is_empty());
    }

    #[test]
    fn test_dangling_children() {
        let dangling = sample().dangling_children();
        assert_eq!(dangling, vec![(ModuleId::from("a"), ModuleId::from("ghost"))]);
    }

    #[test]
    fn test_empty_store() {
        let store = ModuleStore::default();
        assert!(store.is_empty());
        assert!(!store.contains(&"a".into()));
    }

    #[test]
    fn test_integer_and_text_indices_are_different_modules() {
        let store = ModuleStore::new(vec![
            ModuleRecord::new(7i64, "int", Vec::<ModuleId>::new()),
            ModuleRecord::new("7", "text", Vec::<ModuleId>::new()),
        ])
        .into_strict()
        .unwrap();
        assert_eq!(store.lookup(&ModuleId::Int(7)).unwrap().full_code, "int");
        assert_eq!(store.lookup(&"7".into()).unwrap().full_code, "text");
    }

    #[test]
    fn test_id_for_prefers_text_then_integer() {
        let both = ModuleStore::new(vec![
            ModuleRecord::new(7i64, "int", Vec::<ModuleId>::new()),
            ModuleRecord::new("7", "text", Vec::<ModuleId>::new()),
        ]);
        assert_eq!(both.id_for("7"), ModuleId::from("7"));

        let ints = ModuleStore::new(vec![ModuleRecord::new(
            -3i64,
            "neg",
            Vec::<ModuleId>::new(),
        )]);
        assert_eq!(ints.id_for("-3"), ModuleId::Int(-3));
        assert_eq!(ints.id_for("4"), ModuleId::from("4"));
        assert_eq!(ints.id_for("top"), ModuleId::from("top"));
    }
}
