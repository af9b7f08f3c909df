//! Dataset integrity command handler

use super::load_store;
use crate::commands::CheckArgs;
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output::ProgressReporter;
use hdlcov::{ModuleId, ModuleStore};

/// Integrity findings for a dataset
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrityReport {
    /// Records in the dataset
    pub records: usize,
    /// Distinct module identifiers
    pub modules: usize,
    /// Identifiers shared by more than one record
    pub duplicates: Vec<ModuleId>,
    /// `(parent, child)` references to absent modules
    pub dangling: Vec<(ModuleId, ModuleId)>,
}

impl IntegrityReport {
    /// Inspect a store
    #[must_use]
    pub fn from_store(store: &ModuleStore) -> Self {
        Self {
            records: store.len(),
            modules: store.ids().count(),
            duplicates: store.duplicates(),
            dangling: store.dangling_children(),
        }
    }

}

/// Execute the check command
pub fn execute_check(config: &CliConfig, args: &CheckArgs) -> CliResult<()> {
    let reporter = ProgressReporter::new(config.color.should_color(), config.verbosity.is_quiet());
    let store = load_store(&args.dataset)?;
    let report = IntegrityReport::from_store(&store);

    reporter.info(&format!(
        "{} records, {} distinct modules",
        report.records, report.modules
    ));
    for (parent, child) in &report.dangling {
        reporter.warning(&format!("{parent} references missing module {child}"));
    }
    for id in &report.duplicates {
        reporter.failure(&format!("Duplicate module index {id}"));
    }

    // Dangling references are tolerated; the resolver skips them by default
    store
        .into_strict()
        .map_err(|e| CliError::integrity(e.to_string()))?;
    reporter.success("No duplicate module indices");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::Verbosity;
    use crate::handlers::test_support::write_dataset;
    use hdlcov::ModuleRecord;

    #[test]
    fn test_report_clean_store_with_dangling() {
        let dir = tempfile::tempdir().unwrap();
        let store = load_store(&write_dataset(dir.path())).unwrap();
        let report = IntegrityReport::from_store(&store);
        assert_eq!(report.records, 3);
        assert_eq!(report.modules, 3);
        assert!(report.duplicates.is_empty());
        assert_eq!(
            report.dangling,
            vec![(ModuleId::from("mid"), ModuleId::from("ghost"))]
        );
    }

    #[test]
    fn test_report_duplicates() {
        let store = ModuleStore::new(vec![
            ModuleRecord::new("a", "x", Vec::<&str>::new()),
            ModuleRecord::new("a", "y", Vec::<&str>::new()),
            ModuleRecord::new("b", "z", ["a"]),
        ]);
        let report = IntegrityReport::from_store(&store);
        assert_eq!(report.records, 3);
        assert_eq!(report.modules, 2);
        assert_eq!(report.duplicates, vec![ModuleId::from("a")]);
    }

    #[test]
    fn test_execute_fails_on_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dup.jsonl");
        std::fs::write(
            &path,
            "{\"index\": \"1\", \"full_code\": \"a\"}\n{\"index\": \"1\", \"full_code\": \"b\"}\n",
        )
        .unwrap();
        let config = CliConfig::new().with_verbosity(Verbosity::Quiet);
        let err = execute_check(&config, &CheckArgs { dataset: path }).unwrap_err();
        assert!(matches!(err, CliError::Integrity { .. }));
        assert!(err.to_string().contains("1 duplicated module indices: 1"));
    }

    #[test]
    fn test_execute_accepts_integer_and_text_twins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("twins.jsonl");
        std::fs::write(
            &path,
            "{\"index\": 1, \"full_code\": \"a\"}\n{\"index\": \"1\", \"full_code\": \"b\"}\n",
        )
        .unwrap();
        let config = CliConfig::new().with_verbosity(Verbosity::Quiet);
        execute_check(&config, &CheckArgs { dataset: path }).unwrap();
    }
}
