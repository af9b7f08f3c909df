//! Command handlers - one module per subcommand
//!
//! Each handler module contains the execution logic for a CLI command,
//! pure rendering helpers, and tests for both.

pub mod batch;
pub mod check;
pub mod config;
pub mod init_env;
pub mod parse;
pub mod resolve;
pub mod run;

pub use batch::execute_batch;
pub use check::execute_check;
pub use config::{execute_config, load_sandbox_config};
pub use init_env::execute_init_env;
pub use parse::execute_parse;
pub use resolve::execute_resolve;
pub use run::execute_run;

use crate::error::{CliError, CliResult};
use hdlcov::ModuleStore;
use std::path::Path;

/// Load a dataset file into a store
pub fn load_store(path: &Path) -> CliResult<ModuleStore> {
    if !path.exists() {
        return Err(CliError::invalid_argument(format!(
            "Dataset file not found: {}",
            path.display()
        )));
    }
    let records = hdlcov::load_dataset(path)?;
    tracing::info!(path = %path.display(), records = records.len(), "loaded dataset");
    Ok(ModuleStore::new(records))
}

/// Build the multi-threaded runtime that drives sandbox runs
pub(crate) fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new()
        .map_err(|e| CliError::config(format!("Failed to create runtime: {e}")))
}


#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_load_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = test_support::write_dataset(dir.path());
        let store = load_store(&path).unwrap();
        assert_eq!(store.len(), 3);
        assert!(store.contains(&"leaf".into()));
    }

    #[test]
    fn test_load_store_missing_file() {
        let err = load_store(Path::new("/nonexistent/dataset.jsonl")).unwrap_err();
        assert!(err.to_string().contains("Dataset file not found"));
    }

    #[test]
    fn test_load_store_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.jsonl");
        std::fs::write(&path, "{\"index\": 1, \"full_code\": \"x\"}\nnot json\n").unwrap();
        let err = load_store(&path).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
