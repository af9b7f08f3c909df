//! hdlcov: dependency closures and sandboxed coverage runs for HDL datasets
//!
//! A dataset is a collection of modules, each with an identifier, its source
//! text and the identifiers of the modules it instantiates. hdlcov computes
//! the transitive closure needed to compile any starting set as one
//! self-contained unit, hands that unit to Verilator inside an enroot
//! sandbox, and turns the resulting coverage log into counters.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  dataset ──► ModuleStore ──► resolve() ──► SandboxRunner        │
//! │  (jsonl)     (read-only)     (BFS closure)  (enroot+verilator)  │
//! │                                                  │              │
//! │                       BatchDriver ◄── coverage ◄─┘              │
//! │                       (worker pool, JSON summary)               │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use hdlcov::{resolve, ModuleRecord, ModuleStore, ResolveOptions};
//!
//! let store = ModuleStore::new(vec![
//!     ModuleRecord::new("A", "a", ["B", "C"]),
//!     ModuleRecord::new("B", "b", Vec::<&str>::new()),
//!     ModuleRecord::new("C", "a", ["B"]),
//! ]);
//! let closure = resolve(&store, ["A"], ResolveOptions::default()).unwrap();
//! assert_eq!(closure.code_units, vec!["a", "b"]);
//! ```

#![warn(missing_docs)]

pub mod batch;
pub mod coverage;
pub mod dataset;
pub mod resolver;
mod result;
pub mod sandbox;
pub mod store;

pub use batch::{
    jobs_per_module, load_jobs, BatchConfig, BatchDriver, BatchReport, Job, UnitReport, UnitStatus,
};
pub use coverage::{parse_coverage_log, parse_coverage_text, CoverageSummary};
pub use dataset::{load_dataset, to_pretty_json, write_json, ModuleId, ModuleRecord};
pub use resolver::{resolve, DedupPolicy, Resolution, ResolveError, ResolveOptions};
pub use result::{HdlcovError, HdlcovResult};
pub use sandbox::{Isolation, Outcome, RunReport, SandboxConfig, SandboxRunner};
pub use store::{ModuleStore, StoreError};
