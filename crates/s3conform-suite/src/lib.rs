//! s3conform suite
//!
//! The scenario catalog, an in-memory reference service that can emulate any
//! quirk set, the sequential runner and its JSON/JUnit reports. The
//! `s3conform` binary wires these together behind a small CLI.

#![warn(missing_docs)]

pub mod checksums;
pub mod cli;
pub mod config;
pub mod error;
pub mod memory;
pub mod report;
pub mod runner;
pub mod scenarios;

pub use checksums::checksum_of;
pub use config::{connect, QuirkConfig, ServiceDefinition};
pub use error::{Result, ServiceError, SuiteError};
pub use memory::{MemoryProvider, MemorySession};
pub use report::{CaseReport, RunReport};
pub use runner::{Runner, ScenarioFilter};
pub use scenarios::catalog;
