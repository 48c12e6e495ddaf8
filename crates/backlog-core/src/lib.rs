pub mod backlog;
pub mod config;
pub mod error;
pub mod github;
pub mod importer;
pub mod io;
pub mod issue;
pub mod jira;
pub mod keys;
pub mod linker;
pub mod mapping;
pub mod paths;
pub mod reconcile;
pub mod report;
pub mod schedule;
pub mod types;
pub mod verification;

pub use error::{BacklogError, Result};
