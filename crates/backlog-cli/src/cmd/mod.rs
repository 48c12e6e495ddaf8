pub mod config;
pub mod github;
pub mod import;
pub mod issues;
pub mod map;
pub mod parse;
pub mod report;
pub mod sync;
