//! I/O adapters: repositories, the oracle, the terminal and the workspace.

pub mod actions;
pub mod config;
pub mod evidence_store;
pub mod git;
pub mod interact;
pub mod oracle;
pub mod process;
pub mod prompt;
pub mod repo;
