//! Oracle-driven repository analysis and cloud deployment.
//!
//! A run reads a repository (directory, zip, tar or git URL), lets a language
//! model walk it until the runtime facts are known, then lets the same model
//! author a provisioning configuration and a deployment script and drive the
//! commands that apply them. The architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (target classification, listing
//!   normalization, evidence and reply parsing, the conversation log).
//! - **[`io`]**: Side-effecting adapters (repository backends, the oracle
//!   client, prompts, the terminal, process execution, config files).
//!
//! Orchestration modules ([`analysis`], [`deploy`], [`workspace`],
//! [`pipeline`]) combine the two to implement `deployflow deploy`.

pub mod analysis;
pub mod core;
pub mod deploy;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod workspace;
