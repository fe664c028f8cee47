//! automate-me - local task launcher
//!
//! Discovers plugins in a repository-local and a user-global scope, merges
//! their task manifests, and runs a chosen task through its plugin process.
//!
//! This library exposes the resolution engine for both the CLI binary and
//! integration testing.

pub mod config;
pub mod discovery;
pub mod dispatch;
pub mod inputs;
pub mod manifest;
pub mod paths;
pub mod plugins;
pub mod specs;
