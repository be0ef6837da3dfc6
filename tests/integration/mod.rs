//! Integration test suite for reposerve
//!
//! End-to-end tests of the manifest service and the `reposerve` binary.
//! Repositories are faked in-process unless a test needs real git, and the
//! external tools are replaced by small shell scripts.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! RUST_LOG=service=debug,cache=info cargo test --test integration -- --nocapture
//! ```
//!
//! # Test Organization
//!
//! - **service_flow**: request flow, caching by commit, `no_cache`, file access
//! - **directory_sources**: plain YAML/JSON sources, list expansion, labelling
//! - **concurrency**: working directory exclusion, single flight, render limit, cancellation
//! - **renderers**: plugins, Helm, ksonnet and Kustomize through the service
//! - **git_backed**: the git client against real local repositories
//! - **cli**: the `reposerve` command line

#[path = "../common/mod.rs"]
mod common;

mod cli;
mod concurrency;
mod directory_sources;
mod git_backed;
mod renderers;
mod service_flow;
