// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # offload-observability
//!
//! Unified observability infrastructure for the offload runtime.
//!
//! Provides consistent logging setup across all workspace crates with
//! per-crate debug flag support.
//!
//! ## Features
//! - `file-logging`: JSON log file per run (desktop only)

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cli;
pub mod init;

pub use cli::*;
pub use init::*;

/// Known workspace crate names for debug flags
pub const KNOWN_CRATES: &[&str] = &[
    "offload",
    "offload-config",
    "offload-device",
    "offload-memkind",
];
