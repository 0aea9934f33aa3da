// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Error types for memory-kind allocation

use crate::space::MemorySpace;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemKindError {
    /// The memory space has no kind group
    #[error("Unsupported memory space: {0:?}")]
    UnsupportedMemorySpace(MemorySpace),

    /// The backend found no resources of the requested kind
    #[error("No {space:?} resources available on backend '{backend}'")]
    EmptyKindGroup { space: MemorySpace, backend: String },

    /// The backend refused to create an arena
    #[error("Arena creation failed on backend '{backend}' ({space:?}, pool {pool_size} bytes)")]
    ArenaCreation {
        backend: String,
        space: MemorySpace,
        pool_size: usize,
    },

    /// None of the library file names could be opened
    #[error("Failed to load backend library (tried {tried}): {reason}")]
    LibraryLoad { tried: String, reason: String },

    /// A required symbol is missing from the library
    #[error("Backend library '{library}' lacks required symbol '{symbol}'")]
    MissingSymbol { library: String, symbol: String },

    /// A kind the backend cannot work without failed its availability check
    #[error("Backend library '{library}' reports kind '{kind}' unavailable")]
    KindUnavailable { library: String, kind: String },

    /// The backend has been unloaded
    #[error("Backend '{0}' has been shut down")]
    BackendShutDown(String),
}

pub type Result<T> = std::result::Result<T, MemKindError>;
