// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Error type of the runtime facade

use offload_config::ConfigError;
use offload_device::DeviceError;
use offload_memkind::MemKindError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OffloadError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    MemKind(#[from] MemKindError),

    /// Device id outside `[0, number_of_devices)` at a checked boundary
    #[error("Invalid device id {id} (runtime has {count} devices)")]
    InvalidDevice { id: usize, count: usize },

    #[error("Runtime has been shut down")]
    ShutDown,

    #[error("Logging initialization failed: {0}")]
    Logging(String),
}

pub type Result<T> = std::result::Result<T, OffloadError>;
