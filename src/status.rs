// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! C-style status codes for plugin-style call boundaries

use std::fmt::Display;
use tracing::debug;

pub const OFFLOAD_SUCCESS: i32 = 0;
pub const OFFLOAD_FAIL: i32 = !0;

/// Collapse a result into [`OFFLOAD_SUCCESS`] / [`OFFLOAD_FAIL`], logging the error
pub fn to_status<T, E: Display>(result: std::result::Result<T, E>) -> i32 {
    match result {
        Ok(_) => OFFLOAD_SUCCESS,
        Err(e) => {
            debug!(target: "offload", "Call failed: {}", e);
            OFFLOAD_FAIL
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(OFFLOAD_FAIL, -1);
        assert_eq!(to_status::<(), String>(Ok(())), OFFLOAD_SUCCESS);
        assert_eq!(to_status::<(), _>(Err("boom")), OFFLOAD_FAIL);
    }
}
