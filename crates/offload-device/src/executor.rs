// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Region Executor Abstraction
//!
//! The device layer never interprets image code. Running an entry is delegated
//! to a [`RegionExecutor`] injected at construction time, which receives the
//! entry, the loaded image bytes, the marshalled arguments and (for team
//! regions) the resolved team geometry.

use crate::address_space::AddressSpace;
use crate::entry_table::OffloadEntry;
use crate::types::DeviceAddr;
use offload_config::TeamsConfig;
use tracing::debug;

/// Upper bound on teams per launch
pub const HARD_TEAM_LIMIT: u32 = 1 << 16;
/// Upper bound on threads per team
pub const HARD_THREAD_LIMIT: u32 = 1024;
/// Teams used when neither the caller nor the configuration asks for a count
pub const DEFAULT_NUM_TEAMS: u32 = 128;
/// Threads used when the caller passes no thread limit
pub const DEFAULT_NUM_THREADS: u32 = 128;

/// Error type returned by executors
pub type ExecutorError = Box<dyn std::error::Error + Send + Sync>;

/// One marshalled argument: a device base address plus byte offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionArg {
    pub base: DeviceAddr,
    pub offset: isize,
}

impl RegionArg {
    pub fn new(base: DeviceAddr, offset: isize) -> Self {
        Self { base, offset }
    }

    /// `base + offset`, or `None` on overflow
    pub fn address(&self) -> Option<DeviceAddr> {
        i64::try_from(self.offset)
            .ok()
            .and_then(|off| self.base.0.checked_add(off))
            .map(DeviceAddr)
    }
}

/// Team limits read from configuration; `None` means unset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeamLimits {
    pub team_limit: Option<u32>,
    pub num_teams: Option<u32>,
}

impl TeamLimits {
    /// `(team_limit, num_teams)` with `-1` for unset values
    pub fn as_raw(&self) -> (i32, i32) {
        let raw = |v: Option<u32>| v.and_then(|n| i32::try_from(n).ok()).unwrap_or(-1);
        (raw(self.team_limit), raw(self.num_teams))
    }
}

impl From<&TeamsConfig> for TeamLimits {
    fn from(config: &TeamsConfig) -> Self {
        Self {
            team_limit: config.team_limit(),
            num_teams: config.num_teams(),
        }
    }
}

/// Team geometry as requested by the caller. Non-positive values mean "pick for me".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeamRequest {
    pub num_teams: i32,
    pub thread_limit: i32,
    pub loop_tripcount: u64,
}

/// Team geometry after applying defaults and limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeamLaunch {
    pub num_teams: u32,
    pub thread_limit: u32,
    pub loop_tripcount: u64,
}

impl TeamRequest {
    pub fn new(num_teams: i32, thread_limit: i32, loop_tripcount: u64) -> Self {
        Self {
            num_teams,
            thread_limit,
            loop_tripcount,
        }
    }

    /// Apply configured defaults, then clamp to configured and hard limits
    pub fn resolve(&self, limits: &TeamLimits) -> TeamLaunch {
        let requested = u32::try_from(self.num_teams).ok().filter(|&n| n > 0);
        let team_cap = limits
            .team_limit
            .map_or(HARD_TEAM_LIMIT, |l| l.min(HARD_TEAM_LIMIT));
        let num_teams = requested
            .or(limits.num_teams)
            .unwrap_or(DEFAULT_NUM_TEAMS)
            .min(team_cap)
            .max(1);

        let thread_limit = u32::try_from(self.thread_limit)
            .ok()
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_NUM_THREADS)
            .min(HARD_THREAD_LIMIT);

        TeamLaunch {
            num_teams,
            thread_limit,
            loop_tripcount: self.loop_tripcount,
        }
    }
}

/// Everything an executor sees for one dispatch
#[derive(Debug)]
pub struct RegionLaunch<'a> {
    pub device_id: usize,
    pub entry: &'a OffloadEntry,
    /// Bytes of the currently loaded image (empty if none was kept)
    pub image: &'a [u8],
    pub args: &'a [RegionArg],
    /// Present for team regions only
    pub teams: Option<TeamLaunch>,
    /// Read access to device memory for the duration of the call
    pub address_space: &'a AddressSpace,
}

/// Runs a loaded entry
///
/// Implementations must be thread-safe; dispatch is synchronous.
pub trait RegionExecutor: Send + Sync {
    /// Executor name for logging
    fn name(&self) -> &str;

    /// Execute `launch.entry`
    fn run(&self, launch: &RegionLaunch<'_>) -> Result<(), ExecutorError>;
}

/// Default executor: records the call shape and reports success
#[derive(Debug, Default, Clone, Copy)]
pub struct TraceExecutor;

impl RegionExecutor for TraceExecutor {
    fn name(&self) -> &str {
        "trace"
    }

    fn run(&self, launch: &RegionLaunch<'_>) -> Result<(), ExecutorError> {
        debug!(
            target: "offload-device",
            "[TRACE-EXEC] device {} entry '{}' ({} args, image {} bytes, teams {:?})",
            launch.device_id,
            launch.entry.name,
            launch.args.len(),
            launch.image.len(),
            launch.teams
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_for_unset_request() {
        let launch = TeamRequest::new(0, -1, 10).resolve(&TeamLimits::default());
        assert_eq!(launch.num_teams, DEFAULT_NUM_TEAMS);
        assert_eq!(launch.thread_limit, DEFAULT_NUM_THREADS);
        assert_eq!(launch.loop_tripcount, 10);
    }

    #[test]
    fn test_configured_default_and_limit() {
        let limits = TeamLimits {
            team_limit: Some(32),
            num_teams: Some(64),
        };
        assert_eq!(TeamRequest::default().resolve(&limits).num_teams, 32);

        let limits = TeamLimits {
            team_limit: None,
            num_teams: Some(8),
        };
        assert_eq!(TeamRequest::default().resolve(&limits).num_teams, 8);
        assert_eq!(TeamRequest::new(12, 0, 0).resolve(&limits).num_teams, 12);
    }

    #[test]
    fn test_hard_limits() {
        let launch = TeamRequest::new(i32::MAX, 4096, 0).resolve(&TeamLimits::default());
        assert_eq!(launch.num_teams, HARD_TEAM_LIMIT);
        assert_eq!(launch.thread_limit, HARD_THREAD_LIMIT);

        let limits = TeamLimits {
            team_limit: Some(1 << 20),
            num_teams: None,
        };
        assert_eq!(TeamRequest::new(1 << 18, 1, 0).resolve(&limits).num_teams, HARD_TEAM_LIMIT);
    }

    #[test]
    fn test_limits_as_raw() {
        assert_eq!(TeamLimits::default().as_raw(), (-1, -1));
        let limits = TeamLimits {
            team_limit: Some(4),
            num_teams: None,
        };
        assert_eq!(limits.as_raw(), (4, -1));
    }

    #[test]
    fn test_arg_address() {
        assert_eq!(RegionArg::new(DeviceAddr(16), 8).address(), Some(DeviceAddr(24)));
        assert_eq!(RegionArg::new(DeviceAddr(16), -16).address(), Some(DeviceAddr(0)));
        assert_eq!(RegionArg::new(DeviceAddr(i64::MAX), 1).address(), None);
    }
}
