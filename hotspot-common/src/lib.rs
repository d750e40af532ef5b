//! Shared record layouts for the hotspot aggregation tables
//!
//! These types are the values stored in the per-unit scratch slots and the
//! three bounded aggregation tables. They must be:
//! - `#[repr(C)]` for a stable memory layout
//! - `no_std` compatible so the same layouts can back kernel-side maps
//! - fixed-size: text fields are null-padded byte buffers, never heap strings

#![cfg_attr(not(feature = "userspace"), no_std)]

use core::fmt;

/// Reference capacity of the per-entity CPU time table.
pub const PID_STATS_CAPACITY: usize = 10_240;

/// Reference capacity of the directed handoff-pair table.
pub const CONTENTION_CAPACITY: usize = 2_048;

/// Reference capacity of the per-entity page fault table.
pub const FAULT_CAPACITY: usize = 4_096;

/// Width of a task name buffer (kernel `TASK_COMM_LEN`).
pub const COMM_LEN: usize = 16;

/// Width of a resource-group path buffer.
pub const GROUP_PATH_LEN: usize = 64;

/// Written into a group path when hierarchy resolution fails.
pub const SENTINEL: &[u8] = b"n/a";

/// Fixed-width, null-padded text buffer.
///
/// Writes always zero the whole buffer first and keep at least one trailing
/// NUL, so at most `N - 1` bytes of content are stored. A buffer whose first
/// byte is NUL is considered empty.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedStr<const N: usize>([u8; N]);

impl<const N: usize> FixedStr<N> {
    pub const EMPTY: Self = Self([0; N]);

    /// Build a buffer from raw bytes, truncating to capacity.
    pub fn from_bytes(src: &[u8]) -> Self {
        let mut buf = Self::EMPTY;
        buf.write_truncated(src);
        buf
    }

    pub const fn capacity() -> usize {
        N
    }

    pub fn is_empty(&self) -> bool {
        N == 0 || self.0[0] == 0
    }

    pub fn clear(&mut self) {
        self.0 = [0; N];
    }

    /// Replace the contents with `src` up to its first NUL, truncated to
    /// `N - 1` bytes. Returns the number of content bytes written.
    pub fn write_truncated(&mut self, src: &[u8]) -> usize {
        self.clear();
        if N == 0 {
            return 0;
        }
        let len = src
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(src.len())
            .min(N - 1);
        self.0[..len].copy_from_slice(&src[..len]);
        len
    }

    /// Replace the contents with the resolution-failure sentinel.
    pub fn write_sentinel(&mut self) {
        self.write_truncated(SENTINEL);
    }

    pub fn is_sentinel(&self) -> bool {
        self.as_bytes() == SENTINEL
    }

    /// Content bytes up to (not including) the first NUL.
    pub fn as_bytes(&self) -> &[u8] {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(N);
        &self.0[..end]
    }

    pub fn raw(&self) -> &[u8; N] {
        &self.0
    }

    pub fn raw_mut(&mut self) -> &mut [u8; N] {
        &mut self.0
    }

    #[cfg(feature = "userspace")]
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(self.as_bytes()).into_owned()
    }
}

impl<const N: usize> Default for FixedStr<N> {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl<const N: usize> fmt::Debug for FixedStr<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match core::str::from_utf8(self.as_bytes()) {
            Ok(s) => write!(f, "{:?}", s),
            Err(_) => write!(f, "{:?}", self.as_bytes()),
        }
    }
}

impl<const N: usize> fmt::Display for FixedStr<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.as_bytes();
        match core::str::from_utf8(bytes) {
            Ok(s) => f.write_str(s),
            Err(e) => {
                let valid = core::str::from_utf8(&bytes[..e.valid_up_to()])
                    .unwrap_or("");
                f.write_str(valid)?;
                f.write_str("\u{FFFD}")
            }
        }
    }
}

/// Task name buffer.
pub type Comm = FixedStr<COMM_LEN>;

/// Resource-group path buffer.
pub type GroupPath = FixedStr<GROUP_PATH_LEN>;

/// Scratch state of one execution unit: the entity currently running on it
/// and when it was switched in.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "userspace", derive(PartialEq, Eq))]
pub struct UnitState {
    pub entity_id: u32,
    pub _padding: u32,
    pub timestamp_ns: u64,
}

impl UnitState {
    pub const fn new(entity_id: u32, timestamp_ns: u64) -> Self {
        Self {
            entity_id,
            _padding: 0,
            timestamp_ns,
        }
    }
}

/// Accumulated on-CPU time of one entity.
///
/// Layout (88 bytes total, 8-byte aligned):
/// - cpu_time_ns: total nanoseconds observed as the outgoing entity
/// - comm: task name captured at the first switch-out, frozen once set
/// - cgroup: resource-group leaf name (or parent, or `"n/a"`), frozen once set
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "userspace", derive(PartialEq, Eq))]
pub struct PidStat {
    pub cpu_time_ns: u64,
    pub comm: Comm,
    pub cgroup: GroupPath,
}

/// Page fault count of one entity.
///
/// Layout (72 bytes total, 8-byte aligned).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "userspace", derive(PartialEq, Eq))]
pub struct FaultStat {
    pub faults: u64,
    pub cgroup: GroupPath,
}

/// Directed handoff pair packed as `victim << 32 | aggressor`.
///
/// The victim is the entity switched out, the aggressor the one switched in.
/// `(5, 7)` and `(7, 5)` are distinct keys.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentionKey(u64);

impl ContentionKey {
    /// Pack a pair. Returns `None` if either side is entity 0.
    pub const fn new(victim: u32, aggressor: u32) -> Option<Self> {
        if victim == 0 || aggressor == 0 {
            return None;
        }
        Some(Self(((victim as u64) << 32) | aggressor as u64))
    }

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    pub const fn victim(self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub const fn aggressor(self) -> u32 {
        (self.0 & 0xffff_ffff) as u32
    }
}

#[cfg(feature = "userspace")]
const _: () = {
    assert!(
        core::mem::size_of::<UnitState>() == 16,
        "UnitState must be exactly 16 bytes"
    );
    assert!(
        core::mem::align_of::<UnitState>() == 8,
        "UnitState must be 8-byte aligned"
    );
};

#[cfg(feature = "userspace")]
const _: () = {
    assert!(
        core::mem::size_of::<PidStat>() == 88,
        "PidStat must be exactly 88 bytes"
    );
    assert!(
        core::mem::size_of::<FaultStat>() == 72,
        "FaultStat must be exactly 72 bytes"
    );
    assert!(
        core::mem::size_of::<ContentionKey>() == 8,
        "ContentionKey must be exactly 8 bytes"
    );
};
