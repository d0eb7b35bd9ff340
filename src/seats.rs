//! Seat accounting for a license.
//!
//! A seat is held by every machine with a non-expired registration for the
//! licensed product. The decision here is pure; the caller supplies the
//! active set it read (inside the write transaction for the authoritative
//! check).

use crate::errors::{LicenseError, LicenseResult};
use crate::models::Machine;

/// Outcome of a seat check for one machine code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeatDecision {
    /// The machine already holds a seat; re-activation does not consume another.
    AlreadyActive,
    /// A free seat is available for a new machine.
    Available,
}

/// Current usage of a license's seats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeatUsage {
    pub in_use: usize,
    pub seat_count: i64,
}

impl SeatUsage {
    pub fn new(in_use: usize, seat_count: i64) -> Self {
        Self { in_use, seat_count }
    }

    /// Seats still free, never negative (an over-committed license reports 0).
    pub fn available(&self) -> i64 {
        (self.seat_count - self.in_use as i64).max(0)
    }

    pub fn is_full(&self) -> bool {
        self.in_use as i64 >= self.seat_count
    }
}

/// Decide whether `machine_code` may activate given the currently active machines.
///
/// Machine codes compare exactly. Fails with `SeatLimitExceeded` when the
/// machine is new and every seat is taken.
pub fn check_seat(
    active: &[Machine],
    machine_code: &str,
    seat_count: i64,
) -> LicenseResult<SeatDecision> {
    if active.iter().any(|m| m.machine_code == machine_code) {
        return Ok(SeatDecision::AlreadyActive);
    }

    let usage = SeatUsage::new(active.len(), seat_count);
    if usage.is_full() {
        return Err(LicenseError::SeatLimitExceeded {
            in_use: usage.in_use,
            seat_count,
        });
    }
    Ok(SeatDecision::Available)
}
