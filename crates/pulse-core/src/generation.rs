//! Generation tokens that fence off superseded connections.
//!
//! The session advances its counter every time it enters `Connecting` and
//! again when it tears the link down. Asynchronous work remembers the
//! generation it started under and compares it with the live value before
//! applying any result.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// A connection epoch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Generation(u64);

impl Generation {
    /// The generation before any connection attempt.
    pub const ZERO: Generation = Generation(0);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Shared, monotonically increasing generation counter.
///
/// Clones observe the same counter.
#[derive(Debug, Clone, Default)]
pub struct GenerationCounter(Arc<AtomicU64>);

impl GenerationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move to a new generation and return it.
    pub fn advance(&self) -> Generation {
        Generation(self.0.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// The live generation.
    pub fn current(&self) -> Generation {
        Generation(self.0.load(Ordering::SeqCst))
    }

    /// Whether `generation` is still the live one.
    pub fn is_current(&self, generation: Generation) -> bool {
        self.current() == generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_starts_at_zero() {
        let counter = GenerationCounter::new();
        assert_eq!(counter.current(), Generation::ZERO);
        assert!(counter.is_current(Generation::ZERO));
    }

    #[test]
    fn test_advance_is_monotonic() {
        let counter = GenerationCounter::new();
        let first = counter.advance();
        let second = counter.advance();
        assert!(second > first);
        assert_eq!(second.value(), 2);
        assert!(!counter.is_current(first));
        assert!(counter.is_current(second));
    }

    #[test]
    fn test_clones_share_state() {
        let counter = GenerationCounter::new();
        let clone = counter.clone();
        let g = clone.advance();
        assert!(counter.is_current(g));
    }

    #[test]
    fn test_display() {
        assert_eq!(Generation::new(7).to_string(), "#7");
    }
}
