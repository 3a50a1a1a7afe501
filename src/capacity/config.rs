//! Capacity configuration binder
//!
//! Maps the engine's `io_capacity.total` option to per-class capacities and
//! the background-flush threshold. Per-class capacities may also be set
//! directly, overriding the derived split.

use super::error::{CapacityError, CapacityResult};
use super::ThrottleClass;

/// Minimum non-zero capacity in bytes/sec accepted for any class or total
pub const THROTTLE_MIN: u64 = 1_000_000;

/// Checkpoint share of the total, percent
const CKPT_PCT: u64 = 10;
/// Eviction share of the total, percent
const EVICT_PCT: u64 = 60;
/// Log share of the total, percent
const LOG_PCT: u64 = 20;
/// Read share of the total, percent
const READ_PCT: u64 = 60;

/// Flush threshold as a percentage of the summed write-class capacities
const THRESHOLD_PCT: u64 = 10;

/// Capacity configuration for one storage-engine connection
///
/// The shares deliberately sum past 100%: the classes do not all saturate
/// at once, and the aggregate clock enforces the real ceiling.
#[derive(Debug, Clone, Default)]
pub struct CapacityConfig {
    /// Aggregate budget in bytes/sec, 0 = uncapped
    total: u64,
    /// Direct per-class settings, overriding the derived split
    overrides: [Option<u64>; ThrottleClass::COUNT],
}

impl CapacityConfig {
    /// Create an uncapped configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the aggregate budget in bytes/sec (0 = uncapped)
    pub fn with_total(mut self, bytes_per_sec: u64) -> Self {
        self.total = bytes_per_sec;
        self
    }

    /// Set one class's capacity directly, overriding the derived split
    pub fn with_class_capacity(mut self, class: ThrottleClass, bytes_per_sec: u64) -> Self {
        self.overrides[class as usize] = Some(bytes_per_sec);
        self
    }

    /// Aggregate budget in bytes/sec
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Validate every configured value against the engine minimum
    pub fn validate(&self) -> CapacityResult<()> {
        check_minimum(self.total)?;
        for v in self.overrides.iter().flatten() {
            check_minimum(*v)?;
        }
        Ok(())
    }

    /// Resolve the per-class capacities and flush threshold
    pub fn resolve(&self) -> CapacityResult<ResolvedCapacity> {
        self.validate()?;

        let mut classes = if self.total > 0 {
            [
                self.total * CKPT_PCT / 100,
                self.total * EVICT_PCT / 100,
                self.total * LOG_PCT / 100,
                self.total * READ_PCT / 100,
            ]
        } else {
            [0; ThrottleClass::COUNT]
        };
        for (slot, v) in classes.iter_mut().zip(self.overrides.iter()) {
            if let Some(v) = v {
                *slot = *v;
            }
        }

        let ckpt = classes[ThrottleClass::Ckpt as usize];
        let evict = classes[ThrottleClass::Evict as usize];
        let log = classes[ThrottleClass::Log as usize];
        let threshold = (ckpt + evict + log) * THRESHOLD_PCT / 100;

        Ok(ResolvedCapacity {
            total: self.total,
            classes,
            threshold,
        })
    }
}

/// Per-class capacities and flush threshold derived from a configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedCapacity {
    /// Aggregate budget in bytes/sec
    pub total: u64,
    /// Per-class capacities, indexed by `ThrottleClass as usize`
    pub classes: [u64; ThrottleClass::COUNT],
    /// Bytes written before the flusher issues a background fsync
    pub threshold: u64,
}

fn check_minimum(value: u64) -> CapacityResult<()> {
    if value != 0 && value < THROTTLE_MIN {
        return Err(CapacityError::BelowMinimum {
            value,
            minimum: THROTTLE_MIN,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_split() {
        let resolved = CapacityConfig::new()
            .with_total(10_000_000)
            .resolve()
            .unwrap();
        assert_eq!(resolved.classes[ThrottleClass::Ckpt as usize], 1_000_000);
        assert_eq!(resolved.classes[ThrottleClass::Evict as usize], 6_000_000);
        assert_eq!(resolved.classes[ThrottleClass::Log as usize], 2_000_000);
        assert_eq!(resolved.classes[ThrottleClass::Read as usize], 6_000_000);
        // (1M + 6M + 2M) * 10%
        assert_eq!(resolved.threshold, 900_000);
    }

    #[test]
    fn test_uncapped_total_resolves_to_zeroes() {
        let resolved = CapacityConfig::new().resolve().unwrap();
        assert_eq!(resolved.total, 0);
        assert_eq!(resolved.classes, [0; 4]);
        assert_eq!(resolved.threshold, 0);
    }

    #[test]
    fn test_class_override_replaces_derived_value() {
        let resolved = CapacityConfig::new()
            .with_total(10_000_000)
            .with_class_capacity(ThrottleClass::Log, 5_000_000)
            .resolve()
            .unwrap();
        assert_eq!(resolved.classes[ThrottleClass::Log as usize], 5_000_000);
        // Threshold reflects the override: (1M + 6M + 5M) * 10%
        assert_eq!(resolved.threshold, 1_200_000);
    }

    #[test]
    fn test_override_without_total() {
        let resolved = CapacityConfig::new()
            .with_class_capacity(ThrottleClass::Log, 1_000_000)
            .resolve()
            .unwrap();
        assert_eq!(resolved.total, 0);
        assert_eq!(resolved.classes[ThrottleClass::Log as usize], 1_000_000);
        assert_eq!(resolved.classes[ThrottleClass::Ckpt as usize], 0);
        assert_eq!(resolved.threshold, 100_000);
    }

    #[test]
    fn test_below_minimum_rejected() {
        let err = CapacityConfig::new().with_total(512).resolve().unwrap_err();
        match err {
            CapacityError::BelowMinimum { value, minimum } => {
                assert_eq!(value, 512);
                assert_eq!(minimum, THROTTLE_MIN);
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = CapacityConfig::new()
            .with_class_capacity(ThrottleClass::Read, THROTTLE_MIN - 1)
            .resolve()
            .unwrap_err();
        assert!(matches!(err, CapacityError::BelowMinimum { .. }));
    }

    #[test]
    fn test_zero_is_always_valid() {
        assert!(CapacityConfig::new()
            .with_total(0)
            .with_class_capacity(ThrottleClass::Evict, 0)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let config = CapacityConfig::new().with_total(50_000_000);
        assert_eq!(config.resolve().unwrap(), config.resolve().unwrap());
    }
}
