//! Fault point injection for testing durability
//!
//! A fault point is a named location in the commit path. When armed, the
//! operation at that point fails exactly as if the disk had refused it, so
//! tests can verify that nothing from the refused batch becomes durable.
//!
//! Points are armed either per backend instance through a [`FaultInjector`]
//! or process-wide through the `AEROKV_FAULT_POINT` environment variable.
//!
//! ```bash
//! AEROKV_FAULT_POINT=backend_commit_before_fsync aerokv --config ./aerokv.json put ...
//! ```

use std::collections::HashSet;
use std::sync::{Arc, Mutex, OnceLock};

/// Environment variable naming a process-wide fault point.
pub const FAULT_POINT_ENV: &str = "AEROKV_FAULT_POINT";

static ENV_FAULT_POINT: OnceLock<Option<String>> = OnceLock::new();

#[inline]
fn env_fault_point() -> Option<&'static str> {
    ENV_FAULT_POINT
        .get_or_init(|| std::env::var(FAULT_POINT_ENV).ok())
        .as_deref()
}

/// All defined fault point names
pub mod points {
    /// Commit refused before the batch record is written.
    pub const BACKEND_COMMIT_BEFORE_WRITE: &str = "backend_commit_before_write";
    /// Commit refused after the record is written but before fsync.
    pub const BACKEND_COMMIT_BEFORE_FSYNC: &str = "backend_commit_before_fsync";

    /// Get all fault point names
    pub fn all() -> &'static [&'static str] {
        &[BACKEND_COMMIT_BEFORE_WRITE, BACKEND_COMMIT_BEFORE_FSYNC]
    }

    /// Returns whether `name` is a defined fault point.
    pub fn is_known(name: &str) -> bool {
        all().contains(&name)
    }
}

/// Shared, cloneable set of armed fault points.
///
/// Clones share state, so a test can keep one handle and arm points on a
/// backend it has already handed off.
#[derive(Debug, Clone, Default)]
pub struct FaultInjector {
    armed: Arc<Mutex<HashSet<String>>>,
}

impl FaultInjector {
    /// Creates an injector with nothing armed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms a point. Every pass through it fails until disarmed.
    pub fn arm(&self, name: &str) {
        if let Ok(mut armed) = self.armed.lock() {
            armed.insert(name.to_string());
        }
    }

    /// Disarms a point.
    pub fn disarm(&self, name: &str) {
        if let Ok(mut armed) = self.armed.lock() {
            armed.remove(name);
        }
    }

    /// Disarms every point.
    pub fn clear(&self) {
        if let Ok(mut armed) = self.armed.lock() {
            armed.clear();
        }
    }

    /// Returns true if `name` is armed on this injector or via the environment.
    pub fn should_fail(&self, name: &str) -> bool {
        if env_fault_point() == Some(name) {
            return true;
        }
        self.armed
            .lock()
            .map(|armed| armed.contains(name))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nothing_armed_by_default() {
        let faults = FaultInjector::new();
        for name in points::all() {
            assert!(!faults.should_fail(name));
        }
    }

    #[test]
    fn test_arm_and_disarm() {
        let faults = FaultInjector::new();
        faults.arm(points::BACKEND_COMMIT_BEFORE_WRITE);
        assert!(faults.should_fail(points::BACKEND_COMMIT_BEFORE_WRITE));
        assert!(!faults.should_fail(points::BACKEND_COMMIT_BEFORE_FSYNC));

        faults.disarm(points::BACKEND_COMMIT_BEFORE_WRITE);
        assert!(!faults.should_fail(points::BACKEND_COMMIT_BEFORE_WRITE));
    }

    #[test]
    fn test_clones_share_state() {
        let faults = FaultInjector::new();
        let handle = faults.clone();
        handle.arm(points::BACKEND_COMMIT_BEFORE_FSYNC);
        assert!(faults.should_fail(points::BACKEND_COMMIT_BEFORE_FSYNC));
        faults.clear();
        assert!(!handle.should_fail(points::BACKEND_COMMIT_BEFORE_FSYNC));
    }

    #[test]
    fn test_known_points() {
        assert!(points::is_known("backend_commit_before_write"));
        assert!(!points::is_known("wal_after_fsync"));
    }
}
