//! VM shape classification.
//!
//! Shape auto-detection itself is an external collaborator's job, but the
//! network actuator's smart-activation rules dispatch on the result, so the
//! taxonomy lives here.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShapeClass {
    /// Shared-tenancy shapes (e.g. the provider's "E2"-like offerings):
    /// reclamation is evaluated primarily on CPU P95 and network.
    SharedTenancy,
    /// Dedicated-ARM shapes (e.g. "A1"-like offerings): reclamation checks
    /// all three metrics independently; any one above threshold is enough
    /// to avoid reclamation.
    DedicatedArm,
    /// Detection was unavailable or inconclusive.
    Unknown,
}

impl ShapeClass {
    /// Parse a shape-class name leniently (case-insensitive, a couple of
    /// common aliases), falling back to `Unknown` rather than erroring —
    /// this only affects which smart-activation rule applies, never safety.
    pub fn from_str_lenient(raw: &str) -> ShapeClass {
        match raw.trim().to_ascii_lowercase().as_str() {
            "shared" | "shared_tenancy" | "e2" => ShapeClass::SharedTenancy,
            "dedicated" | "dedicated_arm" | "a1" => ShapeClass::DedicatedArm,
            _ => ShapeClass::Unknown,
        }
    }
}

impl Default for ShapeClass {
    fn default() -> Self {
        ShapeClass::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str_lenient_known_aliases() {
        assert_eq!(ShapeClass::from_str_lenient("E2"), ShapeClass::SharedTenancy);
        assert_eq!(ShapeClass::from_str_lenient("a1"), ShapeClass::DedicatedArm);
        assert_eq!(ShapeClass::from_str_lenient("dedicated_arm"), ShapeClass::DedicatedArm);
    }

    #[test]
    fn test_from_str_lenient_unknown_falls_back() {
        assert_eq!(ShapeClass::from_str_lenient("something else"), ShapeClass::Unknown);
        assert_eq!(ShapeClass::from_str_lenient(""), ShapeClass::Unknown);
    }
}
