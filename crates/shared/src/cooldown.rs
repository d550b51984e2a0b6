//! Encounter cooldown lookup.
//!
//! Accounts that jump between distant encounter locations must wait out a
//! cooldown before the next encounter registers. The wait is a monotonic
//! step function of the jump distance, capped at two hours.

/// Upper bound on any cooldown, in seconds (2 hours).
pub const MAX_COOLDOWN_SECS: u32 = 7200;

/// Cooldown steps as `(distance_km, seconds)`, ascending by distance.
const COOLDOWN_STEPS: &[(f64, u32)] = &[
    (0.5, 0),
    (1.0, 60),
    (2.0, 120),
    (4.0, 180),
    (5.0, 240),
    (8.0, 300),
    (10.0, 420),
    (15.0, 540),
    (20.0, 720),
    (25.0, 900),
    (30.0, 1020),
    (40.0, 1200),
    (45.0, 1260),
    (60.0, 1500),
    (80.0, 1800),
    (100.0, 2100),
    (125.0, 2580),
    (150.0, 3000),
    (175.0, 3480),
    (200.0, 3900),
    (250.0, 4500),
    (300.0, 5100),
    (350.0, 6000),
    (400.0, 6600),
    (500.0, 7200),
];

/// Cooldown in seconds for a jump of `distance_km`.
///
/// Zero or negative distances cost nothing; anything beyond the last step
/// saturates at [`MAX_COOLDOWN_SECS`].
pub fn cooldown_secs(distance_km: f64) -> u32 {
    if distance_km <= 0.0 {
        return 0;
    }
    for (km, secs) in COOLDOWN_STEPS {
        if distance_km <= *km {
            return *secs;
        }
    }
    MAX_COOLDOWN_SECS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_and_negative_distance() {
        assert_eq!(cooldown_secs(0.0), 0);
        assert_eq!(cooldown_secs(-3.0), 0);
    }

    #[test]
    fn test_short_hops_are_free() {
        assert_eq!(cooldown_secs(0.1), 0);
        assert_eq!(cooldown_secs(0.5), 0);
    }

    #[test]
    fn test_step_boundaries() {
        assert_eq!(cooldown_secs(0.51), 60);
        assert_eq!(cooldown_secs(1.0), 60);
        assert_eq!(cooldown_secs(1.01), 120);
        assert_eq!(cooldown_secs(10.0), 420);
    }

    #[test]
    fn test_monotonic() {
        let mut prev = 0;
        for km in 1..2000 {
            let secs = cooldown_secs(km as f64);
            assert!(secs >= prev, "not monotonic at {km} km");
            prev = secs;
        }
    }

    #[test]
    fn test_capped_at_two_hours() {
        assert_eq!(cooldown_secs(500.0), MAX_COOLDOWN_SECS);
        assert_eq!(cooldown_secs(1_000.0), MAX_COOLDOWN_SECS);
        assert_eq!(cooldown_secs(40_000.0), MAX_COOLDOWN_SECS);
        for km in 1..1000 {
            assert!(cooldown_secs(km as f64) <= MAX_COOLDOWN_SECS);
        }
    }
}
