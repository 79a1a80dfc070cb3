//! Property test for the reclone jitter function: it must always land
//! strictly inside `[0, d)`, for any repository name and any duration.

use std::time::Duration;

use gitserver_core::maintenance::reclone::jitter;
use proptest::prelude::*;

proptest! {
    #[test]
    fn jitter_is_always_within_bound(key in ".*", secs in 1u64..1_000_000) {
        let d = Duration::from_secs(secs);
        let offset = jitter(&key, d);
        prop_assert!(offset < d);
    }

    #[test]
    fn jitter_is_deterministic_for_same_inputs(key in ".*", secs in 1u64..1_000_000) {
        let d = Duration::from_secs(secs);
        prop_assert_eq!(jitter(&key, d), jitter(&key, d));
    }
}

#[test]
fn jitter_of_zero_duration_is_zero() {
    assert_eq!(jitter("anything", Duration::ZERO), Duration::ZERO);
}
