use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use slog::{Logger, info};

/// Seeds a generator from `seed`, or from the OS when absent. The seed in use
/// is logged so a campaign can be replayed.
pub fn seeded_rng(seed: Option<u64>, logger: &Logger) -> StdRng {
    let seed = seed.unwrap_or_else(|| rand::rng().next_u64());
    info!(logger, "The seed used for input generation is {}", seed);
    StdRng::seed_from_u64(seed)
}

/// `start + duration`, saturating at the largest representable instant.
pub fn deadline(start: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|duration| start.checked_add_signed(duration))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// `now - age`, saturating at the earliest representable instant.
pub fn cutoff(now: DateTime<Utc>, age: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(age)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rand::Rng;

    use super::*;

    #[test]
    fn fixed_seeds_replay() {
        let logger = Logger::root(slog::Discard, slog::o!());
        let a: u64 = seeded_rng(Some(7), &logger).random();
        let b: u64 = seeded_rng(Some(7), &logger).random();
        assert_eq!(a, b);
    }

    #[test]
    fn deadline_adds_and_saturates() {
        let start = Utc.timestamp_opt(100, 0).unwrap();
        assert_eq!(
            deadline(start, Duration::from_secs(5)),
            Utc.timestamp_opt(105, 0).unwrap()
        );
        assert_eq!(deadline(start, Duration::MAX), DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn cutoff_subtracts_and_saturates() {
        let now = Utc.timestamp_opt(100, 0).unwrap();
        assert_eq!(
            cutoff(now, Duration::from_secs(30)),
            Utc.timestamp_opt(70, 0).unwrap()
        );
        assert_eq!(cutoff(now, Duration::MAX), DateTime::<Utc>::MIN_UTC);
    }
}
