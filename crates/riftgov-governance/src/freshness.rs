use chrono::{DateTime, Duration, Utc};

/// Descriptors this old or older are expired.
pub const MAX_DESCRIPTOR_AGE_DAYS: i64 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Expired { age: Duration },
    /// The timestamp could not be read; treated as expired by the validator.
    Unparseable,
}

/// Compare a descriptor timestamp against `now`.
///
/// Expired when `now - timestamp >= max_age`. Timestamps in the future are
/// always fresh.
pub fn check_freshness(timestamp: &str, now: DateTime<Utc>, max_age: Duration) -> Freshness {
    let Some(issued) = riftgov_types::parse_timestamp(timestamp) else {
        return Freshness::Unparseable;
    };
    let age = now - issued;
    if age >= max_age {
        Freshness::Expired { age }
    } else {
        Freshness::Fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
    }

    fn max_age() -> Duration {
        Duration::days(MAX_DESCRIPTOR_AGE_DAYS)
    }

    fn stamp(dt: DateTime<Utc>) -> String {
        dt.to_rfc3339()
    }

    #[test]
    fn eighty_nine_days_is_fresh() {
        let ts = stamp(now() - Duration::days(89));
        assert_eq!(check_freshness(&ts, now(), max_age()), Freshness::Fresh);
    }

    #[test]
    fn ninety_days_and_a_second_is_expired() {
        let ts = stamp(now() - Duration::days(90) - Duration::seconds(1));
        assert!(matches!(
            check_freshness(&ts, now(), max_age()),
            Freshness::Expired { .. }
        ));
    }

    #[test]
    fn exactly_ninety_days_is_expired() {
        let ts = stamp(now() - Duration::days(90));
        assert!(matches!(
            check_freshness(&ts, now(), max_age()),
            Freshness::Expired { .. }
        ));
    }

    #[test]
    fn future_timestamp_is_fresh() {
        let ts = stamp(now() + Duration::days(400));
        assert_eq!(check_freshness(&ts, now(), max_age()), Freshness::Fresh);
    }

    #[test]
    fn z_suffix_is_accepted() {
        assert_eq!(
            check_freshness("2026-05-30T00:00:00Z", now(), max_age()),
            Freshness::Fresh
        );
    }

    #[test]
    fn garbage_is_unparseable() {
        assert_eq!(
            check_freshness("last tuesday", now(), max_age()),
            Freshness::Unparseable
        );
    }
}
