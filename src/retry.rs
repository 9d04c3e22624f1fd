use std::time::Duration;

use chrono::{DateTime, Utc};

/// Scheduling directive attached to a task retry request.
///
/// The three cases are distinct values, not a nullable field with mixed
/// meanings: no scheduled time at all, a delay relative to "now", or an
/// absolute point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDirective {
    /// No scheduled time; the caller decides (usually retry immediately).
    Unscheduled,

    /// Retry after a relative delay.
    After(Duration),

    /// Retry at an absolute timestamp, regardless of "now".
    At(DateTime<Utc>),
}

/// Absolute next-retry timestamp for a directive, relative to `now`.
///
/// Pure function; `now` is injected so tests stay deterministic. Delays too
/// large to represent clamp to the maximum representable timestamp.
pub fn next_retry_date(directive: &RetryDirective, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match directive {
        RetryDirective::Unscheduled => None,
        RetryDirective::After(delay) => {
            let delta = chrono::Duration::from_std(*delay).unwrap_or(chrono::Duration::MAX);
            Some(now.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC))
        }
        RetryDirective::At(when) => Some(*when),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn sarajevo_morning() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(1914, 6, 28, 10, 50, 0).unwrap()
    }

    #[test]
    fn unscheduled_has_no_retry_date() {
        assert_eq!(next_retry_date(&RetryDirective::Unscheduled, sarajevo_morning()), None);
    }

    #[test]
    fn relative_delay_is_added_to_now() {
        let directive = RetryDirective::After(Duration::from_secs(600));
        assert_eq!(
            next_retry_date(&directive, sarajevo_morning()),
            Some(Utc.with_ymd_and_hms(1914, 6, 28, 11, 0, 0).unwrap()),
        );
    }

    #[test]
    fn absolute_timestamp_ignores_now() {
        let when = Utc.with_ymd_and_hms(1914, 6, 28, 11, 0, 0).unwrap();
        let directive = RetryDirective::At(when);
        assert_eq!(next_retry_date(&directive, sarajevo_morning()), Some(when));
        assert_eq!(next_retry_date(&directive, Utc::now()), Some(when));
    }

    #[test]
    fn oversized_delay_clamps_instead_of_overflowing() {
        let directive = RetryDirective::After(Duration::from_secs(u64::MAX));
        assert_eq!(
            next_retry_date(&directive, sarajevo_morning()),
            Some(DateTime::<Utc>::MAX_UTC),
        );
    }
}
