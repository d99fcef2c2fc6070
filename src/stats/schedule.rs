use time::{Date, OffsetDateTime, Time, UtcOffset};

/// First instant (00:00:00 UTC, day 1) of the month after `now`.
pub fn next_month_start(now: OffsetDateTime) -> OffsetDateTime {
    let now = now.to_offset(UtcOffset::UTC);
    let (year, month) = match now.month() {
        time::Month::December => (now.year() + 1, time::Month::January),
        m => (now.year(), m.next()),
    };
    // Day 1 exists in every month.
    let date = Date::from_calendar_date(year, month, 1).unwrap_or(now.date());
    date.with_time(Time::MIDNIGHT).assume_utc()
}

/// How long to sleep until the next snapshot boundary.
pub fn until_next_snapshot(now: OffsetDateTime) -> std::time::Duration {
    let wait = next_month_start(now) - now;
    std::time::Duration::try_from(wait).unwrap_or(std::time::Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn mid_month_rolls_to_first_of_next() {
        assert_eq!(
            next_month_start(datetime!(2026-10-19 13:45:00 UTC)),
            datetime!(2026-11-01 00:00:00 UTC)
        );
    }

    #[test]
    fn december_rolls_year() {
        assert_eq!(
            next_month_start(datetime!(2026-12-31 23:59:59 UTC)),
            datetime!(2027-01-01 00:00:00 UTC)
        );
    }

    #[test]
    fn exact_boundary_waits_a_full_month() {
        assert_eq!(
            next_month_start(datetime!(2027-02-01 00:00:00 UTC)),
            datetime!(2027-03-01 00:00:00 UTC)
        );
    }

    #[test]
    fn non_utc_input_is_normalized() {
        assert_eq!(
            next_month_start(datetime!(2026-10-31 22:00:00 -05:00)),
            datetime!(2026-12-01 00:00:00 UTC)
        );
    }

    #[test]
    fn wait_is_positive() {
        let wait = until_next_snapshot(datetime!(2026-10-31 23:00:00 UTC));
        assert_eq!(wait, std::time::Duration::from_secs(3600));
    }
}
