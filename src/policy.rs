use chrono::{DateTime, Datelike, TimeZone, Timelike, Weekday};

/// Decide whether the fixed time-of-use schedule permits charging at the
/// given local wall-clock time.
///
/// Allowed: any hour on Saturday and Sunday; weekday hours [0,7), [11,17)
/// and [21,24). Denied: weekday hours [7,11) and [17,21).
///
/// The schedule is defined in the charger owner's local time, so the caller
/// supplies a timestamp in an explicit timezone rather than this function
/// reading an ambient system clock.
pub fn is_charging_allowed<Tz: TimeZone>(t: &DateTime<Tz>) -> bool {
    let hour = t.hour();
    match t.weekday() {
        Weekday::Sat | Weekday::Sun => true,
        _ => hour < 7 || (11..17).contains(&hour) || hour >= 21,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 30, 0).unwrap()
    }

    #[test]
    fn weekends_always_allowed() {
        // 2024-02-03 is a Saturday, 2024-02-04 a Sunday
        for hour in 0..24 {
            assert!(is_charging_allowed(&utc(2024, 2, 3, hour)));
            assert!(is_charging_allowed(&utc(2024, 2, 4, hour)));
        }
    }

    #[test]
    fn weekday_schedule() {
        // 2024-02-05 is a Monday
        assert!(is_charging_allowed(&utc(2024, 2, 5, 6)));
        assert!(!is_charging_allowed(&utc(2024, 2, 5, 7)));
        assert!(!is_charging_allowed(&utc(2024, 2, 5, 8)));
        assert!(is_charging_allowed(&utc(2024, 2, 5, 11)));
        assert!(is_charging_allowed(&utc(2024, 2, 5, 12)));
        assert!(!is_charging_allowed(&utc(2024, 2, 5, 17)));
        assert!(!is_charging_allowed(&utc(2024, 2, 5, 19)));
        assert!(is_charging_allowed(&utc(2024, 2, 5, 21)));
        assert!(is_charging_allowed(&utc(2024, 2, 5, 22)));
    }

    #[test]
    fn timezone_is_an_explicit_input() {
        // One instant, two zones: 08:00 UTC on a Monday is denied, but the
        // same instant is 13:00 in UTC+5, which is allowed.
        let instant = utc(2024, 2, 5, 8);
        assert!(!is_charging_allowed(&instant));
        let east = instant.with_timezone(&FixedOffset::east_opt(5 * 3600).unwrap());
        assert!(is_charging_allowed(&east));
    }
}
