//! Daily wall-clock scheduling

use chrono::{DateTime, Duration, NaiveTime, TimeZone};

/// Parse a "HH:MM" time of day
pub fn parse_run_at(text: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(text.trim(), "%H:%M").ok()
}

/// Next occurrence of `at` strictly after `now`, in `now`'s timezone.
///
/// When a DST gap swallows the local time, the run moves forward by the gap;
/// when the local time is ambiguous, the earlier instant is used.
pub fn next_run_after<Tz: TimeZone>(now: &DateTime<Tz>, at: NaiveTime) -> DateTime<Tz> {
    let tz = now.timezone();
    let mut day = now.date_naive();

    loop {
        let local = day.and_time(at);
        let candidate = tz
            .from_local_datetime(&local)
            .earliest()
            .or_else(|| tz.from_local_datetime(&(local + Duration::hours(1))).earliest());

        if let Some(candidate) = candidate {
            if candidate > *now {
                return candidate;
            }
        }
        day = day.succ_opt().unwrap_or(day);
    }
}

/// Time left until the next run, never negative
pub fn until_next_run<Tz: TimeZone>(now: &DateTime<Tz>, at: NaiveTime) -> std::time::Duration {
    (next_run_after(now, at) - now.clone())
        .to_std()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::Guayaquil;
    use chrono_tz::Europe::Berlin;

    fn seven() -> NaiveTime {
        NaiveTime::from_hms_opt(7, 0, 0).unwrap()
    }

    #[test]
    fn parse_run_at_accepts_hh_mm() {
        assert_eq!(parse_run_at("07:00"), Some(seven()));
        assert_eq!(parse_run_at("7am"), None);
    }

    #[test]
    fn runs_later_same_day() {
        let now = Guayaquil.with_ymd_and_hms(2026, 2, 1, 5, 30, 0).unwrap();
        let next = next_run_after(&now, seven());
        assert_eq!(next, Guayaquil.with_ymd_and_hms(2026, 2, 1, 7, 0, 0).unwrap());
    }

    #[test]
    fn runs_next_day_once_passed() {
        let now = Guayaquil.with_ymd_and_hms(2026, 2, 1, 7, 0, 0).unwrap();
        let next = next_run_after(&now, seven());
        assert_eq!(next, Guayaquil.with_ymd_and_hms(2026, 2, 2, 7, 0, 0).unwrap());
    }

    #[test]
    fn skips_dst_gap() {
        // 2026-03-29 02:30 does not exist in Berlin
        let now = Berlin.with_ymd_and_hms(2026, 3, 29, 0, 0, 0).unwrap();
        let at = NaiveTime::from_hms_opt(2, 30, 0).unwrap();
        let next = next_run_after(&now, at);
        assert_eq!(next, Berlin.with_ymd_and_hms(2026, 3, 29, 3, 30, 0).unwrap());
    }

    #[test]
    fn until_next_run_is_positive() {
        let now = Guayaquil.with_ymd_and_hms(2026, 2, 1, 6, 0, 0).unwrap();
        assert_eq!(until_next_run(&now, seven()).as_secs(), 3600);
    }
}
