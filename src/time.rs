//! Timestamp conversions for the various epochs archives use.
//!
//! ZIP headers store MS-DOS timestamps.
//! A DOS time packs `hours:5 minutes:6 seconds/2:5` into 16 bits,
//! and a DOS date packs `years since 1980:7 month:4 day:5` into another 16.
//! Archivers in the wild write all sorts of nonsense into these,
//! so decoding clamps each field into its valid range instead of failing.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};

/// The earliest representable DOS timestamp, 1980-01-01 00:00:00
pub fn dos_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1980, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .expect("1980-01-01 is a valid date")
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map_or(28, |last| last.day())
}

/// Decodes a DOS (time, date) pair, clamping out-of-range fields.
pub fn parse_msdos(time: u16, date: u16) -> NaiveDateTime {
    let seconds = ((0b0000_0000_0001_1111 & time) as u32 * 2).min(59); // MSDOS uses 2-second precision
    let minutes = ((0b0000_0111_1110_0000 & time) as u32 >> 5).min(59);
    let hours = ((0b1111_1000_0000_0000 & time) as u32 >> 11).min(23);

    // MSDOS uses years since 1980; Always interpreted as a positive value
    let years = ((0b1111_1110_0000_0000 & date) >> 9) as i32 + 1980;
    let months = ((0b0000_0001_1110_0000 & date) as u32 >> 5).clamp(1, 12);
    let days = ((0b0000_0000_0001_1111 & date) as u32).clamp(1, days_in_month(years, months));

    NaiveDate::from_ymd_opt(years, months, days)
        .and_then(|d| d.and_hms_opt(hours, minutes, seconds))
        .unwrap_or_else(dos_epoch)
}

/// Encodes a timestamp as a DOS (time, date) pair.
///
/// Seconds are truncated to an even number. Times before 1980 clamp to
/// 1980-01-01 00:00:00 and times after 2107 clamp to 2107-12-31 23:59:58.
pub fn to_msdos(when: &NaiveDateTime) -> (u16, u16) {
    if when.year() < 1980 {
        return (0, (1 << 5) | 1);
    }
    if when.year() > 2107 {
        return (
            (23 << 11) | (59 << 5) | 29,
            (127 << 9) | (12 << 5) | 31,
        );
    }
    let time = (when.hour() << 11) | (when.minute() << 5) | (when.second() / 2);
    let date = (((when.year() - 1980) as u32) << 9) | (when.month() << 5) | when.day();
    (time as u16, date as u16)
}

/// Converts seconds since the Unix epoch, as tar headers
/// and the extended timestamp extra field store them.
pub fn from_unix(seconds: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp(seconds, 0).map(|utc| utc.naive_utc())
}

/// Seconds since the Unix epoch, dropping any fraction
pub fn to_unix(when: &NaiveDateTime) -> i64 {
    when.and_utc().timestamp()
}

fn filetime_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1601, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .expect("1601-01-01 is a valid date")
}

const TICKS_PER_SECOND: u64 = 10_000_000;

/// Converts a Windows FILETIME (100ns ticks since 1601-01-01),
/// as stored in the NTFS extra field.
pub fn from_filetime(ticks: u64) -> NaiveDateTime {
    let seconds = Duration::seconds((ticks / TICKS_PER_SECOND) as i64);
    let nanos = Duration::nanoseconds(((ticks % TICKS_PER_SECOND) * 100) as i64);
    filetime_epoch()
        .checked_add_signed(seconds + nanos)
        .unwrap_or(NaiveDateTime::MAX)
}

/// Converts to a Windows FILETIME. Times before 1601 clamp to zero.
pub fn to_filetime(when: &NaiveDateTime) -> u64 {
    let seconds = (*when - filetime_epoch()).num_seconds();
    if seconds < 0 {
        return 0;
    }
    seconds as u64 * TICKS_PER_SECOND + (when.nanosecond() as u64 % 1_000_000_000) / 100
}

#[cfg(test)]
mod test {
    use super::*;

    fn ymd_hms(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn round_trip_truncates_to_even_seconds() {
        let when = ymd_hms(2021, 7, 14, 13, 37, 43);
        let (time, date) = to_msdos(&when);
        assert_eq!(parse_msdos(time, date), ymd_hms(2021, 7, 14, 13, 37, 42));
    }

    #[test]
    fn clamps_out_of_range_years() {
        let (time, date) = to_msdos(&ymd_hms(1970, 1, 1, 0, 0, 0));
        assert_eq!(parse_msdos(time, date), dos_epoch());

        let (time, date) = to_msdos(&ymd_hms(2200, 6, 1, 12, 0, 0));
        assert_eq!(parse_msdos(time, date), ymd_hms(2107, 12, 31, 23, 59, 58));
    }

    #[test]
    fn filetime_keeps_tick_precision() {
        // 2009-07-25 23:59:59.1234567
        let ticks = 128_930_399_991_234_567;
        let when = from_filetime(ticks);
        assert_eq!(when.date(), NaiveDate::from_ymd_opt(2009, 7, 25).unwrap());
        assert_eq!(to_filetime(&when), ticks);
        assert_eq!(to_filetime(&ymd_hms(1500, 1, 1, 0, 0, 0)), 0);
    }

    #[test]
    fn unix_seconds() {
        let when = ymd_hms(2001, 9, 9, 1, 46, 40);
        assert_eq!(to_unix(&when), 1_000_000_000);
        assert_eq!(from_unix(1_000_000_000), Some(when));
    }

    #[test]
    fn clamps_garbage_fields() {
        // Month 0, day 0
        assert_eq!(parse_msdos(0, 0), dos_epoch());
        // February 31st, 1981 becomes the 28th.
        let date = (1 << 9) | (2 << 5) | 31;
        assert_eq!(parse_msdos(0, date), ymd_hms(1981, 2, 28, 0, 0, 0));
        // 31 * 2 = 62 seconds, 63 minutes, 31 hours
        let time = (31 << 11) | (63 << 5) | 31;
        assert_eq!(
            parse_msdos(time, (1 << 5) | 1),
            ymd_hms(1980, 1, 1, 23, 59, 59)
        );
    }
}
