//! FAT timestamps.

use chrono::{Datelike, Local, Timelike};
use core::fmt;

const MIN_YEAR: u16 = 1980;
const MAX_YEAR: u16 = 2107;

/// A date and time in the packed 32-bit FAT layout.
///
/// | bits   | field            |
/// |--------|------------------|
/// | 31..25 | year - 1980      |
/// | 24..21 | month (1-12)     |
/// | 20..16 | day (1-31)       |
/// | 15..11 | hour (0-23)      |
/// | 10..5  | minute (0-59)    |
/// | 4..0   | second / 2       |
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FatTimestamp(u32);

impl FatTimestamp {
    /// Packs the given fields. The year is clamped to 1980..=2107, the
    /// seconds lose their lowest bit.
    pub fn pack(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        let year = u32::from(year.clamp(MIN_YEAR, MAX_YEAR) - MIN_YEAR);
        let raw = (year << 25)
            | ((u32::from(month) & 0xF) << 21)
            | ((u32::from(day) & 0x1F) << 16)
            | ((u32::from(hour) & 0x1F) << 11)
            | ((u32::from(minute) & 0x3F) << 5)
            | ((u32::from(second) / 2) & 0x1F);
        Self(raw)
    }

    /// Wraps a raw packed value.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw packed value.
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Current local time.
    pub fn now() -> Self {
        let now = Local::now();
        Self::pack(
            u16::try_from(now.year()).unwrap_or(MIN_YEAR),
            now.month() as u8,
            now.day() as u8,
            now.hour() as u8,
            now.minute() as u8,
            now.second() as u8,
        )
    }

    /// Full year, 1980-2107.
    pub fn year(self) -> u16 {
        (self.0 >> 25) as u16 + MIN_YEAR
    }

    /// Month, 1-12.
    pub fn month(self) -> u8 {
        ((self.0 >> 21) & 0xF) as u8
    }

    /// Day of the month.
    pub fn day(self) -> u8 {
        ((self.0 >> 16) & 0x1F) as u8
    }

    /// Hour, 0-23.
    pub fn hour(self) -> u8 {
        ((self.0 >> 11) & 0x1F) as u8
    }

    /// Minute, 0-59.
    pub fn minute(self) -> u8 {
        ((self.0 >> 5) & 0x3F) as u8
    }

    /// Seconds, always even.
    pub fn second(self) -> u8 {
        ((self.0 & 0x1F) * 2) as u8
    }

    pub(crate) fn to_date(self) -> fatfs::Date {
        fatfs::Date {
            year: self.year(),
            month: u16::from(self.month()),
            day: u16::from(self.day()),
        }
    }

    pub(crate) fn to_date_time(self) -> fatfs::DateTime {
        fatfs::DateTime {
            date: self.to_date(),
            time: fatfs::Time {
                hour: u16::from(self.hour()),
                min: u16::from(self.minute()),
                sec: u16::from(self.second()),
                millis: 0,
            },
        }
    }
}

impl From<fatfs::DateTime> for FatTimestamp {
    fn from(dt: fatfs::DateTime) -> Self {
        Self::pack(
            dt.date.year,
            dt.date.month as u8,
            dt.date.day as u8,
            dt.time.hour as u8,
            dt.time.min as u8,
            dt.time.sec as u8,
        )
    }
}

impl fmt::Display for FatTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year(),
            self.month(),
            self.day(),
            self.hour(),
            self.minute(),
            self.second()
        )
    }
}

/// Timestamp callback: the current local time in FAT layout.
pub fn get_fattime() -> u32 {
    FatTimestamp::now().raw()
}

/// Feeds `get_fattime` to the engine so directory entries carry the same
/// packed layout.
#[derive(Debug)]
pub(crate) struct FatTimeProvider;

pub(crate) static TIME_PROVIDER: FatTimeProvider = FatTimeProvider;

impl fatfs::TimeProvider for FatTimeProvider {
    fn get_current_date(&self) -> fatfs::Date {
        FatTimestamp::from_raw(get_fattime()).to_date()
    }

    fn get_current_date_time(&self) -> fatfs::DateTime {
        FatTimestamp::from_raw(get_fattime()).to_date_time()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_layout() {
        let ts = FatTimestamp::pack(2024, 3, 15, 13, 45, 31);
        let expected = (44 << 25) | (3 << 21) | (15 << 16) | (13 << 11) | (45 << 5) | 15;
        assert_eq!(ts.raw(), expected);
        assert_eq!(ts.year(), 2024);
        assert_eq!(ts.month(), 3);
        assert_eq!(ts.day(), 15);
        assert_eq!(ts.hour(), 13);
        assert_eq!(ts.minute(), 45);
        assert_eq!(ts.second(), 30);
    }

    #[test]
    fn test_epoch_and_clamp() {
        let epoch = FatTimestamp::pack(1980, 1, 1, 0, 0, 0);
        assert_eq!(epoch.raw(), (1 << 21) | (1 << 16));
        assert_eq!(FatTimestamp::pack(1970, 1, 1, 0, 0, 0), epoch);
        assert_eq!(FatTimestamp::pack(2200, 1, 1, 0, 0, 0).year(), 2107);
    }

    #[test]
    fn test_engine_date_time_round_trip() {
        let ts = FatTimestamp::pack(2031, 12, 31, 23, 59, 58);
        assert_eq!(FatTimestamp::from(ts.to_date_time()), ts);
        assert_eq!(ts.to_string(), "2031-12-31 23:59:58");
    }

    #[test]
    fn test_now_is_plausible() {
        let now = FatTimestamp::from_raw(get_fattime());
        assert!(now.year() >= 2020);
        assert!((1..=12).contains(&now.month()));
        assert!((1..=31).contains(&now.day()));
    }
}
