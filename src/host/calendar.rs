//! Calendar position of the host and its conversion to epoch start seconds.

/// Cumulative days before the first of each month in a common year.
const DAYS_BEFORE_MONTH: [u32; 12] = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334];

/// Number of days in `month` (1-12); 0 for an invalid month.
pub fn days_in_month(month: u32, leap_year: bool) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if leap_year => 29,
        2 => 28,
        _ => 0,
    }
}

/// Days elapsed in the year before the first of `month`.
///
/// Invalid months map to the start of the year.
pub fn days_before_month(month: u32, leap_year: bool) -> u32 {
    if !(1..=12).contains(&month) {
        return 0;
    }
    let base = DAYS_BEFORE_MONTH[(month - 1) as usize];
    if leap_year && month > 2 { base + 1 } else { base }
}

/// Where the host currently is in its calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarPosition {
    /// Month (1-12).
    pub month: u32,
    /// Day of month (1-based).
    pub day_of_month: u32,
    /// Hour of day (1-24, hour ending).
    pub hour_of_day: u32,
    /// Whether the current year is a leap year.
    pub leap_year: bool,
}

impl CalendarPosition {
    /// Seconds from the start of the year to the start of the current hour.
    ///
    /// This is the epoch start handed to external models when a communication
    /// epoch begins.
    pub fn start_seconds(&self) -> f64 {
        let days = days_before_month(self.month, self.leap_year) + self.day_of_month.saturating_sub(1);
        let hours = 24 * days + self.hour_of_day.saturating_sub(1);
        f64::from(hours) * 3600.0
    }
}
