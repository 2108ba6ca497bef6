use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{ERR_INVALID_FREQUENCY, ERR_INVALID_TIME_OF_DAY};
use crate::error::{AppError, Result};

/// Recurrence rule frequency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScheduleFrequency {
    Daily,
    Weekly,
    Monthly,
}

impl ScheduleFrequency {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "DAILY" => Ok(Self::Daily),
            "WEEKLY" => Ok(Self::Weekly),
            "MONTHLY" => Ok(Self::Monthly),
            _ => Err(AppError::Validation(ERR_INVALID_FREQUENCY.to_string())),
        }
    }
}

/// Schedule record stored in redb, keyed by the settings profile id
///
/// `next_run_at` is null exactly when the schedule is disabled. The anchor
/// fields pin the weekly/monthly recurrence to the weekday and day-of-month
/// the rule was last written on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleRecord {
    pub enabled: bool,
    pub frequency: ScheduleFrequency,
    /// 24-hour "HH:mm"
    pub time_of_day: String,
    /// 0 = Monday .. 6 = Sunday
    pub anchor_weekday: u8,
    /// 1-31; clamped to the last day of short months
    pub anchor_day_of_month: u8,
    pub next_run_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ScheduleRecord {
    /// Next trigger time strictly after `from` (Unix timestamp, UTC)
    ///
    /// Never returns a value <= `from`, so a delayed tick always re-arms
    /// into the future instead of re-using a stale slot.
    pub fn next_occurrence_after(&self, from: i64) -> Result<i64> {
        let (hours, minutes) = validate_time_of_day(&self.time_of_day)
            .map_err(|_| AppError::Validation(ERR_INVALID_TIME_OF_DAY.to_string()))?;
        let from_dt = DateTime::from_timestamp(from, 0)
            .ok_or_else(|| AppError::Validation("Invalid timestamp".to_string()))?;

        match self.frequency {
            ScheduleFrequency::Daily => self.next_daily(from_dt, from, hours, minutes),
            ScheduleFrequency::Weekly => self.next_weekly(from_dt, from, hours, minutes),
            ScheduleFrequency::Monthly => self.next_monthly(from_dt, from, hours, minutes),
        }
    }

    fn next_daily(
        &self,
        from_dt: DateTime<Utc>,
        from: i64,
        hours: u32,
        minutes: u32,
    ) -> Result<i64> {
        let today = from_dt
            .date_naive()
            .and_hms_opt(hours, minutes, 0)
            .ok_or_else(|| AppError::Validation(ERR_INVALID_TIME_OF_DAY.to_string()))?
            .and_utc();

        // Today if the time hasn't passed yet, otherwise tomorrow
        if today.timestamp() > from {
            Ok(today.timestamp())
        } else {
            Ok((today + Duration::days(1)).timestamp())
        }
    }

    fn next_weekly(
        &self,
        from_dt: DateTime<Utc>,
        from: i64,
        hours: u32,
        minutes: u32,
    ) -> Result<i64> {
        for days_ahead in 0..=7 {
            let date = from_dt.date_naive() + Duration::days(days_ahead);
            if date.weekday().num_days_from_monday() as u8 != self.anchor_weekday {
                continue;
            }
            let candidate = date
                .and_hms_opt(hours, minutes, 0)
                .ok_or_else(|| AppError::Validation(ERR_INVALID_TIME_OF_DAY.to_string()))?
                .and_utc();
            if candidate.timestamp() > from {
                return Ok(candidate.timestamp());
            }
        }
        Err(AppError::Validation(
            "Failed to find next weekly occurrence".to_string(),
        ))
    }

    fn next_monthly(
        &self,
        from_dt: DateTime<Utc>,
        from: i64,
        hours: u32,
        minutes: u32,
    ) -> Result<i64> {
        for month_offset in 0..24 {
            let total_months = from_dt.month() as i32 + month_offset;
            let year = from_dt.year() + (total_months - 1) / 12;
            let month = ((total_months - 1) % 12 + 1) as u32;

            // Months without the anchor day clamp to their last day
            let day = (self.anchor_day_of_month as u32).min(days_in_month(year, month));

            let candidate = NaiveDate::from_ymd_opt(year, month, day)
                .and_then(|d| d.and_hms_opt(hours, minutes, 0))
                .ok_or_else(|| AppError::Validation(ERR_INVALID_TIME_OF_DAY.to_string()))?
                .and_utc();
            if candidate.timestamp() > from {
                return Ok(candidate.timestamp());
            }
        }
        Err(AppError::Validation(
            "Failed to find next monthly occurrence".to_string(),
        ))
    }
}

/// Schedule model for API responses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub settings_id: String,
    pub enabled: bool,
    pub frequency: ScheduleFrequency,
    pub time_of_day: String,
    /// RFC3339; absent while the schedule is disabled
    pub next_run_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Schedule {
    pub fn from_record(settings_id: &str, record: &ScheduleRecord) -> Self {
        Self {
            settings_id: settings_id.to_string(),
            enabled: record.enabled,
            frequency: record.frequency,
            time_of_day: record.time_of_day.clone(),
            next_run_at: record.next_run_at.map(timestamp_to_rfc3339),
            created_at: timestamp_to_rfc3339(record.created_at),
            updated_at: timestamp_to_rfc3339(record.updated_at),
        }
    }
}

/// Convert Unix timestamp to RFC3339 string, defaulting to now if invalid
pub fn timestamp_to_rfc3339(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .unwrap_or_else(Utc::now)
        .to_rfc3339()
}

/// Validate `time` against 24-hour "HH:mm" and return (hours, minutes)
///
/// Accepts one- or two-digit hours (0-23) and exactly two-digit minutes.
pub fn validate_time_of_day(time: &str) -> std::result::Result<(u32, u32), String> {
    let err = || ERR_INVALID_TIME_OF_DAY.to_string();

    let (h, m) = time.split_once(':').ok_or_else(err)?;
    if h.is_empty() || h.len() > 2 || !h.bytes().all(|b| b.is_ascii_digit()) {
        return Err(err());
    }
    if m.len() != 2 || !m.bytes().all(|b| b.is_ascii_digit()) {
        return Err(err());
    }

    let hours: u32 = h.parse().map_err(|_| err())?;
    let minutes: u32 = m.parse().map_err(|_| err())?;
    if hours >= 24 || minutes >= 60 {
        return Err(err());
    }

    Ok((hours, minutes))
}

fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if (year % 4 == 0 && year % 100 != 0) || year % 400 == 0 {
                29
            } else {
                28
            }
        }
        _ => 30,
    }
}
