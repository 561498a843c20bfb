// libs/appointment-cell/src/services/validation.rs
use chrono::{
    DateTime, Datelike, Duration, FixedOffset, Months, NaiveDate, NaiveTime, Offset,
    TimeZone, Timelike, Utc, Weekday,
};
use tracing::warn;

use shared_config::AppConfig;

use crate::models::AppointmentError;

/// Clinic booking window. All calendar checks happen in clinic local time.
#[derive(Debug, Clone)]
pub struct SchedulingRules {
    pub horizon_months: u32,
    pub open_hour: u32,
    pub close_hour: u32,
    pub slot_minutes: u32,
    pub clinic_offset: FixedOffset,
}

impl Default for SchedulingRules {
    fn default() -> Self {
        Self {
            horizon_months: 6,
            open_hour: 8,
            close_hour: 18,
            slot_minutes: 30,
            clinic_offset: utc_offset(),
        }
    }
}

impl SchedulingRules {
    pub fn from_config(config: &AppConfig) -> Self {
        let clinic_offset = config
            .clinic_utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| {
                warn!(
                    "CLINIC_UTC_OFFSET_MINUTES={} is out of range, falling back to UTC",
                    config.clinic_utc_offset_minutes
                );
                utc_offset()
            });

        Self {
            horizon_months: config.booking_horizon_months,
            clinic_offset,
            ..Self::default()
        }
    }

    pub fn local(&self, instant: DateTime<Utc>) -> DateTime<FixedOffset> {
        instant.with_timezone(&self.clinic_offset)
    }

    /// Runs every booking rule against `instant`. The first violation wins.
    pub fn validate(&self, instant: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), AppointmentError> {
        self.check_future(instant, now)?;
        self.check_horizon(instant, now)?;
        self.check_weekday(instant)?;
        self.check_working_hours(instant)?;
        self.check_slot_alignment(instant)
    }

    pub fn check_future(&self, instant: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), AppointmentError> {
        if instant <= now {
            return Err(AppointmentError::InvalidDate("must be in the future".to_string()));
        }
        Ok(())
    }

    pub fn check_horizon(&self, instant: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), AppointmentError> {
        if instant > self.horizon_end(now) {
            return Err(AppointmentError::InvalidDate("exceeds booking horizon".to_string()));
        }
        Ok(())
    }

    pub fn check_weekday(&self, instant: DateTime<Utc>) -> Result<(), AppointmentError> {
        if matches!(self.local(instant).weekday(), Weekday::Sat | Weekday::Sun) {
            return Err(AppointmentError::InvalidDate("weekends not bookable".to_string()));
        }
        Ok(())
    }

    pub fn check_working_hours(&self, instant: DateTime<Utc>) -> Result<(), AppointmentError> {
        let hour = self.local(instant).hour();
        if hour < self.open_hour || hour >= self.close_hour {
            return Err(AppointmentError::InvalidDate("outside working hours".to_string()));
        }
        Ok(())
    }

    pub fn check_slot_alignment(&self, instant: DateTime<Utc>) -> Result<(), AppointmentError> {
        let local = self.local(instant);
        let aligned = local.minute() % self.slot_minutes == 0
            && local.second() == 0
            && local.nanosecond() == 0;
        if !aligned {
            return Err(AppointmentError::InvalidSlot("must align to half-hour".to_string()));
        }
        Ok(())
    }

    /// Latest bookable instant, `horizon_months` calendar months after `now`.
    pub fn horizon_end(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_add_months(Months::new(self.horizon_months))
            .unwrap_or_else(|| now + Duration::days(31 * i64::from(self.horizon_months)))
    }

    /// Every slot start between opening and closing on a clinic-local date,
    /// ignoring whether the date is bookable.
    pub fn slots_on(&self, date: NaiveDate) -> Vec<DateTime<Utc>> {
        let mut slots = Vec::new();
        let mut minutes = self.open_hour * 60;
        while minutes < self.close_hour * 60 {
            let start = NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0)
                .map(|time| date.and_time(time))
                .and_then(|naive| self.clinic_offset.from_local_datetime(&naive).single());
            if let Some(start) = start {
                slots.push(start.with_timezone(&Utc));
            }
            minutes += self.slot_minutes;
        }
        slots
    }
}

fn utc_offset() -> FixedOffset {
    Utc.fix()
}
