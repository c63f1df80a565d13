//! Date/time values carried by calendar records.
//!
//! Inputs arrive as loose ISO-8601 strings. Naive date-times stay floating until
//! the gateway resolves them in the configured timezone, after which only UTC
//! instants and all-day dates reach the store.

use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{CalDavError, CalDavResult};

/// Timezone applied to floating inputs when none is configured.
pub const DEFAULT_TIMEZONE: &str = "America/New_York";

/// Read-side display pattern (day/month/year hour:minute).
pub const DISPLAY_FORMAT: &str = "%d/%m/%Y %H:%M";

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordTime {
    /// All-day value
    Date(NaiveDate),
    Utc(DateTime<Utc>),
    /// Wall-clock time with no zone attached yet
    Floating(NaiveDateTime),
}

impl RecordTime {
    /// Parse an ISO-8601 style input: a date, an RFC 3339 timestamp, or a naive date-time.
    pub fn parse(input: &str) -> CalDavResult<Self> {
        let s = input.trim();

        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(RecordTime::Utc(dt.with_timezone(&Utc)));
        }

        for format in NAIVE_FORMATS {
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
                return Ok(RecordTime::Floating(dt));
            }
        }

        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return Ok(RecordTime::Date(date));
        }

        Err(CalDavError::InvalidParameters(format!(
            "Invalid date/time '{}'. Expected YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS",
            input
        )))
    }

    /// Resolve a floating value in `tz`, converting it to UTC.
    ///
    /// Ambiguous local times pick the earliest instant; local times skipped by a
    /// DST transition are rejected.
    pub fn resolve_in(self, tz: Tz) -> CalDavResult<Self> {
        match self {
            RecordTime::Floating(naive) => tz
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| RecordTime::Utc(dt.with_timezone(&Utc)))
                .ok_or_else(|| {
                    CalDavError::InvalidParameters(format!(
                        "Local time {} does not exist in {}",
                        naive, tz
                    ))
                }),
            other => Ok(other),
        }
    }

    /// Start of the value as a UTC instant (dates start at midnight, floating is read as UTC).
    pub fn to_utc(&self) -> DateTime<Utc> {
        match self {
            RecordTime::Date(d) => d.and_time(NaiveTime::MIN).and_utc(),
            RecordTime::Utc(dt) => *dt,
            RecordTime::Floating(dt) => dt.and_utc(),
        }
    }

    /// Render with [`DISPLAY_FORMAT`]; dates render without a time part.
    pub fn display(&self) -> String {
        match self {
            RecordTime::Date(d) => d.format("%d/%m/%Y").to_string(),
            RecordTime::Utc(dt) => dt.format(DISPLAY_FORMAT).to_string(),
            RecordTime::Floating(dt) => dt.format(DISPLAY_FORMAT).to_string(),
        }
    }

    /// iCalendar value text; `VALUE=DATE` must be added by the caller for dates.
    pub fn to_ics_value(&self) -> String {
        match self {
            RecordTime::Date(d) => d.format("%Y%m%d").to_string(),
            RecordTime::Utc(dt) => dt.format("%Y%m%dT%H%M%SZ").to_string(),
            RecordTime::Floating(dt) => dt.format("%Y%m%dT%H%M%S").to_string(),
        }
    }

    /// Parse an iCalendar DATE or DATE-TIME value, honouring an optional TZID.
    ///
    /// Unknown TZIDs degrade to a floating value rather than failing.
    pub fn from_ics_value(value: &str, tzid: Option<&str>, is_date: bool) -> Option<Self> {
        let value = value.trim();

        if is_date || value.len() == 8 {
            return NaiveDate::parse_from_str(value, "%Y%m%d")
                .ok()
                .map(RecordTime::Date);
        }

        if let Some(stripped) = value.strip_suffix('Z') {
            return NaiveDateTime::parse_from_str(stripped, "%Y%m%dT%H%M%S")
                .ok()
                .map(|dt| RecordTime::Utc(dt.and_utc()));
        }

        let naive = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S").ok()?;
        match tzid.and_then(|id| id.parse::<Tz>().ok()) {
            Some(tz) => RecordTime::Floating(naive).resolve_in(tz).ok(),
            None => Some(RecordTime::Floating(naive)),
        }
    }
}

impl fmt::Display for RecordTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordTime::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            RecordTime::Utc(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%SZ")),
            RecordTime::Floating(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S")),
        }
    }
}

impl Serialize for RecordTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RecordTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        RecordTime::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Parse an IANA timezone name.
pub fn parse_timezone(name: &str) -> CalDavResult<Tz> {
    name.parse::<Tz>()
        .map_err(|_| CalDavError::Config(format!("Unknown timezone '{}'", name)))
}

/// Time window for listing records. Bounds are inclusive of overlapping records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> CalDavResult<Self> {
        if end < start {
            return Err(CalDavError::InvalidParameters(format!(
                "Range end {} is before start {}",
                end, start
            )));
        }
        Ok(TimeRange { start, end })
    }

    /// Build a range from optional textual bounds; both are required for a filter.
    pub fn from_bounds(start: Option<&str>, end: Option<&str>, tz: Tz) -> CalDavResult<Option<Self>> {
        let (Some(start), Some(end)) = (start, end) else {
            return Ok(None);
        };
        // Bare dates are days in `tz`; a bare end date covers its whole day
        let start = match RecordTime::parse(start)?.resolve_in(tz)? {
            RecordTime::Date(d) => local_instant(d, NaiveTime::MIN, tz)?,
            other => other.to_utc(),
        };
        let end = match RecordTime::parse(end)?.resolve_in(tz)? {
            RecordTime::Date(d) => {
                let end_of_day = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
                local_instant(d, end_of_day, tz)?
            }
            other => other.to_utc(),
        };
        TimeRange::new(start, end).map(Some)
    }

    /// Whether `[start, end]` overlaps this range. A missing end is an instant.
    pub fn overlaps(&self, start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> bool {
        let end = end.unwrap_or(start);
        start <= self.end && end >= self.start
    }

    /// CalDAV time-range attribute format (`YYYYMMDDTHHMMSSZ`).
    pub fn caldav_bounds(&self) -> (String, String) {
        (
            self.start.format("%Y%m%dT%H%M%SZ").to_string(),
            self.end.format("%Y%m%dT%H%M%SZ").to_string(),
        )
    }
}

/// A wall-clock time on `date` in `tz` as UTC. Times skipped by a DST jump
/// move forward an hour.
fn local_instant(date: NaiveDate, time: NaiveTime, tz: Tz) -> CalDavResult<DateTime<Utc>> {
    let naive = date.and_time(time);
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| {
            CalDavError::InvalidParameters(format!("Local time {} does not exist in {}", naive, tz))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    #[test]
    fn test_parse_accepts_dates_naive_and_offset_inputs() {
        assert_eq!(
            RecordTime::parse("2025-01-01").unwrap(),
            RecordTime::Date(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap())
        );
        assert!(matches!(
            RecordTime::parse("2025-01-01T09:00:00").unwrap(),
            RecordTime::Floating(_)
        ));
        assert!(matches!(
            RecordTime::parse("2025-01-01 09:00").unwrap(),
            RecordTime::Floating(_)
        ));
        assert_eq!(
            RecordTime::parse("2025-01-01T09:00:00+02:00").unwrap(),
            RecordTime::Utc(Utc.with_ymd_and_hms(2025, 1, 1, 7, 0, 0).unwrap())
        );
        assert!(RecordTime::parse("next tuesday").is_err());
    }

    #[test]
    fn test_floating_resolves_in_configured_zone() {
        let tz = parse_timezone("America/New_York").unwrap();
        let resolved = RecordTime::parse("2025-01-01T09:00:00")
            .unwrap()
            .resolve_in(tz)
            .unwrap();
        // EST is UTC-5 in January
        assert_eq!(
            resolved,
            RecordTime::Utc(Utc.with_ymd_and_hms(2025, 1, 1, 14, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_nonexistent_local_time_is_rejected() {
        let tz = parse_timezone("America/New_York").unwrap();
        let err = RecordTime::parse("2025-03-09T02:30:00")
            .unwrap()
            .resolve_in(tz)
            .unwrap_err();
        assert!(matches!(err, CalDavError::InvalidParameters(_)));
    }

    #[test]
    fn test_display_uses_day_month_year_pattern() {
        let t = RecordTime::Utc(Utc.with_ymd_and_hms(2025, 3, 20, 15, 5, 0).unwrap());
        assert_eq!(t.display(), "20/03/2025 15:05");
    }

    #[test]
    fn test_ics_values_with_tzid() {
        let t = RecordTime::from_ics_value("20250101T090000", Some("Europe/Berlin"), false).unwrap();
        assert_eq!(
            t,
            RecordTime::Utc(Utc.with_ymd_and_hms(2025, 1, 1, 8, 0, 0).unwrap())
        );

        let unknown = RecordTime::from_ics_value("20250101T090000", Some("Custom/Zone"), false).unwrap();
        assert!(matches!(unknown, RecordTime::Floating(_)));

        let date = RecordTime::from_ics_value("20250101", None, true).unwrap();
        assert_eq!(date.to_ics_value(), "20250101");
    }

    #[test]
    fn test_range_requires_both_bounds() {
        let tz = parse_timezone("UTC").unwrap();
        assert_eq!(TimeRange::from_bounds(Some("2025-01-01"), None, tz).unwrap(), None);

        let range = TimeRange::from_bounds(Some("2025-01-01"), Some("2025-01-31"), tz)
            .unwrap()
            .expect("both bounds given");
        assert_eq!(
            range.caldav_bounds(),
            ("20250101T000000Z".to_string(), "20250131T235959Z".to_string())
        );
    }

    #[test]
    fn test_date_bounds_are_days_in_the_configured_zone() {
        let tz = parse_timezone("America/New_York").unwrap();
        let range = TimeRange::from_bounds(Some("2025-01-01"), Some("2025-01-31"), tz)
            .unwrap()
            .expect("both bounds given");
        assert_eq!(
            range.caldav_bounds(),
            ("20250101T050000Z".to_string(), "20250201T045959Z".to_string())
        );

        let late_evening = Utc.with_ymd_and_hms(2025, 2, 1, 2, 0, 0).unwrap();
        assert!(range.overlaps(late_evening, None), "Jan 31 21:00 local is inside");
        let early_morning = Utc.with_ymd_and_hms(2025, 1, 1, 3, 0, 0).unwrap();
        assert!(!range.overlaps(early_morning, None), "Dec 31 22:00 local is outside");

        let instants = TimeRange::from_bounds(Some("2025-01-01T00:00:00Z"), Some("2025-01-02T00:00:00Z"), tz)
            .unwrap()
            .unwrap();
        assert_eq!(instants.caldav_bounds().0, "20250101T000000Z", "explicit instants are kept");
    }

    #[test]
    fn test_range_rejects_inverted_bounds() {
        let tz = parse_timezone("UTC").unwrap();
        assert!(TimeRange::from_bounds(Some("2025-02-01"), Some("2025-01-01"), tz).is_err());
    }
}
