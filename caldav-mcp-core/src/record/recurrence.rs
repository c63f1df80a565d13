//! Structured recurrence rules.
//!
//! Only FREQ, INTERVAL and COUNT are modelled. Other RRULE parts are dropped
//! when a rule is read back from the store.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{CalDavError, CalDavResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Frequency {
    Secondly,
    Minutely,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Secondly => "SECONDLY",
            Frequency::Minutely => "MINUTELY",
            Frequency::Hourly => "HOURLY",
            Frequency::Daily => "DAILY",
            Frequency::Weekly => "WEEKLY",
            Frequency::Monthly => "MONTHLY",
            Frequency::Yearly => "YEARLY",
        }
    }
}

impl FromStr for Frequency {
    type Err = CalDavError;

    fn from_str(s: &str) -> CalDavResult<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SECONDLY" => Ok(Frequency::Secondly),
            "MINUTELY" => Ok(Frequency::Minutely),
            "HOURLY" => Ok(Frequency::Hourly),
            "DAILY" => Ok(Frequency::Daily),
            "WEEKLY" => Ok(Frequency::Weekly),
            "MONTHLY" => Ok(Frequency::Monthly),
            "YEARLY" => Ok(Frequency::Yearly),
            other => Err(CalDavError::InvalidParameters(format!(
                "Unknown recurrence frequency '{}'",
                other
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for Frequency {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A recurrence rule: `{frequency, interval, count}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
}

impl RecurrenceRule {
    pub fn new(frequency: Frequency, interval: Option<u32>, count: Option<u32>) -> Self {
        RecurrenceRule {
            frequency,
            interval,
            count,
        }
    }

    /// Parse an RRULE value such as `FREQ=WEEKLY;INTERVAL=2;COUNT=5`.
    pub fn parse_rrule(value: &str) -> CalDavResult<Self> {
        let mut frequency = None;
        let mut interval = None;
        let mut count = None;

        for part in value.trim().trim_start_matches("RRULE:").split(';') {
            let Some((key, val)) = part.split_once('=') else {
                continue;
            };
            match key.trim().to_ascii_uppercase().as_str() {
                "FREQ" => frequency = Some(val.parse::<Frequency>()?),
                "INTERVAL" => interval = Some(parse_positive(key, val)?),
                "COUNT" => count = Some(parse_positive(key, val)?),
                _ => {}
            }
        }

        let frequency = frequency.ok_or_else(|| {
            CalDavError::InvalidParameters(format!("RRULE '{}' has no FREQ", value))
        })?;

        Ok(RecurrenceRule {
            frequency,
            interval,
            count,
        })
    }

    pub fn to_rrule(&self) -> String {
        let mut parts = vec![format!("FREQ={}", self.frequency.as_str())];
        if let Some(interval) = self.interval {
            parts.push(format!("INTERVAL={}", interval));
        }
        if let Some(count) = self.count {
            parts.push(format!("COUNT={}", count));
        }
        parts.join(";")
    }
}

fn parse_positive(key: &str, val: &str) -> CalDavResult<u32> {
    val.trim()
        .parse::<u32>()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| CalDavError::InvalidParameters(format!("Invalid {} '{}'", key, val)))
}

impl fmt::Display for RecurrenceRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rrule())
    }
}

impl<'de> Deserialize<'de> for RecurrenceRule {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Fields {
                #[serde(alias = "freq")]
                frequency: Frequency,
                #[serde(default)]
                interval: Option<u32>,
                #[serde(default)]
                count: Option<u32>,
            },
        }

        match Repr::deserialize(deserializer)? {
            Repr::Text(text) => RecurrenceRule::parse_rrule(&text).map_err(serde::de::Error::custom),
            Repr::Fields {
                frequency,
                interval,
                count,
            } => Ok(RecurrenceRule {
                frequency,
                interval,
                count,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rrule_text_keeps_modelled_parts_only() {
        let rule = RecurrenceRule::parse_rrule("FREQ=weekly;BYDAY=MO;INTERVAL=2;COUNT=10").unwrap();
        assert_eq!(rule, RecurrenceRule::new(Frequency::Weekly, Some(2), Some(10)));
        assert_eq!(rule.to_rrule(), "FREQ=WEEKLY;INTERVAL=2;COUNT=10");
    }

    #[test]
    fn test_rrule_without_freq_is_rejected() {
        assert!(RecurrenceRule::parse_rrule("COUNT=3").is_err());
        assert!(RecurrenceRule::parse_rrule("FREQ=DAILY;COUNT=0").is_err());
    }

    #[test]
    fn test_deserialize_accepts_object_and_text_forms() {
        let from_object: RecurrenceRule =
            serde_json::from_value(json!({"frequency": "daily", "count": 3})).unwrap();
        let from_text: RecurrenceRule = serde_json::from_value(json!("FREQ=DAILY;COUNT=3")).unwrap();
        assert_eq!(from_object, from_text);

        assert_eq!(
            serde_json::to_value(&from_object).unwrap(),
            json!({"frequency": "DAILY", "count": 3})
        );
    }
}
