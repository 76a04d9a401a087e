use schemars::{gen::SchemaGenerator, schema::Schema, JsonSchema};
use serde::{Deserialize, Serialize};

/// An hour of the day, written `H:00` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SlotTime {
    hour: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotTimeError {
    Format(String),
    Hour(String),
    Minute(String),
}

impl std::fmt::Display for SlotTimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Format(value) => write!(f, "Expected format H:00, got: {}", value),
            Self::Hour(value) => write!(f, "Invalid hour: {}", value),
            Self::Minute(value) => write!(f, "Slots start on the hour, got minutes: {}", value),
        }
    }
}

impl std::error::Error for SlotTimeError {}

impl SlotTime {
    pub fn new(hour: u8) -> Result<Self, SlotTimeError> {
        if hour > 23 {
            return Err(SlotTimeError::Hour(hour.to_string()));
        }
        Ok(Self { hour })
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    /// Whole hours from `self` to `end`. Negative when `end` comes first.
    pub fn hours_until(&self, end: SlotTime) -> i64 {
        i64::from(end.hour) - i64::from(self.hour)
    }
}

impl TryFrom<&str> for SlotTime {
    type Error = SlotTimeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let (hour, min) = value
            .trim()
            .split_once(':')
            .ok_or_else(|| SlotTimeError::Format(value.to_string()))?;

        if hour.is_empty() || hour.len() > 2 || min.len() != 2 {
            return Err(SlotTimeError::Format(value.to_string()));
        }

        let hour = hour
            .parse::<u8>()
            .map_err(|_| SlotTimeError::Hour(hour.to_string()))?;
        let min = min
            .parse::<u8>()
            .map_err(|_| SlotTimeError::Minute(min.to_string()))?;
        if min != 0 {
            return Err(SlotTimeError::Minute(min.to_string()));
        }

        Self::new(hour)
    }
}

impl TryFrom<String> for SlotTime {
    type Error = SlotTimeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl From<SlotTime> for String {
    fn from(value: SlotTime) -> Self {
        value.to_string()
    }
}

impl JsonSchema for SlotTime {
    fn schema_name() -> String {
        "SlotTime".to_string()
    }

    fn json_schema(gen: &mut SchemaGenerator) -> Schema {
        String::json_schema(gen)
    }
}

impl std::fmt::Display for SlotTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:00", self.hour)
    }
}
