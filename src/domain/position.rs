//! Position readings and the wire formats they are parsed from

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Deserializer};
use std::fmt::{self, Write};

/// Valid latitude range in decimal degrees
pub const LATITUDE_RANGE: std::ops::RangeInclusive<f64> = -90.0..=90.0;
/// Valid longitude range in decimal degrees
pub const LONGITUDE_RANGE: std::ops::RangeInclusive<f64> = -180.0..=180.0;

/// A coordinate in decimal degrees, keeping the exact text it was parsed from
///
/// The API sends coordinates as strings (`"12.34"`). Readouts show the received
/// text, never a re-formatted float.
#[derive(Debug, Clone, PartialEq)]
pub struct Coordinate {
    degrees: f64,
    text: String,
}

impl Coordinate {
    pub fn parse(text: &str) -> Result<Self, PositionError> {
        let trimmed = text.trim();
        let degrees = trimmed
            .parse::<f64>()
            .map_err(|_| PositionError::InvalidCoordinate(text.to_string()))?;
        if !degrees.is_finite() {
            return Err(PositionError::InvalidCoordinate(text.to_string()));
        }
        Ok(Self { degrees, text: trimmed.to_string() })
    }

    pub fn from_degrees(degrees: f64) -> Self {
        Self { degrees, text: degrees.to_string() }
    }

    pub fn degrees(&self) -> f64 {
        self.degrees
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl<'de> Deserialize<'de> for Coordinate {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::{self, Visitor};

        struct CoordinateVisitor;

        impl<'de> Visitor<'de> for CoordinateVisitor {
            type Value = Coordinate;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a coordinate as a string or number")
            }

            fn visit_str<E>(self, value: &str) -> Result<Coordinate, E>
            where
                E: de::Error,
            {
                Coordinate::parse(value).map_err(E::custom)
            }

            fn visit_f64<E>(self, value: f64) -> Result<Coordinate, E>
            where
                E: de::Error,
            {
                Ok(Coordinate::from_degrees(value))
            }

            fn visit_i64<E>(self, value: i64) -> Result<Coordinate, E>
            where
                E: de::Error,
            {
                Ok(Coordinate { degrees: value as f64, text: value.to_string() })
            }

            fn visit_u64<E>(self, value: u64) -> Result<Coordinate, E>
            where
                E: de::Error,
            {
                Ok(Coordinate { degrees: value as f64, text: value.to_string() })
            }
        }

        deserializer.deserialize_any(CoordinateVisitor)
    }
}

/// Why a response body could not be turned into a position
#[derive(Debug, Clone, PartialEq)]
pub enum PositionError {
    /// Body is not JSON or does not have the expected shape
    InvalidJson(String),
    /// API answered with a non-success `message`
    ApiFailure(String),
    MissingField(&'static str),
    InvalidCoordinate(String),
    LatitudeOutOfRange(f64),
    LongitudeOutOfRange(f64),
    InvalidTimestamp(f64),
}

impl fmt::Display for PositionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionError::InvalidJson(e) => write!(f, "invalid json: {}", e),
            PositionError::ApiFailure(msg) => write!(f, "api reported failure: {}", msg),
            PositionError::MissingField(name) => write!(f, "missing field: {}", name),
            PositionError::InvalidCoordinate(text) => write!(f, "invalid coordinate: {:?}", text),
            PositionError::LatitudeOutOfRange(v) => write!(f, "latitude out of range: {}", v),
            PositionError::LongitudeOutOfRange(v) => write!(f, "longitude out of range: {}", v),
            PositionError::InvalidTimestamp(v) => write!(f, "invalid timestamp: {}", v),
        }
    }
}

impl std::error::Error for PositionError {}

#[derive(Debug, Deserialize)]
struct LatLon {
    #[serde(default)]
    latitude: Option<Coordinate>,
    #[serde(default)]
    longitude: Option<Coordinate>,
}

/// Response body of the position endpoint
///
/// Accepts both the open-notify shape (`iss_position` object plus
/// `message`) and a flat object with `latitude`/`longitude` at the top level.
#[derive(Debug, Deserialize)]
struct PositionResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    timestamp: Option<f64>,
    #[serde(default)]
    iss_position: Option<LatLon>,
    #[serde(default)]
    latitude: Option<Coordinate>,
    #[serde(default)]
    longitude: Option<Coordinate>,
}

/// A validated fix as delivered by the position source, before a timestamp
/// source has been chosen
#[derive(Debug, Clone, PartialEq)]
pub struct PositionFix {
    pub latitude: Coordinate,
    pub longitude: Coordinate,
    /// Server-supplied UNIX time, if the response carried one
    pub server_time: Option<DateTime<Utc>>,
}

impl PositionFix {
    /// Parse and validate a response body
    pub fn from_json(body: &[u8]) -> Result<Self, PositionError> {
        let response: PositionResponse =
            serde_json::from_slice(body).map_err(|e| PositionError::InvalidJson(e.to_string()))?;

        if let Some(message) = &response.message {
            if message != "success" {
                return Err(PositionError::ApiFailure(message.clone()));
            }
        }

        let (latitude, longitude) = match response.iss_position {
            Some(nested) => (nested.latitude, nested.longitude),
            None => (response.latitude, response.longitude),
        };
        let latitude = latitude.ok_or(PositionError::MissingField("latitude"))?;
        let longitude = longitude.ok_or(PositionError::MissingField("longitude"))?;

        if !LATITUDE_RANGE.contains(&latitude.degrees()) {
            return Err(PositionError::LatitudeOutOfRange(latitude.degrees()));
        }
        if !LONGITUDE_RANGE.contains(&longitude.degrees()) {
            return Err(PositionError::LongitudeOutOfRange(longitude.degrees()));
        }

        let server_time = match response.timestamp {
            Some(secs) => Some(unix_seconds(secs)?),
            None => None,
        };

        Ok(Self { latitude, longitude, server_time })
    }
}

fn unix_seconds(secs: f64) -> Result<DateTime<Utc>, PositionError> {
    if !secs.is_finite() {
        return Err(PositionError::InvalidTimestamp(secs));
    }
    let whole = secs.trunc() as i64;
    let nanos = ((secs - secs.trunc()) * 1e9).round() as u32;
    DateTime::from_timestamp(whole, nanos.min(999_999_999))
        .ok_or(PositionError::InvalidTimestamp(secs))
}

/// Which clock a reading's time came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservedAt {
    Server(DateTime<Utc>),
    Local(DateTime<Utc>),
}

impl ObservedAt {
    pub fn time(&self) -> DateTime<Utc> {
        match self {
            ObservedAt::Server(t) | ObservedAt::Local(t) => *t,
        }
    }

    pub fn source(&self) -> &'static str {
        match self {
            ObservedAt::Server(_) => "server",
            ObservedAt::Local(_) => "local",
        }
    }
}

/// Where the displayed timestamp comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampSource {
    /// Server timestamp when present, local clock otherwise
    Server,
    /// Always the local clock at fetch completion
    Local,
}

/// Time zone used when formatting timestamps for display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayTimezone {
    Local,
    Utc,
}

/// One position of the tracked object, built fresh for every successful fetch
#[derive(Debug, Clone, PartialEq)]
pub struct PositionReading {
    pub latitude: Coordinate,
    pub longitude: Coordinate,
    pub observed_at: ObservedAt,
}

impl PositionReading {
    pub fn from_fix(fix: PositionFix, source: TimestampSource, now: DateTime<Utc>) -> Self {
        let observed_at = match (source, fix.server_time) {
            (TimestampSource::Server, Some(t)) => ObservedAt::Server(t),
            _ => ObservedAt::Local(now),
        };
        Self { latitude: fix.latitude, longitude: fix.longitude, observed_at }
    }

    /// Format the observation time with a strftime-style pattern
    pub fn format_observed_at(&self, format: &str, timezone: DisplayTimezone) -> String {
        format_time(self.observed_at.time(), format, timezone)
    }
}

/// Format a time with a strftime-style pattern, falling back to RFC 3339 when
/// the pattern cannot be rendered
pub fn format_time(time: DateTime<Utc>, format: &str, timezone: DisplayTimezone) -> String {
    let mut out = String::new();
    let written = match timezone {
        DisplayTimezone::Utc => write!(out, "{}", time.format(format)),
        DisplayTimezone::Local => write!(out, "{}", time.with_timezone(&Local).format(format)),
    };
    match written {
        Ok(()) => out,
        Err(_) => time.to_rfc3339(),
    }
}

/// Check that a strftime-style pattern only contains known specifiers
pub fn is_valid_time_format(format: &str) -> bool {
    use chrono::format::{Item, StrftimeItems};
    !StrftimeItems::new(format).any(|item| matches!(item, Item::Error))
}
