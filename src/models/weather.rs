use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::ServiceError;

pub const DEFAULT_HOURLY_VARIABLE: &str = "temperature_2m";
pub const DEFAULT_TIMEZONE: &str = "Europe/Berlin";

pub fn default_hourly() -> String {
    DEFAULT_HOURLY_VARIABLE.to_string()
}

pub fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}

/// Inbound weather query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherRequest {
    pub latitude: f64,
    pub longitude: f64,
    /// Name of the single hourly variable to fetch
    #[serde(default = "default_hourly")]
    pub hourly: String,
    /// IANA zone name, or `auto` to let the provider pick one
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl WeatherRequest {
    #[must_use]
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            hourly: default_hourly(),
            timezone: default_timezone(),
        }
    }

    #[must_use]
    pub fn with_timezone(self, timezone: impl Into<String>) -> Self {
        Self {
            timezone: timezone.into(),
            ..self
        }
    }

    #[must_use]
    pub fn with_hourly(self, hourly: impl Into<String>) -> Self {
        Self {
            hourly: hourly.into(),
            ..self
        }
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(ServiceError::validation(format!(
                "Latitude must be between -90 and 90, got: {}",
                self.latitude
            )));
        }

        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(ServiceError::validation(format!(
                "Longitude must be between -180 and 180, got: {}",
                self.longitude
            )));
        }

        if self.hourly.is_empty()
            || !self
                .hourly
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(ServiceError::validation(format!(
                "Hourly must name a single variable, got: '{}'",
                self.hourly
            )));
        }

        if self.timezone != "auto" && self.timezone.parse::<Tz>().is_err() {
            return Err(ServiceError::validation(format!(
                "Unknown timezone: '{}'",
                self.timezone
            )));
        }

        Ok(())
    }

    /// Query parameters sent to the forecast endpoint
    #[must_use]
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("latitude", self.latitude.to_string()),
            ("longitude", self.longitude.to_string()),
            ("hourly", self.hourly.clone()),
            ("timezone", self.timezone.clone()),
            ("timeformat", "unixtime".to_string()),
        ]
    }
}

/// Hourly series: timestamps paired positionally with the values of one variable.
///
/// Serializes as `{"date": [...], "<variable>": [...]}`.
#[derive(Debug, Clone, PartialEq)]
pub struct HourlyData {
    variable: String,
    date: Vec<DateTime<Utc>>,
    values: Vec<Option<f64>>,
}

impl HourlyData {
    /// Pair timestamps with values, truncating both to the shorter length.
    pub fn aligned(
        variable: impl Into<String>,
        mut date: Vec<DateTime<Utc>>,
        mut values: Vec<Option<f64>>,
    ) -> Self {
        let variable = variable.into();
        if date.len() != values.len() {
            tracing::warn!(
                variable = %variable,
                timestamps = date.len(),
                values = values.len(),
                "Hourly series length mismatch, truncating to the shorter one"
            );
            let len = date.len().min(values.len());
            date.truncate(len);
            values.truncate(len);
        }
        Self {
            variable,
            date,
            values,
        }
    }

    #[must_use]
    pub fn variable(&self) -> &str {
        &self.variable
    }

    /// Samples that carry a value; gaps reported by the provider are skipped.
    pub fn points(&self) -> impl Iterator<Item = (DateTime<Utc>, f64)> + '_ {
        self.date
            .iter()
            .zip(&self.values)
            .filter_map(|(time, value)| value.map(|v| (*time, v)))
    }
}

impl Serialize for HourlyData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("date", &self.date)?;
        map.serialize_entry(&self.variable, &self.values)?;
        map.end()
    }
}

/// Outbound weather answer
#[derive(Debug, Clone, Serialize)]
pub struct WeatherResponse {
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: f64,
    pub timezone: String,
    pub timezone_abbreviation: String,
    pub utc_offset_seconds: i32,
    pub hourly_data: HourlyData,
}
