// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Run session summary model.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Firestore field names written by a merge update of a [`RunResult`].
pub const RUN_RESULT_FIELDS: [&str; 3] = ["totalDistance", "duration", "timestamp"];

/// Summary of one completed run session.
///
/// Stored at `users/{uid}/dailyDistances/{date}_{timestamp}`. Numeric fields
/// are written as two-decimal strings, matching documents written by the
/// mobile client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct RunResult {
    /// Cumulative distance in kilometres
    #[serde(rename = "totalDistance", with = "two_decimals")]
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub total_distance_km: f64,
    /// Elapsed wall-clock time in seconds
    #[serde(rename = "duration", with = "two_decimals")]
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub duration_seconds: f64,
    /// Stop time (ISO 8601, millisecond precision)
    pub timestamp: String,
}

impl RunResult {
    /// Calendar date (`YYYY-MM-DD`) of the stop time.
    pub fn date(&self) -> &str {
        self.timestamp
            .split_once('T')
            .map_or(self.timestamp.as_str(), |(date, _)| date)
    }

    /// Document key in `dailyDistances`.
    pub fn document_key(&self) -> String {
        format!("{}_{}", self.date(), self.timestamp)
    }

    /// Duration as `{h}h {m}m {s}s`.
    pub fn formatted_duration(&self) -> String {
        format_duration(self.duration_seconds)
    }
}

/// Format seconds as `{h}h {m}m {s}s`, truncating partial seconds.
pub fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0).floor() as u64;
    let h = total / 3600;
    let m = (total % 3600) / 60;
    let s = total % 60;
    format!("{}h {}m {}s", h, m, s)
}

/// A user-visible informational notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Alert {
    pub title: String,
    pub message: String,
}

impl Alert {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn permission_denied() -> Self {
        Self::new(
            "Permission Denied",
            "Location permission is required to use this feature.",
        )
    }

    pub fn result_not_saved() -> Self {
        Self::new(
            "Run Not Saved",
            "Your run could not be saved. Please try again later.",
        )
    }
}

/// Serialize `f64` as a fixed two-decimal string; accept strings or numbers.
mod two_decimals {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{:.2}", value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(n),
            Raw::Text(s) => s.trim().parse().map_err(de::Error::custom),
        }
    }
}
