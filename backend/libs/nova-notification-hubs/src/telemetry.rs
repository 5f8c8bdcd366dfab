use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{HeaderMap, LOCATION};
use serde::de::{value, IntoDeserializer};
use serde::Deserialize;
use tracing::warn;

use crate::errors::Result;
use crate::models::{
    NotificationDetails, NotificationOutcome, NotificationOutcomeName, NotificationTelemetry,
};
use crate::registration::parse_expiration_time;

static MESSAGE_ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/messages/(?P<id>[^?/]+)\?api-version=").expect("message id pattern is valid")
});

impl NotificationTelemetry {
    /// Message id from a `Location` URL, `None` when the URL has no id
    pub fn from_location(location: &str) -> Option<Self> {
        MESSAGE_ID_PATTERN
            .captures(location)
            .and_then(|captures| captures.name("id"))
            .map(|id| Self {
                notification_message_id: Some(id.as_str().to_string()),
            })
    }

    /// Telemetry from send response headers
    ///
    /// Only Standard tier hubs return a `Location`; a missing or unusable
    /// header yields empty telemetry, never an error.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let Some(location) = headers.get(LOCATION) else {
            return Self::default();
        };

        match location.to_str().ok().and_then(Self::from_location) {
            Some(telemetry) => telemetry,
            None => {
                warn!(location = ?location, "Could not parse notification id from Location header");
                Self::default()
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawOutcome {
    #[serde(rename = "Name", default)]
    name: Option<String>,
    #[serde(rename = "Count", default)]
    count: u64,
}

#[derive(Debug, Default, Deserialize)]
struct RawOutcomeCounts {
    #[serde(rename = "Outcome", default)]
    outcomes: Vec<RawOutcome>,
}

impl RawOutcomeCounts {
    fn into_outcomes(counts: Option<Self>) -> Vec<NotificationOutcome> {
        counts
            .map(|counts| counts.outcomes)
            .unwrap_or_default()
            .into_iter()
            .map(|outcome| NotificationOutcome {
                name: outcome
                    .name
                    .as_deref()
                    .and_then(wire_enum)
                    .unwrap_or(NotificationOutcomeName::Unrecognized),
                count: outcome.count,
            })
            .collect()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawNotificationDetails {
    #[serde(default)]
    notification_id: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    enqueue_time: Option<String>,
    #[serde(default)]
    start_time: Option<String>,
    #[serde(default)]
    end_time: Option<String>,
    #[serde(default)]
    pns_error_details_uri: Option<String>,
    #[serde(default)]
    target_platforms: Option<String>,
    #[serde(default)]
    apns_outcome_counts: Option<RawOutcomeCounts>,
    #[serde(default)]
    gcm_outcome_counts: Option<RawOutcomeCounts>,
    #[serde(default)]
    adm_outcome_counts: Option<RawOutcomeCounts>,
    #[serde(default)]
    baidu_outcome_counts: Option<RawOutcomeCounts>,
    #[serde(default)]
    mpns_outcome_counts: Option<RawOutcomeCounts>,
    #[serde(default)]
    wns_outcome_counts: Option<RawOutcomeCounts>,
}

// Details timestamps are usually RFC 3339; fall back to the registration layouts.
fn detail_time(raw: Option<String>) -> Option<DateTime<Utc>> {
    let raw = raw?;
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|time| time.with_timezone(&Utc))
        .ok()
        .or_else(|| parse_expiration_time(Some(&raw)).ok().flatten())
}

// Element text into a unit variant, honouring `#[serde(other)]` fallbacks
fn wire_enum<'de, T: Deserialize<'de>>(text: &'de str) -> Option<T> {
    let deserializer: value::StrDeserializer<'_, value::Error> = text.trim().into_deserializer();
    T::deserialize(deserializer).ok()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

/// Decode a `<NotificationDetails>` document
pub fn parse_details(xml: &str) -> Result<NotificationDetails> {
    let raw: RawNotificationDetails = quick_xml::de::from_str(xml)?;

    Ok(NotificationDetails {
        notification_id: raw.notification_id.unwrap_or_default(),
        location: non_empty(raw.location),
        state: raw.state.as_deref().and_then(wire_enum).unwrap_or_default(),
        enqueue_time: detail_time(raw.enqueue_time),
        start_time: detail_time(raw.start_time),
        end_time: detail_time(raw.end_time),
        pns_error_details_uri: non_empty(raw.pns_error_details_uri),
        target_platforms: raw
            .target_platforms
            .map(|platforms| {
                platforms
                    .split(',')
                    .map(str::trim)
                    .filter(|platform| !platform.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        apns_outcome_counts: RawOutcomeCounts::into_outcomes(raw.apns_outcome_counts),
        gcm_outcome_counts: RawOutcomeCounts::into_outcomes(raw.gcm_outcome_counts),
        adm_outcome_counts: RawOutcomeCounts::into_outcomes(raw.adm_outcome_counts),
        baidu_outcome_counts: RawOutcomeCounts::into_outcomes(raw.baidu_outcome_counts),
        mpns_outcome_counts: RawOutcomeCounts::into_outcomes(raw.mpns_outcome_counts),
        wns_outcome_counts: RawOutcomeCounts::into_outcomes(raw.wns_outcome_counts),
    })
}
