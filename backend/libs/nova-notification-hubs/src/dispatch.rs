//! Notification dispatch router
//!
//! Picks the endpoint for a delivery mode and assembles the headers and body
//! for it. Authorization is added by the client once the request is routed.

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::{HubError, Result};
use crate::models::{Notification, NotificationFormat};

pub const API_VERSION: &str = "2015-01";
pub const TELEMETRY_API_VERSION: &str = "2016-07";

/// Most device handles accepted by one direct batch send
pub const MAX_BATCH_HANDLES: usize = 1000;

pub const FORMAT_HEADER: HeaderName = HeaderName::from_static("servicebusnotification-format");
pub const TAGS_HEADER: HeaderName = HeaderName::from_static("servicebusnotification-tags");
pub const SCHEDULE_TIME_HEADER: HeaderName =
    HeaderName::from_static("servicebusnotification-scheduletime");
pub const DEVICE_HANDLE_HEADER: HeaderName =
    HeaderName::from_static("servicebusnotification-devicehandle");
pub const APNS_EXPIRATION_HEADER: HeaderName = HeaderName::from_static("x-apns-expiration");
pub const APNS_PUSH_TYPE_HEADER: HeaderName = HeaderName::from_static("x-apns-push-type");
pub const APNS_PRIORITY_HEADER: HeaderName = HeaderName::from_static("x-apns-priority");

const SCHEDULE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// How a notification should reach its devices
#[derive(Debug, Clone, Copy)]
pub enum Delivery<'a> {
    /// Every registration matching the tag expression (all when `None`)
    Broadcast { tags: Option<&'a str> },
    /// Like `Broadcast`, held by the hub until `deliver_at`
    Scheduled {
        tags: Option<&'a str>,
        deliver_at: DateTime<Utc>,
    },
    /// One device handle, without a registration
    Direct { handle: &'a str },
    /// Up to [`MAX_BATCH_HANDLES`] device handles, without registrations
    DirectBatch { handles: &'a [String] },
}

/// Hub endpoint a notification is posted to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Messages,
    ScheduledNotifications,
    DirectMessages,
    DirectBatch,
}

impl Endpoint {
    /// Path segments under the hub path
    pub fn segments(&self) -> &'static [&'static str] {
        match self {
            Self::Messages | Self::DirectMessages => &["messages"],
            Self::ScheduledNotifications => &["schedulednotifications"],
            Self::DirectBatch => &["messages", "$batch"],
        }
    }

    /// Direct sends carry an empty `direct` query parameter
    pub fn is_direct(&self) -> bool {
        matches!(self, Self::DirectMessages | Self::DirectBatch)
    }

    pub fn operation(&self) -> &'static str {
        match self {
            Self::Messages => "send",
            Self::ScheduledNotifications => "schedule",
            Self::DirectMessages => "send_direct",
            Self::DirectBatch => "send_direct_batch",
        }
    }
}

/// A routed notification, ready to be signed and sent
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub endpoint: Endpoint,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct ApplePayload {
    #[serde(default)]
    aps: Option<ApsDictionary>,
}

#[derive(Debug, Deserialize)]
struct ApsDictionary {
    #[serde(rename = "content-available", default)]
    content_available: Option<i64>,
}

/// APNs push type and priority for an Apple payload
///
/// `aps.content-available == 1` marks a silent background push; anything
/// else, including a payload that does not decode, is an alert.
pub fn apple_push_type(payload: &[u8]) -> (&'static str, &'static str) {
    let background = serde_json::from_slice::<ApplePayload>(payload)
        .ok()
        .and_then(|payload| payload.aps)
        .and_then(|aps| aps.content_available)
        == Some(1);

    if background {
        ("background", "5")
    } else {
        ("alert", "10")
    }
}

/// Route `notification` for `delivery`
///
/// `expiry` is the unix time shared with the SAS token of the same request;
/// `now` decides whether a schedule lies in the future. Validation failures
/// are returned before anything is sent.
pub fn route(
    notification: &Notification,
    delivery: Delivery<'_>,
    expiry: i64,
    now: DateTime<Utc>,
) -> Result<Dispatch> {
    let (endpoint, tags) = match delivery {
        Delivery::Broadcast { tags } => (Endpoint::Messages, tags),
        Delivery::Scheduled { tags, deliver_at } => {
            if deliver_at <= now {
                return Err(HubError::ScheduleInPast);
            }
            (Endpoint::ScheduledNotifications, tags)
        }
        Delivery::Direct { .. } => (Endpoint::DirectMessages, None),
        Delivery::DirectBatch { handles } => {
            if handles.len() > MAX_BATCH_HANDLES {
                return Err(HubError::BatchTooLarge {
                    count: handles.len(),
                    max: MAX_BATCH_HANDLES,
                });
            }
            (Endpoint::DirectBatch, None)
        }
    };

    let mut headers = notification_headers(notification, tags, expiry)?;

    let body = match delivery {
        Delivery::Scheduled { deliver_at, .. } => {
            let scheduled = deliver_at.format(SCHEDULE_TIME_FORMAT).to_string();
            headers.insert(SCHEDULE_TIME_HEADER, header_value("ScheduleTime", &scheduled)?);
            notification.payload().to_vec()
        }
        Delivery::Direct { handle } => {
            headers.insert(DEVICE_HANDLE_HEADER, header_value("DeviceHandle", handle)?);
            notification.payload().to_vec()
        }
        Delivery::DirectBatch { handles } => {
            let boundary = format!("nova-batch-{}", Uuid::new_v4().simple());
            headers.insert(
                CONTENT_TYPE,
                header_value(
                    "Content-Type",
                    &format!("multipart/mixed; boundary={}", boundary),
                )?,
            );
            batch_body(notification, handles, &boundary)?
        }
        Delivery::Broadcast { .. } => notification.payload().to_vec(),
    };

    Ok(Dispatch {
        endpoint,
        headers,
        body,
    })
}

/// Headers common to every delivery mode
pub fn notification_headers(
    notification: &Notification,
    tags: Option<&str>,
    expiry: i64,
) -> Result<HeaderMap> {
    let format = notification.format();
    let mut headers = HeaderMap::new();

    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static(format.content_type()),
    );
    headers.insert(FORMAT_HEADER, HeaderValue::from_static(format.as_str()));

    if let Some(tags) = tags.filter(|tags| !tags.is_empty()) {
        headers.insert(TAGS_HEADER, header_value("Tags", tags)?);
    }

    headers.insert(APNS_EXPIRATION_HEADER, HeaderValue::from(expiry));

    if format == NotificationFormat::Apple {
        let (push_type, priority) = apple_push_type(notification.payload());
        headers.insert(APNS_PUSH_TYPE_HEADER, HeaderValue::from_static(push_type));
        headers.insert(APNS_PRIORITY_HEADER, HeaderValue::from_static(priority));
    }

    Ok(headers)
}

/// `multipart/mixed` body of a direct batch send
pub fn batch_body(
    notification: &Notification,
    handles: &[String],
    boundary: &str,
) -> Result<Vec<u8>> {
    let devices = serde_json::to_vec(handles)?;

    let mut body = Vec::with_capacity(notification.payload().len() + devices.len() + 256);
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Type: {}\r\nContent-Disposition: inline; name=notification\r\n\r\n",
            boundary,
            notification.format().content_type()
        )
        .as_bytes(),
    );
    body.extend_from_slice(notification.payload());
    body.extend_from_slice(
        format!(
            "\r\n--{}\r\nContent-Type: application/json\r\nContent-Disposition: inline; name=devices\r\n\r\n",
            boundary
        )
        .as_bytes(),
    );
    body.extend_from_slice(&devices);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

    Ok(body)
}

fn header_value(name: &'static str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| HubError::InvalidHeader {
        name,
        message: e.to_string(),
    })
}
