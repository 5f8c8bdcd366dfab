use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::errors::{HubError, Result};

/// Payload format of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationFormat {
    Template,
    Apple,
    Gcm,
    Baidu,
    #[serde(rename = "adm")]
    Kindle,
    Windows,
    #[serde(rename = "windowsphone")]
    WindowsPhone,
}

impl NotificationFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Template => "template",
            Self::Apple => "apple",
            Self::Gcm => "gcm",
            Self::Baidu => "baidu",
            Self::Kindle => "adm",
            Self::Windows => "windows",
            Self::WindowsPhone => "windowsphone",
        }
    }

    /// `Content-Type` of a payload in this format
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Template | Self::Apple | Self::Gcm | Self::Kindle | Self::Baidu => {
                "application/json"
            }
            Self::Windows | Self::WindowsPhone => "application/xml",
        }
    }
}

impl fmt::Display for NotificationFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationFormat {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "template" => Ok(Self::Template),
            "apple" => Ok(Self::Apple),
            "gcm" => Ok(Self::Gcm),
            "baidu" => Ok(Self::Baidu),
            "adm" => Ok(Self::Kindle),
            "windows" => Ok(Self::Windows),
            "windowsphone" => Ok(Self::WindowsPhone),
            other => Err(HubError::InvalidFormat(other.to_string())),
        }
    }
}

/// Platform a registration delivers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetPlatform {
    Adm,
    AdmTemplate,
    Apple,
    AppleTemplate,
    Baidu,
    BaiduTemplate,
    Gcm,
    GcmTemplate,
    Template,
    WindowsPhone,
    WindowsPhoneTemplate,
    Windows,
    WindowsTemplate,
}

impl TargetPlatform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Adm => "adm",
            Self::AdmTemplate => "admtemplate",
            Self::Apple => "apple",
            Self::AppleTemplate => "appletemplate",
            Self::Baidu => "baidu",
            Self::BaiduTemplate => "baidutemplate",
            Self::Gcm => "gcm",
            Self::GcmTemplate => "gcmtemplate",
            Self::Template => "template",
            Self::WindowsPhone => "windowsphone",
            Self::WindowsPhoneTemplate => "windowsphonetemplate",
            Self::Windows => "windows",
            Self::WindowsTemplate => "windowstemplate",
        }
    }

    pub fn is_template(&self) -> bool {
        matches!(
            self,
            Self::AdmTemplate
                | Self::AppleTemplate
                | Self::BaiduTemplate
                | Self::GcmTemplate
                | Self::Template
                | Self::WindowsPhoneTemplate
                | Self::WindowsTemplate
        )
    }
}

impl fmt::Display for TargetPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetPlatform {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self> {
        let platform = match s {
            "adm" => Self::Adm,
            "admtemplate" => Self::AdmTemplate,
            "apple" => Self::Apple,
            "appletemplate" => Self::AppleTemplate,
            "baidu" => Self::Baidu,
            "baidutemplate" => Self::BaiduTemplate,
            "gcm" => Self::Gcm,
            "gcmtemplate" => Self::GcmTemplate,
            "template" => Self::Template,
            "windowsphone" => Self::WindowsPhone,
            "windowsphonetemplate" => Self::WindowsPhoneTemplate,
            "windows" => Self::Windows,
            "windowstemplate" => Self::WindowsTemplate,
            other => return Err(HubError::InvalidPlatform(other.to_string())),
        };
        Ok(platform)
    }
}

/// An outbound notification: a format and an opaque payload
///
/// The payload is sent as-is; only Apple payloads are inspected, to pick the
/// APNs push type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    format: NotificationFormat,
    payload: Vec<u8>,
}

impl Notification {
    pub fn new(format: NotificationFormat, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            format,
            payload: payload.into(),
        }
    }

    /// Build from a wire format string such as `"apple"` or `"gcm"`
    pub fn from_format_str(format: &str, payload: impl Into<Vec<u8>>) -> Result<Self> {
        Ok(Self::new(format.parse()?, payload))
    }

    pub fn format(&self) -> NotificationFormat {
        self.format
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}",
            self.format,
            String::from_utf8_lossy(&self.payload)
        )
    }
}

/// Uniform device record recovered from any registration description
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegisteredDevice {
    pub device_id: String,
    pub registration_id: String,
    pub etag: String,
    pub expiration_time: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub template: Option<String>,
}

/// Canonical content of one registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationContent {
    pub format: NotificationFormat,
    pub target: TargetPlatform,
    pub registered_device: RegisteredDevice,
}

/// One Atom entry returned by the registrations API
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RegistrationResult {
    pub id: String,
    pub title: String,
    pub published: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    /// `None` for descriptions of platforms this client does not model
    pub content: Option<RegistrationContent>,
}

/// An entry of a registrations feed that could not be normalized
#[derive(Debug)]
pub struct EntryFailure {
    pub index: usize,
    pub id: String,
    pub error: HubError,
}

/// A registrations feed
#[derive(Debug, Default)]
pub struct Registrations {
    pub id: String,
    pub title: String,
    pub updated: Option<DateTime<Utc>>,
    pub entries: Vec<RegistrationResult>,
    pub failures: Vec<EntryFailure>,
}

impl Registrations {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Native registration to create or replace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// Set to replace an existing registration, `None` to create one
    pub registration_id: Option<String>,
    pub device_id: String,
    /// Only `Apple` and `Gcm` can be registered
    pub format: NotificationFormat,
    pub tags: Vec<String>,
}

/// Template registration to create or replace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateRegistration {
    pub registration_id: Option<String>,
    pub device_id: String,
    /// Only `Apple` and `Gcm` can be registered
    pub platform: NotificationFormat,
    pub tags: Vec<String>,
    pub template: String,
}

/// Delivery tracking returned by a send
///
/// Empty unless the hub runs on a tier that reports telemetry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NotificationTelemetry {
    pub notification_message_id: Option<String>,
}

impl NotificationTelemetry {
    pub fn is_empty(&self) -> bool {
        self.notification_message_id.is_none()
    }
}

/// Processing state of a sent notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum NotificationState {
    Abandoned,
    Canceled,
    Completed,
    Enqueued,
    NoTargetFound,
    Processing,
    Scheduled,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Outcome category reported per push service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum NotificationOutcomeName {
    AbandonedNotificationMessages,
    BadChannel,
    ChannelDisconnected,
    ChannelThrottled,
    Dropped,
    ExpiredChannel,
    InvalidCredentials,
    InvalidNotificationSize,
    NoTargets,
    PnsInterfaceError,
    PnsServerError,
    PnsUnavailable,
    PnsUnreachable,
    Skipped,
    Success,
    Throttled,
    UnknownError,
    WrongToken,
    #[serde(other)]
    Unrecognized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationOutcome {
    pub name: NotificationOutcomeName,
    pub count: u64,
}

/// Telemetry record of one sent notification
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NotificationDetails {
    pub notification_id: String,
    pub location: Option<String>,
    pub state: NotificationState,
    pub enqueue_time: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub pns_error_details_uri: Option<String>,
    pub target_platforms: Vec<String>,
    pub apns_outcome_counts: Vec<NotificationOutcome>,
    pub gcm_outcome_counts: Vec<NotificationOutcome>,
    pub adm_outcome_counts: Vec<NotificationOutcome>,
    pub baidu_outcome_counts: Vec<NotificationOutcome>,
    pub mpns_outcome_counts: Vec<NotificationOutcome>,
    pub wns_outcome_counts: Vec<NotificationOutcome>,
}

/// Push service of an installation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallationPlatform {
    Apns,
    Gcm,
    Wns,
    Mpns,
    Adm,
    Baidu,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallationTemplate {
    pub body: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// JSON device installation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Installation {
    pub installation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub platform: InstallationPlatform,
    pub push_channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expired_push_channel: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub templates: HashMap<String, InstallationTemplate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_active_on: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,
}

impl Installation {
    pub fn new(
        installation_id: impl Into<String>,
        platform: InstallationPlatform,
        push_channel: impl Into<String>,
    ) -> Self {
        Self {
            installation_id: installation_id.into(),
            user_id: None,
            platform,
            push_channel: push_channel.into(),
            expired_push_channel: None,
            tags: Vec::new(),
            templates: HashMap::new(),
            expiration_time: None,
            last_active_on: None,
            last_update: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallationChangeOp {
    Add,
    Remove,
    Replace,
}

/// One JSON-Patch operation against an installation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationChange {
    pub op: InstallationChangeOp,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}
