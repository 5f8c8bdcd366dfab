//! Registration content normalizer
//!
//! The hub answers registration calls with Atom entries whose `<content>`
//! holds one of several platform-specific description elements. They are
//! decoded into a private tagged union, classified, then converted into a
//! single [`RegistrationContent`] shape.

use chrono::{DateTime, NaiveDateTime, Utc};
use quick_xml::escape::escape;
use serde::Deserialize;
use tracing::warn;

use crate::errors::{HubError, Result};
use crate::models::{
    EntryFailure, NotificationFormat, RegisteredDevice, Registration, RegistrationContent,
    RegistrationResult, Registrations, TargetPlatform, TemplateRegistration,
};

/// `Content-Type` of registration create/update bodies
pub const ATOM_ENTRY_CONTENT_TYPE: &str = "application/atom+xml;type=entry;charset=utf-8";

// Both layouts are UTC. The service writes `.000` millis, but `%.f` also takes
// other fraction widths or none, so hand-edited or older records still decode.
const EXPIRATION_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.fZ", "%Y-%m-%dT%H:%M:%S%.f"];

const ATOM_NS: &str = "http://www.w3.org/2005/Atom";
const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";
const SERVICEBUS_NS: &str = "http://schemas.microsoft.com/netservices/2010/10/servicebus/connect";

#[derive(Debug, Default, Deserialize)]
struct AtomText {
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawFeed {
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: AtomText,
    #[serde(default)]
    updated: Option<String>,
    #[serde(rename = "entry", default)]
    entries: Vec<RawEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct RawEntry {
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: AtomText,
    #[serde(default)]
    published: Option<String>,
    #[serde(default)]
    updated: Option<String>,
    #[serde(default)]
    content: Option<RawContent>,
}

#[derive(Debug, Default, Deserialize)]
struct RawContent {
    #[serde(rename = "AppleRegistrationDescription", default)]
    apple: Option<RawDescription>,
    #[serde(rename = "AppleTemplateRegistrationDescription", default)]
    apple_template: Option<RawDescription>,
    #[serde(rename = "GcmRegistrationDescription", default)]
    gcm: Option<RawDescription>,
    #[serde(rename = "GcmTemplateRegistrationDescription", default)]
    gcm_template: Option<RawDescription>,
}

/// Union of the fields carried by every supported description element
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawDescription {
    #[serde(default)]
    expiration_time: Option<String>,
    #[serde(default)]
    registration_id: Option<String>,
    #[serde(default)]
    tags: Option<String>,
    #[serde(rename = "ETag", default)]
    etag: Option<String>,
    #[serde(default)]
    device_token: Option<String>,
    #[serde(default)]
    gcm_registration_id: Option<String>,
    #[serde(default)]
    body_template: Option<String>,
}

/// Exactly one recognised description variant, or none
#[derive(Debug)]
enum RegistrationDescription {
    Apple(RawDescription),
    AppleTemplate(RawDescription),
    Gcm(RawDescription),
    GcmTemplate(RawDescription),
    Unsupported,
}

impl From<RawContent> for RegistrationDescription {
    // Template variants win over native ones for the same platform.
    fn from(content: RawContent) -> Self {
        if let Some(description) = content.apple_template {
            Self::AppleTemplate(description)
        } else if let Some(description) = content.apple {
            Self::Apple(description)
        } else if let Some(description) = content.gcm_template {
            Self::GcmTemplate(description)
        } else if let Some(description) = content.gcm {
            Self::Gcm(description)
        } else {
            Self::Unsupported
        }
    }
}

/// Conversion into canonical registration content
///
/// `Ok(None)` means the input carried no description this client models.
/// Normalizing an already canonical [`RegistrationContent`] returns it
/// unchanged, so the operation is idempotent.
pub trait Normalize {
    fn normalize(self) -> Result<Option<RegistrationContent>>;
}

impl Normalize for RegistrationContent {
    fn normalize(self) -> Result<Option<RegistrationContent>> {
        Ok(Some(self))
    }
}

impl<T: Normalize> Normalize for Option<T> {
    fn normalize(self) -> Result<Option<RegistrationContent>> {
        match self {
            Some(inner) => inner.normalize(),
            None => Ok(None),
        }
    }
}

impl Normalize for RawContent {
    fn normalize(self) -> Result<Option<RegistrationContent>> {
        RegistrationDescription::from(self).normalize()
    }
}

impl Normalize for RegistrationDescription {
    fn normalize(self) -> Result<Option<RegistrationContent>> {
        let (format, target, handle, description) = match self {
            Self::Apple(d) => (
                NotificationFormat::Apple,
                TargetPlatform::Apple,
                d.device_token.clone(),
                d,
            ),
            Self::AppleTemplate(d) => (
                NotificationFormat::Template,
                TargetPlatform::AppleTemplate,
                d.device_token.clone(),
                d,
            ),
            Self::Gcm(d) => (
                NotificationFormat::Gcm,
                TargetPlatform::Gcm,
                d.gcm_registration_id.clone(),
                d,
            ),
            Self::GcmTemplate(d) => (
                NotificationFormat::Template,
                TargetPlatform::GcmTemplate,
                d.gcm_registration_id.clone(),
                d,
            ),
            Self::Unsupported => return Ok(None),
        };

        let device_id = match handle {
            Some(handle) if !handle.is_empty() => handle,
            _ if target == TargetPlatform::Apple || target == TargetPlatform::AppleTemplate => {
                return Err(HubError::MissingField("DeviceToken"))
            }
            _ => return Err(HubError::MissingField("GcmRegistrationId")),
        };

        let template = if target.is_template() {
            description.body_template
        } else {
            None
        };

        Ok(Some(RegistrationContent {
            format,
            target,
            registered_device: RegisteredDevice {
                device_id,
                registration_id: description.registration_id.unwrap_or_default(),
                etag: description.etag.unwrap_or_default(),
                expiration_time: parse_expiration_time(description.expiration_time.as_deref())?,
                tags: parse_tags(description.tags.as_deref()),
                template,
            },
        }))
    }
}

/// Normalize anything that implements [`Normalize`]
pub fn normalize<N: Normalize>(description: N) -> Result<Option<RegistrationContent>> {
    description.normalize()
}

/// Parse an expiration timestamp, with or without a trailing `Z`
///
/// Absent or empty input is `None`; anything else that fits neither layout
/// is an error.
pub fn parse_expiration_time(raw: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    let raw = match raw.map(str::trim) {
        Some(raw) if !raw.is_empty() => raw,
        _ => return Ok(None),
    };

    EXPIRATION_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| Some(naive.and_utc()))
        .ok_or_else(|| HubError::InvalidTimestamp(raw.to_string()))
}

/// Split a comma separated tag list; empty or absent means no tags
pub fn parse_tags(raw: Option<&str>) -> Vec<String> {
    match raw {
        Some(raw) if !raw.is_empty() => raw
            .split(',')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn parse_atom_time(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|raw| DateTime::parse_from_rfc3339(raw.trim()).ok())
        .map(|time| time.with_timezone(&Utc))
}

fn entry_result(entry: RawEntry) -> Result<RegistrationResult> {
    Ok(RegistrationResult {
        published: parse_atom_time(entry.published.as_deref()),
        updated: parse_atom_time(entry.updated.as_deref()),
        content: entry.content.normalize()?,
        id: entry.id,
        title: entry.title.value,
    })
}

/// Decode and normalize a single Atom `<entry>`
pub fn parse_entry(xml: &str) -> Result<RegistrationResult> {
    let entry: RawEntry = quick_xml::de::from_str(xml)?;
    entry_result(entry)
}

/// Decode and normalize an Atom `<feed>` of registrations
///
/// Entries are normalized independently: a bad entry is recorded in
/// [`Registrations::failures`] and the rest are still returned.
pub fn parse_feed(xml: &str) -> Result<Registrations> {
    let feed: RawFeed = quick_xml::de::from_str(xml)?;

    let mut registrations = Registrations {
        id: feed.id,
        title: feed.title.value,
        updated: parse_atom_time(feed.updated.as_deref()),
        entries: Vec::with_capacity(feed.entries.len()),
        failures: Vec::new(),
    };

    for (index, entry) in feed.entries.into_iter().enumerate() {
        let id = entry.id.clone();
        match entry_result(entry) {
            Ok(result) => registrations.entries.push(result),
            Err(error) => {
                warn!(index, id = %id, error = %error, "Skipping registration entry");
                registrations.failures.push(EntryFailure { index, id, error });
            }
        }
    }

    Ok(registrations)
}

/// Atom entry body creating or replacing a native registration
pub fn registration_body(registration: &Registration) -> Result<String> {
    let (element, handle_element) = native_elements(registration.format)?;

    Ok(atom_entry(
        element,
        &format!(
            "<Tags>{}</Tags><{handle}>{}</{handle}>",
            escape(registration.tags.join(",").as_str()),
            escape(registration.device_id.as_str()),
            handle = handle_element,
        ),
    ))
}

/// Atom entry body creating or replacing a template registration
pub fn template_registration_body(registration: &TemplateRegistration) -> Result<String> {
    let (element, handle_element) = template_elements(registration.platform)?;

    Ok(atom_entry(
        element,
        &format!(
            "<Tags>{}</Tags><{handle}>{}</{handle}><BodyTemplate><![CDATA[{}]]></BodyTemplate>",
            escape(registration.tags.join(",").as_str()),
            escape(registration.device_id.as_str()),
            cdata(&registration.template),
            handle = handle_element,
        ),
    ))
}

fn native_elements(format: NotificationFormat) -> Result<(&'static str, &'static str)> {
    match format {
        NotificationFormat::Apple => Ok(("AppleRegistrationDescription", "DeviceToken")),
        NotificationFormat::Gcm => Ok(("GcmRegistrationDescription", "GcmRegistrationId")),
        other => Err(HubError::UnsupportedPlatform(other.to_string())),
    }
}

fn template_elements(platform: NotificationFormat) -> Result<(&'static str, &'static str)> {
    match platform {
        NotificationFormat::Apple => Ok(("AppleTemplateRegistrationDescription", "DeviceToken")),
        NotificationFormat::Gcm => Ok(("GcmTemplateRegistrationDescription", "GcmRegistrationId")),
        other => Err(HubError::UnsupportedPlatform(other.to_string())),
    }
}

fn atom_entry(element: &str, fields: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?><entry xmlns="{ATOM_NS}"><content type="application/xml"><{element} xmlns:i="{XSI_NS}" xmlns="{SERVICEBUS_NS}">{fields}</{element}></content></entry>"#
    )
}

// A literal `]]>` would close the section early; split it across two sections.
fn cdata(text: &str) -> String {
    text.replace("]]>", "]]]]><![CDATA[>")
}
