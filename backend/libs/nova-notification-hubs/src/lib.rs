//! Nova Notification Hubs Library
//!
//! This library provides an Azure Notification Hubs client for delivering
//! push notifications to Apple, Android and Windows devices across the Nova
//! platform.
//!
//! It handles:
//! - Shared Access Signature (SAS) request signing
//! - Broadcast, scheduled, direct and direct batch delivery
//! - Normalizing registration descriptions into one device record
//! - Registration and installation management
//! - Delivery telemetry

pub mod client;
pub mod clock;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod errors;
pub mod models;
pub mod registration;
pub mod sas;
pub mod telemetry;
pub mod transport;

pub use client::NotificationHub;
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::HubConfig;
pub use connection::{ConnectionDescriptor, Scheme};
pub use errors::{ErrorStage, HubError, Result, TransportError};
pub use models::{
    EntryFailure, Installation, InstallationChange, InstallationChangeOp, InstallationPlatform,
    InstallationTemplate, Notification, NotificationDetails, NotificationFormat,
    NotificationOutcome, NotificationOutcomeName, NotificationState, NotificationTelemetry,
    RegisteredDevice, Registration, RegistrationContent, RegistrationResult, Registrations,
    TargetPlatform, TemplateRegistration,
};
pub use registration::Normalize;
pub use sas::SasTokenGenerator;
pub use transport::{HubRequest, HubResponse, HubTransport, ReqwestTransport};
pub use tokio_util::sync::CancellationToken;
