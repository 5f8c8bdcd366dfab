use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, IF_MATCH};
use reqwest::{Method, Url};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::config::HubConfig;
use crate::connection::ConnectionDescriptor;
use crate::dispatch::{self, Delivery, API_VERSION, TELEMETRY_API_VERSION};
use crate::errors::{HubError, Result};
use crate::models::{
    Installation, InstallationChange, Notification, NotificationDetails, NotificationTelemetry,
    Registration, RegistrationResult, Registrations, TemplateRegistration,
};
use crate::registration::{self, ATOM_ENTRY_CONTENT_TYPE};
use crate::sas::{SasTokenGenerator, TOKEN_TTL_SECS};
use crate::telemetry;
use crate::transport::{HubRequest, HubResponse, HubTransport, ReqwestTransport};

const JSON_CONTENT_TYPE: &str = "application/json";
const JSON_PATCH_CONTENT_TYPE: &str = "application/json-patch+json";

/// Azure Notification Hubs client
///
/// Holds only immutable state and can be shared across tasks. Every call
/// signs a fresh SAS token and accepts a [`CancellationToken`]; a cancelled
/// call returns [`HubError::Cancelled`].
pub struct NotificationHub {
    descriptor: ConnectionDescriptor,
    hub_path: String,
    sas: SasTokenGenerator,
    transport: Arc<dyn HubTransport>,
    clock: Arc<dyn Clock>,
}

impl NotificationHub {
    /// Client for `hub_path` using the reqwest transport with default settings
    pub fn new(connection_string: &str, hub_path: &str) -> Result<Self> {
        Self::from_config(&HubConfig::new(connection_string, hub_path))
    }

    /// Client built from a [`HubConfig`]
    pub fn from_config(config: &HubConfig) -> Result<Self> {
        let transport =
            ReqwestTransport::new(config.timeout).map_err(|source| HubError::Transport {
                operation: "connect",
                source,
            })?;

        Ok(Self::with_parts(
            ConnectionDescriptor::parse(&config.connection_string),
            &config.hub_path,
            Arc::new(transport),
            Arc::new(SystemClock),
        ))
    }

    /// Client with an explicit transport and clock
    pub fn with_parts(
        descriptor: ConnectionDescriptor,
        hub_path: &str,
        transport: Arc<dyn HubTransport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        info!(
            host = %descriptor.host,
            hub_path = %hub_path,
            key_name = %descriptor.key_name,
            "Notification hub client created"
        );

        Self {
            sas: SasTokenGenerator::new(descriptor.clone()),
            descriptor,
            hub_path: hub_path.to_string(),
            transport,
            clock,
        }
    }

    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    pub fn hub_path(&self) -> &str {
        &self.hub_path
    }

    /// Send to every registration matching `tags`, or to all of them
    pub async fn send(
        &self,
        notification: &Notification,
        tags: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<NotificationTelemetry> {
        self.deliver(notification, Delivery::Broadcast { tags }, cancel)
            .await
    }

    /// Send at `deliver_at`, which must lie in the future
    pub async fn schedule(
        &self,
        notification: &Notification,
        tags: Option<&str>,
        deliver_at: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<NotificationTelemetry> {
        self.deliver(notification, Delivery::Scheduled { tags, deliver_at }, cancel)
            .await
    }

    /// Send straight to one device handle
    pub async fn send_direct(
        &self,
        notification: &Notification,
        handle: &str,
        cancel: &CancellationToken,
    ) -> Result<NotificationTelemetry> {
        self.deliver(notification, Delivery::Direct { handle }, cancel)
            .await
    }

    /// Send straight to at most 1000 device handles
    pub async fn send_direct_batch(
        &self,
        notification: &Notification,
        handles: &[String],
        cancel: &CancellationToken,
    ) -> Result<NotificationTelemetry> {
        self.deliver(notification, Delivery::DirectBatch { handles }, cancel)
            .await
    }

    async fn deliver(
        &self,
        notification: &Notification,
        delivery: Delivery<'_>,
        cancel: &CancellationToken,
    ) -> Result<NotificationTelemetry> {
        // One instant for the schedule check, the SAS token and X-Apns-Expiration
        let now = self.clock.now();
        let expiry = now.timestamp() + TOKEN_TTL_SECS;

        let routed = dispatch::route(notification, delivery, expiry, now)?;
        let endpoint = routed.endpoint;
        let url = self.api_url(endpoint.segments(), API_VERSION, endpoint.is_direct())?;

        let response = self
            .exec(
                endpoint.operation(),
                Method::POST,
                url,
                routed.headers,
                routed.body,
                expiry,
                cancel,
            )
            .await?;

        Ok(NotificationTelemetry::from_headers(&response.headers))
    }

    /// Create a native registration, or replace it when `registration_id` is set
    pub async fn register(
        &self,
        registration: &Registration,
        cancel: &CancellationToken,
    ) -> Result<RegistrationResult> {
        let body = registration::registration_body(registration)?;
        self.write_registration(
            "register",
            registration.registration_id.as_deref(),
            body,
            cancel,
        )
        .await
    }

    /// Create a template registration, or replace it when `registration_id` is set
    pub async fn register_with_template(
        &self,
        registration: &TemplateRegistration,
        cancel: &CancellationToken,
    ) -> Result<RegistrationResult> {
        let body = registration::template_registration_body(registration)?;
        self.write_registration(
            "register_with_template",
            registration.registration_id.as_deref(),
            body,
            cancel,
        )
        .await
    }

    async fn write_registration(
        &self,
        operation: &'static str,
        registration_id: Option<&str>,
        body: String,
        cancel: &CancellationToken,
    ) -> Result<RegistrationResult> {
        let (method, url) = match registration_id.filter(|id| !id.is_empty()) {
            Some(id) => (
                Method::PUT,
                self.api_url(&["registrations", id], API_VERSION, false)?,
            ),
            None => (
                Method::POST,
                self.api_url(&["registrations"], API_VERSION, false)?,
            ),
        };

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(ATOM_ENTRY_CONTENT_TYPE));

        let response = self
            .exec(
                operation,
                method,
                url,
                headers,
                body.into_bytes(),
                self.expiry(),
                cancel,
            )
            .await?;

        registration::parse_entry(&response.text())
    }

    /// Read one registration
    pub async fn registration(
        &self,
        registration_id: &str,
        cancel: &CancellationToken,
    ) -> Result<RegistrationResult> {
        let url = self.api_url(&["registrations", registration_id], API_VERSION, false)?;
        let response = self
            .exec(
                "registration",
                Method::GET,
                url,
                HeaderMap::new(),
                Vec::new(),
                self.expiry(),
                cancel,
            )
            .await?;

        registration::parse_entry(&response.text())
    }

    /// Read every registration of the hub
    pub async fn registrations(&self, cancel: &CancellationToken) -> Result<Registrations> {
        let url = self.api_url(&["registrations"], API_VERSION, false)?;
        let response = self
            .exec(
                "registrations",
                Method::GET,
                url,
                HeaderMap::new(),
                Vec::new(),
                self.expiry(),
                cancel,
            )
            .await?;

        registration::parse_feed(&response.text())
    }

    /// Delete a registration regardless of its ETag
    pub async fn delete_registration(
        &self,
        registration_id: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let url = self.api_url(&["registrations", registration_id], API_VERSION, false)?;

        let mut headers = HeaderMap::new();
        headers.insert(IF_MATCH, HeaderValue::from_static("*"));

        self.exec(
            "delete_registration",
            Method::DELETE,
            url,
            headers,
            Vec::new(),
            self.expiry(),
            cancel,
        )
        .await?;

        Ok(())
    }

    /// Read one installation
    pub async fn installation(
        &self,
        installation_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Installation> {
        let url = self.api_url(&["installations", installation_id], API_VERSION, false)?;
        let response = self
            .exec(
                "installation",
                Method::GET,
                url,
                HeaderMap::new(),
                Vec::new(),
                self.expiry(),
                cancel,
            )
            .await?;

        Ok(serde_json::from_slice(&response.body)?)
    }

    /// Create or overwrite an installation
    pub async fn install(
        &self,
        installation: &Installation,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let url = self.api_url(
            &["installations", installation.installation_id.as_str()],
            API_VERSION,
            false,
        )?;
        let body = serde_json::to_vec(installation)?;

        self.exec(
            "install",
            Method::PUT,
            url,
            json_headers(JSON_CONTENT_TYPE),
            body,
            self.expiry(),
            cancel,
        )
        .await?;

        Ok(())
    }

    /// Apply JSON-Patch changes to an installation
    pub async fn update_installation(
        &self,
        installation_id: &str,
        changes: &[InstallationChange],
        cancel: &CancellationToken,
    ) -> Result<()> {
        let url = self.api_url(&["installations", installation_id], API_VERSION, false)?;
        let body = serde_json::to_vec(changes)?;

        self.exec(
            "update_installation",
            Method::PATCH,
            url,
            json_headers(JSON_PATCH_CONTENT_TYPE),
            body,
            self.expiry(),
            cancel,
        )
        .await?;

        Ok(())
    }

    /// Delete an installation
    pub async fn uninstall(&self, installation_id: &str, cancel: &CancellationToken) -> Result<()> {
        let url = self.api_url(&["installations", installation_id], API_VERSION, false)?;

        self.exec(
            "uninstall",
            Method::DELETE,
            url,
            json_headers(JSON_CONTENT_TYPE),
            Vec::new(),
            self.expiry(),
            cancel,
        )
        .await?;

        Ok(())
    }

    /// Read delivery telemetry of a sent notification
    pub async fn notification_details(
        &self,
        notification_id: &str,
        cancel: &CancellationToken,
    ) -> Result<NotificationDetails> {
        let url = self.api_url(&["messages", notification_id], TELEMETRY_API_VERSION, false)?;
        let response = self
            .exec(
                "notification_details",
                Method::GET,
                url,
                HeaderMap::new(),
                Vec::new(),
                self.expiry(),
                cancel,
            )
            .await?;

        telemetry::parse_details(&response.text())
    }

    /// `scheme://host/{hub_path}/{segments..}?api-version=..[&direct=]`
    pub fn api_url(&self, segments: &[&str], api_version: &str, direct: bool) -> Result<Url> {
        let base = self.descriptor.base_uri();
        let mut url = Url::parse(&base).map_err(|e| HubError::InvalidUrl(format!("{}: {}", base, e)))?;

        url.path_segments_mut()
            .map_err(|_| HubError::InvalidUrl(base.clone()))?
            .clear()
            .push(&self.hub_path)
            .extend(segments);

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("api-version", api_version);
            if direct {
                query.append_pair("direct", "");
            }
        }

        Ok(url)
    }

    fn expiry(&self) -> i64 {
        SasTokenGenerator::expiry(self.clock.as_ref())
    }

    #[allow(clippy::too_many_arguments)]
    async fn exec(
        &self,
        operation: &'static str,
        method: Method,
        url: Url,
        mut headers: HeaderMap,
        body: Vec<u8>,
        expiry: i64,
        cancel: &CancellationToken,
    ) -> Result<HubResponse> {
        let token = self.sas.token_for_expiry(expiry);
        let authorization =
            HeaderValue::from_str(&token).map_err(|e| HubError::InvalidHeader {
                name: "Authorization",
                message: e.to_string(),
            })?;
        headers.insert(AUTHORIZATION, authorization);

        debug!(operation, method = %method, path = url.path(), "Sending hub request");

        let request = HubRequest {
            method,
            url,
            headers,
            body,
        };

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(HubError::Cancelled),
            result = self.transport.exec(request) => {
                result.map_err(|source| HubError::Transport { operation, source })?
            }
        };

        if !response.is_success() {
            return Err(HubError::UnexpectedStatus {
                operation,
                status: response.status,
                body: response.text(),
            });
        }

        Ok(response)
    }
}

impl std::fmt::Debug for NotificationHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationHub")
            .field("descriptor", &self.descriptor)
            .field("hub_path", &self.hub_path)
            .finish()
    }
}

fn json_headers(content_type: &'static str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers
}
