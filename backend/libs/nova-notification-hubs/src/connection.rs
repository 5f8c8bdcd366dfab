use std::fmt;

const PARAM_ENDPOINT: &str = "Endpoint=";
const PARAM_KEY_NAME: &str = "SharedAccessKeyName=";
const PARAM_KEY_VALUE: &str = "SharedAccessKey=";

/// URI scheme used to reach the hub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scheme {
    #[default]
    Secure,
    Plain,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Secure => "https",
            Scheme::Plain => "http",
        }
    }
}

/// Parsed connection string: where the hub lives and how to sign for it
///
/// Built once when the client is constructed and never mutated afterwards.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct ConnectionDescriptor {
    pub host: String,
    pub scheme: Scheme,
    pub key_name: String,
    key_value: String,
}

impl ConnectionDescriptor {
    pub fn new(
        host: impl Into<String>,
        scheme: Scheme,
        key_name: impl Into<String>,
        key_value: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            scheme,
            key_name: key_name.into(),
            key_value: key_value.into(),
        }
    }

    /// Parse `Endpoint=sb://<host>/;SharedAccessKeyName=<name>;SharedAccessKey=<value>`
    ///
    /// Segments may come in any order and unknown segments are ignored. A
    /// malformed string yields empty fields rather than an error, so the
    /// resulting requests are rejected by the service instead of the client.
    pub fn parse(connection_string: &str) -> Self {
        let mut descriptor = Self::default();

        for segment in connection_string.split(';').map(str::trim) {
            if let Some(endpoint) = segment.strip_prefix(PARAM_ENDPOINT) {
                let (scheme, host) = split_endpoint(endpoint);
                descriptor.scheme = scheme;
                descriptor.host = host;
            } else if let Some(name) = segment.strip_prefix(PARAM_KEY_NAME) {
                descriptor.key_name = name.to_string();
            } else if let Some(value) = segment.strip_prefix(PARAM_KEY_VALUE) {
                descriptor.key_value = value.to_string();
            }
        }

        descriptor
    }

    pub fn key_value(&self) -> &str {
        &self.key_value
    }

    /// `scheme://host` with no path or query
    pub fn base_uri(&self) -> String {
        format!("{}://{}", self.scheme.as_str(), self.host)
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("host", &self.host)
            .field("scheme", &self.scheme)
            .field("key_name", &self.key_name)
            .field("key_value", &"<redacted>")
            .finish()
    }
}

// `sb://` (Service Bus) and scheme-less endpoints are served over https.
fn split_endpoint(endpoint: &str) -> (Scheme, String) {
    let (scheme, rest) = match endpoint.split_once("://") {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("http") => (Scheme::Plain, rest),
        Some((_, rest)) => (Scheme::Secure, rest),
        None => (Scheme::Secure, endpoint),
    };

    let host = rest.split('/').next().unwrap_or_default().to_string();
    (scheme, host)
}
