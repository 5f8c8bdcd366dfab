use async_trait::async_trait;
use nova_notification_hubs::{
    ConnectionDescriptor, FixedClock, HubRequest, HubResponse, HubTransport, NotificationHub,
    TransportError,
};
use reqwest::header::{HeaderMap, HeaderValue};
use std::sync::{Arc, Mutex};

pub const CONNECTION_STRING: &str = "Endpoint=sb://testhub-ns.servicebus.windows.net/;SharedAccessKeyName=testAccessKeyName;SharedAccessKey=testAccessKey";
pub const HUB_PATH: &str = "testhub";
pub const NOW: i64 = 1_700_000_000;

/// Records every request and answers with a canned response
#[derive(Default)]
pub struct RecordingTransport {
    requests: Mutex<Vec<HubRequest>>,
    response: Mutex<HubResponse>,
}

#[allow(dead_code)]
impl RecordingTransport {
    pub fn ok() -> Arc<Self> {
        Self::respond(200, HeaderMap::new(), Vec::new())
    }

    pub fn with_body(body: impl Into<Vec<u8>>) -> Arc<Self> {
        Self::respond(200, HeaderMap::new(), body.into())
    }

    pub fn with_location(location: &'static str) -> Arc<Self> {
        let mut headers = HeaderMap::new();
        headers.insert("location", HeaderValue::from_static(location));
        Self::respond(201, headers, Vec::new())
    }

    pub fn respond(status: u16, headers: HeaderMap, body: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            response: Mutex::new(HubResponse {
                status,
                headers,
                body,
            }),
        })
    }

    pub fn requests(&self) -> Vec<HubRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> HubRequest {
        self.requests()
            .pop()
            .expect("no request reached the transport")
    }
}

#[async_trait]
impl HubTransport for RecordingTransport {
    async fn exec(&self, request: HubRequest) -> Result<HubResponse, TransportError> {
        self.requests.lock().unwrap().push(request);
        Ok(self.response.lock().unwrap().clone())
    }
}

/// Never answers; used to exercise cancellation
#[allow(dead_code)]
pub struct StalledTransport;

#[async_trait]
impl HubTransport for StalledTransport {
    async fn exec(&self, _request: HubRequest) -> Result<HubResponse, TransportError> {
        std::future::pending().await
    }
}

/// Always fails at the network layer
#[allow(dead_code)]
pub struct FailingTransport;

#[async_trait]
impl HubTransport for FailingTransport {
    async fn exec(&self, _request: HubRequest) -> Result<HubResponse, TransportError> {
        Err(TransportError::Other("connection reset".to_string()))
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn hub_with(transport: Arc<dyn HubTransport>) -> NotificationHub {
    init_tracing();
    NotificationHub::with_parts(
        ConnectionDescriptor::parse(CONNECTION_STRING),
        HUB_PATH,
        transport,
        Arc::new(FixedClock::from_unix(NOW)),
    )
}

#[allow(dead_code)]
pub fn header<'a>(request: &'a HubRequest, name: &str) -> Option<&'a str> {
    request.headers.get(name).and_then(|value| value.to_str().ok())
}

#[allow(dead_code)]
pub fn fixture(name: &str) -> String {
    let path = format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name);
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("fixture {}: {}", path, e))
}
