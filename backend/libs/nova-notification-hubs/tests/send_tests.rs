mod common;

use chrono::{DateTime, Duration};
use common::{hub_with, header, FailingTransport, RecordingTransport, StalledTransport, NOW};
use nova_notification_hubs::{
    CancellationToken, ErrorStage, HubError, Notification, NotificationFormat,
};
use reqwest::header::HeaderMap;
use reqwest::Method;
use std::sync::Arc;

fn sas_param(authorization: &str, name: &str) -> Option<String> {
    authorization
        .strip_prefix("SharedAccessSignature ")?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

#[tokio::test]
async fn test_send_posts_to_messages() {
    let transport = RecordingTransport::ok();
    let hub = hub_with(transport.clone());
    let notification = Notification::new(NotificationFormat::Template, r#"{"message":"hi"}"#);

    let telemetry = hub
        .send(&notification, Some("tag1 && tag2"), &CancellationToken::new())
        .await
        .unwrap();
    assert!(telemetry.is_empty());

    let request = transport.last_request();
    assert_eq!(request.method, Method::POST);
    assert_eq!(
        request.url.as_str(),
        "https://testhub-ns.servicebus.windows.net/testhub/messages?api-version=2015-01"
    );
    assert_eq!(header(&request, "Content-Type"), Some("application/json"));
    assert_eq!(header(&request, "ServiceBusNotification-Format"), Some("template"));
    assert_eq!(header(&request, "ServiceBusNotification-Tags"), Some("tag1 && tag2"));
    assert_eq!(request.body, br#"{"message":"hi"}"#);
}

#[tokio::test]
async fn test_sas_and_apns_expiration_share_expiry() {
    let transport = RecordingTransport::ok();
    let hub = hub_with(transport.clone());
    let notification = Notification::new(NotificationFormat::Apple, r#"{"aps":{"alert":"hi"}}"#);

    hub.send(&notification, None, &CancellationToken::new())
        .await
        .unwrap();

    let request = transport.last_request();
    let expiry = (NOW + 3600).to_string();
    let authorization = header(&request, "Authorization").unwrap();

    assert_eq!(sas_param(authorization, "se").as_deref(), Some(expiry.as_str()));
    assert_eq!(sas_param(authorization, "skn").as_deref(), Some("testAccessKeyName"));
    assert_eq!(
        sas_param(authorization, "sr").as_deref(),
        Some("https%3A%2F%2Ftesthub-ns.servicebus.windows.net")
    );
    assert_eq!(header(&request, "X-Apns-Expiration"), Some(expiry.as_str()));
    assert_eq!(header(&request, "X-Apns-Push-Type"), Some("alert"));
    assert_eq!(header(&request, "X-Apns-Priority"), Some("10"));
    assert!(request.headers.get("ServiceBusNotification-Tags").is_none());
}

#[tokio::test]
async fn test_send_reads_telemetry_from_location() {
    let transport = RecordingTransport::with_location(
        "https://testhub-ns.servicebus.windows.net/testhub/messages/3288835312934927344-986564390439048203-1?api-version=2015-01",
    );
    let hub = hub_with(transport);
    let notification = Notification::new(NotificationFormat::Gcm, r#"{"data":{}}"#);

    let telemetry = hub
        .send(&notification, None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        telemetry.notification_message_id.as_deref(),
        Some("3288835312934927344-986564390439048203-1")
    );
}

#[tokio::test]
async fn test_schedule_in_future() {
    let transport = RecordingTransport::ok();
    let hub = hub_with(transport.clone());
    let notification = Notification::new(NotificationFormat::Gcm, r#"{"data":{}}"#);
    let deliver_at = DateTime::from_timestamp(NOW, 0).unwrap() + Duration::seconds(1);

    hub.schedule(&notification, Some("vip"), deliver_at, &CancellationToken::new())
        .await
        .unwrap();

    let request = transport.last_request();
    assert_eq!(
        request.url.as_str(),
        "https://testhub-ns.servicebus.windows.net/testhub/schedulednotifications?api-version=2015-01"
    );
    assert_eq!(
        header(&request, "ServiceBusNotification-ScheduleTime"),
        Some("2023-11-14T22:13:21")
    );
    assert_eq!(header(&request, "ServiceBusNotification-Tags"), Some("vip"));
}

#[tokio::test]
async fn test_schedule_in_past_is_rejected_locally() {
    let transport = RecordingTransport::ok();
    let hub = hub_with(transport.clone());
    let notification = Notification::new(NotificationFormat::Gcm, r#"{"data":{}}"#);
    let deliver_at = DateTime::from_timestamp(NOW, 0).unwrap() - Duration::seconds(1);

    let err = hub
        .schedule(&notification, None, deliver_at, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, HubError::ScheduleInPast));
    assert_eq!(err.to_string(), "cannot schedule a notification in the past");
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn test_send_direct() {
    let transport = RecordingTransport::ok();
    let hub = hub_with(transport.clone());
    let notification = Notification::new(NotificationFormat::Apple, r#"{"aps":{"content-available":1}}"#);

    hub.send_direct(&notification, "DEVICE-TOKEN", &CancellationToken::new())
        .await
        .unwrap();

    let request = transport.last_request();
    assert_eq!(
        request.url.as_str(),
        "https://testhub-ns.servicebus.windows.net/testhub/messages?api-version=2015-01&direct="
    );
    assert_eq!(
        header(&request, "ServiceBusNotification-DeviceHandle"),
        Some("DEVICE-TOKEN")
    );
    assert_eq!(header(&request, "X-Apns-Push-Type"), Some("background"));
    assert_eq!(header(&request, "X-Apns-Priority"), Some("5"));
}

#[tokio::test]
async fn test_send_direct_batch() {
    let transport = RecordingTransport::ok();
    let hub = hub_with(transport.clone());
    let notification = Notification::new(NotificationFormat::Gcm, r#"{"data":{}}"#);
    let handles = vec!["h1".to_string(), "h2".to_string()];

    hub.send_direct_batch(&notification, &handles, &CancellationToken::new())
        .await
        .unwrap();

    let request = transport.last_request();
    assert_eq!(
        request.url.as_str(),
        "https://testhub-ns.servicebus.windows.net/testhub/messages/$batch?api-version=2015-01&direct="
    );
    assert!(header(&request, "Content-Type")
        .unwrap()
        .starts_with("multipart/mixed; boundary="));

    let body = String::from_utf8(request.body).unwrap();
    assert!(body.contains("Content-Disposition: inline; name=notification"));
    assert!(body.contains("Content-Disposition: inline; name=devices"));
    assert!(body.contains(r#"["h1","h2"]"#));
}

#[tokio::test]
async fn test_direct_batch_limit() {
    let transport = RecordingTransport::ok();
    let hub = hub_with(transport.clone());
    let notification = Notification::new(NotificationFormat::Gcm, r#"{"data":{}}"#);

    let handles: Vec<String> = (0..1000).map(|i| format!("handle-{}", i)).collect();
    hub.send_direct_batch(&notification, &handles, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(transport.requests().len(), 1);

    let handles: Vec<String> = (0..1001).map(|i| format!("handle-{}", i)).collect();
    let err = hub
        .send_direct_batch(&notification, &handles, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, HubError::BatchTooLarge { count: 1001, max: 1000 }));
    assert_eq!(err.stage(), ErrorStage::Validation);
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
async fn test_non_success_status() {
    let transport = RecordingTransport::respond(401, HeaderMap::new(), b"Unauthorized".to_vec());
    let hub = hub_with(transport);
    let notification = Notification::new(NotificationFormat::Gcm, r#"{"data":{}}"#);

    let err = hub
        .send(&notification, None, &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        HubError::UnexpectedStatus {
            operation,
            status,
            ref body,
        } => {
            assert_eq!(operation, "send");
            assert_eq!(status, 401);
            assert_eq!(body, "Unauthorized");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_transport_failure_carries_operation() {
    let hub = hub_with(Arc::new(FailingTransport));
    let notification = Notification::new(NotificationFormat::Gcm, r#"{"data":{}}"#);

    let err = hub
        .send_direct(&notification, "h1", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, HubError::Transport { operation: "send_direct", .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_cancelled_before_send() {
    let transport = RecordingTransport::ok();
    let hub = hub_with(transport.clone());
    let notification = Notification::new(NotificationFormat::Gcm, r#"{"data":{}}"#);

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = hub.send(&notification, None, &cancel).await.unwrap_err();
    assert!(matches!(err, HubError::Cancelled));
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn test_cancelled_while_in_flight() {
    let hub = hub_with(Arc::new(StalledTransport));
    let notification = Notification::new(NotificationFormat::Gcm, r#"{"data":{}}"#);
    let cancel = CancellationToken::new();

    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            cancel.cancel();
        })
    };

    let err = hub.send(&notification, None, &cancel).await.unwrap_err();
    assert!(matches!(err, HubError::Cancelled));
    canceller.await.unwrap();
}
