use serde::Deserialize;

#[derive(Deserialize)]
struct Notification {
    #[serde(rename = "Message")]
    message: String,
}

/// The inner `Message` of a topic notification, or the body unchanged
pub fn unwrap_notification(body: &str) -> String {
    serde_json::from_str::<Notification>(body)
        .map(|notification| notification.message)
        .unwrap_or_else(|_| body.to_string())
}
