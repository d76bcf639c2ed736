use riph3::types::{CancelToken, ClientTimeouts, ConnConfig};
use std::time::Duration;

#[test]
fn default_config() {
    let config = ConnConfig::default();
    assert_eq!(config.max_field_section_size, 65_536);
    assert_eq!(config.user_agent, "riph3/0.1.0");
    assert!(!config.verify_certificates);
    assert_eq!(config.timeouts.connect, Some(Duration::from_secs(10)));
}

#[test]
fn timeout_builders() {
    let timeouts = ClientTimeouts::disabled().read(Duration::from_millis(250));
    assert_eq!(timeouts.connect, None);
    assert_eq!(timeouts.read, Some(Duration::from_millis(250)));
    assert_eq!(timeouts.write, None);

    let config = ConnConfig::default()
        .timeouts(timeouts.clone())
        .max_field_section_size(1024)
        .user_agent("probe/2");
    assert_eq!(config.timeouts, timeouts);
    assert_eq!(config.max_field_section_size, 1024);
    assert_eq!(config.user_agent, "probe/2");
}

#[tokio::test]
async fn cancel_token_wakes_every_clone() {
    let token = CancelToken::new();
    let waiter = token.clone();
    let task = tokio::spawn(async move { waiter.cancelled().await });
    assert!(!token.is_cancelled());
    token.cancel();
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("woken")
        .expect("join");
    assert!(token.is_cancelled());
    // Already cancelled tokens resolve at once.
    token.cancelled().await;
}
