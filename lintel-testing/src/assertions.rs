// Assertions over recorded channel output

use crate::RecordingChannel;
use http::StatusCode;

/// Assert the status that went on the wire
pub fn assert_status(channel: &RecordingChannel, expected: StatusCode) {
    let actual = channel.status();
    assert_eq!(
        actual,
        Some(expected),
        "Expected status {}, got {:?}",
        expected,
        actual
    );
}

/// Assert a header of the buffered response or streamed head
pub fn assert_header(channel: &RecordingChannel, key: &str, expected: &str) {
    let actual = channel.header(key);
    assert_eq!(
        actual,
        Some(expected),
        "Expected header '{}' to be '{}', got {:?}",
        key,
        expected,
        actual
    );
}

pub fn assert_no_header(channel: &RecordingChannel, key: &str) {
    let actual = channel.header(key);
    assert!(actual.is_none(), "Expected no '{}' header, got {:?}", key, actual);
}

/// Assert the concatenated body bytes
pub fn assert_body(channel: &RecordingChannel, expected: &[u8]) {
    let body = channel.body();
    assert_eq!(
        body.as_ref(),
        expected,
        "Body mismatch: got {:?}",
        String::from_utf8_lossy(&body)
    );
}

/// Assert the body parses as JSON equal to `expected`
pub fn assert_json(channel: &RecordingChannel, expected: &serde_json::Value) {
    let body = channel.body();
    let actual: serde_json::Value = serde_json::from_slice(&body)
        .unwrap_or_else(|e| panic!("Body is not JSON ({}): {:?}", e, String::from_utf8_lossy(&body)));
    assert_eq!(&actual, expected, "JSON bodies do not match");
}

/// Assert nothing at all reached the channel
pub fn assert_nothing_written(channel: &RecordingChannel) {
    assert!(
        channel.is_empty(),
        "Expected no channel activity, got {:?}",
        channel.ops()
    );
}
