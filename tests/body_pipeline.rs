//! Integration tests for negotiation, codec dispatch and write strategies.

use bytes::Bytes;
use http::StatusCode;
use lintel::prelude::*;
use lintel::{CodecError, TextPlainHandler, TransportTextPlainHandler};
use lintel_testing::*;
use std::any::Any;
use std::io::{Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn assembler_with(codecs: CodecRegistry) -> ResponseAssembler {
    ResponseAssembler::new(
        Arc::new(codecs),
        Arc::new(CustomResponseRegistry::with_defaults()),
    )
}

// =============================================================================
// Negotiation
// =============================================================================

#[tokio::test]
async fn test_negotiation_failure_before_any_writer() {
    let resolved = Arc::new(AtomicUsize::new(0));
    let codecs = CodecRegistry::builder()
        .with_defaults()
        .register(
            HandlerRegistration::writer(
                BodyType::of::<String>(),
                vec![MediaType::text_plain()],
                CountingWriter(resolved.clone()),
            )
            .priority(10),
        )
        .build();
    let assembler = assembler_with(codecs);

    let request = TestRequest::get("/").accept("application/json").build();
    let mut channel = RecordingChannel::new();
    let err = assembler
        .render(
            OutgoingBody::new(String::from("hello")).with_produces(vec![MediaType::text_plain()]),
            &request,
            &mut Response::ok(),
            &mut channel,
        )
        .await
        .unwrap_err();

    assert!(matches!(err.error, Error::NotAcceptable { .. }));
    assert_eq!(err.error.status_code(), StatusCode::NOT_ACCEPTABLE);
    assert!(!err.committed);
    assert_eq!(resolved.load(Ordering::SeqCst), 0);
    assert_nothing_written(&channel);
}

#[tokio::test]
async fn test_quality_order_selects_media_type() {
    let assembler = ResponseAssembler::with_defaults();
    let request = TestRequest::get("/")
        .accept("text/plain;q=0.3, text/html")
        .build();
    let mut channel = RecordingChannel::new();

    assembler
        .render(
            OutgoingBody::new(String::from("<b>hi</b>"))
                .with_produces(vec![MediaType::text_plain(), MediaType::html()]),
            &request,
            &mut Response::ok(),
            &mut channel,
        )
        .await
        .unwrap();

    assert_header(&channel, "Content-Type", "text/html");
    assert_body(&channel, b"<b>hi</b>");
}

// =============================================================================
// Codec registry
// =============================================================================

struct CountingWriter(Arc<AtomicUsize>);

impl MessageBodyWriter for CountingWriter {
    fn write_to(
        &self,
        _body_type: &BodyType,
        value: &dyn Any,
        _media_type: &MediaType,
        headers: &mut HeaderMap,
        output: &mut dyn Write,
    ) -> std::result::Result<(), CodecError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        let text = value
            .downcast_ref::<String>()
            .ok_or(CodecError::TypeMismatch { expected: "String" })?;
        headers.set_if_absent("Content-Type", "text/plain");
        output.write_all(text.to_uppercase().as_bytes())?;
        Ok(())
    }
}

#[tokio::test]
async fn test_override_applies_to_its_pair_only() {
    let calls = Arc::new(AtomicUsize::new(0));
    let codecs = CodecRegistry::builder()
        .with_defaults()
        .register(HandlerRegistration::writer(
            BodyType::of::<String>(),
            vec![MediaType::text_plain()],
            CountingWriter(calls.clone()),
        ))
        .build();
    let assembler = assembler_with(codecs);

    let mut plain = RecordingChannel::new();
    assembler
        .render(
            OutgoingBody::new(String::from("shout")).with_produces(vec![MediaType::text_plain()]),
            &TestRequest::get("/").build(),
            &mut Response::ok(),
            &mut plain,
        )
        .await
        .unwrap();
    assert_body(&plain, b"SHOUT");

    let mut html = RecordingChannel::new();
    assembler
        .render(
            OutgoingBody::new(String::from("quiet")).with_produces(vec![MediaType::html()]),
            &TestRequest::get("/").build(),
            &mut Response::ok(),
            &mut html,
        )
        .await
        .unwrap();
    assert_body(&html, b"quiet");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

struct CountingReader(Arc<AtomicUsize>);

impl Read for CountingReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.fetch_add(buf.len().max(1), Ordering::SeqCst);
        Ok(0)
    }
}

#[test]
fn test_unsupported_reader_consumes_no_bytes() {
    let registry = CodecRegistry::with_defaults();
    let consumed = Arc::new(AtomicUsize::new(0));
    let mut input = CountingReader(consumed.clone());

    let err = registry
        .read(
            &BodyType::of::<String>(),
            &MediaType::new("application", "x-unknown"),
            &HeaderMap::new(),
            &mut input,
        )
        .unwrap_err();

    assert!(matches!(err, Error::UnsupportedMediaType { .. }));
    assert_eq!(err.status_code(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(consumed.load(Ordering::SeqCst), 0);
}

#[test]
fn test_request_body_decoding() {
    #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Order {
        id: u32,
        items: Vec<String>,
    }

    let assembler = assembler_with(
        CodecRegistry::builder()
            .with_defaults()
            .register_json::<Order>()
            .build(),
    );
    let order = Order {
        id: 3,
        items: vec!["tea".into()],
    };
    let request = TestRequest::post("/orders").json(&order).build();

    let decoded: Order = assembler.read_body_as(&request).unwrap();
    assert_eq!(decoded, order);

    let typed = assembler.typed::<Order>(request);
    assert_eq!(typed.body().unwrap(), Some(order));

    let broken = TestRequest::post("/orders")
        .content_type(&MediaType::json())
        .body("{")
        .build();
    let err = assembler.read_body_as::<Order>(&broken).unwrap_err();
    assert!(matches!(err, Error::Decoding { .. }));
    assert!(err.is_client_error());
}

// =============================================================================
// Write strategies
// =============================================================================

#[tokio::test]
async fn test_zero_length_buffered_write() {
    let assembler = ResponseAssembler::with_defaults();
    let mut channel = RecordingChannel::new();

    assembler
        .render(
            OutgoingBody::new(String::new()).with_produces(vec![MediaType::text_plain()]),
            &TestRequest::get("/").build(),
            &mut Response::ok(),
            &mut channel,
        )
        .await
        .unwrap();

    assert!(channel.is_buffered());
    assert_header(&channel, "Content-Length", "0");
    assert_no_header(&channel, "Transfer-Encoding");
    assert_eq!(channel.chunk_count(), 0);
}

#[tokio::test]
async fn test_transport_text_handler_replaces_plain() {
    let codecs = CodecRegistry::builder()
        .with_defaults()
        .with_transport_handlers()
        .build();
    let names: Vec<_> = codecs.registrations().iter().filter_map(|r| r.name()).collect();
    assert!(names.contains(&TransportTextPlainHandler::NAME));
    assert!(!names.contains(&TextPlainHandler::NAME));

    let assembler = assembler_with(codecs);
    let mut response = Response::ok().with_header("Content-Type", "text/plain; charset=utf-16le");
    let mut channel = RecordingChannel::new();
    assembler
        .render(
            OutgoingBody::new(String::from("ok")),
            &TestRequest::get("/").build(),
            &mut response,
            &mut channel,
        )
        .await
        .unwrap();

    assert!(channel.is_buffered());
    assert_body(&channel, &[b'o', 0, b'k', 0]);
    assert_header(&channel, "Content-Type", "text/plain; charset=utf-16le");
}

#[tokio::test]
async fn test_header_guard_across_renders() {
    let assembler = ResponseAssembler::with_defaults();
    let mut response = Response::ok().with_header("Content-Type", "text/plain; charset=iso-8859-1");

    for _ in 0..2 {
        let mut channel = RecordingChannel::new();
        assembler
            .render(
                OutgoingBody::new(String::from("café")),
                &TestRequest::get("/").build(),
                &mut response,
                &mut channel,
            )
            .await
            .unwrap();
        assert_header(&channel, "Content-Type", "text/plain; charset=iso-8859-1");
        assert_body(&channel, b"caf\xE9");
    }
}

#[tokio::test]
async fn test_ndjson_streams_chunks_with_terminal() {
    let assembler = ResponseAssembler::with_defaults();
    let items = vec![serde_json::json!({"n": 1}), serde_json::json!({"n": 2})];
    let mut channel = RecordingChannel::new();

    assembler
        .render(
            OutgoingBody::new(items).with_produces(vec![MediaType::ndjson()]),
            &TestRequest::get("/").accept("application/x-ndjson").build(),
            &mut Response::ok(),
            &mut channel,
        )
        .await
        .unwrap();

    assert!(!channel.is_buffered());
    assert_eq!(channel.chunk_count(), 2);
    assert_eq!(channel.ready_calls(), 2);
    assert_eq!(channel.terminal_count(), 1);
    assert_no_header(&channel, "Content-Length");
    assert_body(&channel, b"{\"n\":1}\n{\"n\":2}\n");
}

#[tokio::test]
async fn test_failure_after_commit_aborts() {
    let assembler = ResponseAssembler::with_defaults();
    let items = vec![serde_json::json!(1), serde_json::json!(2)];
    let mut channel = RecordingChannel::new().fail_chunk_at(1);

    let err = assembler
        .render(
            OutgoingBody::new(items).with_produces(vec![MediaType::ndjson()]),
            &TestRequest::get("/").build(),
            &mut Response::ok(),
            &mut channel,
        )
        .await
        .unwrap_err();

    assert!(err.committed);
    assert!(matches!(err.error, Error::Transport(_)));
    assert!(channel.aborted());
    assert_eq!(channel.terminal_count(), 0);
}

#[tokio::test]
async fn test_error_response_for_uncommitted_failure() {
    let assembler = ResponseAssembler::with_defaults();
    let mut channel = RecordingChannel::new();
    let err = assembler
        .render(
            OutgoingBody::new(7i64),
            &TestRequest::get("/").build(),
            &mut Response::ok(),
            &mut channel,
        )
        .await
        .unwrap_err();

    let response = err.error_response().unwrap();
    channel.write_buffered(response).await.unwrap();
    assert_status(&channel, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_header(&channel, "Content-Type", "application/json");

    let body: serde_json::Value = serde_json::from_slice(&channel.body()).unwrap();
    assert_eq!(body["status"], 415);
}

#[tokio::test]
async fn test_empty_response_via_send() {
    let assembler = ResponseAssembler::with_defaults();
    let mut response = Response::new(StatusCode::NO_CONTENT);
    let mut channel = RecordingChannel::new();
    assembler
        .send(&TestRequest::get("/").build(), &mut response, &mut channel)
        .await
        .unwrap();
    assert_status(&channel, StatusCode::NO_CONTENT);
    assert_no_header(&channel, "Content-Length");
    assert_eq!(channel.body(), Bytes::new());
}
