//! Integration tests for customizable response types: files and live streams.

use http::StatusCode;
use lintel::prelude::*;
use lintel::{CodecError, Http1Channel, StreamOutcome};
use lintel_testing::*;
use std::any::Any;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn fixture(len: usize, suffix: &str) -> (tempfile::NamedTempFile, Vec<u8>) {
    let contents: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(&contents).unwrap();
    file.flush().unwrap();
    (file, contents)
}

#[tokio::test]
async fn test_file_uses_zero_copy_once() {
    let (file, contents) = fixture(70_000, ".bin");
    let assembler = ResponseAssembler::with_defaults();
    let mut channel = RecordingChannel::new().with_zero_copy();

    let outcome = assembler
        .render(
            OutgoingBody::new(SystemFile::new(file.path())),
            &TestRequest::get("/download").build(),
            &mut Response::ok(),
            &mut channel,
        )
        .await
        .unwrap();

    assert_eq!(outcome, StreamOutcome::Completed);
    let zero_copies: Vec<_> = channel
        .ops()
        .iter()
        .filter_map(|op| match op {
            ChannelOp::ZeroCopy { length, .. } => Some(*length),
            _ => None,
        })
        .collect();
    assert_eq!(zero_copies, vec![contents.len() as u64]);
    assert_eq!(channel.chunk_count(), 0);
    assert_eq!(channel.terminal_count(), 1);
    assert_header(&channel, "Content-Length", "70000");
    assert_header(&channel, "Content-Type", "application/octet-stream");
    assert_body(&channel, &contents);
}

#[tokio::test]
async fn test_file_streams_without_zero_copy() {
    let (file, contents) = fixture(10_000, ".txt");
    let assembler = ResponseAssembler::with_defaults()
        .with_config(BodyConfig::default().with_chunk_size(4096));
    let mut channel = RecordingChannel::new();

    assembler
        .render(
            OutgoingBody::new(SystemFile::new(file.path())),
            &TestRequest::get("/").build(),
            &mut Response::ok(),
            &mut channel,
        )
        .await
        .unwrap();

    assert!(!channel.used_zero_copy());
    assert!(channel.chunk_count() >= 3);
    assert!(channel.ops().iter().all(|op| match op {
        ChannelOp::Chunk(chunk) => chunk.len() <= 4096,
        _ => true,
    }));
    assert_body(&channel, &contents);
    assert_header(&channel, "Content-Type", "text/plain");
    assert_eq!(channel.terminal_count(), 1);
}

#[tokio::test]
async fn test_zero_copy_disabled_by_config() {
    let (file, contents) = fixture(100, ".bin");
    let assembler =
        ResponseAssembler::with_defaults().with_config(BodyConfig::default().with_zero_copy(false));
    let mut channel = RecordingChannel::new().with_zero_copy();

    assembler
        .render(
            OutgoingBody::new(SystemFile::new(file.path())),
            &TestRequest::get("/").build(),
            &mut Response::ok(),
            &mut channel,
        )
        .await
        .unwrap();

    assert!(!channel.used_zero_copy());
    assert_body(&channel, &contents);
}

#[tokio::test]
async fn test_path_value_delegates_to_file_handler() {
    let (file, contents) = fixture(64, ".json");
    let assembler = ResponseAssembler::with_defaults();
    let mut response = Response::ok();
    let mut channel = RecordingChannel::new();

    assembler
        .render(
            OutgoingBody::new(file.path().to_path_buf()),
            &TestRequest::get("/").build(),
            &mut response,
            &mut channel,
        )
        .await
        .unwrap();

    assert!(
        response
            .body()
            .and_then(|b| b.downcast_ref::<SystemFile>())
            .is_some_and(|f| f.path() == file.path())
    );
    assert_header(&channel, "Content-Type", "application/json");
    assert_body(&channel, &contents);
}

#[tokio::test]
async fn test_cancelled_download_ends_quietly() {
    let (file, _) = fixture(20_000, ".bin");
    let assembler = ResponseAssembler::with_defaults()
        .with_config(BodyConfig::default().with_chunk_size(1024));
    let mut channel = RecordingChannel::new().cancel_after(2);

    let outcome = assembler
        .render(
            OutgoingBody::new(SystemFile::new(file.path())),
            &TestRequest::get("/").build(),
            &mut Response::ok(),
            &mut channel,
        )
        .await
        .unwrap();

    assert_eq!(outcome, StreamOutcome::Cancelled);
    assert_eq!(channel.chunk_count(), 2);
    assert_eq!(channel.terminal_count(), 0);
    assert!(!channel.aborted());
}

#[tokio::test]
async fn test_missing_file_fails_before_commit() {
    let dir = tempfile::tempdir().unwrap();
    let assembler = ResponseAssembler::with_defaults();
    let mut channel = RecordingChannel::new();

    let err = assembler
        .render(
            OutgoingBody::new(dir.path().join("absent.txt")),
            &TestRequest::get("/").build(),
            &mut Response::ok(),
            &mut channel,
        )
        .await
        .unwrap_err();

    assert!(matches!(err.error, Error::CustomHandler { .. }));
    assert!(!err.committed);
    assert_eq!(
        err.error_response().map(|r| r.head.status),
        Some(StatusCode::INTERNAL_SERVER_ERROR)
    );
    assert_nothing_written(&channel);
}

#[tokio::test]
async fn test_not_modified() {
    let (file, _) = fixture(10, ".txt");
    let assembler = ResponseAssembler::with_defaults();
    let since = httpdate::fmt_http_date(std::time::SystemTime::now() + std::time::Duration::from_secs(60));
    let mut channel = RecordingChannel::new().with_zero_copy();

    assembler
        .render(
            OutgoingBody::new(SystemFile::new(file.path())),
            &TestRequest::get("/").header("If-Modified-Since", &since).build(),
            &mut Response::ok(),
            &mut channel,
        )
        .await
        .unwrap();

    assert!(channel.is_buffered());
    assert_status(&channel, StatusCode::NOT_MODIFIED);
    assert_no_header(&channel, "Content-Length");
    assert!(!channel.used_zero_copy());
}

struct SystemFileWriter(Arc<AtomicUsize>);

impl MessageBodyWriter for SystemFileWriter {
    fn write_to(
        &self,
        _body_type: &BodyType,
        _value: &dyn Any,
        _media_type: &MediaType,
        _headers: &mut HeaderMap,
        _output: &mut dyn Write,
    ) -> std::result::Result<(), CodecError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_writeable(&self, _body_type: &BodyType, _media_type: &MediaType) -> bool {
        self.0.fetch_add(1, Ordering::SeqCst);
        true
    }
}

#[tokio::test]
async fn test_custom_handler_takes_precedence_over_codecs() {
    let consulted = Arc::new(AtomicUsize::new(0));
    let codecs = CodecRegistry::builder()
        .with_defaults()
        .register(
            HandlerRegistration::writer(
                BodyType::of::<SystemFile>(),
                vec![MediaType::any()],
                SystemFileWriter(consulted.clone()),
            )
            .priority(1000),
        )
        .build();
    let assembler = ResponseAssembler::new(
        Arc::new(codecs),
        Arc::new(CustomResponseRegistry::with_defaults()),
    );
    let (file, contents) = fixture(32, ".bin");
    let mut channel = RecordingChannel::new();

    assembler
        .render(
            OutgoingBody::new(SystemFile::new(file.path())),
            &TestRequest::get("/").build(),
            &mut Response::ok(),
            &mut channel,
        )
        .await
        .unwrap();

    assert_eq!(consulted.load(Ordering::SeqCst), 0);
    assert_body(&channel, &contents);
}

#[tokio::test]
async fn test_streamed_body_from_producer_task() {
    let assembler = ResponseAssembler::with_defaults();
    let (body, sender) = StreamedBody::ndjson(2);
    let producer = tokio::spawn(async move {
        for n in 0..5 {
            sender.send_json(&serde_json::json!({ "n": n })).await.unwrap();
        }
        sender.close().await;
        sender.items_sent()
    });

    let mut channel = RecordingChannel::new();
    assembler
        .render(
            OutgoingBody::new(body),
            &TestRequest::get("/events").build(),
            &mut Response::ok(),
            &mut channel,
        )
        .await
        .unwrap();

    assert_eq!(producer.await.unwrap(), 5);
    assert_eq!(channel.chunk_count(), 5);
    assert_eq!(channel.terminal_count(), 1);
    assert_header(&channel, "Content-Type", "application/x-ndjson");
    let lines = String::from_utf8(channel.body().to_vec()).unwrap();
    assert_eq!(lines.lines().count(), 5);
}

#[tokio::test]
async fn test_cancelled_stream_releases_producer() {
    let assembler = ResponseAssembler::with_defaults();
    let (body, sender) = StreamedBody::channel(1);
    let producer = tokio::spawn(async move {
        let mut sent = 0;
        while sender.send(vec![b'x'; 8]).await.is_ok() {
            sent += 1;
        }
        sent
    });

    let mut channel = RecordingChannel::new().cancel_after(3);
    let outcome = assembler
        .render(
            OutgoingBody::new(body),
            &TestRequest::get("/").build(),
            &mut Response::ok(),
            &mut channel,
        )
        .await
        .unwrap();

    assert_eq!(outcome, StreamOutcome::Cancelled);
    let sent = producer.await.unwrap();
    assert!(sent >= 3);
    assert_eq!(channel.terminal_count(), 0);
}

#[tokio::test]
async fn test_file_over_http1_channel() {
    let (file, contents) = fixture(300, ".bin");
    let assembler = ResponseAssembler::with_defaults()
        .with_config(BodyConfig::default().with_chunk_size(128));
    let mut channel = Http1Channel::new(Vec::new());

    assembler
        .render(
            OutgoingBody::new(PathBuf::from(file.path())),
            &TestRequest::get("/").build(),
            &mut Response::ok(),
            &mut channel,
        )
        .await
        .unwrap();

    let wire = channel.into_inner();
    let split = wire.windows(4).position(|w| w == b"\r\n\r\n").unwrap() + 4;
    let head = String::from_utf8(wire[..split].to_vec()).unwrap();
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(head.contains("Content-Length: 300\r\n"));
    assert!(!head.contains("Transfer-Encoding"));
    assert_eq!(&wire[split..], &contents[..]);
}

#[tokio::test]
async fn test_streamed_body_shorter_than_declared_length_aborts() {
    let assembler = ResponseAssembler::with_defaults();
    let (body, sender) = assembler.streamed_body();
    sender.send("abc").await.unwrap();
    sender.close().await;

    let mut channel = RecordingChannel::new();
    let err = assembler
        .render(
            OutgoingBody::new(body.with_length(5)),
            &TestRequest::get("/").build(),
            &mut Response::ok(),
            &mut channel,
        )
        .await
        .unwrap_err();

    assert!(err.committed);
    assert!(matches!(
        &err.error,
        Error::Transport(e) if e.kind() == std::io::ErrorKind::UnexpectedEof
    ));
    assert_header(&channel, "Content-Length", "5");
    assert_eq!(channel.terminal_count(), 0);
    assert!(channel.aborted());
}
