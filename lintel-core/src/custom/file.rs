//! File serving.
//!
//! [`SystemFileHandler`] turns a [`SystemFile`] into a [`CustomBody::File`]
//! carrying an open [`FileResource`]; the channel then sends it with
//! zero-copy transfer or the assembler streams it in chunks.
//! [`PathFileHandler`] accepts a bare `PathBuf` and delegates.

use super::{CustomBody, CustomResponse, CustomResponseHandler};
use crate::body_type::BodyType;
use crate::error::{CodecError, Error, Result};
use crate::exchange::{OutgoingBody, Request, Response};
use crate::headers::{CONTENT_TYPE, IF_MODIFIED_SINCE, LAST_MODIFIED};
use crate::media_type::MediaType;
use crate::streaming::BodyStream;
use crate::transport::ResponseHead;
use async_trait::async_trait;
use http::StatusCode;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;
use tracing::debug;

/// A file on the local filesystem to send as the response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemFile {
    path: PathBuf,
    media_type: Option<MediaType>,
}

impl SystemFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            media_type: None,
        }
    }

    /// Use this Content-Type instead of guessing from the extension.
    pub fn with_media_type(mut self, media_type: MediaType) -> Self {
        self.media_type = Some(media_type);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Declared media type, or a guess from the file extension.
    pub fn media_type(&self) -> MediaType {
        self.media_type.clone().unwrap_or_else(|| {
            let guessed = mime_guess::from_path(&self.path).first_or_octet_stream();
            MediaType::parse(guessed.essence_str()).unwrap_or_else(MediaType::octet_stream)
        })
    }
}

/// An open file handle plus the number of bytes to send.
///
/// Dropping it closes the file, so whoever holds it last releases it.
pub struct FileResource {
    file: File,
    path: PathBuf,
    length: u64,
}

impl FileResource {
    pub async fn open(path: impl AsRef<Path>) -> io::Result<(Self, std::fs::Metadata)> {
        let path = path.as_ref();
        let file = File::open(path).await?;
        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }
        let resource = Self {
            file,
            path: path.to_path_buf(),
            length: metadata.len(),
        };
        Ok((resource, metadata))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Hand the raw handle to a channel that can send it directly.
    pub fn into_file(self) -> File {
        self.file
    }

    /// Chunked read of exactly `len()` bytes, for channels without zero-copy.
    pub fn into_stream(self, chunk_size: usize) -> BodyStream {
        let reader = self.file.take(self.length);
        Box::pin(ReaderStream::with_capacity(reader, chunk_size.max(1)))
    }
}

impl fmt::Debug for FileResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileResource")
            .field("path", &self.path)
            .field("length", &self.length)
            .finish()
    }
}

fn unix_seconds(time: SystemTime) -> Option<u64> {
    time.duration_since(UNIX_EPOCH).ok().map(|d| d.as_secs())
}

/// Serves [`SystemFile`] values.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemFileHandler;

impl SystemFileHandler {
    pub const NAME: &'static str = "system-file";

    /// Open `file` and describe the response.
    ///
    /// Answers `304 Not Modified` when the request's `If-Modified-Since` is
    /// not older than the file's modification time.
    pub async fn serve(
        &self,
        file: SystemFile,
        request: &Request,
        response: &mut Response,
    ) -> Result<CustomResponse> {
        let body_type = BodyType::of::<SystemFile>();
        let (resource, metadata) = FileResource::open(file.path())
            .await
            .map_err(|e| Error::custom_handler(Self::NAME, body_type.clone(), e))?;

        let modified = metadata.modified().ok();
        if let Some(modified) = modified {
            response
                .headers
                .insert(LAST_MODIFIED, httpdate::fmt_http_date(modified));
        }

        let since = request
            .headers
            .get(IF_MODIFIED_SINCE)
            .and_then(|value| httpdate::parse_http_date(value).ok());
        if let (Some(modified), Some(since)) = (modified.and_then(unix_seconds), since.and_then(unix_seconds))
        {
            if modified <= since {
                debug!(path = %file.path().display(), "file not modified");
                drop(resource);
                response.status = StatusCode::NOT_MODIFIED;
                return Ok(CustomResponse::new(
                    ResponseHead::from_response(response),
                    CustomBody::Empty,
                    false,
                ));
            }
        }

        if !response.headers.contains(CONTENT_TYPE) {
            response.headers.set_content_type(&file.media_type());
        }
        response.headers.set_content_length(
            usize::try_from(resource.len())
                .map_err(|e| Error::custom_handler(Self::NAME, body_type, e))?,
        );

        debug!(path = %file.path().display(), length = resource.len(), "serving file");
        Ok(CustomResponse::new(
            ResponseHead::from_response(response),
            CustomBody::File(resource),
            true,
        ))
    }
}

#[async_trait]
impl CustomResponseHandler for SystemFileHandler {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn supports(&self, body_type: &BodyType) -> bool {
        body_type.is::<SystemFile>()
    }

    async fn handle(
        &self,
        value: OutgoingBody,
        request: &Request,
        response: &mut Response,
    ) -> Result<CustomResponse> {
        let body_type = value.body_type().clone();
        let file = value.downcast::<SystemFile>().map_err(|_| {
            Error::custom_handler(
                Self::NAME,
                body_type,
                CodecError::TypeMismatch {
                    expected: std::any::type_name::<SystemFile>(),
                },
            )
        })?;
        self.serve(file, request, response).await
    }
}

/// Serves a bare `PathBuf` by wrapping it into a [`SystemFile`].
#[derive(Debug, Clone)]
pub struct PathFileHandler {
    system: Arc<SystemFileHandler>,
}

impl PathFileHandler {
    pub const NAME: &'static str = "path-file";

    pub fn new(system: Arc<SystemFileHandler>) -> Self {
        Self { system }
    }
}

#[async_trait]
impl CustomResponseHandler for PathFileHandler {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn order(&self) -> i32 {
        10
    }

    fn supports(&self, body_type: &BodyType) -> bool {
        body_type.is::<PathBuf>()
    }

    async fn handle(
        &self,
        value: OutgoingBody,
        request: &Request,
        response: &mut Response,
    ) -> Result<CustomResponse> {
        let body_type = value.body_type().clone();
        let path = value.downcast::<PathBuf>().map_err(|_| {
            Error::custom_handler(
                Self::NAME,
                body_type,
                CodecError::TypeMismatch {
                    expected: std::any::type_name::<PathBuf>(),
                },
            )
        })?;
        let file = SystemFile::new(path);
        response.set_body(OutgoingBody::new(file.clone()));
        self.system.serve(file, request, response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    fn temp_file(contents: &[u8], suffix: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_media_type_guess() {
        assert_eq!(SystemFile::new("a/b/index.html").media_type(), MediaType::html());
        assert_eq!(
            SystemFile::new("blob.unknownext").media_type(),
            MediaType::octet_stream()
        );
        assert_eq!(
            SystemFile::new("x.html")
                .with_media_type(MediaType::text_plain())
                .media_type(),
            MediaType::text_plain()
        );
    }

    #[tokio::test]
    async fn test_serve_sets_headers_and_resource() {
        let tmp = temp_file(b"hello file", ".txt");
        let request = Request::get("/file");
        let mut response = Response::ok();

        let custom = SystemFileHandler
            .serve(SystemFile::new(tmp.path()), &request, &mut response)
            .await
            .unwrap();

        assert!(custom.need_last);
        assert_eq!(custom.head.status, StatusCode::OK);
        assert_eq!(custom.head.headers.content_length(), Some(10));
        assert_eq!(custom.head.headers.content_type(), Some(&"text/plain".to_string()));
        assert!(custom.head.headers.contains(LAST_MODIFIED));
        match custom.body {
            CustomBody::File(resource) => assert_eq!(resource.len(), 10),
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_caller_content_type_is_kept() {
        let tmp = temp_file(b"{}", ".json");
        let mut response = Response::ok().with_header("Content-Type", "application/vnd.custom");
        let custom = SystemFileHandler
            .serve(SystemFile::new(tmp.path()), &Request::get("/"), &mut response)
            .await
            .unwrap();
        assert_eq!(
            custom.head.headers.content_type(),
            Some(&"application/vnd.custom".to_string())
        );
    }

    #[tokio::test]
    async fn test_not_modified() {
        let tmp = temp_file(b"cached", ".txt");
        let later = SystemTime::now() + Duration::from_secs(3600);
        let request = Request::get("/").with_header(IF_MODIFIED_SINCE, httpdate::fmt_http_date(later));
        let mut response = Response::ok();

        let custom = SystemFileHandler
            .serve(SystemFile::new(tmp.path()), &request, &mut response)
            .await
            .unwrap();

        assert_eq!(custom.head.status, StatusCode::NOT_MODIFIED);
        assert!(matches!(custom.body, CustomBody::Empty));
        assert!(!custom.need_last);
    }

    #[tokio::test]
    async fn test_stale_if_modified_since_serves_file() {
        let tmp = temp_file(b"fresh", ".txt");
        let request = Request::get("/").with_header(
            IF_MODIFIED_SINCE,
            httpdate::fmt_http_date(UNIX_EPOCH + Duration::from_secs(86_400)),
        );
        let custom = SystemFileHandler
            .serve(SystemFile::new(tmp.path()), &request, &mut Response::ok())
            .await
            .unwrap();
        assert_eq!(custom.head.status, StatusCode::OK);
        assert!(matches!(custom.body, CustomBody::File(_)));
    }

    #[tokio::test]
    async fn test_missing_file_is_custom_handler_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = SystemFileHandler
            .serve(
                SystemFile::new(dir.path().join("nope.txt")),
                &Request::get("/"),
                &mut Response::ok(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CustomHandler { .. }));
        assert!(err.is_server_error());
    }

    #[tokio::test]
    async fn test_path_handler_delegates() {
        let tmp = temp_file(b"abc", ".bin");
        let handler = PathFileHandler::new(Arc::new(SystemFileHandler));
        let mut response = Response::ok();

        assert!(handler.supports(&BodyType::of::<PathBuf>()));
        assert!(!handler.supports(&BodyType::of::<SystemFile>()));

        let custom = handler
            .handle(
                OutgoingBody::new(tmp.path().to_path_buf()),
                &Request::get("/"),
                &mut response,
            )
            .await
            .unwrap();

        assert!(response.body().is_some_and(|b| b.body_type().is::<SystemFile>()));
        assert_eq!(custom.head.headers.content_length(), Some(3));
    }

    #[tokio::test]
    async fn test_into_stream_reads_exact_length() {
        use futures_util::StreamExt;

        let tmp = temp_file(&[7u8; 10_000], ".bin");
        let (resource, _) = FileResource::open(tmp.path()).await.unwrap();
        let chunks: Vec<_> = resource
            .into_stream(4096)
            .map(|c| c.unwrap().len())
            .collect()
            .await;
        assert_eq!(chunks.iter().sum::<usize>(), 10_000);
        assert!(chunks.iter().all(|&len| len <= 4096));
    }
}
