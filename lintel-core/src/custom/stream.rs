use super::{CustomBody, CustomResponse, CustomResponseHandler};
use crate::body_type::BodyType;
use crate::error::{CodecError, Error, Result};
use crate::exchange::{OutgoingBody, Request, Response};
use crate::headers::{CONTENT_LENGTH, CONTENT_TYPE};
use crate::media_type::MediaType;
use crate::streaming::{BodyStream, ByteStream, ByteStreamSender, JsonStreamSender};
use crate::transport::ResponseHead;
use async_trait::async_trait;
use std::fmt;

/// A live body produced elsewhere, e.g. by a spawned task.
pub struct StreamedBody {
    stream: BodyStream,
    media_type: MediaType,
    length: Option<u64>,
}

impl StreamedBody {
    pub fn new(stream: BodyStream, media_type: MediaType) -> Self {
        Self {
            stream,
            media_type,
            length: None,
        }
    }

    /// Declare the exact length; the response is then not chunked.
    pub fn with_length(mut self, length: u64) -> Self {
        self.length = Some(length);
        self
    }

    /// Producer-fed `application/octet-stream` body.
    pub fn channel(buffer: usize) -> (Self, ByteStreamSender) {
        let (stream, sender) = ByteStream::with_buffer_size(buffer);
        (Self::new(stream.boxed(), MediaType::octet_stream()), sender)
    }

    /// Producer-fed newline-delimited JSON body.
    pub fn ndjson(buffer: usize) -> (Self, JsonStreamSender) {
        let (stream, sender) = JsonStreamSender::channel(buffer);
        (Self::new(stream.boxed(), MediaType::ndjson()), sender)
    }

    pub fn media_type(&self) -> &MediaType {
        &self.media_type
    }

    pub fn length(&self) -> Option<u64> {
        self.length
    }
}

impl fmt::Debug for StreamedBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamedBody")
            .field("media_type", &self.media_type)
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

/// Sends a [`StreamedBody`] chunk by chunk.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamedBodyHandler;

impl StreamedBodyHandler {
    pub const NAME: &'static str = "streamed-body";
}

#[async_trait]
impl CustomResponseHandler for StreamedBodyHandler {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn order(&self) -> i32 {
        20
    }

    fn supports(&self, body_type: &BodyType) -> bool {
        body_type.is::<StreamedBody>()
    }

    async fn handle(
        &self,
        value: OutgoingBody,
        _request: &Request,
        response: &mut Response,
    ) -> Result<CustomResponse> {
        let body_type = value.body_type().clone();
        let body = value.downcast::<StreamedBody>().map_err(|_| {
            Error::custom_handler(
                Self::NAME,
                body_type,
                CodecError::TypeMismatch {
                    expected: std::any::type_name::<StreamedBody>(),
                },
            )
        })?;

        if !response.headers.contains(CONTENT_TYPE) {
            response.headers.set_content_type(&body.media_type);
        }
        match body.length {
            Some(length) => {
                response.headers.insert(CONTENT_LENGTH, length.to_string());
            }
            None => {
                response.headers.remove(CONTENT_LENGTH);
            }
        }

        Ok(CustomResponse::new(
            ResponseHead::from_response(response),
            CustomBody::Stream(body.stream),
            true,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn test_handle_sets_headers() {
        let (body, sender) = StreamedBody::ndjson(4);
        let mut response = Response::ok().with_header(CONTENT_LENGTH, "99");

        let custom = StreamedBodyHandler
            .handle(OutgoingBody::new(body), &Request::get("/"), &mut response)
            .await
            .unwrap();

        assert!(custom.need_last);
        assert_eq!(
            custom.head.headers.content_type(),
            Some(&"application/x-ndjson".to_string())
        );
        assert_eq!(custom.head.headers.content_length(), None);

        sender.send_json(&serde_json::json!(1)).await.unwrap();
        sender.close().await;
        match custom.body {
            CustomBody::Stream(stream) => {
                let chunks: Vec<_> = stream.map(|c| c.unwrap()).collect().await;
                assert_eq!(chunks.concat(), b"1\n".to_vec());
            }
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_declared_length_kept() {
        let (body, _sender) = StreamedBody::channel(1);
        let mut response = Response::ok().with_header(CONTENT_TYPE, "image/png");

        let custom = StreamedBodyHandler
            .handle(
                OutgoingBody::new(body.with_length(12)),
                &Request::get("/"),
                &mut response,
            )
            .await
            .unwrap();

        assert_eq!(custom.head.headers.content_length(), Some(12));
        assert_eq!(custom.head.headers.content_type(), Some(&"image/png".to_string()));
    }
}
