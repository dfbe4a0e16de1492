// Request builder for tests

use bytes::Bytes;
use http::Method;
use lintel_core::{MediaType, Request};
use serde::Serialize;

/// Fluent builder for [`Request`].
#[derive(Debug, Clone)]
pub struct TestRequest {
    inner: Request,
}

impl TestRequest {
    pub fn get(path: &str) -> Self {
        Self {
            inner: Request::get(path),
        }
    }

    pub fn post(path: &str) -> Self {
        Self {
            inner: Request::post(path),
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.inner.method = method;
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.inner = self.inner.with_header(name, value);
        self
    }

    pub fn accept(self, value: &str) -> Self {
        self.header("Accept", value)
    }

    pub fn content_type(self, media_type: &MediaType) -> Self {
        let value = media_type.to_header_value();
        self.header("Content-Type", &value)
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.inner = self.inner.with_body(body);
        self
    }

    /// JSON body with `application/json` Content-Type.
    pub fn json<T: Serialize>(self, value: &T) -> Self {
        let body = serde_json::to_vec(value).unwrap_or_default();
        self.content_type(&MediaType::json()).body(body)
    }

    pub fn build(self) -> Request {
        self.inner
    }
}

impl From<TestRequest> for Request {
    fn from(request: TestRequest) -> Self {
        request.build()
    }
}
