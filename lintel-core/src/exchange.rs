// Request and response types seen by the body pipeline

use crate::body_type::BodyType;
use crate::headers::{ACCEPT, HeaderMap};
use crate::media_type::{Accept, MediaType};
use bytes::Bytes;
use http::{Method, StatusCode};
use std::any::Any;
use std::fmt;

/// Inbound request as handed over by the surrounding server.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Acceptable media types, `*/*` when no Accept header was sent.
    pub fn accept(&self) -> Accept {
        let values = self.headers.get_all(ACCEPT);
        if values.is_empty() {
            return Accept::any();
        }
        let joined = values
            .iter()
            .map(|v| v.as_str())
            .collect::<Vec<_>>()
            .join(",");
        Accept::parse(&joined)
    }

    /// Declared Content-Type of the body.
    pub fn content_type(&self) -> Option<MediaType> {
        self.headers.content_type_media()
    }
}

/// Outgoing response being assembled for one exchange.
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    body: Option<OutgoingBody>,
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn ok() -> Self {
        Self::new(StatusCode::OK)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn body(&self) -> Option<&OutgoingBody> {
        self.body.as_ref()
    }

    pub fn set_body(&mut self, body: OutgoingBody) {
        self.body = Some(body);
    }

    pub fn take_body(&mut self) -> Option<OutgoingBody> {
        self.body.take()
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::ok()
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .finish()
    }
}

/// A type-erased application value on its way out, with the type it was
/// declared as and the media types its producer can emit.
pub struct OutgoingBody {
    value: Box<dyn Any + Send>,
    body_type: BodyType,
    produces: Vec<MediaType>,
}

impl OutgoingBody {
    pub fn new<T: Any + Send>(value: T) -> Self {
        Self {
            value: Box::new(value),
            body_type: BodyType::of::<T>(),
            produces: Vec::new(),
        }
    }

    /// Override the declared type, e.g. with an erased pattern carrying type arguments.
    pub fn with_body_type(mut self, body_type: BodyType) -> Self {
        self.body_type = body_type;
        self
    }

    pub fn with_produces(mut self, produces: Vec<MediaType>) -> Self {
        self.produces = produces;
        self
    }

    pub fn body_type(&self) -> &BodyType {
        &self.body_type
    }

    pub fn produces(&self) -> &[MediaType] {
        &self.produces
    }

    pub fn value(&self) -> &dyn Any {
        self.value.as_ref()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Take the value back out as `T`, or get `self` back on mismatch.
    pub fn downcast<T: Any>(self) -> Result<T, Self> {
        let Self {
            value,
            body_type,
            produces,
        } = self;
        match value.downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(value) => Err(Self {
                value,
                body_type,
                produces,
            }),
        }
    }

    pub fn into_parts(self) -> (Box<dyn Any + Send>, BodyType, Vec<MediaType>) {
        (self.value, self.body_type, self.produces)
    }
}

impl fmt::Debug for OutgoingBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutgoingBody")
            .field("body_type", &self.body_type)
            .field("produces", &self.produces)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_defaults_to_any() {
        let request = Request::get("/");
        assert!(request.accept().media_types()[0].is_any());
    }

    #[test]
    fn test_accept_merges_repeated_headers() {
        let request = Request::get("/")
            .with_header("Accept", "text/plain;q=0.5")
            .with_header("accept", "application/json");
        let accept = request.accept();
        assert_eq!(accept.media_types()[0], MediaType::json());
        assert_eq!(accept.media_types()[1], MediaType::text_plain());
    }

    #[test]
    fn test_content_type() {
        let request = Request::post("/").with_header("Content-Type", "text/plain; charset=latin1");
        let content_type = request.content_type().unwrap();
        assert_eq!(content_type.charset(), Some("latin1"));
    }

    #[test]
    fn test_outgoing_body_downcast() {
        let body = OutgoingBody::new(String::from("hi"));
        assert!(body.body_type().is::<String>());
        assert_eq!(body.downcast_ref::<String>().map(String::as_str), Some("hi"));

        let body = body.downcast::<u32>().unwrap_err();
        assert_eq!(body.downcast::<String>().unwrap(), "hi");
    }

    #[test]
    fn test_response_body_slot() {
        let mut response = Response::ok();
        assert!(response.body().is_none());
        response.set_body(OutgoingBody::new(1u8));
        assert!(response.take_body().is_some());
        assert!(response.body().is_none());
    }
}
