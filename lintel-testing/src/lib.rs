//! Testing utilities for the Lintel body pipeline.
//!
//! - **RecordingChannel** - transport channel that records every write and
//!   can simulate zero-copy support, disconnects and socket failures
//! - **TestRequest** - request builder
//! - **Assertions** - checks over recorded output
//!
//! ```
//! use lintel_core::{OutgoingBody, Response, ResponseAssembler};
//! use lintel_testing::*;
//!
//! # tokio_test::block_on(async {
//! let assembler = ResponseAssembler::with_defaults();
//! let request = TestRequest::get("/").accept("application/json").build();
//! let mut channel = RecordingChannel::new();
//!
//! assembler
//!     .render(
//!         OutgoingBody::new(serde_json::json!({"ok": true})),
//!         &request,
//!         &mut Response::ok(),
//!         &mut channel,
//!     )
//!     .await
//!     .unwrap();
//!
//! assert_status(&channel, http::StatusCode::OK);
//! assert_header(&channel, "Content-Type", "application/json");
//! assert_json(&channel, &serde_json::json!({"ok": true}));
//! # });
//! ```

mod assertions;
mod channel;
mod request;

pub use assertions::{
    assert_body, assert_header, assert_json, assert_no_header, assert_nothing_written,
    assert_status,
};
pub use channel::{ChannelOp, RecordingChannel};
pub use request::TestRequest;
