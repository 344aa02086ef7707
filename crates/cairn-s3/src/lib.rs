//! Cairn S3 request dispatch
//!
//! This crate sits between the HTTP server and the operation handlers:
//! - route selection from verb, path and query
//! - authorization contexts and the authenticator call
//! - the `Expect: 100-continue` handshake
//! - body buffering under size ceilings and XML pre-checks
//! - handler invocation and S3 XML error rendering

pub mod api;
pub mod body;
pub mod checks;
pub mod contexts;
pub mod copy_source;
pub mod dispatcher;
pub mod expect;
pub mod handlers;
pub mod request;
pub mod response;
pub mod routes;

pub use api::{ApiMethod, BodyCheck};
pub use dispatcher::Dispatcher;
pub use expect::{InterimResponder, should_continue};
pub use handlers::ApiHandlers;
pub use request::{BodyStream, S3Request};
pub use response::{ErrorResponse, ResponseBody, S3Response, xml_document};
pub use routes::select_route;
