//! Request/response payload encoding.

pub mod exchange;

pub use exchange::{Request, Response, DEFAULT_REQUEST_TEXT};
