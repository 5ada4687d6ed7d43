//! HTTP clients for the external services.

mod http;
mod minrue;
mod ragflow;

pub use http::*;
pub use minrue::*;
pub use ragflow::*;
