//! Common HTTP vocabulary for skein
//!
//! Method and status types shared by every skein crate, plus the
//! `HttpResponseLike` view used by response consumers.

pub mod http;

pub use http::{HttpMethod, HttpResponseLike, HttpStatus};
