//! CMP operation implementations.
//!
//! This module contains the request and response halves of a certificate
//! exchange. The public API is exposed through the `CmpClient` struct.

pub mod request;
pub mod response;

pub use request::{CertRequestBuilder, PreparedRequest};
pub use response::{ResponseValidator, ValidatedResponse};
