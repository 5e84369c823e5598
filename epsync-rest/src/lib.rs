//! epsync REST client
//!
//! Implements [`epsync_core::EndpointClient`] against the Azure DevOps
//! service endpoint REST API (`_apis/serviceendpoint`). HTTP 404 maps to
//! [`epsync_core::ClientError::NotFound`], every other failure to
//! [`epsync_core::ClientError::Transport`].

pub mod client;
pub mod error;

pub use client::{DEFAULT_API_VERSION, RestClient, RestConfig};
pub use error::RestError;
