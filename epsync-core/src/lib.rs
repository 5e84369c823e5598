//! epsync core library
//!
//! Lifecycle reconciliation for remotely provisioned service endpoints:
//! create and wait until ready (rolling back on failure), delete and wait
//! until gone, connectivity checks with retry, and scope reference
//! reconciliation. The remote service is reached through [`EndpointClient`].
//!
//! # Example
//! ```ignore
//! use epsync_core::{
//!     CancellationToken, EndpointConfig, EndpointResource, ReconcilerConfig, ScopeId,
//! };
//!
//! let resource = EndpointResource::new(client, ReconcilerConfig::default());
//! let mut config = EndpointConfig::new(ScopeId::parse("p1")?, "github", "gh");
//! config.authorization.insert("personal_access_token".into(), token);
//! let created = resource.create(&config, &CancellationToken::new()).await?;
//! ```

pub mod adapter;
pub mod audit;
pub mod catalog;
pub mod client;
pub mod config;
pub mod error;
pub mod ids;
pub mod lifecycle;
pub mod model;
pub mod poller;
pub mod record;
pub mod references;
pub mod resource;
pub mod validator;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

// Re-export commonly used types at crate root
pub use adapter::{AdapterRegistry, FieldAdapter};
pub use audit::AuditLogger;
pub use client::{ClientResult, EndpointClient};
pub use config::ReconcilerConfig;
pub use error::{ClientError, ReconcileError, Result, Target};
pub use ids::{EndpointId, ScopeId, parse_import_id};
pub use lifecycle::LifecycleReconciler;
pub use model::{
    EndpointAuthorization, EndpointType, OperationState, OperationStatus, ProbeRequest,
    ProbeResult, ScopeReference, ServiceEndpoint,
};
pub use poller::{Observation, PollConfig, await_terminal};
pub use record::EndpointConfig;
pub use references::{ReferenceFields, ReferencePlan, ReferenceReconciler, plan_references};
pub use resource::EndpointResource;
pub use validator::ConnectivityValidator;

pub use tokio_util::sync::CancellationToken;
