//! Connectivity validation of service endpoints.
//!
//! The remote service runs a test-connection data source against the
//! endpoint. A non-OK status is usually transient right after a create
//! (credentials still propagating), so those are retried with exponential
//! backoff until the deadline. A failed call is not retried.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, sleep_until, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::audit::AuditLogger;
use crate::client::EndpointClient;
use crate::config::ValidationSettings;
use crate::error::{ReconcileError, Result, Target};
use crate::ids::ScopeId;
use crate::model::{ProbeRequest, ServiceEndpoint};
use crate::poller::instant_after;

/// Runs test-connection probes.
pub struct ConnectivityValidator {
    client: Arc<dyn EndpointClient>,
    settings: ValidationSettings,
    audit: AuditLogger,
}

impl ConnectivityValidator {
    pub fn new(client: Arc<dyn EndpointClient>, settings: ValidationSettings) -> Self {
        Self {
            client,
            settings,
            audit: AuditLogger::new_noop(),
        }
    }

    pub fn with_audit(mut self, audit: AuditLogger) -> Self {
        self.audit = audit;
        self
    }

    pub fn settings(&self) -> &ValidationSettings {
        &self.settings
    }

    /// Check that the remote service can reach the endpoint from `scope_id`.
    pub async fn validate(
        &self,
        endpoint: &ServiceEndpoint,
        scope_id: &ScopeId,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let target = Target::new(endpoint.id.clone(), scope_id.clone());
        let request = ProbeRequest::test_connection(endpoint, scope_id.clone());
        let started = Instant::now();
        let deadline = instant_after(started, timeout);
        let mut last: Option<(String, String)> = None;
        let mut attempt: u32 = 0;

        loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(ReconcileError::Cancelled { target });
                }
                res = timeout_at(deadline, self.client.execute_probe(&request)) => match res {
                    Ok(Ok(result)) => result,
                    Ok(Err(e)) => return Err(ReconcileError::transport(target, e)),
                    Err(_) => return Err(self.exhausted(target, last, started)),
                },
            };

            if result.is_ok() {
                info!(
                    endpoint_id = ?endpoint.id,
                    scope_id = %scope_id,
                    attempts = attempt + 1,
                    "Service endpoint connectivity verified"
                );
                return Ok(());
            }

            let message = result.error_message.unwrap_or_default();
            debug!(
                endpoint_id = ?endpoint.id,
                status_code = %result.status_code,
                message = %message,
                attempt = attempt + 1,
                "Connectivity check not OK, will retry"
            );
            last = Some((result.status_code, message));

            let backoff = self.settings.backoff(attempt);
            attempt += 1;
            let wake = instant_after(Instant::now(), backoff);
            if wake >= deadline {
                return Err(self.exhausted(target, last, started));
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(ReconcileError::Cancelled { target });
                }
                _ = sleep_until(wake) => {}
            }
        }
    }

    fn exhausted(
        &self,
        target: Target,
        last: Option<(String, String)>,
        started: Instant,
    ) -> ReconcileError {
        let Some((status_code, message)) = last else {
            return ReconcileError::Timeout {
                target,
                waited: started.elapsed(),
                last_observed: "no probe response".to_string(),
            };
        };
        self.audit
            .validation_failed(target.endpoint_id.as_ref(), &target.scope_id, &message);
        ReconcileError::Connectivity {
            target,
            status_code,
            message,
        }
    }
}
