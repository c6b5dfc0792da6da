use crate::capability::OperationClass;
use crate::retry::{retry_with_backoff, CallFailure, RetryPolicy};
use crate::transport::Transport;
use hive_core::{ErrorKind, ToolOutcome};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Default per-attempt deadline for each operation class, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadlineTable {
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
    #[serde(default = "default_debug_timeout_ms")]
    pub debug_timeout_ms: u64,
    #[serde(default = "default_long_running_timeout_ms")]
    pub long_running_timeout_ms: u64,
}

fn default_query_timeout_ms() -> u64 {
    30_000
}
fn default_write_timeout_ms() -> u64 {
    60_000
}
fn default_debug_timeout_ms() -> u64 {
    20_000
}
fn default_long_running_timeout_ms() -> u64 {
    300_000
}

impl Default for DeadlineTable {
    fn default() -> Self {
        Self {
            query_timeout_ms: default_query_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
            debug_timeout_ms: default_debug_timeout_ms(),
            long_running_timeout_ms: default_long_running_timeout_ms(),
        }
    }
}

impl DeadlineTable {
    pub fn for_class(&self, class: OperationClass) -> Duration {
        let ms = match class {
            OperationClass::Query => self.query_timeout_ms,
            OperationClass::Write => self.write_timeout_ms,
            OperationClass::Debug => self.debug_timeout_ms,
            OperationClass::LongRunning => self.long_running_timeout_ms,
        };
        Duration::from_millis(ms)
    }
}

/// Invoker settings, read from the `[invoker]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokerConfig {
    #[serde(flatten)]
    pub retry: RetryPolicy,
    #[serde(flatten)]
    pub deadlines: DeadlineTable,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// How long an endpoint that failed its probe stays marked unreachable.
    #[serde(default = "default_probe_cooldown_ms")]
    pub probe_cooldown_ms: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections_per_endpoint: usize,
}

fn default_probe_timeout_ms() -> u64 {
    3_000
}
fn default_probe_cooldown_ms() -> u64 {
    30_000
}
fn default_max_connections() -> usize {
    4
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            deadlines: DeadlineTable::default(),
            probe_timeout_ms: default_probe_timeout_ms(),
            probe_cooldown_ms: default_probe_cooldown_ms(),
            max_connections_per_endpoint: default_max_connections(),
        }
    }
}

/// Result of one protected invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    /// Transport sends performed; 0 when the endpoint was skipped as unreachable.
    pub attempts: u32,
    pub outcome: ToolOutcome,
    pub latency: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Health {
    Unknown,
    Healthy,
    Unreachable { until: Instant },
}

struct EndpointState {
    health: Health,
    permits: Arc<Semaphore>,
}

/// Snapshot of one endpoint's health as seen by the invoker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointStatus {
    pub endpoint: String,
    pub healthy: Option<bool>,
    pub available_permits: usize,
}

/// Wraps a [`Transport`] with per-attempt deadlines, retry with backoff,
/// a first-use health probe, and a bounded connection pool per endpoint.
///
/// `execute` never fails: every path ends in a [`ToolOutcome`].
pub struct ToolInvoker {
    transport: Arc<dyn Transport>,
    config: InvokerConfig,
    endpoints: Mutex<HashMap<String, EndpointState>>,
}

impl ToolInvoker {
    pub fn new(transport: Arc<dyn Transport>, config: InvokerConfig) -> Self {
        Self {
            transport,
            config,
            endpoints: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &InvokerConfig {
        &self.config
    }

    /// Invoke `endpoint` with `payload`. The deadline is `deadline_override`
    /// or the class default and applies to each attempt separately.
    pub async fn execute(
        &self,
        endpoint: &str,
        class: OperationClass,
        payload: serde_json::Value,
        deadline_override: Option<Duration>,
    ) -> Execution {
        let started = Instant::now();
        let deadline = deadline_override.unwrap_or_else(|| self.config.deadlines.for_class(class));

        if let Err(failure) = self.ensure_reachable(endpoint).await {
            return Execution {
                attempts: 0,
                outcome: ToolOutcome::error(failure.kind, failure.detail),
                latency: started.elapsed(),
            };
        }

        let permits = self.permits(endpoint);
        let transport = &self.transport;
        let retried = retry_with_backoff(&self.config.retry, |attempt| {
            let permits = permits.clone();
            let payload = payload.clone();
            async move {
                let send = async {
                    let _permit = permits.acquire_owned().await.map_err(|_| {
                        CallFailure::new(ErrorKind::TransientRemoteError, "endpoint pool closed")
                    })?;
                    transport
                        .send(endpoint, payload, deadline)
                        .await
                        .map_err(|e| CallFailure::new(e.kind(), e.to_string()))
                };
                match tokio::time::timeout(deadline, send).await {
                    Ok(result) => result,
                    Err(_) => {
                        debug!(endpoint, attempt, deadline_ms = deadline.as_millis() as u64, "Attempt timed out");
                        Err(CallFailure::new(
                            ErrorKind::Timeout,
                            format!("no response within {}ms", deadline.as_millis()),
                        ))
                    }
                }
            }
        })
        .await;

        let outcome = match retried.result {
            Ok(value) => ToolOutcome::success(value),
            Err(CallFailure {
                kind: ErrorKind::Timeout,
                ..
            }) => ToolOutcome::Timeout,
            Err(failure) => ToolOutcome::error(failure.kind, failure.detail),
        };

        Execution {
            attempts: retried.attempts,
            outcome,
            latency: started.elapsed(),
        }
    }

    /// Forget the cached health of `endpoint` so the next call probes again.
    pub fn reset_endpoint(&self, endpoint: &str) {
        if let Some(state) = self.endpoints.lock().get_mut(endpoint) {
            state.health = Health::Unknown;
        }
    }

    /// Health and pool usage of every endpoint touched so far, sorted by name.
    pub fn status(&self) -> Vec<EndpointStatus> {
        let endpoints = self.endpoints.lock();
        let mut out: Vec<EndpointStatus> = endpoints
            .iter()
            .map(|(name, state)| EndpointStatus {
                endpoint: name.clone(),
                healthy: match state.health {
                    Health::Unknown => None,
                    Health::Healthy => Some(true),
                    Health::Unreachable { .. } => Some(false),
                },
                available_permits: state.permits.available_permits(),
            })
            .collect();
        out.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
        out
    }

    fn permits(&self, endpoint: &str) -> Arc<Semaphore> {
        let mut endpoints = self.endpoints.lock();
        self.entry(&mut endpoints, endpoint).permits.clone()
    }

    fn entry<'a>(
        &self,
        endpoints: &'a mut HashMap<String, EndpointState>,
        endpoint: &str,
    ) -> &'a mut EndpointState {
        endpoints
            .entry(endpoint.to_string())
            .or_insert_with(|| EndpointState {
                health: Health::Unknown,
                permits: Arc::new(Semaphore::new(self.config.max_connections_per_endpoint.max(1))),
            })
    }

    /// Probe on first use; fast-fail while a failed probe's cooldown lasts.
    async fn ensure_reachable(&self, endpoint: &str) -> Result<(), CallFailure> {
        let health = {
            let mut endpoints = self.endpoints.lock();
            self.entry(&mut endpoints, endpoint).health
        };

        match health {
            Health::Healthy => return Ok(()),
            Health::Unreachable { until } if Instant::now() < until => {
                return Err(CallFailure::new(
                    ErrorKind::TransientRemoteError,
                    format!("endpoint '{endpoint}' unreachable (probe failed recently)"),
                ));
            }
            _ => {}
        }

        let probe_deadline = Duration::from_millis(self.config.probe_timeout_ms);
        let probed = match tokio::time::timeout(
            probe_deadline,
            self.transport.probe(endpoint, probe_deadline),
        )
        .await
        {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(_) => Err(format!("probe timed out after {}ms", self.config.probe_timeout_ms)),
        };

        let mut endpoints = self.endpoints.lock();
        let state = self.entry(&mut endpoints, endpoint);
        match probed {
            Ok(()) => {
                if state.health != Health::Healthy {
                    info!(endpoint, "Endpoint probe succeeded");
                }
                state.health = Health::Healthy;
                Ok(())
            }
            Err(detail) => {
                let cooldown = Duration::from_millis(self.config.probe_cooldown_ms);
                warn!(endpoint, error = %detail, cooldown_ms = self.config.probe_cooldown_ms, "Endpoint probe failed");
                state.health = Health::Unreachable {
                    until: Instant::now() + cooldown,
                };
                Err(CallFailure::new(
                    ErrorKind::TransientRemoteError,
                    format!("endpoint '{endpoint}' unreachable: {detail}"),
                ))
            }
        }
    }
}
