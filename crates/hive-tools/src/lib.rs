//! Capability routing and protected tool invocation.
//!
//! Every outbound call an agent makes goes through two layers:
//!
//! - [`CapabilityRouter`] resolves an abstract [`AgentAction`](hive_core::AgentAction)
//!   (verb + target + parameters) to a registered capability endpoint by exact
//!   name, synonym, or fuzzy description match.
//! - [`ToolInvoker`] executes the resolved call over a [`Transport`] under a
//!   per-operation-class deadline, a bounded retry policy with exponential
//!   backoff, a fast health probe on first use of an endpoint, and a small
//!   per-endpoint connection pool.
//!
//! The invoker never returns an error past its boundary: callers always get
//! a [`ToolOutcome`](hive_core::ToolOutcome) to branch on.

/// Capability descriptors and the registry used for resolution.
pub mod capability;
/// Reqwest-based HTTP transport.
pub mod http;
/// Deadline, retry, health-probe, and pooling wrapper around a transport.
pub mod invoker;
/// Retry policy and backoff computation.
pub mod retry;
/// Action-to-capability resolution and routed invocation.
pub mod router;
/// Transport abstraction supplied by external collaborators.
pub mod transport;

pub use capability::{CapabilityDescriptor, CapabilityRegistry, OperationClass};
pub use http::{HttpTransport, HttpTransportConfig};
pub use invoker::{DeadlineTable, EndpointStatus, Execution, InvokerConfig, ToolInvoker};
pub use retry::{compute_backoff, retry_with_backoff, CallFailure, RetryOutcome, RetryPolicy};
pub use router::CapabilityRouter;
pub use transport::{Transport, TransportError};
