//! newscheck-harness: Drives a news engine binary through its batch and server
//! contracts.

pub mod batch;
pub mod http;
pub mod orchestrator;
pub mod random;
pub mod shutdown;
pub mod supervisor;
pub mod workload;

pub use batch::{BatchCommand, BatchRunner};
pub use http::{HttpOutcome, HttpRequest, RetryClient, RetryPolicy};
pub use orchestrator::{Action, Check, Orchestrator, RunReport};
pub use random::WorkloadRng;
pub use shutdown::{install_signal_handlers, ProcessRegistry};
pub use supervisor::{ServerControl, ServerSupervisor};
pub use workload::{RankingQuery, ServerWorkload, WorkloadOptions, WorkloadSummary};
