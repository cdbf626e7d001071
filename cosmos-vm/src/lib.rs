pub mod bytecode;
pub mod config;
pub mod error;
pub mod process;
pub mod scheduler;
pub mod types;
pub mod vmio;

pub use config::{LoadPolicy, VmConfig};
pub use error::{SchedulerError, VmError};
pub use process::{Environment, Process, ProcessId, ProcessKind, ProcessState, SuspensionKey};
pub use scheduler::{ProcessOutcome, RunStep, Scheduler};
pub use types::Value;
