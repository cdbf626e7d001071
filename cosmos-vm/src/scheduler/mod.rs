pub mod scheduler;

pub use scheduler::{ProcessOutcome, RunStep, Scheduler};
