//! Pipeline execution engine

pub mod engine;
pub mod executor;
pub mod runner;
pub mod scheduler;

pub use engine::{EventHandler, EventSender, ExecutionEngine, ExecutionEvent};
pub use executor::{JobEnvironment, JobExecutor};
pub use runner::{CommandOutput, CommandRequest, CommandRunner, ShellRunner, Termination};
pub use scheduler::SchedulingStrategy;
