//! Application layer wiring the profile and auto-switch components together

pub mod orchestrator;
pub mod worker;

pub use orchestrator::{Notice, Orchestrator, OrchestratorSettings};
pub use worker::{ProfileWorker, WorkerCommand, WorkerEvent};
