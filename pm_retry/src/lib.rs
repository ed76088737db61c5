pub mod orchestrator;

pub use orchestrator::RetryOrchestrator;
pub use orchestrator::RetryOutcome;
