pub mod coordinator;
pub mod evaluator;
pub mod merge;

pub use coordinator::ExecutionCoordinator;
