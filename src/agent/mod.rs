pub mod events;
pub mod postprocess;
pub mod turn;

pub use events::{NoopSink, TurnSink};
pub use turn::{Orchestrator, TurnOutcome, TurnRequest};
