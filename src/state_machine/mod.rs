// Processing state model for message units
//
// Every message unit carries an append-only history of processing states. Changes go through
// a compare-and-append on the persisted current state; there is no static transition table,
// the pipeline stages drive the transitions.

pub mod errors;
pub mod history;
pub mod states;

pub use errors::{StateMachineError, StateMachineResult};
pub use history::{ProcessingStateLog, ProcessingStateRecord, TransitionOutcome};
pub use states::ProcessingState;
