pub mod quiz_flow;
pub mod quiz_state;

pub use quiz_flow::{QuizFlow, QuizReport};
pub use quiz_state::{advance, Limits, StepState, Transition};
