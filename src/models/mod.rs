pub mod answer;
pub mod content;
pub mod session;
pub mod table;
pub mod task;

pub use answer::Answer;
pub use content::{ContentKind, Payload, Resolution, ResolvedContent};
pub use session::{FailureKind, FinalOutcome, QuizSession, StepResult};
pub use table::{ColumnSummary, Table};
pub use task::{AnswerFormat, Link, LinkKind, TaskDescriptor};
