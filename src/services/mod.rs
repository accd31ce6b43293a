pub mod answer_computer;
pub mod data_resolver;
pub mod field_extractor;
pub mod format_coercion;
pub mod llm_gateway;
pub mod tabular;

pub use answer_computer::AnswerComputer;
pub use data_resolver::DataResolver;
pub use field_extractor::FieldExtractor;
pub use llm_gateway::{LlmGateway, ProviderRole};
