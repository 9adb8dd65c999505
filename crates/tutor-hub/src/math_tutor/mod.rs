//! Math tutoring: worked solutions, follow-up questions and concept explanations.
pub mod knowledge;
pub mod prompts;
pub mod tutor;
pub mod types;
pub use tutor::MathTutor;
pub use types::*;
