//! External text classifier
//!
//! A classifier takes a rendered prompt and returns the model's raw text.
//! Parsing and every safety invariant live in the normalizer, so an
//! implementation only has to do transport.

pub mod http;

use async_trait::async_trait;

use crate::error::ClassifierError;
use crate::prompts::ClassifierPrompt;

pub use http::ChatCompletionsClassifier;

/// One classification round-trip.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Send the prompt and return the raw model output.
    async fn classify(&self, prompt: &ClassifierPrompt) -> Result<String, ClassifierError>;

    /// Identifier used in logs.
    fn name(&self) -> &str;
}
