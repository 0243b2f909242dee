pub mod ai;
pub mod backend;
pub mod decoder;
pub mod llm_provider;
pub mod prompts;
pub mod template;
pub mod types;

use async_trait::async_trait;

use crate::policy::AdaptiveGenerationConfig;

pub use ai::{AdaptiveGenerator, AiEnhancedGenerator};
pub use backend::{BackendError, CompletionBackend, CompletionOptions, Prompt};
pub use decoder::{decode, DecodeError, DecodedSentence, StructuredContent};
pub use llm_provider::{LlmConfig, LlmError, LlmProvider};
pub use template::{indefinite_article, TemplateGenerator};
pub use types::{
    ConfigurationError, ContentType, GeneratedContent, GenerationContext, GenerationError,
    GenerationMode, GenerationRequest,
};

/// Produces content for one generation mode.
#[async_trait]
pub trait ModeGenerator: Send + Sync {
    fn mode(&self) -> GenerationMode;

    /// Whether the caller should resolve an adaptive config from the item's memory state.
    fn uses_memory_state(&self) -> bool {
        false
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
        adaptive: Option<&AdaptiveGenerationConfig>,
    ) -> Result<GeneratedContent, GenerationError>;
}
