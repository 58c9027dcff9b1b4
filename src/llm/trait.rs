use anyhow::Result;

/// Trait for language models that answer a question from assembled snippets
#[async_trait::async_trait]
pub trait AnswerModel: Send + Sync {
    /// Complete a chat turn made of a system message and a user message
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}
