use async_trait::async_trait;

/// Text generation boundary. Implementations are expected to be cheap to
/// clone behind an `Arc` and safe for concurrent use.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate a completion for the prompt. Callers own the fallback
    /// semantics for errors (empty result, sentinel, raw query).
    async fn generate(&self, prompt: &str) -> anyhow::Result<String>;
}

/// Strip a markdown code fence (```json ... ```) from an LLM response.
/// Models frequently wrap JSON output despite instructions not to.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}
