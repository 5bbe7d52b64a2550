//! Model runtime seam
//!
//! The scheduler treats the model as an opaque capability: given a
//! prompt and generation parameters it produces a [`TokenStream`]. The
//! numeric inference engine behind it is out of scope here.

use async_trait::async_trait;
use futures::StreamExt;
use kiln_types::{GenerationParams, Result};
use std::time::Duration;

use crate::TokenStream;

/// The opaque model capability.
///
/// Implementations must be safe for the scheduler to call from up to N
/// worker tasks concurrently, where N is the concurrency limit the
/// deployment configured for the model. A returned stream belongs to
/// exactly one request; it is never restarted or shared.
#[async_trait]
pub trait ModelRuntime: Send + Sync {
    /// Start one generation. Fails with `KilnError::Model` on invalid
    /// input or an internal runtime fault.
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<TokenStream>;
}

/// Deterministic runtime used for model-less deployments and tests.
///
/// Echoes the prompt back word by word, prefixed with a fixed
/// acknowledgement, pacing tokens by `token_delay` to imitate real
/// decode latency. Honors `max_tokens` and stop sequences.
#[derive(Debug, Clone)]
pub struct StubRuntime {
    token_delay: Duration,
}

impl StubRuntime {
    pub fn new(token_delay: Duration) -> Self {
        Self { token_delay }
    }

    fn reply_tokens(prompt: &str, params: &GenerationParams) -> Vec<String> {
        let mut tokens: Vec<String> = std::iter::once("echo:")
            .chain(prompt.split_whitespace())
            .map(|word| format!("{word} "))
            .take(params.max_tokens)
            .collect();

        if !params.stop_sequences.is_empty() {
            let mut text = String::new();
            for (i, token) in tokens.iter().enumerate() {
                text.push_str(token);
                if params.stop_sequences.iter().any(|s| text.contains(s)) {
                    tokens.truncate(i + 1);
                    break;
                }
            }
        }

        tokens
    }
}

impl Default for StubRuntime {
    fn default() -> Self {
        Self::new(Duration::from_millis(20))
    }
}

#[async_trait]
impl ModelRuntime for StubRuntime {
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<TokenStream> {
        params.validate()?;
        let delay = self.token_delay;
        let tokens = Self::reply_tokens(prompt, params);

        let stream = futures::stream::iter(tokens).then(move |token| async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok(token)
        });

        Ok(TokenStream::new(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_echoes_prompt() {
        let runtime = StubRuntime::new(Duration::ZERO);
        let mut stream = runtime
            .generate("hello world", &GenerationParams::default())
            .await
            .unwrap();

        let mut text = String::new();
        while let Some(token) = stream.next().await {
            text.push_str(&token.unwrap());
        }
        assert_eq!(text, "echo: hello world ");
    }

    #[tokio::test]
    async fn stub_respects_max_tokens() {
        let runtime = StubRuntime::new(Duration::ZERO);
        let params = GenerationParams::default().with_max_tokens(2);
        let mut stream = runtime.generate("a b c d", &params).await.unwrap();

        let mut count = 0;
        while stream.next().await.is_some() {
            count += 1;
        }
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn stub_honors_stop_sequences() {
        let runtime = StubRuntime::new(Duration::ZERO);
        let params =
            GenerationParams::default().with_stop_sequences(vec!["world".to_string()]);
        let mut stream = runtime.generate("hello world and more", &params).await.unwrap();

        let mut text = String::new();
        while let Some(token) = stream.next().await {
            text.push_str(&token.unwrap());
        }
        assert_eq!(text, "echo: hello world ");
    }

    #[tokio::test]
    async fn stub_rejects_invalid_params() {
        let runtime = StubRuntime::new(Duration::ZERO);
        let params = GenerationParams::default().with_max_tokens(0);
        assert!(runtime.generate("x", &params).await.is_err());
    }
}
