//! Mock provider implementation for testing.

use super::{GenerationParams, ProviderError, ProviderResponse, TextProvider};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// How the mock answers.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Returns the given text.
    Reply(String),
    /// Fails with the given kind of error.
    Fail(MockFailure),
    /// Sleeps before replying, to exercise timeouts.
    Stall(Duration),
}

#[derive(Debug, Clone, Copy)]
pub enum MockFailure {
    RateLimited,
    Unauthorized,
    Upstream,
}

/// Mock text provider for testing.
pub struct MockTextProvider {
    behavior: MockBehavior,
    calls: AtomicUsize,
}

impl MockTextProvider {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn replying(text: impl Into<String>) -> Self {
        Self::new(MockBehavior::Reply(text.into()))
    }

    pub fn failing(failure: MockFailure) -> Self {
        Self::new(MockBehavior::Fail(failure))
    }

    pub fn stalling(delay: Duration) -> Self {
        Self::new(MockBehavior::Stall(delay))
    }

    /// Number of `generate` calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextProvider for MockTextProvider {
    async fn generate(
        &self,
        prompt: &str,
        _params: &GenerationParams,
    ) -> Result<ProviderResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let text = match &self.behavior {
            MockBehavior::Reply(text) => text.clone(),
            MockBehavior::Fail(MockFailure::RateLimited) => return Err(ProviderError::RateLimited),
            MockBehavior::Fail(MockFailure::Unauthorized) => {
                return Err(ProviderError::Unauthorized("mock".to_string()))
            }
            MockBehavior::Fail(MockFailure::Upstream) => {
                return Err(ProviderError::ApiError("mock upstream failure".to_string()))
            }
            MockBehavior::Stall(delay) => {
                tokio::time::sleep(*delay).await;
                "Mock response after delay".to_string()
            }
        };

        Ok(ProviderResponse {
            text: Some(text),
            input_tokens: prompt.len() as i32 / 4,
            output_tokens: 10,
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
