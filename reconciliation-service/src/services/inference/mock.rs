//! Mock completion provider for testing.

use super::{InferenceError, TextCompletion};
use async_trait::async_trait;

/// Mock text-completion provider that returns a canned response.
pub struct MockTextCompletion {
    enabled: bool,
    response: Option<String>,
}

impl MockTextCompletion {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            response: None,
        }
    }

    /// A mock that always answers with the given text.
    pub fn with_response(response: impl Into<String>) -> Self {
        Self {
            enabled: true,
            response: Some(response.into()),
        }
    }
}

#[async_trait]
impl TextCompletion for MockTextCompletion {
    async fn complete(&self, prompt: &str) -> Result<String, InferenceError> {
        if !self.enabled {
            return Err(InferenceError::NotConfigured(
                "Mock completion provider not enabled".to_string(),
            ));
        }

        match &self.response {
            Some(text) => Ok(text.clone()),
            None => Ok(format!("Mock response for: {}", prompt)),
        }
    }
}
