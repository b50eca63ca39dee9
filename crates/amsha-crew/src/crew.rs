//! Crew capability traits and result types.
//!
//! A crew is a named, configured group of LLM-driven agents and tasks
//! executed as a unit by an external agent framework. This module defines
//! the boundary amsha relies on: a crew can be kicked off with an input map
//! and yields an opaque result that may carry token usage.

use amsha_core::{JsonMap, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Token usage counters reported by a crew invocation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    /// Fold another usage record into this one, saturating on overflow.
    pub fn merge(&mut self, other: &TokenUsage) {
        self.prompt_tokens = self.prompt_tokens.saturating_add(other.prompt_tokens);
        self.completion_tokens = self.completion_tokens.saturating_add(other.completion_tokens);
        self.total_tokens = self.total_tokens.saturating_add(other.total_tokens);
    }

    /// Parse a mapping-style usage record.
    ///
    /// Accepts any object carrying some of `prompt_tokens`,
    /// `completion_tokens` and `total_tokens`; a missing total is derived
    /// from the parts. Returns None for non-objects.
    pub fn from_value(value: &Value) -> Option<TokenUsage> {
        let obj = value.as_object()?;
        let field = |key: &str| obj.get(key).and_then(Value::as_u64);

        let prompt_tokens = field("prompt_tokens").unwrap_or(0);
        let completion_tokens = field("completion_tokens").unwrap_or(0);
        let total_tokens = field("total_tokens")
            .unwrap_or_else(|| prompt_tokens.saturating_add(completion_tokens));

        Some(TokenUsage {
            prompt_tokens,
            completion_tokens,
            total_tokens,
        })
    }
}

/// Result of one crew invocation.
///
/// The output is opaque to amsha; `raw` carries any extra fields the
/// framework reported (including a mapping-style usage record when the
/// framework does not type it).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CrewResult {
    /// Produced output
    pub output: Value,

    /// Typed token usage, when the framework reports one
    pub usage: Option<TokenUsage>,

    /// Untyped extra fields from the framework
    #[serde(default)]
    pub raw: JsonMap,
}

impl CrewResult {
    pub fn new(output: Value) -> Self {
        Self {
            output,
            usage: None,
            raw: JsonMap::new(),
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn with_raw(mut self, raw: JsonMap) -> Self {
        self.raw = raw;
        self
    }

    /// Token usage for this result, tolerating either the typed field or a
    /// mapping-style `usage` record in the raw payload.
    pub fn token_usage(&self) -> Option<TokenUsage> {
        if let Some(usage) = self.usage {
            return Some(usage);
        }
        self.raw.get("usage").and_then(TokenUsage::from_value)
    }
}

/// A buildable, invocable crew.
#[async_trait]
pub trait Crew: Send + Sync {
    /// Crew name as registered with the framework.
    fn name(&self) -> &str;

    /// Invoke the crew with the given inputs.
    async fn kickoff(&self, inputs: JsonMap) -> Result<CrewResult>;
}

/// Closure-backed crew, used for tests and dry runs.
pub struct FnCrew {
    name: String,
    func: Arc<dyn Fn(JsonMap) -> Result<CrewResult> + Send + Sync>,
}

impl FnCrew {
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(JsonMap) -> Result<CrewResult> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }
}

#[async_trait]
impl Crew for FnCrew {
    fn name(&self) -> &str {
        &self.name
    }

    async fn kickoff(&self, inputs: JsonMap) -> Result<CrewResult> {
        (self.func)(inputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_usage_merge_saturates() {
        let mut usage = TokenUsage {
            prompt_tokens: u64::MAX - 1,
            completion_tokens: 10,
            total_tokens: 10,
        };
        usage.merge(&TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        });
        assert_eq!(usage.prompt_tokens, u64::MAX);
        assert_eq!(usage.completion_tokens, 15);
        assert_eq!(usage.total_tokens, 25);
    }

    #[test]
    fn test_usage_from_mapping_derives_total() {
        let usage = TokenUsage::from_value(&json!({
            "prompt_tokens": 100,
            "completion_tokens": 20
        }))
        .unwrap();
        assert_eq!(usage.total_tokens, 120);
    }

    #[test]
    fn test_usage_from_non_object_is_none() {
        assert!(TokenUsage::from_value(&json!("120 tokens")).is_none());
        assert!(TokenUsage::from_value(&json!(null)).is_none());
    }

    #[test]
    fn test_result_prefers_typed_usage() {
        let raw: JsonMap = [("usage".to_string(), json!({"total_tokens": 7}))]
            .into_iter()
            .collect();
        let result = CrewResult::new(json!("out"))
            .with_usage(TokenUsage {
                prompt_tokens: 1,
                completion_tokens: 2,
                total_tokens: 3,
            })
            .with_raw(raw);
        assert_eq!(result.token_usage().unwrap().total_tokens, 3);
    }

    #[test]
    fn test_result_falls_back_to_mapping_usage() {
        let raw: JsonMap = [("usage".to_string(), json!({"total_tokens": 7}))]
            .into_iter()
            .collect();
        let result = CrewResult::new(json!("out")).with_raw(raw);
        assert_eq!(result.token_usage().unwrap().total_tokens, 7);
    }

    #[tokio::test]
    async fn test_fn_crew_kickoff() {
        let crew = FnCrew::new("echo", |inputs| {
            Ok(CrewResult::new(amsha_core::map_to_object(&inputs)))
        });
        let inputs: JsonMap = [("k".to_string(), json!("v"))].into_iter().collect();
        let result = crew.kickoff(inputs).await.unwrap();
        assert_eq!(result.output["k"], json!("v"));
    }
}
