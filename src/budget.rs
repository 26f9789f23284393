//! Response size budget for tool results.
//!
//! Sizes are estimated as one token per four characters of the exact text
//! handed to the client. A response over the limit is rejected unless the
//! caller asked for a labeled, truncated traversal.

use crate::{GraphnavError, Result};

/// Default per-response budget: 80% of a 25k-token client limit.
pub const MAX_RESPONSE_TOKENS: usize = 20_000;

const CHARS_PER_TOKEN: usize = 4;

/// Rough token count of rendered text, never less than 1.
pub fn estimate_tokens(text: &str) -> usize {
    (text.chars().count() / CHARS_PER_TOKEN).max(1)
}

#[derive(Debug, Clone, Copy)]
pub struct TokenBudget {
    limit: usize,
}

impl Default for TokenBudget {
    fn default() -> Self {
        Self::new(MAX_RESPONSE_TOKENS)
    }
}

impl TokenBudget {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn fits(&self, text: &str) -> bool {
        estimate_tokens(text) <= self.limit
    }

    /// Estimated size of `text`, or `ResultTooLarge` when it does not fit.
    pub fn check_text(&self, text: &str) -> Result<usize> {
        let estimated = estimate_tokens(text);
        if estimated > self.limit {
            log::warn!("Response of ~{} tokens exceeds budget {}", estimated, self.limit);
            return Err(GraphnavError::ResultTooLarge {
                estimated,
                limit: self.limit,
            });
        }
        Ok(estimated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_estimate_minimum_one() {
        assert_eq!(estimate_tokens(""), 1);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcdefgh"), 2);
    }

    #[test]
    fn test_estimate_counts_chars_not_bytes() {
        // 8 chars, 16 bytes
        assert_eq!(estimate_tokens("ééééééé\u{e9}"), 2);
    }

    #[test]
    fn test_check_within_budget() {
        let budget = TokenBudget::new(100);
        let text = json!({"message": "ok"}).to_string();
        assert_eq!(budget.check_text(&text).unwrap(), estimate_tokens(&text));
        assert!(budget.fits(&text));
    }

    #[test]
    fn test_check_over_budget() {
        let budget = TokenBudget::new(10);
        let text = json!({"fact": "x".repeat(400)}).to_string();
        assert!(!budget.fits(&text));
        match budget.check_text(&text).unwrap_err() {
            GraphnavError::ResultTooLarge { estimated, limit } => {
                assert!(estimated > 100);
                assert_eq!(limit, 10);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_pretty_rendering_is_what_counts() {
        let value = json!({"a": {"b": {"c": [1, 2, 3]}}});
        let compact = value.to_string();
        let pretty = serde_json::to_string_pretty(&value).unwrap();
        assert!(estimate_tokens(&pretty) > estimate_tokens(&compact));

        let budget = TokenBudget::new(estimate_tokens(&compact));
        assert!(budget.fits(&compact));
        assert!(!budget.fits(&pretty));
    }

    #[test]
    fn test_default_limit() {
        assert_eq!(TokenBudget::default().limit(), MAX_RESPONSE_TOKENS);
    }
}
