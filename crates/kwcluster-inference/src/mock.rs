//! Deterministic intent classifier for tests.
//!
//! ```rust,ignore
//! use kwcluster_inference::mock::MockIntentClassifier;
//! use kwcluster_core::IntentLabels;
//!
//! let classifier = MockIntentClassifier::new()
//!     .with_labels("buy shoes", IntentLabels::new("Transactional", "product"))
//!     .with_failure("broken");
//! assert_eq!(classifier.call_count(), 0);
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use kwcluster_core::{Error, IntentClassifier, IntentLabels, Result};

#[derive(Debug, Clone)]
pub struct MockCall {
    pub keyword: String,
    pub link_count: usize,
}

#[derive(Clone)]
pub struct MockIntentClassifier {
    default_labels: IntentLabels,
    labels: HashMap<String, IntentLabels>,
    failures: HashSet<String>,
    calls: Arc<Mutex<Vec<MockCall>>>,
}

impl Default for MockIntentClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl MockIntentClassifier {
    pub fn new() -> Self {
        Self {
            default_labels: IntentLabels::new("Informational", "blog"),
            labels: HashMap::new(),
            failures: HashSet::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_default_labels(mut self, labels: IntentLabels) -> Self {
        self.default_labels = labels;
        self
    }

    pub fn with_labels(mut self, keyword: impl Into<String>, labels: IntentLabels) -> Self {
        self.labels.insert(keyword.into(), labels);
        self
    }

    /// Make calls for `keyword` return an inference error.
    pub fn with_failure(mut self, keyword: impl Into<String>) -> Self {
        self.failures.insert(keyword.into());
        self
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }
}

#[async_trait]
impl IntentClassifier for MockIntentClassifier {
    async fn classify(&self, keyword: &str, links: &[String]) -> Result<IntentLabels> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(MockCall {
                keyword: keyword.to_string(),
                link_count: links.len(),
            });
        }
        if self.failures.contains(keyword) {
            return Err(Error::Inference(format!("mock failure for {}", keyword)));
        }
        Ok(self
            .labels
            .get(keyword)
            .cloned()
            .unwrap_or_else(|| self.default_labels.clone()))
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_labels_and_failures() {
        let classifier = MockIntentClassifier::new()
            .with_labels("buy shoes", IntentLabels::new("Transactional", "product"))
            .with_failure("broken");

        let links = vec!["https://a".to_string()];
        let labels = classifier.classify("buy shoes", &links).await.unwrap();
        assert_eq!(labels.kind, "product");
        let labels = classifier.classify("other", &links).await.unwrap();
        assert_eq!(labels, IntentLabels::new("Informational", "blog"));
        assert!(classifier.classify("broken", &[]).await.is_err());

        let calls = classifier.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[2].link_count, 0);
    }
}
