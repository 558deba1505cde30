//! Caller-supplied metadata accompanying a claim result

use serde::{Deserialize, Serialize};

/// Task metadata passed alongside the claim result
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClaimMetadata {
    /// Domain the task was filed under (may be empty when unknown)
    #[serde(default)]
    pub domain: String,
    /// Claim sub-kind; inferred from the result fields when absent
    #[serde(default)]
    pub claim_type: Option<String>,
    #[serde(default)]
    pub task_type: Option<String>,
    #[serde(default)]
    pub lab_slug: Option<String>,
}

impl ClaimMetadata {
    pub fn new(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            ..Default::default()
        }
    }

    pub fn with_claim_type(mut self, claim_type: &str) -> Self {
        self.claim_type = Some(claim_type.to_string());
        self
    }

    pub fn with_task_type(mut self, task_type: &str) -> Self {
        self.task_type = Some(task_type.to_string());
        self
    }

    pub fn with_lab(mut self, lab_slug: &str) -> Self {
        self.lab_slug = Some(lab_slug.to_string());
        self
    }

    /// Explicit claim type, ignoring blank strings
    pub fn explicit_claim_type(&self) -> Option<&str> {
        self.claim_type
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}
