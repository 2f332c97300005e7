//! JSON types for the Gerrit REST API.
//!
//! Field names follow the Gerrit ChangeInfo entity; everything is
//! defaulted so partial responses (restricted `o=` options) still decode.

use serde::Deserialize;
use std::collections::HashMap;

/// A Gerrit change, as returned by change queries.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangeInfo {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub current_revision: String,
    #[serde(default, rename = "_number")]
    pub number: u64,
    #[serde(default)]
    pub labels: HashMap<String, LabelInfo>,
    #[serde(default)]
    pub unresolved_comment_count: u32,
}

impl ChangeInfo {
    /// Label names in lexicographic order, for stable display.
    pub fn label_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.labels.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_merged(&self) -> bool {
        self.status == "MERGED"
    }
}

/// Per-label review state.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LabelInfo {
    #[serde(default)]
    pub all: Vec<ApprovalInfo>,
}

/// One reviewer's vote on a label.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApprovalInfo {
    #[serde(default)]
    pub value: i32,
}
