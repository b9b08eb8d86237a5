use serde::{Deserialize, Serialize};

/// One pass/fail record returned by `executeTests`.
///
/// Records nest without a depth limit: a group carries its members in
/// `items`, a leaf has none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResultRecord {
    pub name: String,
    #[serde(default)]
    pub is_ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Engine-reported duration, when it measures one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<TestResultRecord>,
}

impl TestResultRecord {
    #[must_use]
    pub fn leaf(name: impl Into<String>, is_ok: bool) -> Self {
        Self {
            name: name.into(),
            is_ok,
            message: None,
            elapsed_ms: None,
            items: Vec::new(),
        }
    }

    #[must_use]
    pub fn group(name: impl Into<String>, items: Vec<TestResultRecord>) -> Self {
        let is_ok = items.iter().all(|item| item.is_ok);
        Self {
            name: name.into(),
            is_ok,
            message: None,
            elapsed_ms: None,
            items,
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.items.is_empty()
    }
}
