//! `list` responses: what the engine returns when asked about one expression.

use serde::{Deserialize, Serialize};

use crate::category::TreeCategory;

/// Response to a `list(path, forceEvaluation)` request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeResponse {
    #[serde(default)]
    pub kind: TreeCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    /// Named child records, in engine order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<TreeItem>,
}

impl TreeResponse {
    /// No value and no children: the expression legitimately has nothing to show.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.value.is_none() && self.items.is_empty()
    }
}

/// One child record inside a [`TreeResponse`], possibly already partially evaluated.
///
/// A `kind` sent with the item is not decoded: a child's category is only
/// known once the child itself is fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeItem {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
}

impl TreeItem {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
            type_name: None,
        }
    }
}

/// Lookup key of a child expression.
///
/// Members of a composite are joined with `.`; sequence children carry their
/// own positional syntax (`[0]`) and are appended without a separator. The
/// children of the script root (empty path) are addressed by name alone.
#[must_use]
pub fn child_path(parent_path: &str, parent_category: TreeCategory, child_name: &str) -> String {
    if parent_path.is_empty() {
        return child_name.to_string();
    }
    match parent_category {
        TreeCategory::Sequence => format!("{parent_path}{child_name}"),
        TreeCategory::RootFile
        | TreeCategory::Unresolved
        | TreeCategory::Value
        | TreeCategory::Composite => format!("{parent_path}.{child_name}"),
    }
}
