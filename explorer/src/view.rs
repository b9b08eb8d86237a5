//! What a host needs to render one tree row.

use fcs_types::Collapsible;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeItemView {
    pub label: String,
    /// Secondary text shown after the label (value and type, or a test summary).
    pub description: Option<String>,
    pub tooltip: Option<String>,
    pub icon: &'static str,
    pub collapsible: Collapsible,
}
