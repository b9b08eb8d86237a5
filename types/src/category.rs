//! Node categories reported by the engine and the pure functions the tree
//! views derive from them.

use serde::{Deserialize, Serialize};

/// What the engine knows about an expression.
///
/// A freshly discovered child starts as [`TreeCategory::Unresolved`] and
/// learns its real category on its own first fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TreeCategory {
    /// The loaded script itself.
    RootFile,
    /// Not evaluated yet, or evaluated to nothing.
    #[default]
    Unresolved,
    /// A scalar with a printable value.
    Value,
    /// An ordered collection; children are addressed positionally.
    Sequence,
    /// An object with named members.
    Composite,
}

impl TreeCategory {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RootFile => "root-file",
            Self::Unresolved => "unresolved",
            Self::Value => "value",
            Self::Sequence => "sequence",
            Self::Composite => "composite",
        }
    }
}

/// Icon identifier for a category (codicon names, as used by editor tree views).
#[must_use]
pub const fn icon_for(category: TreeCategory) -> &'static str {
    match category {
        TreeCategory::RootFile => "file-code",
        TreeCategory::Unresolved => "circle-outline",
        TreeCategory::Value => "symbol-constant",
        TreeCategory::Sequence => "symbol-array",
        TreeCategory::Composite => "symbol-class",
    }
}

/// Whether a node of this category may have children worth asking for.
///
/// `Unresolved` is expandable: expanding it is what triggers the fetch that
/// resolves it.
#[must_use]
pub const fn is_expandable(category: TreeCategory) -> bool {
    match category {
        TreeCategory::RootFile
        | TreeCategory::Unresolved
        | TreeCategory::Sequence
        | TreeCategory::Composite => true,
        TreeCategory::Value => false,
    }
}

/// Collapsible state of a rendered tree item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collapsible {
    /// A leaf: no expansion arrow.
    None,
    Collapsed,
    Expanded,
}
