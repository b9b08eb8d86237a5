//! Plain-text rendering of tree rows.

use std::fmt::Write as _;

use fcs_explorer::TreeItemView;
use fcs_types::Collapsible;
use fcs_utils::sanitize_display_text;

const INDENT: &str = "  ";

/// One flattened tree row.
#[derive(Debug, Clone)]
pub(crate) struct Row {
    pub depth: usize,
    pub view: TreeItemView,
    /// Extra lines printed under the row (a value diff or failure message).
    pub detail: Option<String>,
}

/// Terminal glyph for an icon name.
pub(crate) fn glyph(icon: &str) -> &'static str {
    match icon {
        "pass" => "✓",
        "error" => "✗",
        "sync" => "↻",
        "beaker" | "file-code" => "▤",
        "symbol-array" => "[]",
        "symbol-class" => "{}",
        "symbol-constant" => "=",
        _ => "○",
    }
}

pub(crate) fn render_rows(rows: &[Row]) -> String {
    let mut out = String::new();
    for row in rows {
        let indent = INDENT.repeat(row.depth);
        let marker = match row.view.collapsible {
            Collapsible::None => ' ',
            Collapsible::Collapsed => '▸',
            Collapsible::Expanded => '▾',
        };
        let label = sanitize_display_text(&row.view.label).replace('\n', " ");
        let _ = write!(out, "{indent}{marker} {} {label}", glyph(row.view.icon));
        if let Some(description) = &row.view.description {
            let description = sanitize_display_text(description).replace('\n', " ");
            let _ = write!(out, "  {description}");
        }
        out.push('\n');

        if let Some(detail) = &row.detail {
            for line in sanitize_display_text(detail).lines() {
                let _ = writeln!(out, "{indent}{INDENT}{INDENT}{line}");
            }
        }
    }
    out
}
