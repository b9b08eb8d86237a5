//! Finding and loading test definition files.

use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher};
use ignore::WalkBuilder;

use fcs_types::{DefinitionError, TestDefinition, parse_definitions};

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("invalid test file pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        source: globset::Error,
    },
}

/// One definition file that parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionFile {
    pub path: PathBuf,
    pub definitions: Vec<TestDefinition>,
}

/// A definition file that was skipped.
#[derive(Debug)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

impl SkippedFile {
    /// User-visible warning text.
    #[must_use]
    pub fn warning(&self) -> String {
        format!(
            "Skipping test definitions in {}: {}",
            self.path.display(),
            self.reason
        )
    }
}

#[derive(Debug, Default)]
pub struct Discovery {
    pub files: Vec<DefinitionFile>,
    pub skipped: Vec<SkippedFile>,
}

fn file_matcher(pattern: &str) -> Result<GlobMatcher, DiscoveryError> {
    let mut glob = GlobBuilder::new(pattern.trim());
    if cfg!(windows) {
        glob.case_insensitive(true);
    }
    glob.literal_separator(true)
        .build()
        .map(|g| g.compile_matcher())
        .map_err(|source| DiscoveryError::Pattern {
            pattern: pattern.to_string(),
            source,
        })
}

/// Walk `root` (respecting ignore files) for definition files named like `pattern`.
///
/// Each file is parsed on its own: one malformed file is reported in
/// `skipped` and never stops the others from loading.
pub fn discover(root: &Path, pattern: &str) -> Result<Discovery, DiscoveryError> {
    let matcher = file_matcher(pattern)?;

    let walker = WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(true)
        .git_exclude(true)
        .filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy();
            !matches!(name.as_ref(), ".git" | "node_modules" | "target")
        })
        .build();

    let mut paths: Vec<PathBuf> = walker
        .flatten()
        .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
        .filter(|entry| matcher.is_match(entry.file_name()))
        .map(ignore::DirEntry::into_path)
        .collect();
    paths.sort();

    let mut discovery = Discovery::default();
    for path in paths {
        match load_file(&path) {
            Ok(definitions) => {
                tracing::debug!(path = %path.display(), count = definitions.len(), "loaded test definitions");
                discovery.files.push(DefinitionFile { path, definitions });
            }
            Err(reason) => {
                let skipped = SkippedFile { path, reason };
                tracing::warn!("{}", skipped.warning());
                discovery.skipped.push(skipped);
            }
        }
    }
    Ok(discovery)
}

fn load_file(path: &Path) -> Result<Vec<TestDefinition>, String> {
    let text = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    parse_definitions(&text).map_err(|e: DefinitionError| e.to_string())
}

/// Script a definition targets: relative paths resolve against the directory
/// of the definition file.
#[must_use]
pub fn resolve_script(definition_file: &Path, definition: &TestDefinition) -> PathBuf {
    let script = Path::new(definition.file_path());
    if script.is_absolute() {
        return script.to_path_buf();
    }
    definition_file
        .parent()
        .map_or_else(|| script.to_path_buf(), |dir| dir.join(script))
}
