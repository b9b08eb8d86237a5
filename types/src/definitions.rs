//! Schema of `*.tests.json` definition files.
//!
//! Each file is an array of definitions:
//!
//! ```json
//! [
//!   { "name": "Gears", "filePath": "gears.fcs", "tests": ["Gear.test_teeth", { "name": "mass", "path": "Gear.test_mass" }] }
//! ]
//! ```

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    #[error("invalid test definitions: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("definition `{0}` has an empty filePath")]
    EmptyFilePath(String),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTestDefinition {
    name: String,
    file_path: String,
    #[serde(default)]
    tests: Vec<TestReference>,
}

/// One named group of tests against a single script.
///
/// Invariant: `file_path` is non-empty (checked at the deserialization boundary).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawTestDefinition")]
pub struct TestDefinition {
    name: String,
    file_path: String,
    tests: Vec<TestReference>,
}

impl TryFrom<RawTestDefinition> for TestDefinition {
    type Error = DefinitionError;

    fn try_from(raw: RawTestDefinition) -> Result<Self, Self::Error> {
        if raw.file_path.trim().is_empty() {
            return Err(DefinitionError::EmptyFilePath(raw.name));
        }
        Ok(Self {
            name: raw.name,
            file_path: raw.file_path,
            tests: raw.tests,
        })
    }
}

impl TestDefinition {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Script path as written in the file; relative paths are relative to the
    /// definition file's directory.
    #[must_use]
    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    #[must_use]
    pub fn tests(&self) -> &[TestReference] {
        &self.tests
    }
}

/// A test entry: either a bare expression path or a labelled one.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TestReference {
    Path(String),
    Named { name: String, path: String },
}

impl TestReference {
    /// Display name; a bare path is its own name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Path(path) => path,
            Self::Named { name, .. } => name,
        }
    }

    /// Expression path passed to `executeTests`.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Path(path) | Self::Named { path, .. } => path,
        }
    }
}

/// Parse the contents of one definition file.
pub fn parse_definitions(text: &str) -> Result<Vec<TestDefinition>, DefinitionError> {
    Ok(serde_json::from_str(text)?)
}
