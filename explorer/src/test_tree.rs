//! Test runner tree: definition files, their named definitions, the test
//! entries they list, and the nested records the engine returns.
//!
//! Tests run lazily. [`TestTree::run`] only marks entries dirty; a dirty
//! entry executes when the host next asks for its (or its definition's)
//! children. Every execution gets its own engine session.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fcs_session::EngineBackend;
use fcs_types::{Collapsible, RootId, TestDefinition, TestResultRecord};

use crate::comparator::{self, Mismatch, Tally};
use crate::diff_document::{self, DiffDocuments};
use crate::discovery::{self, DiscoveryError};
use crate::notify::Notifier;
use crate::view::TreeItemView;

const EXECUTION_FAILED: &str = "Test execution failed: no result from the engine";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TestNodeId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestNodeKind {
    /// One `*.tests.json` file.
    File { path: PathBuf },
    /// A named definition inside a file, bound to one script.
    Definition { script: PathBuf },
    /// One test of a definition; `path` is what `executeTests` is given.
    Entry { script: PathBuf, path: String },
    /// A record returned by the engine.
    Result,
}

#[derive(Debug, Clone)]
pub struct TestNode {
    name: String,
    kind: TestNodeKind,
    root: RootId,
    parent: Option<TestNodeId>,
    children: Vec<TestNodeId>,
    dirty: bool,
    evaluated: bool,
    ok: bool,
    elapsed: Option<Duration>,
    message: Option<String>,
    mismatch: Option<Mismatch>,
    /// Leaf counts of the record this node was built from.
    outcome: Tally,
}

impl TestNode {
    fn new(name: String, kind: TestNodeKind, root: RootId, parent: Option<TestNodeId>) -> Self {
        Self {
            name,
            kind,
            root,
            parent,
            children: Vec::new(),
            dirty: false,
            evaluated: false,
            ok: false,
            elapsed: None,
            message: None,
            mismatch: None,
            outcome: Tally::default(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> &TestNodeKind {
        &self.kind
    }

    #[must_use]
    pub fn root(&self) -> RootId {
        self.root
    }

    #[must_use]
    pub fn parent(&self) -> Option<TestNodeId> {
        self.parent
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    #[must_use]
    pub fn is_evaluated(&self) -> bool {
        self.evaluated
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.ok
    }

    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        self.elapsed
    }

    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Result and expectation of a failed equality assertion.
    #[must_use]
    pub fn mismatch(&self) -> Option<&Mismatch> {
        self.mismatch.as_ref()
    }

    fn is_outcome(&self) -> bool {
        matches!(self.kind, TestNodeKind::Entry { .. } | TestNodeKind::Result)
    }
}

pub struct TestTree<B: EngineBackend> {
    backend: B,
    nodes: HashMap<TestNodeId, TestNode>,
    roots: Vec<TestNodeId>,
    next_id: usize,
    next_root: RootId,
    notifier: Notifier<TestNodeId>,
}

impl<B: EngineBackend> TestTree<B> {
    #[must_use]
    pub fn new(backend: B, notifier: Notifier<TestNodeId>) -> Self {
        Self {
            backend,
            nodes: HashMap::new(),
            roots: Vec::new(),
            next_id: 0,
            next_root: RootId::new(1),
            notifier,
        }
    }

    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Replace the tree with the definition files found under `dir`.
    ///
    /// Files that fail to parse are reported as messages and skipped.
    pub fn load(&mut self, dir: &Path, pattern: &str) -> Result<usize, DiscoveryError> {
        let found = discovery::discover(dir, pattern)?;
        for skipped in &found.skipped {
            self.notifier.message(skipped.warning());
        }

        self.nodes.clear();
        self.roots.clear();
        for file in &found.files {
            self.insert_file(&file.path, &file.definitions);
        }
        self.notifier.roots_changed();
        Ok(found.files.len())
    }

    /// Add (or replace) the root for one definition file.
    pub fn add_file(&mut self, path: &Path, definitions: &[TestDefinition]) -> TestNodeId {
        let id = self.insert_file(path, definitions);
        self.notifier.roots_changed();
        id
    }

    fn insert_file(&mut self, path: &Path, definitions: &[TestDefinition]) -> TestNodeId {
        if let Some(existing) = self.root_for(path) {
            self.remove_subtree(existing);
            self.roots.retain(|id| *id != existing);
        }

        let root = self.next_root;
        self.next_root = root.next();
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        let file = self.insert(
            None,
            TestNode::new(
                name,
                TestNodeKind::File {
                    path: path.to_path_buf(),
                },
                root,
                None,
            ),
        );
        self.roots.push(file);

        for definition in definitions {
            let script = discovery::resolve_script(path, definition);
            let def = self.insert(
                Some(file),
                TestNode::new(
                    definition.name().to_string(),
                    TestNodeKind::Definition {
                        script: script.clone(),
                    },
                    root,
                    Some(file),
                ),
            );
            for test in definition.tests() {
                self.insert(
                    Some(def),
                    TestNode::new(
                        test.name().to_string(),
                        TestNodeKind::Entry {
                            script: script.clone(),
                            path: test.path().to_string(),
                        },
                        root,
                        Some(def),
                    ),
                );
            }
        }
        file
    }

    fn insert(&mut self, parent: Option<TestNodeId>, node: TestNode) -> TestNodeId {
        let id = TestNodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, node);
        if let Some(parent) = parent.and_then(|p| self.nodes.get_mut(&p)) {
            parent.children.push(id);
        }
        id
    }

    fn remove_subtree(&mut self, id: TestNodeId) {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.remove(&id) {
                stack.extend(node.children);
            }
        }
    }

    #[must_use]
    pub fn roots(&self) -> &[TestNodeId] {
        &self.roots
    }

    #[must_use]
    pub fn root_for(&self, path: &Path) -> Option<TestNodeId> {
        self.roots.iter().copied().find(|id| {
            self.nodes
                .get(id)
                .is_some_and(|n| matches!(&n.kind, TestNodeKind::File { path: p } if p == path))
        })
    }

    #[must_use]
    pub fn node(&self, id: TestNodeId) -> Option<&TestNode> {
        self.nodes.get(&id)
    }

    /// Current children, without running anything.
    #[must_use]
    pub fn child_ids(&self, id: TestNodeId) -> &[TestNodeId] {
        self.nodes.get(&id).map_or(&[], |n| n.children.as_slice())
    }

    /// Request (re-)execution of everything under `id`.
    ///
    /// On a returned record, the entry that produced it is re-run.
    pub fn run(&mut self, id: TestNodeId) {
        let Some(start) = self.owning_runnable(id) else {
            return;
        };
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get_mut(&id) else {
                continue;
            };
            if matches!(node.kind, TestNodeKind::Result) {
                continue;
            }
            if !matches!(node.kind, TestNodeKind::File { .. }) {
                node.dirty = true;
            }
            stack.extend(node.children.iter().copied());
            self.notifier.node_changed(id);
        }
    }

    fn owning_runnable(&self, mut id: TestNodeId) -> Option<TestNodeId> {
        loop {
            let node = self.nodes.get(&id)?;
            match node.kind {
                TestNodeKind::Result => id = node.parent?,
                _ => return Some(id),
            }
        }
    }

    /// Children of `id`, executing dirty entries first.
    ///
    /// Expanding a dirty definition runs each of its dirty entries in turn;
    /// expanding a dirty entry runs that entry.
    pub async fn children(&mut self, id: TestNodeId) -> Vec<TestNodeId> {
        let Some(node) = self.nodes.get(&id) else {
            return Vec::new();
        };
        let dirty = node.dirty;
        match node.kind {
            TestNodeKind::Definition { .. } if dirty => {
                let entries: Vec<TestNodeId> = node
                    .children
                    .iter()
                    .copied()
                    .filter(|c| self.nodes.get(c).is_some_and(|n| n.dirty))
                    .collect();
                for entry in entries {
                    self.execute_entry(entry).await;
                }
                if let Some(node) = self.nodes.get_mut(&id) {
                    node.dirty = false;
                }
                self.notify_with_ancestors(id);
            }
            TestNodeKind::Entry { .. } if dirty => self.execute_entry(id).await,
            _ => {}
        }
        self.child_ids(id).to_vec()
    }

    async fn execute_entry(&mut self, id: TestNodeId) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        let TestNodeKind::Entry { script, path } = &node.kind else {
            return;
        };
        let (root, script, path) = (node.root, script.clone(), path.clone());

        tracing::info!(root = %root, test = %path, "executing test");
        let started = Instant::now();
        let outcome = self.backend.execute_tests(root, &script, &path).await;
        let elapsed = started.elapsed();

        let previous = self
            .nodes
            .get_mut(&id)
            .map(|n| std::mem::take(&mut n.children))
            .unwrap_or_default();
        for child in previous {
            self.remove_subtree(child);
        }

        match outcome {
            Ok(Some(record)) => self.apply_record(id, record, elapsed),
            Ok(None) => self.mark_failed(id, elapsed),
            Err(unavailable) => {
                self.notifier.message(unavailable.to_string());
                self.mark_failed(id, elapsed);
            }
        }
        self.notify_with_ancestors(id);
    }

    fn mark_failed(&mut self, id: TestNodeId, elapsed: Duration) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.dirty = false;
            node.evaluated = true;
            node.ok = false;
            node.elapsed = Some(elapsed);
            node.message = Some(EXECUTION_FAILED.to_string());
            node.mismatch = None;
            node.outcome = Tally::leaf(false);
        }
    }

    fn apply_record(&mut self, id: TestNodeId, record: TestResultRecord, elapsed: Duration) {
        let outcome = comparator::tally(&record);
        let TestResultRecord {
            is_ok,
            message,
            items,
            ..
        } = record;
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        let root = node.root;
        node.dirty = false;
        node.evaluated = true;
        node.ok = is_ok;
        node.elapsed = Some(elapsed);
        node.mismatch = failure_mismatch(is_ok, message.as_deref());
        node.message = message;
        node.outcome = outcome;

        for item in items {
            self.insert_record(id, root, item);
        }
    }

    fn insert_record(&mut self, parent: TestNodeId, root: RootId, record: TestResultRecord) {
        let outcome = comparator::tally(&record);
        let mut node = TestNode::new(record.name, TestNodeKind::Result, root, Some(parent));
        node.evaluated = true;
        node.ok = record.is_ok;
        node.elapsed = record.elapsed_ms.map(Duration::from_millis);
        node.mismatch = failure_mismatch(record.is_ok, record.message.as_deref());
        node.message = record.message;
        node.outcome = outcome;
        let id = self.insert(Some(parent), node);
        for item in record.items {
            self.insert_record(id, root, item);
        }
    }

    fn notify_with_ancestors(&self, id: TestNodeId) {
        let mut current = Some(id);
        while let Some(id) = current {
            self.notifier.node_changed(id);
            current = self.nodes.get(&id).and_then(|n| n.parent);
        }
    }

    /// Pass/fail counts over the evaluated leaves under `id`.
    ///
    /// Entries and results carry the counts of their record; files and
    /// definitions sum their children.
    #[must_use]
    pub fn tally(&self, id: TestNodeId) -> Tally {
        let Some(node) = self.nodes.get(&id) else {
            return Tally::default();
        };
        if node.is_outcome() {
            return node.outcome;
        }
        let mut total = Tally::default();
        for child in &node.children {
            total += self.tally(*child);
        }
        total
    }

    /// Time spent executing the entries under `id`.
    #[must_use]
    pub fn elapsed_total(&self, id: TestNodeId) -> Duration {
        let Some(node) = self.nodes.get(&id) else {
            return Duration::ZERO;
        };
        if matches!(node.kind, TestNodeKind::Entry { .. }) {
            return node.elapsed.unwrap_or_default();
        }
        node.children.iter().map(|c| self.elapsed_total(*c)).sum()
    }

    /// Aggregate line for a file or definition.
    #[must_use]
    pub fn summary(&self, id: TestNodeId) -> String {
        comparator::summary_text(self.tally(id))
    }

    /// Line diff of a failed assertion's result against its expectation.
    #[must_use]
    pub fn diff(&self, id: TestNodeId) -> Option<String> {
        let mismatch = self.nodes.get(&id)?.mismatch.as_ref()?;
        Some(fcs_utils::format_value_diff(
            &mismatch.result,
            &mismatch.expectation,
        ))
    }

    /// Diff documents for a failed assertion, keyed by the test's qualified name.
    #[must_use]
    pub fn diff_documents(&self, id: TestNodeId) -> Option<DiffDocuments> {
        let mismatch = self.nodes.get(&id)?.mismatch.as_ref()?;
        let key = self.qualified_name(id);
        match diff_document::diff_documents(&key, mismatch) {
            Ok(docs) => Some(docs),
            Err(e) => {
                tracing::debug!(test = %key, "cannot build diff documents: {e}");
                None
            }
        }
    }

    /// Names from the definition down to `id`, joined with `/`.
    #[must_use]
    pub fn qualified_name(&self, id: TestNodeId) -> String {
        let mut names = Vec::new();
        let mut current = Some(id);
        while let Some(id) = current {
            let Some(node) = self.nodes.get(&id) else {
                break;
            };
            if matches!(node.kind, TestNodeKind::File { .. }) {
                break;
            }
            names.push(node.name.as_str());
            current = node.parent;
        }
        names.reverse();
        names.join("/")
    }

    /// Row presentation for a node.
    #[must_use]
    pub fn item(&self, id: TestNodeId) -> Option<TreeItemView> {
        let node = self.nodes.get(&id)?;
        let (icon, description, collapsible) = match &node.kind {
            TestNodeKind::File { .. } | TestNodeKind::Definition { .. } => {
                let tally = self.tally(id);
                let icon = if tally.is_empty() {
                    "beaker"
                } else if tally.fail == 0 {
                    "pass"
                } else {
                    "error"
                };
                let mut description = self.summary(id);
                if !tally.is_empty() {
                    description.push_str(&format!(" ({})", format_elapsed(self.elapsed_total(id))));
                }
                (icon, Some(description), Collapsible::Collapsed)
            }
            TestNodeKind::Entry { .. } | TestNodeKind::Result => {
                let icon = match (node.dirty, node.evaluated, node.ok) {
                    (true, _, _) => "sync",
                    (false, false, _) => "circle-outline",
                    (false, true, true) => "pass",
                    (false, true, false) => "error",
                };
                let description = node.elapsed.map(format_elapsed);
                // An entry that has not run yet expands to run it.
                let pending = matches!(node.kind, TestNodeKind::Entry { .. })
                    && (node.dirty || !node.evaluated);
                let collapsible = if pending || !node.children.is_empty() {
                    Collapsible::Collapsed
                } else {
                    Collapsible::None
                };
                (icon, description, collapsible)
            }
        };
        Some(TreeItemView {
            label: node.name.clone(),
            description,
            tooltip: node.message.clone(),
            icon,
            collapsible,
        })
    }
}

fn failure_mismatch(is_ok: bool, message: Option<&str>) -> Option<Mismatch> {
    if is_ok {
        return None;
    }
    message.and_then(comparator::parse_failure_message)
}

fn format_elapsed(elapsed: Duration) -> String {
    format!("{} ms", elapsed.as_millis())
}
