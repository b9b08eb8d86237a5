//! Interactive inspection tree.
//!
//! Nodes are fetched lazily: nothing below a node is known until the host
//! asks for its children, and every such request is one `list` call on the
//! root's session. A fetch that changes the node's own category or value is
//! reported as a redraw of that node instead of returning children, so stale
//! node state is never shown next to fresh children.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use fcs_session::EngineBackend;
use fcs_types::{
    Collapsible, RootId, TreeCategory, TreeItem, TreeResponse, child_path, icon_for, is_expandable,
};

use crate::notify::Notifier;
use crate::view::TreeItemView;

/// Address of a node: its root plus the expression path (`""` for the root).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey {
    pub root: RootId,
    pub path: String,
}

impl NodeKey {
    #[must_use]
    pub fn root(root: RootId) -> Self {
        Self {
            root,
            path: String::new(),
        }
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }
}

/// One evaluated, or not yet evaluated, expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultNode {
    name: String,
    category: TreeCategory,
    value: Option<String>,
    type_name: Option<String>,
    force_evaluation: bool,
    /// Child keys from the last successful fetch.
    children: Option<Vec<NodeKey>>,
    /// Fetched and found to have neither value nor children.
    settled: bool,
}

impl ResultNode {
    fn new(name: String, category: TreeCategory) -> Self {
        Self {
            name,
            category,
            value: None,
            type_name: None,
            force_evaluation: false,
            children: None,
            settled: false,
        }
    }

    fn from_item(item: TreeItem) -> Self {
        Self {
            value: item.value,
            type_name: item.type_name,
            ..Self::new(item.name, TreeCategory::Unresolved)
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn category(&self) -> TreeCategory {
        self.category
    }

    #[must_use]
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    #[must_use]
    pub fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }

    #[must_use]
    pub fn force_evaluation(&self) -> bool {
        self.force_evaluation
    }

    /// A terminal "nothing to show" node; it is not fetched again.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.settled
    }

    #[must_use]
    pub fn children(&self) -> Option<&[NodeKey]> {
        self.children.as_deref()
    }
}

#[derive(Debug)]
struct RootEntry {
    script: PathBuf,
}

/// What a fetch did to a node.
enum Fetched {
    /// The node itself changed and must be redrawn.
    Redraw,
    Children(Vec<NodeKey>),
}

pub struct ResultTree<B: EngineBackend> {
    backend: B,
    roots: BTreeMap<RootId, RootEntry>,
    nodes: HashMap<NodeKey, ResultNode>,
    next_root: RootId,
    notifier: Notifier<NodeKey>,
}

impl<B: EngineBackend> ResultTree<B> {
    #[must_use]
    pub fn new(backend: B, notifier: Notifier<NodeKey>) -> Self {
        Self {
            backend,
            roots: BTreeMap::new(),
            nodes: HashMap::new(),
            next_root: RootId::new(1),
            notifier,
        }
    }

    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Open `script` as a root, or return the root already showing it.
    pub fn open(&mut self, script: &Path) -> NodeKey {
        let script = std::path::absolute(script).unwrap_or_else(|_| script.to_path_buf());
        if let Some(root) = self.root_for(&script) {
            return NodeKey::root(root);
        }

        let root = self.next_root;
        self.next_root = root.next();
        let name = script
            .file_name()
            .map_or_else(|| script.display().to_string(), |n| n.to_string_lossy().into_owned());

        tracing::info!(root = %root, script = %script.display(), "opened script");
        self.roots.insert(root, RootEntry { script });
        self.nodes
            .insert(NodeKey::root(root), ResultNode::new(name, TreeCategory::RootFile));
        self.notifier.roots_changed();
        NodeKey::root(root)
    }

    #[must_use]
    pub fn root_for(&self, script: &Path) -> Option<RootId> {
        self.roots
            .iter()
            .find(|(_, entry)| entry.script == script)
            .map(|(id, _)| *id)
    }

    #[must_use]
    pub fn script(&self, root: RootId) -> Option<&Path> {
        self.roots.get(&root).map(|entry| entry.script.as_path())
    }

    /// Displayed roots, in the order they were opened.
    #[must_use]
    pub fn roots(&self) -> Vec<NodeKey> {
        self.roots.keys().copied().map(NodeKey::root).collect()
    }

    #[must_use]
    pub fn node(&self, key: &NodeKey) -> Option<&ResultNode> {
        self.nodes.get(key)
    }

    /// Remove a root and tear down its session.
    pub async fn close(&mut self, root: RootId) {
        if self.roots.remove(&root).is_none() {
            return;
        }
        self.backend.release(root).await;
        self.nodes.retain(|key, _| key.root != root);
        tracing::info!(root = %root, "closed script");
        self.notifier.roots_changed();
    }

    pub async fn close_all(&mut self) {
        let roots: Vec<RootId> = self.roots.keys().copied().collect();
        for root in roots {
            self.close(root).await;
        }
    }

    /// Ask for fresh evaluation of a node on its next fetch.
    pub fn request_evaluation(&mut self, key: &NodeKey) {
        if let Some(node) = self.nodes.get_mut(key) {
            node.force_evaluation = true;
            node.settled = false;
            self.notifier.node_changed(key.clone());
        }
    }

    /// Children of `key`, fetching them from the engine.
    ///
    /// Returns an empty list when the node was redrawn instead or is settled.
    /// When no session is available or the request fails, the children from
    /// the previous fetch are returned unchanged.
    pub async fn children(&mut self, key: &NodeKey) -> Vec<NodeKey> {
        let Some(node) = self.nodes.get(key) else {
            return Vec::new();
        };
        if node.settled {
            return Vec::new();
        }
        let Some(script) = self.roots.get(&key.root).map(|r| r.script.clone()) else {
            return Vec::new();
        };
        let force = node.force_evaluation;

        match self
            .backend
            .list(key.root, &script, &key.path, force)
            .await
        {
            Ok(Some(response)) => match self.apply(key, response) {
                Fetched::Redraw => {
                    self.notifier.node_changed(key.clone());
                    Vec::new()
                }
                Fetched::Children(children) => children,
            },
            Ok(None) => {
                tracing::debug!(root = %key.root, path = %key.path, "list failed; keeping previous children");
                self.cached_children(key)
            }
            Err(unavailable) => {
                self.notifier.message(unavailable.to_string());
                self.cached_children(key)
            }
        }
    }

    fn cached_children(&self, key: &NodeKey) -> Vec<NodeKey> {
        self.nodes
            .get(key)
            .and_then(|node| node.children.clone())
            .unwrap_or_default()
    }

    fn apply(&mut self, key: &NodeKey, response: TreeResponse) -> Fetched {
        let Some(node) = self.nodes.get_mut(key) else {
            return Fetched::Children(Vec::new());
        };
        node.force_evaluation = false;

        // A root always stays a root file; only its value can change.
        let category_changed = !key.is_root() && response.kind != node.category;
        if category_changed || response.value != node.value {
            if !key.is_root() {
                node.category = response.kind;
            }
            node.value = response.value;
            if response.type_name.is_some() {
                node.type_name = response.type_name;
            }
            return Fetched::Redraw;
        }
        if response.type_name.is_some() {
            node.type_name = response.type_name;
        }

        if response.items.is_empty() {
            let settled = node.value.is_none();
            node.settled = settled;
            let previous = node.children.replace(Vec::new()).unwrap_or_default();
            self.remove_subtrees(previous);
            // A settled node turns into a leaf, which only a redraw shows.
            return if settled {
                Fetched::Redraw
            } else {
                Fetched::Children(Vec::new())
            };
        }

        let parent_category = node.category;
        let previous = node.children.take().unwrap_or_default();
        let mut items = response.items;
        items.sort_by(|a, b| a.name.cmp(&b.name));

        let mut children = Vec::with_capacity(items.len());
        for item in items {
            let child = NodeKey {
                root: key.root,
                path: child_path(&key.path, parent_category, &item.name),
            };
            if children.contains(&child) {
                continue;
            }
            self.nodes
                .entry(child.clone())
                .or_insert_with(|| ResultNode::from_item(item));
            children.push(child);
        }

        let gone: Vec<NodeKey> = previous
            .into_iter()
            .filter(|old| !children.contains(old))
            .collect();
        self.remove_subtrees(gone);

        if let Some(node) = self.nodes.get_mut(key) {
            node.children = Some(children.clone());
        }
        Fetched::Children(children)
    }

    fn remove_subtrees(&mut self, keys: Vec<NodeKey>) {
        let mut stack = keys;
        while let Some(key) = stack.pop() {
            if let Some(node) = self.nodes.remove(&key) {
                stack.extend(node.children.unwrap_or_default());
            }
        }
    }

    /// Row presentation for a node.
    #[must_use]
    pub fn item(&self, key: &NodeKey) -> Option<TreeItemView> {
        let node = self.nodes.get(key)?;
        let collapsible = if node.settled || !is_expandable(node.category) {
            Collapsible::None
        } else if key.is_root() {
            Collapsible::Expanded
        } else {
            Collapsible::Collapsed
        };
        let description = match (&node.value, &node.type_name) {
            (Some(value), Some(ty)) => Some(format!("{value} : {ty}")),
            (Some(value), None) => Some(value.clone()),
            (None, Some(ty)) => Some(ty.clone()),
            (None, None) => None,
        };
        let tooltip = if key.is_root() {
            self.script(key.root).map(|p| p.display().to_string())
        } else {
            Some(key.path.clone())
        };
        Some(TreeItemView {
            label: node.name.clone(),
            description,
            tooltip,
            icon: icon_for(node.category),
            collapsible,
        })
    }

    /// Tell the host about roots whose engine went away on its own.
    ///
    /// The next fetch under such a root opens a new session.
    pub async fn sync_sessions(&mut self) {
        for root in self.backend.reap().await {
            let Some(entry) = self.roots.get(&root) else {
                continue;
            };
            self.notifier.message(format!(
                "Engine session for {} ended",
                entry.script.display()
            ));
            self.notifier.node_changed(NodeKey::root(root));
        }
    }
}
