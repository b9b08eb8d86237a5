//! Tree models over engine sessions.
//!
//! [`ResultTree`] browses the evaluated model of opened scripts one level at a
//! time. [`TestTree`] loads test definition files and runs their entries on
//! demand. Both report changes through a [`Notifier`] and never render
//! anything themselves.

mod comparator;
mod diff_document;
mod discovery;
mod notify;
mod result_tree;
mod test_tree;
mod view;

pub use comparator::{Mismatch, Tally, parse_failure_message, summary_text};
pub use diff_document::{DIFF_SCHEME, DiffDocuments, diff_documents, diff_uri, provide_text};
pub use discovery::{
    DefinitionFile, Discovery, DiscoveryError, SkippedFile, discover, resolve_script,
};
pub use notify::{Notifier, TreeEvent};
pub use result_tree::{NodeKey, ResultNode, ResultTree};
pub use test_tree::{TestNode, TestNodeId, TestNodeKind, TestTree};
pub use view::TreeItemView;
