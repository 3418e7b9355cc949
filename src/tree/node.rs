use serde::Deserialize;
use slotmap::new_key_type;

new_key_type! {
    /// Handle into the node arena. Stable across insertions and removals.
    pub struct NodeId;
}

/// Children of a node: not yet known (lazy) or a loaded, possibly empty, list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Children {
    #[default]
    Unknown,
    Loaded(Vec<NodeId>),
}

impl Children {
    /// Loaded child ids; empty for `Unknown`.
    pub fn ids(&self) -> &[NodeId] {
        match self {
            Children::Unknown => &[],
            Children::Loaded(ids) => ids,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Children::Unknown)
    }

    /// Append ids, turning an unknown list into a loaded one.
    pub fn extend(&mut self, added: impl IntoIterator<Item = NodeId>) {
        match self {
            Children::Loaded(ids) => ids.extend(added),
            Children::Unknown => *self = Children::Loaded(added.into_iter().collect()),
        }
    }
}

/// Marks a synthetic node that stands in for a status rather than data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusNodeType {
    Loading,
    Error,
    NoData,
}

impl StatusNodeType {
    pub fn label(&self) -> &'static str {
        match self {
            StatusNodeType::Loading => "Loading...",
            StatusNodeType::Error => "Load error",
            StatusNodeType::NoData => "No data",
        }
    }
}

/// A child record as delivered by a data source.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct NodeData {
    pub key: Option<String>,
    pub title: String,
    pub children: Option<Vec<NodeData>>,
    pub lazy: bool,
    pub expanded: bool,
    pub selected: bool,
    /// Lazy-load descriptor handed to the data source (defaults to the key).
    pub source: Option<String>,
}

impl NodeData {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_children(mut self, children: Vec<NodeData>) -> Self {
        self.children = Some(children);
        self
    }

    pub fn expanded(mut self) -> Self {
        self.expanded = true;
        self
    }

    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }
}

/// Filter bookkeeping; only meaningful while a filter is active.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterState {
    pub matched: Option<bool>,
    pub sub_match_count: usize,
    pub title_with_highlight: Option<String>,
    /// Expanded by the filter rather than the user.
    pub auto_expanded: bool,
}

/// A node in the tree arena.
#[derive(Debug, Clone)]
pub struct Node {
    pub key: String,
    pub title: String,
    pub parent: Option<NodeId>,
    pub children: Children,
    pub depth: usize,
    pub expanded: bool,
    pub selected: bool,
    pub lazy: bool,
    pub status: Option<StatusNodeType>,
    pub source: Option<String>,
    pub filter: FilterState,
    /// Position in the flattened visible ordering, valid for `row_generation`.
    pub(crate) row_index: usize,
    pub(crate) row_generation: u64,
    /// Bumped whenever anything a row surface shows changes.
    pub(crate) revision: u64,
    pub(crate) pending_load: Option<u64>,
}

impl Node {
    pub(crate) fn new(key: String, title: String, parent: Option<NodeId>, depth: usize) -> Self {
        Self {
            key,
            title,
            parent,
            children: Children::Loaded(Vec::new()),
            depth,
            expanded: false,
            selected: false,
            lazy: false,
            status: None,
            source: None,
            filter: FilterState::default(),
            row_index: 0,
            row_generation: 0,
            revision: 0,
            pending_load: None,
        }
    }

    /// `None` while children are unknown, otherwise whether any exist.
    pub fn has_children(&self) -> Option<bool> {
        match &self.children {
            Children::Unknown => None,
            Children::Loaded(ids) => Some(!ids.is_empty()),
        }
    }

    pub fn is_status(&self) -> bool {
        self.status.is_some()
    }

    /// Lazy node whose children have not been fetched yet.
    pub fn is_unloaded(&self) -> bool {
        self.lazy && self.children.is_unknown()
    }

    /// Branch rows draw an expander: loaded children or still unknown.
    pub fn is_branch(&self) -> bool {
        self.has_children() != Some(false)
    }

    pub fn is_loading(&self) -> bool {
        self.pending_load.is_some()
    }

    pub fn matched(&self) -> bool {
        self.filter.matched == Some(true)
    }

    pub fn sub_match_count(&self) -> usize {
        self.filter.sub_match_count
    }

    pub fn title_with_highlight(&self) -> Option<&str> {
        self.filter.title_with_highlight.as_deref()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub(crate) fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_data_parses_nested_records() {
        let json = r#"[
            {"key": "a", "title": "Alpha", "expanded": true,
             "children": [{"title": "Beta"}]},
            {"title": "Lazy", "lazy": true, "source": "lazy-1"}
        ]"#;
        let data: Vec<NodeData> = serde_json::from_str(json).unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data[0].key.as_deref(), Some("a"));
        assert!(data[0].expanded);
        assert_eq!(data[0].children.as_ref().unwrap()[0].title, "Beta");
        assert!(data[1].lazy);
        assert!(data[1].children.is_none());
        assert_eq!(data[1].source.as_deref(), Some("lazy-1"));
    }

    #[test]
    fn children_tri_state() {
        let mut node = Node::new("k".into(), "t".into(), None, 0);
        assert_eq!(node.has_children(), Some(false));
        assert!(!node.is_branch());

        node.children = Children::Unknown;
        assert_eq!(node.has_children(), None);
        assert!(node.is_branch());
        assert!(node.children.ids().is_empty());
    }

    #[test]
    fn unloaded_requires_lazy_flag() {
        let mut node = Node::new("k".into(), "t".into(), None, 0);
        node.children = Children::Unknown;
        assert!(!node.is_unloaded());
        node.lazy = true;
        assert!(node.is_unloaded());
    }

    #[test]
    fn status_labels() {
        assert_eq!(StatusNodeType::NoData.label(), "No data");
        assert_eq!(StatusNodeType::Loading.label(), "Loading...");
    }
}
