//! Tree controller: the node arena, key index, active node, and the
//! sequencing of structural changes, filtering, and render requests.
//!
//! Traversal lives in [`traverse`], the filter engine in [`filter`] and
//! [`highlight`], and row virtualization in [`viewport`].

pub mod filter;
pub mod highlight;
pub mod loader;
pub mod node;
pub mod traverse;
pub mod viewport;

use std::collections::{HashMap, HashSet};

use log::{debug, error};
use slotmap::SlotMap;

use crate::error::{AppError, Result};
use filter::FilterContext;
pub use node::{Children, Node, NodeData, NodeId, StatusNodeType};

/// Key of the synthetic "no results" node installed under the root.
pub const NO_DATA_KEY: &str = "_no_data";

/// Lifecycle notifications for observers such as the status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeEvent {
    StructureChanged { reason: &'static str },
    StatusChanged { node: NodeId, status: Option<StatusNodeType> },
    FilterApplied { matches: usize },
    FilterCleared,
    ActiveChanged { node: Option<NodeId> },
}

/// A pending lazy load handed to a data source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub node: NodeId,
    pub token: u64,
    /// `None` requests the top-level data set.
    pub descriptor: Option<String>,
}

/// Result of an expand/collapse request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpandOutcome {
    Changed,
    Unchanged,
    NeedsLoad(LoadRequest),
}

/// The tree: owns every node and serializes all mutation.
pub struct Tree {
    nodes: SlotMap<NodeId, Node>,
    root: NodeId,
    keys: HashMap<String, NodeId>,
    active: Option<NodeId>,
    escape_titles: bool,
    next_key: u64,
    next_load_token: u64,
    filter: FilterContext,
    render_requested: bool,
    render_suspended: bool,
    /// Generation of the latest renumber pass; see `Node::row_index`.
    row_generation: u64,
    /// Bumped on presentation changes that affect every row.
    style_epoch: u64,
    events: Vec<TreeEvent>,
}

impl Tree {
    /// Create an empty tree holding only the invisible root.
    pub fn new(escape_titles: bool) -> Self {
        let mut nodes = SlotMap::with_key();
        let mut root_node = Node::new("_root".into(), String::new(), None, 0);
        root_node.expanded = true;
        let root = nodes.insert(root_node);
        let mut keys = HashMap::new();
        keys.insert("_root".to_string(), root);
        Self {
            nodes,
            root,
            keys,
            active: None,
            escape_titles,
            next_key: 1,
            next_load_token: 1,
            filter: FilterContext::default(),
            render_requested: true,
            render_suspended: false,
            row_generation: 0,
            style_epoch: 0,
            events: Vec::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn escape_titles(&self) -> bool {
        self.escape_titles
    }

    /// Borrow a node; panics if `id` is not attached to this tree.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Number of nodes, excluding the root.
    pub fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn node_by_key(&self, key: &str) -> Option<NodeId> {
        self.keys.get(key).copied()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes[id].children.ids()
    }

    pub(crate) fn style_epoch(&self) -> u64 {
        self.style_epoch
    }

    pub(crate) fn bump_style_epoch(&mut self) {
        self.style_epoch = self.style_epoch.wrapping_add(1);
    }

    pub(crate) fn row_generation(&self) -> u64 {
        self.row_generation
    }

    /// Start a renumber pass; returns the new generation.
    pub(crate) fn next_row_generation(&mut self) -> u64 {
        self.row_generation += 1;
        self.row_generation
    }

    /// Row index from the most recent renumber pass, if the node was visible.
    pub fn row_index(&self, id: NodeId) -> Option<usize> {
        let node = self.nodes.get(id)?;
        (self.row_generation > 0 && node.row_generation == self.row_generation)
            .then_some(node.row_index)
    }

    // ── Structure ───────────────────────────────────────────────────────────

    /// Append `data` (recursively) as children of `parent`.
    ///
    /// Keys are validated up front: a duplicate leaves the tree untouched.
    pub fn add_children(&mut self, parent: NodeId, data: Vec<NodeData>) -> Result<Vec<NodeId>> {
        let supplied = self.check_keys(&data)?;
        let depth = self.nodes[parent].depth + 1;
        let mut added = Vec::with_capacity(data.len());
        for record in data {
            let id = self.insert_record(parent, record, depth, &supplied);
            added.push(id);
        }
        let parent_node = &mut self.nodes[parent];
        parent_node.children.extend(added.iter().copied());
        parent_node.touch();
        self.structure_changed("add_children");
        Ok(added)
    }

    /// Remove all existing children of `parent`, then add `data`.
    pub fn replace_children(&mut self, parent: NodeId, data: Vec<NodeData>) -> Result<Vec<NodeId>> {
        let doomed: HashSet<&str> = self
            .subtree_keys(parent)
            .into_iter()
            .collect::<HashSet<_>>();
        let mut seen = HashSet::new();
        Self::collect_duplicate_keys(&data, &mut seen, &|key: &str| {
            self.keys.contains_key(key) && !doomed.contains(key)
        })?;
        self.remove_children(parent);
        self.add_children(parent, data)
    }

    /// Remove a node and its whole subtree. The root cannot be removed.
    pub fn remove_node(&mut self, id: NodeId) -> bool {
        if id == self.root || !self.nodes.contains_key(id) {
            return false;
        }
        if let Some(parent) = self.nodes[id].parent {
            if let Children::Loaded(ids) = &mut self.nodes[parent].children {
                ids.retain(|c| *c != id);
            }
            self.nodes[parent].touch();
        }
        self.drop_subtree(id);
        self.structure_changed("remove_node");
        true
    }

    /// Remove every child of `id`, leaving an empty (loaded) child list.
    pub fn remove_children(&mut self, id: NodeId) {
        let children = std::mem::replace(&mut self.nodes[id].children, Children::Loaded(Vec::new()));
        for child in children.ids() {
            self.drop_subtree(*child);
        }
        self.nodes[id].touch();
        self.structure_changed("remove_children");
    }

    pub fn set_title(&mut self, id: NodeId, title: impl Into<String>) {
        let node = &mut self.nodes[id];
        node.title = title.into();
        node.touch();
        self.request_render();
    }

    pub fn set_selected(&mut self, id: NodeId, selected: bool) {
        let node = &mut self.nodes[id];
        if node.selected != selected {
            node.selected = selected;
            node.touch();
            self.request_render();
        }
    }

    // ── Expansion ───────────────────────────────────────────────────────────

    /// User-initiated expand/collapse.
    ///
    /// Clears the filter's auto-expanded tag so `clear_filter` leaves the node
    /// as the user put it. Expanding an unloaded lazy node starts a load.
    pub fn set_expanded(&mut self, id: NodeId, expanded: bool) -> ExpandOutcome {
        if id == self.root || self.nodes[id].is_status() {
            return ExpandOutcome::Unchanged;
        }
        let node = &mut self.nodes[id];
        node.filter.auto_expanded = false;
        if node.expanded == expanded {
            return ExpandOutcome::Unchanged;
        }
        node.expanded = expanded;
        node.touch();
        let needs_load = expanded && node.is_unloaded() && !node.is_loading();
        self.structure_changed(if expanded { "expand" } else { "collapse" });
        if needs_load {
            return ExpandOutcome::NeedsLoad(self.begin_load(id));
        }
        ExpandOutcome::Changed
    }

    pub fn toggle_expanded(&mut self, id: NodeId) -> ExpandOutcome {
        let expanded = self.nodes[id].expanded;
        self.set_expanded(id, !expanded)
    }

    /// Expanded on behalf of the filter; remembered for `clear_filter`.
    pub(crate) fn auto_expand(&mut self, id: NodeId) {
        if id == self.root {
            return;
        }
        let node = &mut self.nodes[id];
        if !node.expanded {
            node.expanded = true;
            node.filter.auto_expanded = true;
            node.touch();
            self.request_render();
        }
    }

    /// Expand or collapse every loaded branch. Lazy branches are not fetched.
    pub fn set_all_expanded(&mut self, expanded: bool) {
        let ids: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|(id, n)| *id != self.root && !n.is_status() && n.has_children() == Some(true))
            .map(|(id, _)| id)
            .collect();
        for id in ids {
            let node = &mut self.nodes[id];
            node.filter.auto_expanded = false;
            if node.expanded != expanded {
                node.expanded = expanded;
                node.touch();
            }
        }
        self.structure_changed(if expanded { "expand_all" } else { "collapse_all" });
    }

    // ── Active node ─────────────────────────────────────────────────────────

    pub fn active(&self) -> Option<NodeId> {
        self.active.filter(|id| self.nodes.contains_key(*id))
    }

    pub fn set_active(&mut self, id: Option<NodeId>) {
        let id = id.filter(|id| self.nodes.contains_key(*id) && *id != self.root);
        if self.active() == id {
            return;
        }
        if let Some(old) = self.active() {
            self.nodes[old].touch();
        }
        if let Some(new) = id {
            self.nodes[new].touch();
        }
        self.active = id;
        self.events.push(TreeEvent::ActiveChanged { node: id });
        self.request_render();
    }

    // ── Lazy loading and status nodes ───────────────────────────────────────

    /// Mark `id` as loading and describe what the data source should fetch.
    pub fn begin_load(&mut self, id: NodeId) -> LoadRequest {
        let token = self.next_load_token;
        self.next_load_token += 1;
        let node = &mut self.nodes[id];
        node.pending_load = Some(token);
        let descriptor = (id != self.root).then(|| node.source.clone().unwrap_or_else(|| node.key.clone()));
        debug!("load {token} started for {:?}", descriptor);
        self.set_status(id, Some((StatusNodeType::Loading, String::new())));
        LoadRequest {
            node: id,
            token,
            descriptor,
        }
    }

    /// Deliver the outcome of a load started by `begin_load`.
    ///
    /// Returns `Ok(false)` when the result is stale (node removed or reloaded
    /// meanwhile). A failure leaves an error status node under `id` and is
    /// returned to the caller.
    pub fn finish_load(
        &mut self,
        id: NodeId,
        token: u64,
        result: Result<Vec<NodeData>>,
    ) -> Result<bool> {
        match self.nodes.get(id) {
            Some(node) if node.pending_load == Some(token) => {}
            _ => {
                debug!("load {token} ignored: node gone or superseded");
                return Ok(false);
            }
        }
        self.nodes[id].pending_load = None;
        let outcome = result.and_then(|data| {
            self.set_status(id, None);
            self.replace_children(id, data)
        });
        match outcome {
            Ok(added) => {
                debug!("load {token} delivered {} nodes", added.len());
                if self.filter.is_active() && self.filter.options.auto_apply {
                    self.update_filter();
                }
                Ok(true)
            }
            Err(e) => {
                error!("load {token} failed: {e}");
                self.set_status(id, Some((StatusNodeType::Error, e.to_string())));
                Err(e)
            }
        }
    }

    /// Forget the children of a lazy node so the next expand fetches again.
    pub fn reset_lazy(&mut self, id: NodeId) {
        if !self.nodes[id].lazy {
            return;
        }
        self.remove_children(id);
        let node = &mut self.nodes[id];
        node.children = Children::Unknown;
        node.expanded = false;
        node.pending_load = None;
        node.touch();
    }

    /// Replace any status child of `id` with the given status (or none).
    pub fn set_status(&mut self, id: NodeId, status: Option<(StatusNodeType, String)>) {
        let existing: Vec<NodeId> = self.nodes[id]
            .children
            .ids()
            .iter()
            .copied()
            .filter(|c| self.nodes[*c].is_status())
            .collect();
        for child in existing {
            self.remove_node(child);
        }
        let kind = status.as_ref().map(|(kind, _)| *kind);
        if let Some((kind, message)) = status {
            let key = if kind == StatusNodeType::NoData && id == self.root {
                NO_DATA_KEY.to_string()
            } else {
                self.generate_key(&HashSet::new())
            };
            let title = if message.is_empty() {
                kind.label().to_string()
            } else {
                format!("{}: {}", kind.label(), message)
            };
            let depth = self.nodes[id].depth + 1;
            let mut node = Node::new(key.clone(), title, Some(id), depth);
            node.status = Some(kind);
            let child = self.nodes.insert(node);
            self.keys.insert(key, child);
            self.nodes[id].children.extend([child]);
            self.nodes[id].touch();
        }
        self.events.push(TreeEvent::StatusChanged { node: id, status: kind });
        self.request_render();
    }

    /// Status child of `id`, if one is installed.
    pub fn status_child(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id]
            .children
            .ids()
            .iter()
            .copied()
            .find(|c| self.nodes[*c].is_status())
    }

    // ── Render scheduling ───────────────────────────────────────────────────

    /// Ask for one viewport pass; repeated requests coalesce.
    pub fn request_render(&mut self) {
        self.render_requested = true;
    }

    /// Suspend render passes; returns the previous state for `resume_render`.
    pub fn suspend_render(&mut self) -> bool {
        std::mem::replace(&mut self.render_suspended, true)
    }

    pub fn resume_render(&mut self, previous: bool) {
        self.render_suspended = previous;
    }

    pub fn is_render_suspended(&self) -> bool {
        self.render_suspended
    }

    /// Consume a pending render request unless rendering is suspended.
    pub fn take_render_request(&mut self) -> bool {
        if self.render_suspended {
            return false;
        }
        std::mem::take(&mut self.render_requested)
    }

    // ── Notifications ───────────────────────────────────────────────────────

    pub fn drain_events(&mut self) -> Vec<TreeEvent> {
        std::mem::take(&mut self.events)
    }

    pub(crate) fn emit(&mut self, event: TreeEvent) {
        self.events.push(event);
    }

    fn structure_changed(&mut self, reason: &'static str) {
        self.events.push(TreeEvent::StructureChanged { reason });
        self.request_render();
    }

    // ── Internals ───────────────────────────────────────────────────────────

    /// Next free `_N` key, skipping keys the current batch still has to insert.
    fn generate_key(&mut self, supplied: &HashSet<String>) -> String {
        loop {
            let key = format!("_{}", self.next_key);
            self.next_key += 1;
            if !self.keys.contains_key(&key) && !supplied.contains(&key) {
                return key;
            }
        }
    }

    /// Reject duplicate keys and return every key the batch supplies.
    fn check_keys(&self, data: &[NodeData]) -> Result<HashSet<String>> {
        let mut seen = HashSet::new();
        Self::collect_duplicate_keys(data, &mut seen, &|key: &str| self.keys.contains_key(key))?;
        Ok(seen.into_iter().map(str::to_string).collect())
    }

    fn collect_duplicate_keys<'a>(
        data: &'a [NodeData],
        seen: &mut HashSet<&'a str>,
        taken: &dyn Fn(&str) -> bool,
    ) -> Result<()> {
        for record in data {
            if let Some(key) = record.key.as_deref() {
                if taken(key) || !seen.insert(key) {
                    return Err(AppError::DuplicateKey(key.to_string()));
                }
            }
            if let Some(children) = &record.children {
                Self::collect_duplicate_keys(children, seen, taken)?;
            }
        }
        Ok(())
    }

    fn subtree_keys(&self, id: NodeId) -> Vec<&str> {
        let mut keys = Vec::new();
        let mut stack: Vec<NodeId> = self.nodes[id].children.ids().to_vec();
        while let Some(current) = stack.pop() {
            let node = &self.nodes[current];
            keys.push(node.key.as_str());
            stack.extend_from_slice(node.children.ids());
        }
        keys
    }

    fn insert_record(
        &mut self,
        parent: NodeId,
        record: NodeData,
        depth: usize,
        supplied: &HashSet<String>,
    ) -> NodeId {
        let key = match record.key {
            Some(key) => key,
            None => self.generate_key(supplied),
        };
        let mut node = Node::new(key.clone(), record.title, Some(parent), depth);
        node.lazy = record.lazy;
        // An unloaded lazy node starts collapsed; its first expand fetches.
        node.expanded = record.expanded && !(record.lazy && record.children.is_none());
        node.selected = record.selected;
        node.source = record.source;
        if record.children.is_none() && record.lazy {
            node.children = Children::Unknown;
        }
        let id = self.nodes.insert(node);
        self.keys.insert(key, id);
        if let Some(children) = record.children {
            let ids: Vec<NodeId> = children
                .into_iter()
                .map(|child| self.insert_record(id, child, depth + 1, supplied))
                .collect();
            self.nodes[id].children = Children::Loaded(ids);
        }
        id
    }

    fn drop_subtree(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(current) {
                stack.extend_from_slice(node.children.ids());
                if self.keys.get(&node.key) == Some(&current) {
                    self.keys.remove(&node.key);
                }
                if self.active == Some(current) {
                    self.active = None;
                    self.events.push(TreeEvent::ActiveChanged { node: None });
                }
            }
        }
    }
}
