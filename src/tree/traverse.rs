//! Depth-first traversal over the node arena.
//!
//! Row order is pre-order over visible nodes: children of collapsed nodes are
//! pruned, and while a "hide" filter is active so are nodes that neither
//! matched nor contain a match. `include_hidden` lifts both rules.

use super::{NodeId, Tree};

/// Flow control returned by traversal callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitControl {
    Continue,
    /// Do not descend into this node's children; keep going with the rest.
    Skip,
    /// Abort the whole traversal.
    Stop,
}

/// One level of the cursor: the current node is `children(parent)[index]`.
#[derive(Debug, Clone, Copy)]
struct Frame {
    parent: NodeId,
    index: usize,
}

/// Position in row order, kept as the path of child indices from the root so
/// stepping to a neighbour never rescans a sibling list.
#[derive(Debug, Clone)]
struct RowCursor {
    stack: Vec<Frame>,
    include_hidden: bool,
}

impl RowCursor {
    /// Cursor on `id`; on the root it sits before the first row.
    fn at(tree: &Tree, id: NodeId, include_hidden: bool) -> Self {
        assert!(
            tree.contains(id),
            "traversal started at a node that is not attached to the tree"
        );
        let mut stack = Vec::with_capacity(tree.node(id).depth);
        let mut current = id;
        while let Some(parent) = tree.parent(current) {
            let index = tree
                .children(parent)
                .iter()
                .position(|c| *c == current)
                .expect("child is listed under its parent");
            stack.push(Frame { parent, index });
            current = parent;
        }
        assert!(
            current == tree.root(),
            "traversal started at a node that is not attached to the tree"
        );
        stack.reverse();
        Self {
            stack,
            include_hidden,
        }
    }

    fn current(&self, tree: &Tree) -> NodeId {
        match self.stack.last() {
            Some(frame) => tree.children(frame.parent)[frame.index],
            None => tree.root(),
        }
    }

    /// Step to the next row. With `descend` false the current subtree is skipped.
    fn advance(&mut self, tree: &Tree, descend: bool) -> Option<NodeId> {
        let current = self.current(tree);
        if descend && tree.descends(current, self.include_hidden) {
            let children = tree.children(current);
            if let Some(index) = children
                .iter()
                .position(|c| tree.passes_filter(*c, self.include_hidden))
            {
                self.stack.push(Frame {
                    parent: current,
                    index,
                });
                return Some(children[index]);
            }
        }
        while let Some(frame) = self.stack.last_mut() {
            let siblings = tree.children(frame.parent);
            let next = (frame.index + 1..siblings.len())
                .find(|i| tree.passes_filter(siblings[*i], self.include_hidden));
            if let Some(index) = next {
                frame.index = index;
                return Some(siblings[index]);
            }
            self.stack.pop();
        }
        None
    }

    /// Step to the previous row: the previous sibling's deepest visible
    /// descendant, or the parent.
    fn retreat(&mut self, tree: &Tree) -> Option<NodeId> {
        let frame = self.stack.last_mut()?;
        let siblings = tree.children(frame.parent);
        let prev = (0..frame.index)
            .rev()
            .find(|i| tree.passes_filter(siblings[*i], self.include_hidden));
        match prev {
            Some(index) => {
                frame.index = index;
                self.descend_last(tree);
                Some(self.current(tree))
            }
            None => {
                self.stack.pop();
                (!self.stack.is_empty()).then(|| self.current(tree))
            }
        }
    }

    /// Move down to the last visible descendant of the current node.
    fn descend_last(&mut self, tree: &Tree) {
        loop {
            let current = self.current(tree);
            if !tree.descends(current, self.include_hidden) {
                return;
            }
            let children = tree.children(current);
            let Some(index) = children
                .iter()
                .rposition(|c| tree.passes_filter(*c, self.include_hidden))
            else {
                return;
            };
            self.stack.push(Frame {
                parent: current,
                index,
            });
        }
    }
}

/// Read-only iterator over rows from a starting node to the end of the tree.
pub struct Rows<'a> {
    tree: &'a Tree,
    cursor: RowCursor,
    next: Option<NodeId>,
}

impl Iterator for Rows<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.cursor.advance(self.tree, true);
        Some(current)
    }
}

impl Tree {
    /// Whether `id` takes part in row order under the active filter.
    pub(crate) fn passes_filter(&self, id: NodeId, include_hidden: bool) -> bool {
        if include_hidden || !self.filter.hides_unmatched() {
            return true;
        }
        let node = self.node(id);
        node.is_status() || node.matched() || node.sub_match_count() > 0
    }

    fn descends(&self, id: NodeId, include_hidden: bool) -> bool {
        id == self.root() || include_hidden || self.node(id).expanded
    }

    /// Pre-order walk from `start` (inclusive) to the end of the tree.
    ///
    /// Starting at the root begins with the first row. Returns `false` if a
    /// callback stopped the walk. Callbacks may change node state but not
    /// the structure of the tree.
    pub fn visit_top_down<F>(&mut self, start: NodeId, include_hidden: bool, mut f: F) -> bool
    where
        F: FnMut(&mut Tree, NodeId) -> VisitControl,
    {
        let mut cursor = RowCursor::at(self, start, include_hidden);
        let mut current = if start == self.root() {
            cursor.advance(self, true)
        } else {
            Some(start)
        };
        while let Some(id) = current {
            let descend = match f(self, id) {
                VisitControl::Stop => return false,
                VisitControl::Skip => false,
                VisitControl::Continue => true,
            };
            current = cursor.advance(self, descend);
        }
        true
    }

    /// Reverse walk from `start` (inclusive) back to the first row; exactly
    /// the reverse of `visit_top_down` under the same visibility rules.
    ///
    /// Starting at the root begins with the last row. `Skip` has no subtree to
    /// prune here and behaves like `Continue`.
    pub fn visit_bottom_up<F>(&mut self, start: NodeId, include_hidden: bool, mut f: F) -> bool
    where
        F: FnMut(&mut Tree, NodeId) -> VisitControl,
    {
        let mut current = if start == self.root() {
            self.last_row(include_hidden)
        } else {
            Some(start)
        };
        let mut cursor = RowCursor::at(self, current.unwrap_or(start), include_hidden);
        while let Some(id) = current {
            if f(self, id) == VisitControl::Stop {
                return false;
            }
            current = cursor.retreat(self);
        }
        true
    }

    /// Visit the children of `id`'s parent in order.
    pub fn visit_siblings<F>(&mut self, id: NodeId, include_self: bool, mut f: F) -> bool
    where
        F: FnMut(&mut Tree, NodeId) -> VisitControl,
    {
        let siblings = match self.parent(id) {
            Some(parent) => self.children(parent).to_vec(),
            None => vec![id],
        };
        for sibling in siblings {
            if sibling == id && !include_self {
                continue;
            }
            if f(self, sibling) == VisitControl::Stop {
                return false;
            }
        }
        true
    }

    /// Visit parent, grandparent, … up to and including the root.
    pub fn visit_ancestors<F>(&mut self, id: NodeId, include_self: bool, mut f: F) -> bool
    where
        F: FnMut(&mut Tree, NodeId) -> VisitControl,
    {
        let mut current = if include_self {
            Some(id)
        } else {
            self.parent(id)
        };
        while let Some(node) = current {
            if f(self, node) == VisitControl::Stop {
                return false;
            }
            current = self.parent(node);
        }
        true
    }

    /// Visit a whole subtree, hidden nodes included.
    pub fn visit_subtree<F>(&mut self, start: NodeId, include_self: bool, mut f: F) -> bool
    where
        F: FnMut(&mut Tree, NodeId) -> VisitControl,
    {
        let mut stack: Vec<NodeId> = if include_self {
            vec![start]
        } else {
            self.children(start).iter().rev().copied().collect()
        };
        while let Some(id) = stack.pop() {
            match f(self, id) {
                VisitControl::Stop => return false,
                VisitControl::Skip => {}
                VisitControl::Continue => stack.extend(self.children(id).iter().rev()),
            }
        }
        true
    }

    /// Row after `id`, if any.
    pub fn next_row(&self, id: NodeId, include_hidden: bool) -> Option<NodeId> {
        RowCursor::at(self, id, include_hidden).advance(self, true)
    }

    /// Row before `id`, if any.
    pub fn prev_row(&self, id: NodeId, include_hidden: bool) -> Option<NodeId> {
        if id == self.root() {
            return None;
        }
        RowCursor::at(self, id, include_hidden).retreat(self)
    }

    pub fn first_row(&self, include_hidden: bool) -> Option<NodeId> {
        self.next_row(self.root(), include_hidden)
    }

    pub fn last_row(&self, include_hidden: bool) -> Option<NodeId> {
        let root = self.root();
        let index = self
            .children(root)
            .iter()
            .rposition(|c| self.passes_filter(*c, include_hidden))?;
        let mut cursor = RowCursor {
            stack: vec![Frame {
                parent: root,
                index,
            }],
            include_hidden,
        };
        cursor.descend_last(self);
        Some(cursor.current(self))
    }

    /// Rows from `start` (inclusive; the root means "from the first row").
    pub fn rows(&self, start: NodeId, include_hidden: bool) -> Rows<'_> {
        let mut cursor = RowCursor::at(self, start, include_hidden);
        let next = if start == self.root() {
            cursor.advance(self, true)
        } else {
            Some(start)
        };
        Rows {
            tree: self,
            cursor,
            next,
        }
    }
}
