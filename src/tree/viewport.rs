//! Row virtualization: numbers the visible rows and keeps surfaces only for
//! the rows inside the rendered window.

use log::debug;
use slotmap::SecondaryMap;

use super::traverse::VisitControl;
use super::{NodeId, Tree};

/// Builds and maintains the renderable representation of a row.
pub trait SurfaceFactory {
    type Surface;

    /// Build a surface for `id` shown at `row`.
    fn create(&mut self, tree: &Tree, id: NodeId, row: usize) -> Self::Surface;

    /// Refresh an existing surface in place after its row or content changed.
    fn update(&mut self, tree: &Tree, id: NodeId, row: usize, surface: &mut Self::Surface);

    /// Called once a surface leaves the rendered window.
    fn release(&mut self, _id: NodeId, _surface: Self::Surface) {}
}

/// Inclusive range of row indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowRange {
    pub start: usize,
    pub end: usize,
}

impl RowRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    pub fn contains(&self, row: usize) -> bool {
        self.start <= row && row <= self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }
}

/// Counters for the most recent renumber pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    pub rows: usize,
    pub created: usize,
    pub updated: usize,
    pub reused: usize,
    pub released: usize,
}

struct Slot<S> {
    surface: S,
    row: usize,
    revision: u64,
    epoch: u64,
    pass: u64,
}

/// A scrollable window over the tree's visible rows.
///
/// Offsets (`scroll_top`, `height`, extent) are in display units; each row
/// is `row_height` units tall.
pub struct Viewport<F: SurfaceFactory> {
    factory: F,
    slots: SecondaryMap<NodeId, Slot<F::Surface>>,
    scroll_top: usize,
    height: usize,
    row_height: usize,
    prefetch: usize,
    row_count: usize,
    extent: usize,
    last_range: Option<RowRange>,
    pass: u64,
    scheduled: bool,
    stats: PassStats,
}

impl<F: SurfaceFactory> Viewport<F> {
    pub fn new(factory: F, height: usize, row_height: usize, prefetch: usize) -> Self {
        Self {
            factory,
            slots: SecondaryMap::new(),
            scroll_top: 0,
            height,
            row_height: row_height.max(1),
            prefetch,
            row_count: 0,
            extent: 0,
            last_range: None,
            pass: 0,
            scheduled: true,
            stats: PassStats::default(),
        }
    }

    /// Number every visible row and sync surfaces with `range`.
    ///
    /// All visible rows are counted so the content extent stays correct, but
    /// only rows inside `range` keep a surface. Returns whether any row index
    /// changed since the previous pass.
    pub fn renumber(&mut self, tree: &mut Tree, range: RowRange) -> bool {
        let generation = tree.next_row_generation();
        let epoch = tree.style_epoch();
        self.pass += 1;
        let pass = self.pass;
        let mut stats = PassStats::default();

        // A removed node's slot can be reused by a new node before this pass,
        // so surfaces of dead nodes are released before anything is created.
        let dead: Vec<NodeId> = self
            .slots
            .keys()
            .filter(|&id| !tree.contains(id))
            .collect();
        for id in dead {
            if let Some(slot) = self.slots.remove(id) {
                self.factory.release(id, slot.surface);
                stats.released += 1;
            }
        }

        let slots = &mut self.slots;
        let factory = &mut self.factory;
        let mut changed = false;
        let mut row = 0;

        let root = tree.root();
        tree.visit_top_down(root, false, |tree, id| {
            let node = tree.node_mut(id);
            let previous = (node.row_generation + 1 == generation).then_some(node.row_index);
            changed |= previous != Some(row);
            node.row_index = row;
            node.row_generation = generation;
            let revision = node.revision;

            if range.contains(row) {
                match slots.get_mut(id) {
                    Some(slot) => {
                        if slot.row != row || slot.revision != revision || slot.epoch != epoch {
                            factory.update(tree, id, row, &mut slot.surface);
                            slot.row = row;
                            slot.revision = revision;
                            slot.epoch = epoch;
                            stats.updated += 1;
                        } else {
                            stats.reused += 1;
                        }
                        slot.pass = pass;
                    }
                    None => {
                        let surface = factory.create(tree, id, row);
                        slots.insert(
                            id,
                            Slot {
                                surface,
                                row,
                                revision,
                                epoch,
                                pass,
                            },
                        );
                        stats.created += 1;
                    }
                }
            }
            row += 1;
            VisitControl::Continue
        });

        let stale: Vec<NodeId> = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.pass != pass)
            .map(|(id, _)| id)
            .collect();
        for id in stale {
            if let Some(slot) = self.slots.remove(id) {
                self.factory.release(id, slot.surface);
                stats.released += 1;
            }
        }

        changed |= row != self.row_count;
        stats.rows = row;
        self.row_count = row;
        self.extent = row * self.row_height;
        self.last_range = Some(range);
        self.stats = stats;
        debug!(
            "renumber {}..={}: {} rows, {} created, {} updated, {} released",
            range.start, range.end, stats.rows, stats.created, stats.updated, stats.released
        );
        changed
    }

    /// Window for the current scroll position, plus the prefetch margin.
    pub fn range(&self) -> RowRange {
        let first = self.scroll_top / self.row_height;
        let visible = self.height.div_ceil(self.row_height).max(1);
        RowRange::new(
            first.saturating_sub(self.prefetch),
            first + visible - 1 + self.prefetch,
        )
    }

    /// Renumber for the current scroll position.
    pub fn update_viewport(&mut self, tree: &mut Tree) -> bool {
        self.scheduled = false;
        let mut changed = self.renumber(tree, self.range());
        // Rows may have disappeared below the scroll position.
        let max = self.max_scroll();
        if self.scroll_top > max {
            self.scroll_top = max;
            changed |= self.renumber(tree, self.range());
        }
        changed
    }

    pub fn schedule_update(&mut self) {
        self.scheduled = true;
    }

    pub fn is_update_scheduled(&self) -> bool {
        self.scheduled
    }

    /// Run one pass if the viewport or the tree asked for it since the last
    /// one. Nothing happens while tree rendering is suspended. Returns
    /// whether a pass ran.
    pub fn flush(&mut self, tree: &mut Tree) -> bool {
        if tree.is_render_suspended() {
            return false;
        }
        let requested = tree.take_render_request();
        if !requested && !self.scheduled {
            return false;
        }
        self.update_viewport(tree);
        true
    }

    pub fn scroll_to(&mut self, offset: usize) {
        let offset = offset.min(self.max_scroll());
        if offset != self.scroll_top {
            self.scroll_top = offset;
            self.schedule_update();
        }
    }

    /// Scroll by whole rows.
    pub fn scroll_by(&mut self, rows: isize) {
        let delta = rows.unsigned_abs() * self.row_height;
        let offset = if rows < 0 {
            self.scroll_top.saturating_sub(delta)
        } else {
            self.scroll_top + delta
        };
        self.scroll_to(offset);
    }

    /// Scroll the minimum amount that makes `row` fully visible.
    pub fn scroll_row_into_view(&mut self, row: usize) {
        let top = row * self.row_height;
        let bottom = top + self.row_height;
        if top < self.scroll_top {
            self.scroll_to(top);
        } else if bottom > self.scroll_top + self.height {
            self.scroll_to(bottom.saturating_sub(self.height));
        }
    }

    pub fn resize(&mut self, height: usize) {
        if height != self.height {
            self.height = height;
            self.schedule_update();
        }
    }

    pub fn set_row_height(&mut self, row_height: usize) {
        self.row_height = row_height.max(1);
        self.schedule_update();
    }

    pub fn set_prefetch(&mut self, prefetch: usize) {
        self.prefetch = prefetch;
        self.schedule_update();
    }

    fn max_scroll(&self) -> usize {
        self.extent.saturating_sub(self.height)
    }

    /// Total height of all visible rows.
    pub fn content_extent(&self) -> usize {
        self.extent
    }

    /// Visible rows counted by the last pass, rendered or not.
    pub fn visible_row_count(&self) -> usize {
        self.row_count
    }

    pub fn last_range(&self) -> Option<RowRange> {
        self.last_range
    }

    pub fn scroll_top(&self) -> usize {
        self.scroll_top
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn row_height(&self) -> usize {
        self.row_height
    }

    pub fn stats(&self) -> PassStats {
        self.stats
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn surface(&self, id: NodeId) -> Option<&F::Surface> {
        self.slots.get(id).map(|slot| &slot.surface)
    }

    pub fn surface_count(&self) -> usize {
        self.slots.len()
    }

    /// Rendered surfaces ordered by row.
    pub fn surfaces(&self) -> Vec<(usize, NodeId, &F::Surface)> {
        let mut rows: Vec<_> = self
            .slots
            .iter()
            .map(|(id, slot)| (slot.row, id, &slot.surface))
            .collect();
        rows.sort_by_key(|(row, _, _)| *row);
        rows
    }

    /// Node whose row covers display offset `y` within the window.
    pub fn node_at(&self, y: usize) -> Option<NodeId> {
        let row = (self.scroll_top + y) / self.row_height;
        self.slots
            .iter()
            .find(|(_, slot)| slot.row == row)
            .map(|(id, _)| id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::tests::{id, sample_tree};
    use crate::tree::NodeData;

    #[derive(Default)]
    struct Counting {
        created: usize,
        updated: usize,
        released: usize,
    }

    impl SurfaceFactory for Counting {
        type Surface = (String, usize);

        fn create(&mut self, tree: &Tree, id: NodeId, row: usize) -> Self::Surface {
            self.created += 1;
            (tree.node(id).title.clone(), row)
        }

        fn update(&mut self, tree: &Tree, id: NodeId, row: usize, surface: &mut Self::Surface) {
            self.updated += 1;
            *surface = (tree.node(id).title.clone(), row);
        }

        fn release(&mut self, _id: NodeId, _surface: Self::Surface) {
            self.released += 1;
        }
    }

    fn flat_tree(n: usize) -> Tree {
        let mut tree = Tree::new(true);
        let root = tree.root();
        let data = (0..n).map(|i| NodeData::new(format!("n{i}"))).collect();
        tree.add_children(root, data).unwrap();
        tree
    }

    fn rendered_rows<F: SurfaceFactory>(viewport: &Viewport<F>) -> Vec<usize> {
        viewport.surfaces().iter().map(|(row, _, _)| *row).collect()
    }

    #[test]
    fn extent_counts_all_rows_regardless_of_range() {
        let mut tree = flat_tree(50);
        let mut viewport = Viewport::new(Counting::default(), 10, 2, 0);
        viewport.renumber(&mut tree, RowRange::new(0, 4));
        assert_eq!(viewport.content_extent(), 100);
        viewport.renumber(&mut tree, RowRange::new(10, 20));
        assert_eq!(viewport.content_extent(), 100);
        assert_eq!(viewport.visible_row_count(), 50);
    }

    #[test]
    fn surfaces_exist_exactly_inside_range() {
        let mut tree = flat_tree(50);
        let mut viewport = Viewport::new(Counting::default(), 10, 1, 0);
        viewport.renumber(&mut tree, RowRange::new(5, 9));
        assert_eq!(rendered_rows(&viewport), vec![5, 6, 7, 8, 9]);
        viewport.renumber(&mut tree, RowRange::new(30, 31));
        assert_eq!(rendered_rows(&viewport), vec![30, 31]);
        assert_eq!(viewport.factory().released, 5);
    }

    #[test]
    fn scrolling_one_row_reuses_surfaces() {
        let mut tree = flat_tree(50);
        let mut viewport = Viewport::new(Counting::default(), 10, 1, 0);
        viewport.update_viewport(&mut tree);
        assert_eq!(viewport.factory().created, 10);

        viewport.scroll_by(1);
        assert!(viewport.flush(&mut tree));
        let stats = viewport.stats();
        assert_eq!(stats.created, 1);
        assert_eq!(stats.released, 1);
        assert_eq!(stats.updated, 0);
        assert_eq!(stats.reused, 9);
        assert_eq!(rendered_rows(&viewport), (1..=10).collect::<Vec<_>>());
    }

    #[test]
    fn prefetch_extends_range() {
        let tree = flat_tree(50);
        let mut viewport = Viewport::new(Counting::default(), 10, 1, 3);
        assert_eq!(viewport.range(), RowRange::new(0, 12));
        viewport.extent = tree.len();
        viewport.scroll_to(20);
        assert_eq!(viewport.range(), RowRange::new(17, 32));
    }

    #[test]
    fn renumber_reports_index_changes() {
        let mut tree = sample_tree();
        let mut viewport = Viewport::new(Counting::default(), 10, 1, 0);
        assert!(viewport.update_viewport(&mut tree));
        assert!(!viewport.update_viewport(&mut tree));

        let a = id(&tree, "A");
        tree.set_expanded(a, true);
        assert!(viewport.update_viewport(&mut tree));
        assert_eq!(tree.row_index(id(&tree, "E")), Some(3));
        assert_eq!(tree.row_index(id(&tree, "D")), None);
    }

    #[test]
    fn content_change_updates_surface_in_place() {
        let mut tree = sample_tree();
        let mut viewport = Viewport::new(Counting::default(), 10, 1, 0);
        viewport.update_viewport(&mut tree);
        let e = id(&tree, "E");
        tree.set_title(e, "Echo");
        viewport.update_viewport(&mut tree);
        assert_eq!(viewport.stats().updated, 1);
        assert_eq!(viewport.stats().created, 0);
        assert_eq!(viewport.surface(e).unwrap().0, "Echo");
    }

    #[test]
    fn filter_changes_refresh_every_row() {
        let mut tree = sample_tree();
        let mut viewport = Viewport::new(Counting::default(), 10, 1, 0);
        viewport.update_viewport(&mut tree);
        tree.filter_nodes(
            "zzz",
            crate::tree::filter::FilterOptions {
                mode: crate::tree::filter::FilterMode::Dim,
                ..Default::default()
            },
        );
        assert!(viewport.flush(&mut tree));
        assert_eq!(viewport.stats().updated, 2);
    }

    #[test]
    fn removed_nodes_lose_their_surface() {
        let mut tree = sample_tree();
        let mut viewport = Viewport::new(Counting::default(), 10, 1, 0);
        viewport.update_viewport(&mut tree);
        let a = id(&tree, "A");
        tree.remove_node(a);
        viewport.update_viewport(&mut tree);
        assert_eq!(viewport.surface_count(), 1);
        assert_eq!(viewport.factory().released, 1);
        assert_eq!(viewport.content_extent(), 1);
    }

    #[test]
    fn reused_slot_releases_the_old_surface() {
        let mut tree = flat_tree(2);
        let mut viewport = Viewport::new(Counting::default(), 10, 1, 0);
        viewport.update_viewport(&mut tree);
        let root = tree.root();
        let b = tree.node(root).children.ids()[1];
        tree.remove_node(b);
        tree.add_children(root, vec![NodeData::new("c")]).unwrap();
        viewport.update_viewport(&mut tree);

        let factory = viewport.factory();
        assert_eq!(factory.released, 1);
        assert_eq!(factory.created - factory.released, viewport.surface_count());
        assert_eq!(viewport.surface_count(), 2);
    }

    #[test]
    fn flush_coalesces_requests() {
        let mut tree = flat_tree(5);
        let mut viewport = Viewport::new(Counting::default(), 10, 1, 0);
        assert!(viewport.flush(&mut tree));
        assert!(!viewport.flush(&mut tree));

        tree.request_render();
        tree.request_render();
        viewport.schedule_update();
        assert!(viewport.flush(&mut tree));
        assert!(!viewport.flush(&mut tree));

        let previous = tree.suspend_render();
        tree.request_render();
        assert!(!viewport.flush(&mut tree));
        tree.resume_render(previous);
        assert!(viewport.flush(&mut tree));
    }

    #[test]
    fn scroll_is_clamped_and_follows_rows() {
        let mut tree = flat_tree(20);
        let mut viewport = Viewport::new(Counting::default(), 5, 1, 0);
        viewport.update_viewport(&mut tree);
        viewport.scroll_to(100);
        assert_eq!(viewport.scroll_top(), 15);

        viewport.scroll_row_into_view(2);
        assert_eq!(viewport.scroll_top(), 2);
        viewport.scroll_row_into_view(10);
        assert_eq!(viewport.scroll_top(), 6);
        viewport.scroll_by(-10);
        assert_eq!(viewport.scroll_top(), 0);
    }

    #[test]
    fn shrinking_content_pulls_scroll_back() {
        let mut tree = flat_tree(20);
        let mut viewport = Viewport::new(Counting::default(), 5, 1, 0);
        viewport.update_viewport(&mut tree);
        viewport.scroll_to(15);
        viewport.update_viewport(&mut tree);
        let root = tree.root();
        tree.replace_children(root, vec![NodeData::new("only")])
            .unwrap();
        viewport.update_viewport(&mut tree);
        assert_eq!(viewport.scroll_top(), 0);
        assert_eq!(rendered_rows(&viewport), vec![0]);
    }

    #[test]
    fn node_at_maps_offsets_to_rows() {
        let mut tree = flat_tree(20);
        let mut viewport = Viewport::new(Counting::default(), 4, 2, 0);
        viewport.update_viewport(&mut tree);
        let second = tree.children(tree.root())[1];
        assert_eq!(viewport.node_at(2), Some(second));
        assert_eq!(viewport.node_at(3), Some(second));
    }

    #[test]
    fn empty_tree_has_no_rows() {
        let mut tree = Tree::new(true);
        let mut viewport = Viewport::new(Counting::default(), 10, 1, 2);
        assert!(!viewport.update_viewport(&mut tree));
        assert_eq!(viewport.content_extent(), 0);
        assert_eq!(viewport.surface_count(), 0);
    }
}
