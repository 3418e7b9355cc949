use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info};
use ratatui::layout::Rect;
use tokio::sync::mpsc::UnboundedSender;

use crate::components::tree::LineFactory;
use crate::config::AppConfig;
use crate::error::Result;
use crate::event::Event;
use crate::theme::{resolve_theme, ThemeColors};
use crate::tree::filter::{FilterOptions, Predicate};
use crate::tree::loader::DataSource;
use crate::tree::viewport::Viewport;
use crate::tree::{ExpandOutcome, LoadRequest, NodeData, NodeId, Tree, TreeEvent};

/// How long a status message stays on screen.
const STATUS_TTL: Duration = Duration::from_secs(3);

/// Text typed into the filter bar. `cursor` counts chars, not bytes.
#[derive(Debug, Clone, Default)]
pub struct FilterInput {
    pub query: String,
    pub cursor: usize,
    pub editing: bool,
}

impl FilterInput {
    pub fn len(&self) -> usize {
        self.query.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.query.is_empty()
    }

    fn byte_offset(&self, chars: usize) -> usize {
        self.query
            .char_indices()
            .nth(chars)
            .map_or(self.query.len(), |(i, _)| i)
    }

    pub fn insert(&mut self, c: char) {
        let at = self.byte_offset(self.cursor);
        self.query.insert(at, c);
        self.cursor += 1;
    }

    /// Delete the char before the cursor.
    pub fn backspace(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.cursor -= 1;
        let at = self.byte_offset(self.cursor);
        self.query.remove(at);
        true
    }

    /// Delete the char under the cursor.
    pub fn delete(&mut self) -> bool {
        if self.cursor >= self.len() {
            return false;
        }
        let at = self.byte_offset(self.cursor);
        self.query.remove(at);
        true
    }

    pub fn move_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn move_right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.len());
    }

    pub fn home(&mut self) {
        self.cursor = 0;
    }

    pub fn end(&mut self) {
        self.cursor = self.len();
    }

    pub fn clear(&mut self) {
        self.query.clear();
        self.cursor = 0;
    }

    /// Query split around the cursor: text before, char under it, text after.
    pub fn split(&self) -> (&str, Option<char>, &str) {
        let at = self.byte_offset(self.cursor);
        let (before, rest) = self.query.split_at(at);
        let mut chars = rest.chars();
        let under = chars.next();
        (before, under, chars.as_str())
    }
}

/// Main application state.
pub struct App {
    pub tree: Tree,
    pub viewport: Viewport<LineFactory>,
    pub theme: ThemeColors,
    pub filter_input: FilterInput,
    /// Options handed to every filter application.
    pub filter_options: FilterOptions,
    pub branch_mode: bool,
    pub should_quit: bool,
    /// Status message with creation time for auto-dismiss.
    pub status_message: Option<(String, Instant)>,
    pub status_is_error: bool,
    /// Inner area of the tree pane from the last draw, for mouse hits.
    pub tree_area: Rect,
    source: Arc<dyn DataSource>,
    events: UnboundedSender<Event>,
    debounce: Duration,
    filter_deadline: Option<Instant>,
    follow_active: bool,
    expand_root_children: bool,
}

impl App {
    /// Create the app; call `load_root` to fetch the initial data.
    pub fn new(config: &AppConfig, source: Arc<dyn DataSource>, events: UnboundedSender<Event>) -> Self {
        let theme = resolve_theme(&config.theme);
        let viewport = Viewport::new(
            LineFactory::new(theme.clone()),
            0,
            config.row_height(),
            config.prefetch_rows(),
        );
        Self {
            tree: Tree::new(config.escape_titles()),
            viewport,
            theme,
            filter_input: FilterInput::default(),
            filter_options: config.filter_options(),
            branch_mode: false,
            should_quit: false,
            status_message: None,
            status_is_error: false,
            tree_area: Rect::default(),
            source,
            events,
            debounce: Duration::from_millis(config.debounce_ms()),
            filter_deadline: None,
            follow_active: false,
            expand_root_children: config.expand_root_children(),
        }
    }

    pub fn quit(&mut self) {
        self.should_quit = true;
    }

    pub fn source_label(&self) -> String {
        self.source.describe()
    }

    // ── Loading ─────────────────────────────────────────────────────────────

    /// Fetch the top-level records.
    pub fn load_root(&mut self) {
        let root = self.tree.root();
        let request = self.tree.begin_load(root);
        self.dispatch_load(request);
    }

    /// Run a load in the background; the result comes back as `Event::LoadComplete`.
    fn dispatch_load(&self, request: LoadRequest) {
        let future = self.source.load(request.descriptor.as_deref());
        let tx = self.events.clone();
        tokio::spawn(async move {
            let result = future.await;
            let _ = tx.send(Event::LoadComplete {
                node: request.node,
                token: request.token,
                result,
            });
        });
    }

    pub fn handle_load_complete(&mut self, node: NodeId, token: u64, result: Result<Vec<NodeData>>) {
        let root = self.tree.root();
        match self.tree.finish_load(node, token, result) {
            Ok(false) => {}
            Ok(true) if node == root => {
                info!("loaded {} nodes from {}", self.tree.len(), self.source.describe());
                if self.expand_root_children {
                    for child in self.tree.children(root).to_vec() {
                        self.set_expanded(child, true);
                    }
                }
                if self.tree.active().is_none() {
                    let first = self.tree.first_row(false);
                    self.tree.set_active(first);
                }
                self.set_status_message(format!("Loaded {} nodes", self.tree.len()));
            }
            Ok(true) => {
                debug!("loaded {} children", self.tree.children(node).len());
            }
            Err(e) => self.set_error_message(format!("✗ {e}")),
        }
    }

    /// Forget a lazy node's children and fetch them again.
    pub fn reload_active(&mut self) {
        let Some(id) = self.tree.active() else {
            return;
        };
        if !self.tree.node(id).lazy {
            self.set_status_message("Only lazy nodes can be reloaded".to_string());
            return;
        }
        self.tree.reset_lazy(id);
        self.set_expanded(id, true);
    }

    // ── Expansion ───────────────────────────────────────────────────────────

    pub fn set_expanded(&mut self, id: NodeId, expanded: bool) {
        if let ExpandOutcome::NeedsLoad(request) = self.tree.set_expanded(id, expanded) {
            self.dispatch_load(request);
        }
    }

    pub fn toggle_active(&mut self) {
        if let Some(id) = self.tree.active() {
            let expanded = self.tree.node(id).expanded;
            self.set_expanded(id, !expanded);
        }
    }

    /// Expand a collapsed branch, or step into an expanded one.
    pub fn expand_or_enter(&mut self) {
        let Some(id) = self.tree.active() else {
            return;
        };
        let node = self.tree.node(id);
        if !node.is_branch() {
            return;
        }
        if !node.expanded {
            self.set_expanded(id, true);
        } else if let Some(next) = self.tree.next_row(id, false) {
            if self.tree.parent(next) == Some(id) {
                self.activate(next);
            }
        }
    }

    /// Collapse an expanded branch, or step out to the parent row.
    pub fn collapse_or_leave(&mut self) {
        let Some(id) = self.tree.active() else {
            return;
        };
        let node = self.tree.node(id);
        if node.expanded && node.is_branch() {
            self.set_expanded(id, false);
        } else if let Some(parent) = self.tree.parent(id).filter(|p| *p != self.tree.root()) {
            self.activate(parent);
        }
    }

    pub fn set_all_expanded(&mut self, expanded: bool) {
        self.tree.set_all_expanded(expanded);
        self.follow_active = true;
    }

    pub fn toggle_selected(&mut self) {
        if let Some(id) = self.tree.active() {
            let selected = self.tree.node(id).selected;
            self.tree.set_selected(id, !selected);
        }
    }

    // ── Navigation ──────────────────────────────────────────────────────────

    fn activate(&mut self, id: NodeId) {
        self.tree.set_active(Some(id));
        self.follow_active = true;
    }

    /// Move the active row by `steps` visible rows, stopping at either end.
    pub fn move_active(&mut self, steps: isize) {
        let Some(mut target) = self.tree.active() else {
            if let Some(first) = self.tree.first_row(false) {
                self.activate(first);
            }
            return;
        };
        for _ in 0..steps.unsigned_abs() {
            let next = if steps > 0 {
                self.tree.next_row(target, false)
            } else {
                self.tree.prev_row(target, false)
            };
            match next {
                Some(id) => target = id,
                None => break,
            }
        }
        self.activate(target);
    }

    pub fn select_next(&mut self) {
        self.move_active(1);
    }

    pub fn select_prev(&mut self) {
        self.move_active(-1);
    }

    fn page_rows(&self) -> isize {
        (self.viewport.height() / self.viewport.row_height()).max(1) as isize
    }

    pub fn page_down(&mut self) {
        self.move_active(self.page_rows());
    }

    pub fn page_up(&mut self) {
        self.move_active(-self.page_rows());
    }

    pub fn select_first(&mut self) {
        if let Some(id) = self.tree.first_row(false) {
            self.activate(id);
        }
    }

    pub fn select_last(&mut self) {
        if let Some(id) = self.tree.last_row(false) {
            self.activate(id);
        }
    }

    /// Wheel scrolling moves the window, not the active row.
    pub fn scroll(&mut self, rows: isize) {
        self.viewport.scroll_by(rows);
    }

    /// Handle a left click at terminal coordinates.
    pub fn click(&mut self, column: u16, row: u16) {
        let area = self.tree_area;
        if column < area.x || row < area.y || column >= area.x + area.width || row >= area.y + area.height {
            return;
        }
        let Some(id) = self.viewport.node_at((row - area.y) as usize) else {
            return;
        };
        let node = self.tree.node(id);
        let expander_x = area.x as usize + 2 * node.depth.saturating_sub(1);
        let on_expander = (expander_x..expander_x + 2).contains(&(column as usize));
        if on_expander && self.tree.shows_expander(id) {
            let expanded = node.expanded;
            self.set_expanded(id, !expanded);
        }
        self.activate(id);
    }

    // ── Filtering ───────────────────────────────────────────────────────────

    pub fn start_filter_input(&mut self) {
        self.filter_input.editing = true;
        self.filter_input.end();
    }

    /// The query changed; apply once typing pauses.
    pub fn filter_input_changed(&mut self) {
        self.filter_deadline = Some(Instant::now() + self.debounce);
    }

    pub fn commit_filter_input(&mut self) {
        self.filter_input.editing = false;
        self.apply_current_filter();
    }

    pub fn cancel_filter_input(&mut self) {
        self.filter_input.editing = false;
        self.clear_filter();
    }

    pub fn is_filter_pending(&self) -> bool {
        self.filter_deadline.is_some()
    }

    /// Apply the typed query now. An empty query clears the filter.
    pub fn apply_current_filter(&mut self) {
        self.filter_deadline = None;
        if self.filter_input.is_empty() {
            if self.tree.is_filter_active() {
                self.tree.clear_filter();
            }
            return;
        }
        let predicate = Predicate::Text(self.filter_input.query.clone());
        self.tree
            .apply_filter(predicate, self.branch_mode, self.filter_options.clone());
        self.follow_active = true;
    }

    pub fn clear_filter(&mut self) {
        self.filter_input.clear();
        self.filter_deadline = None;
        self.tree.clear_filter();
        self.follow_active = true;
    }

    /// Re-run the last filter against the current data.
    pub fn update_filter(&mut self) {
        match self.tree.update_filter() {
            Some(matches) => self.set_status_message(format!("Filter reapplied: {matches} matches")),
            None if self.tree.is_filter_active() => {
                self.set_status_message("Automatic filter reapply is off".to_string())
            }
            None => self.set_status_message("No active filter".to_string()),
        }
    }

    fn reapply_with(&mut self, message: String) {
        if !self.filter_input.is_empty() {
            self.apply_current_filter();
        }
        self.set_status_message(message);
    }

    fn on_off(flag: bool) -> &'static str {
        if flag {
            "on"
        } else {
            "off"
        }
    }

    pub fn toggle_filter_mode(&mut self) {
        self.filter_options.mode = self.filter_options.mode.toggled();
        self.reapply_with(format!("Filter mode: {}", self.filter_options.mode));
    }

    pub fn toggle_fuzzy(&mut self) {
        self.filter_options.fuzzy = !self.filter_options.fuzzy;
        self.reapply_with(format!("Fuzzy matching {}", Self::on_off(self.filter_options.fuzzy)));
    }

    pub fn toggle_branch_mode(&mut self) {
        self.branch_mode = !self.branch_mode;
        self.reapply_with(format!("Branch mode {}", Self::on_off(self.branch_mode)));
    }

    pub fn toggle_leaves_only(&mut self) {
        self.filter_options.leaves_only = !self.filter_options.leaves_only;
        self.reapply_with(format!("Leaves only {}", Self::on_off(self.filter_options.leaves_only)));
    }

    pub fn toggle_hide_expanders(&mut self) {
        self.filter_options.hide_expanders = !self.filter_options.hide_expanders;
        self.reapply_with(format!(
            "Hide expanders {}",
            Self::on_off(self.filter_options.hide_expanders)
        ));
    }

    pub fn toggle_counter(&mut self) {
        self.filter_options.counter = !self.filter_options.counter;
        self.reapply_with(format!("Match counters {}", Self::on_off(self.filter_options.counter)));
    }

    // ── Periodic work ───────────────────────────────────────────────────────

    pub fn on_tick(&mut self) {
        self.tick_at(Instant::now());
    }

    pub(crate) fn tick_at(&mut self, now: Instant) {
        if self.filter_deadline.is_some_and(|deadline| now >= deadline) {
            self.apply_current_filter();
        }
        self.clear_expired_status();
    }

    /// Log tree notifications; filter runs and structural changes may move
    /// the active row.
    pub fn handle_tree_events(&mut self) {
        for event in self.tree.drain_events() {
            match event {
                TreeEvent::FilterApplied { matches } => {
                    debug!("filter applied: {matches} matches");
                    self.follow_active = true;
                }
                TreeEvent::FilterCleared => debug!("filter cleared"),
                TreeEvent::StructureChanged { reason } => debug!("structure changed: {reason}"),
                TreeEvent::StatusChanged { .. } | TreeEvent::ActiveChanged { .. } => {}
            }
        }
    }

    /// Bring the viewport up to date before drawing.
    ///
    /// If the active node lost its row (collapsed away or filtered out) the
    /// nearest visible ancestor, or the first row, becomes active.
    pub fn sync_viewport(&mut self) {
        self.handle_tree_events();
        self.viewport.flush(&mut self.tree);
        if let Some(active) = self.tree.active() {
            if self.tree.row_index(active).is_none() {
                let replacement = self.nearest_visible(active);
                self.tree.set_active(replacement);
                self.follow_active = true;
                self.viewport.flush(&mut self.tree);
            }
        }
        if std::mem::take(&mut self.follow_active) {
            if let Some(row) = self.tree.active().and_then(|id| self.tree.row_index(id)) {
                self.viewport.scroll_row_into_view(row);
            }
        }
        self.viewport.flush(&mut self.tree);
    }

    fn nearest_visible(&self, id: NodeId) -> Option<NodeId> {
        let mut current = self.tree.parent(id);
        while let Some(ancestor) = current {
            if self.tree.row_index(ancestor).is_some() {
                return Some(ancestor);
            }
            current = self.tree.parent(ancestor);
        }
        self.tree.first_row(false)
    }

    // ── Status line ─────────────────────────────────────────────────────────

    pub fn set_status_message(&mut self, msg: String) {
        self.status_message = Some((msg, Instant::now()));
        self.status_is_error = false;
    }

    pub fn set_error_message(&mut self, msg: String) {
        self.status_message = Some((msg, Instant::now()));
        self.status_is_error = true;
    }

    /// Clear the status message once it has been displayed long enough.
    pub fn clear_expired_status(&mut self) {
        if let Some((_, ref created)) = self.status_message {
            if created.elapsed() > STATUS_TTL {
                self.status_message = None;
                self.status_is_error = false;
            }
        }
    }
}
