//! Filter engine: evaluates a predicate against every node, propagates
//! match counts to ancestors, auto-expands matched branches, and produces
//! highlighted titles.

use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use log::{debug, warn};

use super::highlight::{
    extract_html_text, find_literal, finish_markup, fuzzy_indices, fuzzy_match, mark_fuzzy,
    mark_literal, strip_sentinels,
};
use super::node::Node;
use super::traverse::VisitControl;
use super::{NodeId, StatusNodeType, Tree, TreeEvent, NO_DATA_KEY};

/// How unmatched nodes are presented while a filter is active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FilterMode {
    /// Unmatched nodes without matching descendants are removed from the rows.
    #[default]
    Hide,
    /// Every node stays a row; unmatched ones are drawn dimmed.
    Dim,
}

impl FilterMode {
    pub fn toggled(self) -> Self {
        match self {
            FilterMode::Hide => FilterMode::Dim,
            FilterMode::Dim => FilterMode::Hide,
        }
    }
}

impl FromStr for FilterMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hide" => Ok(FilterMode::Hide),
            "dim" | "dimm" => Ok(FilterMode::Dim),
            other => Err(format!("unknown filter mode '{other}' (expected hide or dim)")),
        }
    }
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterMode::Hide => write!(f, "hide"),
            FilterMode::Dim => write!(f, "dim"),
        }
    }
}

/// Options for a single filter application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterOptions {
    pub mode: FilterMode,
    pub fuzzy: bool,
    /// Only evaluate nodes without loaded children. Ignored in branch mode.
    pub leaves_only: bool,
    /// Expand collapsed ancestors of direct matches.
    pub auto_expand: bool,
    pub highlight: bool,
    /// Hide the expander of branches whose children are all filtered out.
    pub hide_expanders: bool,
    /// Show a "no data" status row when nothing matched in hide mode.
    pub no_data: bool,
    /// Reapply the filter when new data arrives.
    pub auto_apply: bool,
    /// Show sub-match counts on branch rows.
    pub counter: bool,
    /// Only show counts on collapsed rows.
    pub hide_expanded_counter: bool,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            mode: FilterMode::Hide,
            fuzzy: false,
            leaves_only: false,
            auto_expand: false,
            highlight: true,
            hide_expanders: false,
            no_data: true,
            auto_apply: true,
            counter: true,
            hide_expanded_counter: true,
        }
    }
}

/// Outcome of a custom predicate for one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchResult {
    NoMatch,
    Match,
    /// Match, and descendants inherit it.
    Branch,
    /// Exclude this node and its whole subtree.
    Skip,
}

impl From<bool> for MatchResult {
    fn from(matched: bool) -> Self {
        if matched {
            MatchResult::Match
        } else {
            MatchResult::NoMatch
        }
    }
}

/// What a filter tests nodes with.
#[derive(Clone)]
pub enum Predicate {
    /// Literal or fuzzy text, depending on `FilterOptions::fuzzy`.
    Text(String),
    Custom(Rc<dyn Fn(&Node) -> MatchResult>),
}

impl Predicate {
    pub fn custom(f: impl Fn(&Node) -> MatchResult + 'static) -> Self {
        Predicate::Custom(Rc::new(f))
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Predicate::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl From<&str> for Predicate {
    fn from(text: &str) -> Self {
        Predicate::Text(text.to_string())
    }
}

impl From<String> for Predicate {
    fn from(text: String) -> Self {
        Predicate::Text(text)
    }
}

/// Container-level presentation switches while a filter is active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StyleHooks {
    pub mode: Option<FilterMode>,
    pub hide_expanders: bool,
}

#[derive(Debug, Clone)]
struct FilterArgs {
    predicate: Predicate,
    branch_mode: bool,
    options: FilterOptions,
}

/// Filter state held by the tree.
#[derive(Debug, Default)]
pub(crate) struct FilterContext {
    pub(crate) mode: Option<FilterMode>,
    pub(crate) options: FilterOptions,
    last_args: Option<FilterArgs>,
    match_count: usize,
}

impl FilterContext {
    pub(crate) fn is_active(&self) -> bool {
        self.mode.is_some()
    }

    pub(crate) fn hides_unmatched(&self) -> bool {
        self.mode == Some(FilterMode::Hide)
    }
}

/// A predicate prepared for evaluation.
enum Matcher {
    Literal(String),
    Fuzzy(String),
    Custom(Rc<dyn Fn(&Node) -> MatchResult>),
}

impl Matcher {
    fn compile(predicate: &Predicate, fuzzy: bool) -> Self {
        match predicate {
            Predicate::Text(text) if fuzzy => Matcher::Fuzzy(text.clone()),
            Predicate::Text(text) => Matcher::Literal(text.clone()),
            Predicate::Custom(f) => Matcher::Custom(Rc::clone(f)),
        }
    }

    /// Evaluate `node`; text matches also return highlight markup when asked.
    fn evaluate(&self, node: &Node, escape_titles: bool, highlight: bool) -> (MatchResult, Option<String>) {
        let text = || {
            let text = if escape_titles {
                node.title.clone()
            } else {
                extract_html_text(&node.title)
            };
            strip_sentinels(&text)
        };
        match self {
            Matcher::Custom(f) => (f(node), None),
            Matcher::Literal(query) => {
                let text = text();
                if find_literal(&text, query).is_empty() {
                    return (MatchResult::NoMatch, None);
                }
                let markup = highlight.then(|| finish_markup(&mark_literal(&text, query)));
                (MatchResult::Match, markup)
            }
            Matcher::Fuzzy(query) => {
                let text = text();
                match fuzzy_match(&text, query) {
                    Some(gaps) => {
                        let markup = highlight
                            .then(|| finish_markup(&mark_fuzzy(&text, &fuzzy_indices(&gaps))));
                        (MatchResult::Match, markup)
                    }
                    None => (MatchResult::NoMatch, None),
                }
            }
        }
    }
}

impl Tree {
    /// Filter the tree, replacing any previous filter state.
    ///
    /// Empty text clears the filter instead. Returns the number of direct
    /// matches; nodes matched by inheritance in branch mode are not counted.
    pub fn apply_filter(&mut self, predicate: Predicate, branch_mode: bool, options: FilterOptions) -> usize {
        if matches!(&predicate, Predicate::Text(text) if text.is_empty()) {
            warn!("empty filter text, clearing filter");
            self.clear_filter();
            return 0;
        }

        let previous = self.suspend_render();
        let leaves_only = options.leaves_only && !branch_mode;
        let matcher = Matcher::compile(&predicate, options.fuzzy);
        let escape_titles = self.escape_titles;
        self.filter.mode = Some(options.mode);
        self.filter.options = options.clone();
        self.filter.last_args = Some(FilterArgs {
            predicate,
            branch_mode,
            options: options.clone(),
        });
        self.remove_no_data();

        for node in self.nodes.values_mut() {
            if node.filter.matched.is_some()
                || node.filter.sub_match_count > 0
                || node.filter.title_with_highlight.is_some()
            {
                node.filter.matched = None;
                node.filter.sub_match_count = 0;
                node.filter.title_with_highlight = None;
                node.touch();
            }
        }

        let root = self.root();
        let mut count = 0;
        // Matched nodes whose descendants inherit the match.
        let mut spreading: HashSet<NodeId> = HashSet::new();
        self.visit_top_down(root, true, |tree, id| {
            let node = tree.node(id);
            let is_branch = node.children.ids().iter().any(|c| !tree.node(*c).is_status());
            if node.is_status() || (leaves_only && is_branch) {
                return VisitControl::Continue;
            }
            let (result, markup) = matcher.evaluate(node, escape_titles, options.highlight);
            if result == MatchResult::Skip {
                tree.visit_subtree(id, true, |tree, id| {
                    tree.node_mut(id).filter.matched = Some(false);
                    VisitControl::Continue
                });
                return VisitControl::Skip;
            }
            let parent_matched = node.parent.is_some_and(|p| tree.node(p).matched());
            let parent_spreads = node.parent.is_some_and(|p| spreading.contains(&p));
            let inherited = parent_matched
                && (branch_mode || parent_spreads || result == MatchResult::Branch);
            let matched = inherited || matches!(result, MatchResult::Match | MatchResult::Branch);
            if matched && (result == MatchResult::Branch || (inherited && parent_spreads)) {
                spreading.insert(id);
            }

            let node = tree.node_mut(id);
            node.filter.matched = Some(matched);
            node.filter.title_with_highlight = if matched { markup } else { None };
            node.touch();
            if !matched {
                return VisitControl::Continue;
            }
            if !inherited {
                count += 1;
            }
            let expand = options.auto_expand && !inherited;
            tree.visit_ancestors(id, false, |tree, ancestor| {
                let node = tree.node_mut(ancestor);
                node.filter.sub_match_count += 1;
                node.touch();
                if expand {
                    tree.auto_expand(ancestor);
                }
                VisitControl::Continue
            });
            VisitControl::Continue
        });

        if count == 0 && options.mode == FilterMode::Hide && options.no_data {
            self.set_status(root, Some((StatusNodeType::NoData, String::new())));
        }
        self.filter.match_count = count;
        self.bump_style_epoch();
        self.emit(TreeEvent::FilterApplied { matches: count });
        debug!("filter applied ({} mode): {count} matches", options.mode);
        self.resume_render(previous);
        self.structure_changed("apply_filter");
        count
    }

    /// Filter individual nodes.
    pub fn filter_nodes(&mut self, predicate: impl Into<Predicate>, options: FilterOptions) -> usize {
        self.apply_filter(predicate.into(), false, options)
    }

    /// Filter whole branches: descendants of a match match as well.
    pub fn filter_branches(&mut self, predicate: impl Into<Predicate>, options: FilterOptions) -> usize {
        self.apply_filter(predicate.into(), true, options)
    }

    /// Drop all filter state and collapse nodes the filter expanded, unless
    /// the user has expanded them since. Calling it again is a no-op.
    pub fn clear_filter(&mut self) {
        let previous = self.suspend_render();
        let was_active = self.filter.is_active();
        self.remove_no_data();
        for node in self.nodes.values_mut() {
            let mut changed = node.filter.matched.take().is_some();
            changed |= std::mem::take(&mut node.filter.sub_match_count) > 0;
            changed |= node.filter.title_with_highlight.take().is_some();
            if std::mem::take(&mut node.filter.auto_expanded) && node.expanded {
                node.expanded = false;
                changed = true;
            }
            if changed {
                node.touch();
            }
        }
        self.filter.mode = None;
        self.filter.last_args = None;
        self.filter.match_count = 0;
        self.resume_render(previous);
        if was_active {
            self.bump_style_epoch();
            self.emit(TreeEvent::FilterCleared);
            debug!("filter cleared");
            self.structure_changed("clear_filter");
        }
    }

    /// Reapply the last filter, e.g. after new data arrived.
    ///
    /// Returns `None` (with a warning) when no filter is active or automatic
    /// reapplication is disabled.
    pub fn update_filter(&mut self) -> Option<usize> {
        match &self.filter.last_args {
            Some(args) if self.filter.is_active() && args.options.auto_apply => {
                let args = args.clone();
                Some(self.apply_filter(args.predicate, args.branch_mode, args.options))
            }
            Some(_) if self.filter.is_active() => {
                warn!("update_filter: automatic reapply is disabled");
                None
            }
            _ => {
                warn!("update_filter: no filter active");
                None
            }
        }
    }

    pub fn is_filter_active(&self) -> bool {
        self.filter.is_active()
    }

    pub fn filter_mode(&self) -> Option<FilterMode> {
        self.filter.mode
    }

    pub fn filter_options(&self) -> &FilterOptions {
        &self.filter.options
    }

    /// Direct matches found by the last filter pass.
    pub fn last_match_count(&self) -> usize {
        self.filter.match_count
    }

    /// False only for nodes an active filter did not match.
    pub fn is_matched(&self, id: NodeId) -> bool {
        !self.filter.is_active() || self.node(id).matched()
    }

    /// Whether a row is drawn dimmed: unmatched, no matching descendants,
    /// and a dim filter active.
    pub fn is_dimmed(&self, id: NodeId) -> bool {
        let node = self.node(id);
        self.filter.mode == Some(FilterMode::Dim)
            && !node.is_status()
            && !node.matched()
            && node.sub_match_count() == 0
    }

    pub fn style_hooks(&self) -> StyleHooks {
        StyleHooks {
            mode: self.filter.mode,
            hide_expanders: self.filter.is_active() && self.filter.options.hide_expanders,
        }
    }

    /// Whether the row for `id` shows an expander under the current filter.
    pub fn shows_expander(&self, id: NodeId) -> bool {
        let node = self.node(id);
        if !node.is_branch() || node.is_status() {
            return false;
        }
        !(self.style_hooks().hide_expanders && node.sub_match_count() == 0)
    }

    /// Sub-match count to display next to the row, if any.
    pub fn counter_badge(&self, id: NodeId) -> Option<usize> {
        let options = &self.filter.options;
        let node = self.node(id);
        let shown = self.filter.is_active()
            && options.counter
            && node.sub_match_count() > 0
            && !(options.hide_expanded_counter && node.expanded);
        shown.then_some(node.sub_match_count())
    }

    fn remove_no_data(&mut self) {
        if let Some(id) = self.node_by_key(NO_DATA_KEY) {
            self.remove_node(id);
        }
    }
}
