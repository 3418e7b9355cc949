use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Widget},
};

use crate::theme::ThemeColors;
use crate::tree::highlight::markup_segments;
use crate::tree::viewport::{SurfaceFactory, Viewport};
use crate::tree::{NodeId, StatusNodeType, Tree};

/// Rendered content of one tree row.
#[derive(Debug, Clone, PartialEq)]
pub struct RowLine {
    pub line: Line<'static>,
    pub active: bool,
}

impl RowLine {
    /// Plain text of the row, without styling.
    pub fn text(&self) -> String {
        self.line.spans.iter().map(|s| s.content.as_ref()).collect()
    }
}

/// Builds styled row lines for the viewport.
pub struct LineFactory {
    theme: ThemeColors,
}

impl LineFactory {
    pub fn new(theme: ThemeColors) -> Self {
        Self { theme }
    }

    pub fn theme(&self) -> &ThemeColors {
        &self.theme
    }

    fn expander(tree: &Tree, id: NodeId) -> &'static str {
        let node = tree.node(id);
        if !tree.shows_expander(id) {
            "  "
        } else if node.is_loading() {
            "◌ "
        } else if node.expanded {
            "▾ "
        } else {
            "▸ "
        }
    }

    fn build(&self, tree: &Tree, id: NodeId) -> RowLine {
        let node = tree.node(id);
        let theme = &self.theme;
        let active = tree.active() == Some(id);

        let mut spans = vec![Span::raw("  ".repeat(node.depth.saturating_sub(1)))];

        if let Some(status) = node.status {
            let fg = match status {
                StatusNodeType::Loading => theme.info_fg,
                StatusNodeType::Error => theme.error_fg,
                StatusNodeType::NoData => theme.dim_fg,
            };
            spans.push(Span::raw("  "));
            spans.push(Span::styled(
                node.title.clone(),
                Style::default().fg(fg).add_modifier(Modifier::ITALIC),
            ));
            return RowLine {
                line: Line::from(spans),
                active,
            };
        }

        let dimmed = tree.is_dimmed(id);
        let base = if dimmed {
            Style::default().fg(theme.tree_dim_fg)
        } else if node.is_branch() {
            Style::default()
                .fg(theme.tree_branch_fg)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(theme.tree_leaf_fg)
        };
        let mark = Style::default().bg(theme.match_bg).fg(theme.match_fg);

        spans.push(Span::styled(
            Self::expander(tree, id),
            Style::default().fg(theme.tree_guide_fg),
        ));
        if node.selected {
            spans.push(Span::styled("● ", Style::default().fg(theme.accent_fg)));
        }

        match node.title_with_highlight() {
            Some(markup) => {
                for segment in markup_segments(markup) {
                    let style = if segment.highlighted { mark } else { base };
                    spans.push(Span::styled(segment.text, style));
                }
            }
            None if tree.escape_titles() => spans.push(Span::styled(node.title.clone(), base)),
            None => {
                for segment in markup_segments(&node.title) {
                    spans.push(Span::styled(segment.text, base));
                }
            }
        }

        if let Some(count) = tree.counter_badge(id) {
            spans.push(Span::styled(
                format!(" ({count})"),
                Style::default().fg(theme.counter_fg),
            ));
        }

        let mut line = Line::from(spans);
        if active {
            line.style = Style::default()
                .bg(theme.tree_selected_bg)
                .add_modifier(Modifier::BOLD);
        }
        RowLine { line, active }
    }
}

impl SurfaceFactory for LineFactory {
    type Surface = RowLine;

    fn create(&mut self, tree: &Tree, id: NodeId, _row: usize) -> RowLine {
        self.build(tree, id)
    }

    fn update(&mut self, tree: &Tree, id: NodeId, _row: usize, surface: &mut RowLine) {
        *surface = self.build(tree, id);
    }
}

/// Draws the rows the viewport currently holds surfaces for.
pub struct TreeWidget<'a> {
    viewport: &'a Viewport<LineFactory>,
    block: Option<Block<'a>>,
}

impl<'a> TreeWidget<'a> {
    pub fn new(viewport: &'a Viewport<LineFactory>) -> Self {
        Self {
            viewport,
            block: None,
        }
    }

    pub fn block(mut self, block: Block<'a>) -> Self {
        self.block = block.into();
        self
    }
}

impl<'a> Widget for TreeWidget<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let inner_area = if let Some(block) = &self.block {
            let inner = block.inner(area);
            block.clone().render(area, buf);
            inner
        } else {
            area
        };
        if inner_area.height == 0 || inner_area.width == 0 {
            return;
        }

        let theme = self.viewport.factory().theme();
        let scroll_top = self.viewport.scroll_top();
        let row_height = self.viewport.row_height();
        let visible_height = inner_area.height as usize;

        for (row, _, surface) in self.viewport.surfaces() {
            // Rows above the window (prefetched or partly scrolled) are skipped.
            let Some(offset) = (row * row_height).checked_sub(scroll_top) else {
                continue;
            };
            if offset >= visible_height {
                continue;
            }
            let y = inner_area.y + offset as u16;
            if surface.active {
                let lines = row_height.min(visible_height - offset) as u16;
                buf.set_style(
                    Rect::new(inner_area.x, y, inner_area.width, lines),
                    Style::default()
                        .bg(theme.tree_selected_bg)
                        .fg(theme.tree_selected_fg),
                );
            }
            buf.set_line(inner_area.x, y, &surface.line, inner_area.width);
        }
    }
}
