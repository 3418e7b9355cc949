use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::Style,
    widgets::{Block, Borders},
    Frame,
};

use crate::app::App;
use crate::components::filter_bar::FilterBarWidget;
use crate::components::status_bar::StatusBarWidget;
use crate::components::tree::TreeWidget;

/// Split the frame into tree pane, filter bar and status bar.
fn layout(area: Rect) -> (Rect, Rect, Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(area);
    (chunks[0], chunks[1], chunks[2])
}

/// Render the application UI.
pub fn render(app: &mut App, frame: &mut Frame) {
    let (tree_area, filter_area, status_area) = layout(frame.area());

    let border_fg = if app.filter_input.editing {
        app.theme.border_fg
    } else {
        app.theme.border_focused_fg
    };
    let title = match app.tree.active() {
        Some(id) => format!(" {} ", app.tree.node(id).key),
        None => " vtree ".to_string(),
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_fg))
        .style(Style::default().bg(app.theme.tree_bg).fg(app.theme.tree_fg));

    // The viewport is sized to the pane before numbering rows for this frame.
    let inner = block.inner(tree_area);
    app.tree_area = inner;
    app.viewport.resize(inner.height as usize);
    app.sync_viewport();

    frame.render_widget(TreeWidget::new(&app.viewport).block(block), tree_area);

    let matches = app
        .tree
        .is_filter_active()
        .then(|| app.tree.last_match_count());
    let filter_bar = FilterBarWidget::new(&app.filter_input, &app.filter_options, &app.theme)
        .branch_mode(app.branch_mode)
        .matches(matches);
    frame.render_widget(filter_bar, filter_area);

    let source = app.source_label();
    let row_info = match app.tree.active().and_then(|id| app.tree.row_index(id)) {
        Some(row) => format!(
            "row {}/{} | {} nodes",
            row + 1,
            app.viewport.visible_row_count(),
            app.tree.len()
        ),
        None => format!(
            "{} rows | {} nodes",
            app.viewport.visible_row_count(),
            app.tree.len()
        ),
    };
    let mut status_bar = StatusBarWidget::new(&source, &row_info, &app.theme);
    if let Some((msg, _)) = &app.status_message {
        status_bar = status_bar.status_message(msg, app.status_is_error);
    }
    frame.render_widget(status_bar, status_area);
}
