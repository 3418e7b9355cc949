use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::Widget,
};

use crate::theme::ThemeColors;

/// Status bar widget: data source, tree info and key hints, or a transient
/// status message.
pub struct StatusBarWidget<'a> {
    source: &'a str,
    tree_info: &'a str,
    theme: &'a ThemeColors,
    status_message: Option<&'a str>,
    is_error: bool,
}

impl<'a> StatusBarWidget<'a> {
    pub fn new(source: &'a str, tree_info: &'a str, theme: &'a ThemeColors) -> Self {
        Self {
            source,
            tree_info,
            theme,
            status_message: None,
            is_error: false,
        }
    }

    pub fn status_message(mut self, msg: &'a str, is_error: bool) -> Self {
        self.status_message = Some(msg);
        self.is_error = is_error;
        self
    }
}

/// Keep the last `budget` chars of `text`, marking the cut with "...".
fn truncate_front(text: &str, budget: usize) -> String {
    let len = text.chars().count();
    if len <= budget {
        return text.to_string();
    }
    if budget <= 3 {
        return text.chars().take(budget).collect();
    }
    let tail: String = text.chars().skip(len - (budget - 3)).collect();
    format!("...{tail}")
}

impl<'a> Widget for StatusBarWidget<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.height == 0 || area.width == 0 {
            return;
        }

        let width = area.width as usize;
        buf.set_style(area, Style::default().bg(self.theme.status_bg));

        if let Some(msg) = self.status_message {
            let style = if self.is_error {
                Style::default()
                    .bg(self.theme.error_fg)
                    .fg(self.theme.status_fg)
            } else {
                Style::default().fg(self.theme.success_fg)
            };
            let display: String = msg.chars().take(width).collect();
            let display = format!("{:<width$}", display, width = width);
            buf.set_line(area.x, area.y, &Line::from(Span::styled(display, style)), area.width);
            return;
        }

        // Normal bar: [source] [tree info] [key hints]
        let key_hints = " /:filter  m:mode  F:fuzzy  b:branch  q:quit ";
        let hints_len = key_hints.chars().count();
        let info_len = self.tree_info.chars().count();
        let remaining = width.saturating_sub(hints_len);
        let source_budget = remaining.saturating_sub(info_len).saturating_sub(1);
        let source_display = truncate_front(self.source, source_budget);
        let info_display = truncate_front(
            self.tree_info,
            remaining.saturating_sub(source_display.chars().count()),
        );
        let gap = remaining
            .saturating_sub(source_display.chars().count())
            .saturating_sub(info_display.chars().count());

        let mut spans = vec![
            Span::styled(source_display, Style::default().fg(self.theme.status_fg)),
            Span::raw(" ".repeat(gap)),
            Span::styled(info_display, Style::default().fg(self.theme.info_fg)),
        ];
        if width > hints_len {
            spans.push(Span::styled(
                key_hints,
                Style::default()
                    .fg(self.theme.dim_fg)
                    .add_modifier(Modifier::DIM),
            ));
        }
        buf.set_line(area.x, area.y, &Line::from(spans), area.width);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::theme;
    use ratatui::style::Color;

    fn test_theme() -> ThemeColors {
        theme::dark_theme()
    }

    fn row(buf: &Buffer, width: u16) -> String {
        (0..width)
            .map(|x| buf.cell((x, 0)).unwrap().symbol().to_string())
            .collect()
    }

    #[test]
    fn test_basic_widget_creation() {
        let tc = test_theme();
        let widget = StatusBarWidget::new("data/tree.json", "12 nodes | 4 rows", &tc);
        assert_eq!(widget.source, "data/tree.json");
        assert_eq!(widget.tree_info, "12 nodes | 4 rows");
        assert!(widget.status_message.is_none());
        assert!(!widget.is_error);
    }

    #[test]
    fn test_status_message_success() {
        let tc = test_theme();
        let widget =
            StatusBarWidget::new("src", "info", &tc).status_message("Loaded 12 nodes", false);

        let area = Rect::new(0, 0, 80, 1);
        let mut buf = Buffer::empty(area);
        widget.render(area, &mut buf);

        assert!(row(&buf, 80).contains("Loaded 12 nodes"));
        let cell = buf.cell((0, 0)).unwrap();
        assert_eq!(cell.fg, Color::Rgb(166, 227, 161));
    }

    #[test]
    fn test_status_message_error() {
        let tc = test_theme();
        let widget = StatusBarWidget::new("src", "info", &tc)
            .status_message("✗ Load failed: offline", true);

        let area = Rect::new(0, 0, 80, 1);
        let mut buf = Buffer::empty(area);
        widget.render(area, &mut buf);

        assert!(row(&buf, 80).contains("Load failed: offline"));
        let cell = buf.cell((0, 0)).unwrap();
        assert_eq!(cell.bg, Color::Rgb(243, 139, 168));
        assert_eq!(cell.fg, Color::Rgb(205, 214, 244));
    }

    #[test]
    fn test_normal_bar_rendering() {
        let tc = test_theme();
        let widget = StatusBarWidget::new("generated 4x3", "84 nodes | 4 rows", &tc);

        let area = Rect::new(0, 0, 100, 1);
        let mut buf = Buffer::empty(area);
        widget.render(area, &mut buf);

        let content = row(&buf, 100);
        assert!(content.starts_with("generated 4x3"));
        assert!(content.contains("84 nodes | 4 rows"));
        assert!(content.contains("/:filter"));
        assert!(content.contains("q:quit"));
    }

    #[test]
    fn test_long_source_is_truncated_from_front() {
        assert_eq!(truncate_front("/very/long/path/tree.json", 12), "...tree.json");
        assert_eq!(truncate_front("short", 12), "short");
        assert_eq!(truncate_front("abcdef", 2), "ab");
    }

    #[test]
    fn test_zero_area_does_not_panic() {
        let tc = test_theme();
        let widget = StatusBarWidget::new("src", "info", &tc);
        let area = Rect::new(0, 0, 0, 0);
        let mut buf = Buffer::empty(area);
        widget.render(area, &mut buf);
    }
}
