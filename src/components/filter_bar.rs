use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::Widget,
};

use crate::app::FilterInput;
use crate::theme::ThemeColors;
use crate::tree::filter::FilterOptions;

/// One-line filter input with the active filter settings on the right.
pub struct FilterBarWidget<'a> {
    input: &'a FilterInput,
    options: &'a FilterOptions,
    theme: &'a ThemeColors,
    branch_mode: bool,
    matches: Option<usize>,
}

impl<'a> FilterBarWidget<'a> {
    pub fn new(input: &'a FilterInput, options: &'a FilterOptions, theme: &'a ThemeColors) -> Self {
        Self {
            input,
            options,
            theme,
            branch_mode: false,
            matches: None,
        }
    }

    pub fn branch_mode(mut self, branch_mode: bool) -> Self {
        self.branch_mode = branch_mode;
        self
    }

    /// Match count of the active filter; `None` when no filter is applied.
    pub fn matches(mut self, matches: Option<usize>) -> Self {
        self.matches = matches;
        self
    }

    fn settings(&self) -> String {
        let mut flags = vec![self.options.mode.to_string()];
        if self.options.fuzzy {
            flags.push("fuzzy".to_string());
        }
        if self.branch_mode {
            flags.push("branch".to_string());
        }
        if self.options.leaves_only {
            flags.push("leaves".to_string());
        }
        let mut text = format!("[{}]", flags.join("|"));
        if let Some(count) = self.matches {
            text.push_str(&format!(" {} match{}", count, if count == 1 { "" } else { "es" }));
        }
        text.push(' ');
        text
    }
}

impl<'a> Widget for FilterBarWidget<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.height == 0 || area.width == 0 {
            return;
        }
        buf.set_style(area, Style::default().bg(self.theme.filter_bg));

        let prompt_style = Style::default()
            .fg(self.theme.accent_fg)
            .add_modifier(Modifier::BOLD);
        let input_style = Style::default().fg(self.theme.tree_fg);
        let hint_style = Style::default()
            .fg(self.theme.dim_fg)
            .add_modifier(Modifier::DIM);

        let mut spans = vec![Span::styled(" / ", prompt_style)];
        if self.input.editing {
            let (before, under, after) = self.input.split();
            let cursor_style = Style::default()
                .bg(self.theme.tree_fg)
                .fg(self.theme.status_bg)
                .add_modifier(Modifier::BOLD);
            spans.push(Span::styled(before, input_style));
            spans.push(Span::styled(under.map_or(" ".to_string(), String::from), cursor_style));
            spans.push(Span::styled(after, input_style));
        } else if self.input.is_empty() {
            spans.push(Span::styled("press / to filter", hint_style));
        } else {
            spans.push(Span::styled(self.input.query.as_str(), input_style));
        }
        buf.set_line(area.x, area.y, &Line::from(spans), area.width);

        let settings = self.settings();
        let width = settings.chars().count() as u16;
        if width < area.width {
            let style = match self.matches {
                Some(0) => Style::default().fg(self.theme.warning_fg),
                Some(_) => Style::default().fg(self.theme.info_fg),
                None => hint_style,
            };
            buf.set_line(
                area.x + area.width - width,
                area.y,
                &Line::from(Span::styled(settings, style)),
                width,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::theme;
    use crate::tree::filter::FilterMode;

    fn buffer_to_string(buf: &Buffer, area: Rect) -> String {
        let mut s = String::new();
        for y in area.y..area.y + area.height {
            for x in area.x..area.x + area.width {
                s.push_str(buf.cell((x, y)).unwrap().symbol());
            }
            s.push('\n');
        }
        s
    }

    fn render(widget: FilterBarWidget, width: u16) -> (Buffer, String) {
        let area = Rect::new(0, 0, width, 1);
        let mut buf = Buffer::empty(area);
        widget.render(area, &mut buf);
        let content = buffer_to_string(&buf, area);
        (buf, content)
    }

    #[test]
    fn test_idle_bar_shows_hint() {
        let tc = theme::dark_theme();
        let input = FilterInput::default();
        let options = FilterOptions::default();
        let (_, content) = render(FilterBarWidget::new(&input, &options, &tc), 60);
        assert!(content.contains("press / to filter"));
        assert!(content.contains("[hide]"));
    }

    #[test]
    fn test_editing_shows_cursor() {
        let tc = theme::dark_theme();
        let input = FilterInput {
            query: "abc".to_string(),
            cursor: 1,
            editing: true,
        };
        let options = FilterOptions::default();
        let (buf, content) = render(FilterBarWidget::new(&input, &options, &tc), 60);
        assert!(content.starts_with(" / abc"));
        // Cursor sits on "b".
        assert_eq!(buf.cell((4, 0)).unwrap().bg, tc.tree_fg);
        assert_ne!(buf.cell((3, 0)).unwrap().bg, tc.tree_fg);
    }

    #[test]
    fn test_settings_and_match_count() {
        let tc = theme::dark_theme();
        let input = FilterInput {
            query: "x".to_string(),
            cursor: 1,
            editing: false,
        };
        let options = FilterOptions {
            mode: FilterMode::Dim,
            fuzzy: true,
            ..FilterOptions::default()
        };
        let widget = FilterBarWidget::new(&input, &options, &tc)
            .branch_mode(true)
            .matches(Some(1));
        let (_, content) = render(widget, 60);
        assert!(content.contains("[dim|fuzzy|branch] 1 match "));
    }

    #[test]
    fn test_zero_matches_use_warning_color() {
        let tc = theme::dark_theme();
        let input = FilterInput::default();
        let options = FilterOptions::default();
        let widget = FilterBarWidget::new(&input, &options, &tc).matches(Some(0));
        let (buf, content) = render(widget, 40);
        assert!(content.contains("0 matches"));
        assert_eq!(buf.cell((38, 0)).unwrap().fg, tc.warning_fg);
    }

    #[test]
    fn test_zero_area_does_not_panic() {
        let tc = theme::dark_theme();
        let input = FilterInput::default();
        let options = FilterOptions::default();
        let area = Rect::new(0, 0, 0, 0);
        let mut buf = Buffer::empty(area);
        FilterBarWidget::new(&input, &options, &tc).render(area, &mut buf);
    }
}
