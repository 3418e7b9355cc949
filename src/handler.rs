use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};

use crate::app::App;

/// Rows moved per mouse wheel notch.
const WHEEL_ROWS: isize = 3;

/// Handle a key event.
pub fn handle_key_event(app: &mut App, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.quit();
        return;
    }
    if app.filter_input.editing {
        handle_filter_input(app, key);
    } else {
        handle_normal(app, key);
    }
}

fn handle_filter_input(app: &mut App, key: KeyEvent) {
    let input = &mut app.filter_input;
    let changed = match key.code {
        KeyCode::Enter => {
            app.commit_filter_input();
            return;
        }
        KeyCode::Esc => {
            app.cancel_filter_input();
            return;
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            input.clear();
            true
        }
        KeyCode::Char(c) => {
            input.insert(c);
            true
        }
        KeyCode::Backspace => input.backspace(),
        KeyCode::Delete => input.delete(),
        KeyCode::Left => {
            input.move_left();
            false
        }
        KeyCode::Right => {
            input.move_right();
            false
        }
        KeyCode::Home => {
            input.home();
            false
        }
        KeyCode::End => {
            input.end();
            false
        }
        // Navigate results without leaving the input.
        KeyCode::Down => {
            app.select_next();
            false
        }
        KeyCode::Up => {
            app.select_prev();
            false
        }
        _ => false,
    };
    if changed {
        app.filter_input_changed();
    }
}

fn handle_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.quit(),

        // Navigation
        KeyCode::Char('j') | KeyCode::Down => app.select_next(),
        KeyCode::Char('k') | KeyCode::Up => app.select_prev(),
        KeyCode::PageDown => app.page_down(),
        KeyCode::PageUp => app.page_up(),
        KeyCode::Char('g') | KeyCode::Home => app.select_first(),
        KeyCode::Char('G') | KeyCode::End => app.select_last(),

        // Expansion
        KeyCode::Enter | KeyCode::Char(' ') => app.toggle_active(),
        KeyCode::Right => app.expand_or_enter(),
        KeyCode::Left => app.collapse_or_leave(),
        KeyCode::Char('*') => app.set_all_expanded(true),
        KeyCode::Char('-') => app.set_all_expanded(false),
        KeyCode::Char('x') => app.toggle_selected(),
        KeyCode::Char('R') => app.reload_active(),

        // Filtering
        KeyCode::Char('/') => app.start_filter_input(),
        KeyCode::Esc => app.clear_filter(),
        KeyCode::Char('r') => app.update_filter(),
        KeyCode::Char('m') => app.toggle_filter_mode(),
        KeyCode::Char('F') => app.toggle_fuzzy(),
        KeyCode::Char('b') => app.toggle_branch_mode(),
        KeyCode::Char('L') => app.toggle_leaves_only(),
        KeyCode::Char('e') => app.toggle_hide_expanders(),
        KeyCode::Char('c') => app.toggle_counter(),
        _ => {}
    }
}

/// Handle a mouse event.
pub fn handle_mouse_event(app: &mut App, mouse: MouseEvent) {
    match mouse.kind {
        MouseEventKind::ScrollDown => app.scroll(WHEEL_ROWS),
        MouseEventKind::ScrollUp => app.scroll(-WHEEL_ROWS),
        MouseEventKind::Down(MouseButton::Left) => app.click(mouse.column, mouse.row),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::tree::loader::SyntheticSource;
    use crate::tree::NodeData;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    /// App with `[fruits[apple, banana], veg]` already loaded.
    fn setup_app() -> App {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut app = App::new(
            &AppConfig::default(),
            Arc::new(SyntheticSource::new(1, 1, false)),
            tx,
        );
        let root = app.tree.root();
        app.tree
            .add_children(
                root,
                vec![
                    NodeData::new("fruits").with_key("fruits").with_children(vec![
                        NodeData::new("apple").with_key("apple"),
                        NodeData::new("banana").with_key("banana"),
                    ]),
                    NodeData::new("veg").with_key("veg"),
                ],
            )
            .unwrap();
        let first = app.tree.first_row(false);
        app.tree.set_active(first);
        app.viewport.resize(10);
        app.sync_viewport();
        app
    }

    fn active_key(app: &App) -> &str {
        &app.tree.node(app.tree.active().unwrap()).key
    }

    #[test]
    fn quit_keys() {
        let mut app = setup_app();
        handle_key_event(&mut app, key(KeyCode::Char('q')));
        assert!(app.should_quit);

        let mut app = setup_app();
        handle_key_event(&mut app, ctrl('c'));
        assert!(app.should_quit);
    }

    #[test]
    fn navigation_and_expansion_keys() {
        let mut app = setup_app();
        handle_key_event(&mut app, key(KeyCode::Char('j')));
        assert_eq!(active_key(&app), "veg");
        handle_key_event(&mut app, key(KeyCode::Char('k')));
        handle_key_event(&mut app, key(KeyCode::Right));
        assert!(app.tree.node(app.tree.active().unwrap()).expanded);
        handle_key_event(&mut app, key(KeyCode::Right));
        assert_eq!(active_key(&app), "apple");
        handle_key_event(&mut app, key(KeyCode::Char('G')));
        assert_eq!(active_key(&app), "veg");
        handle_key_event(&mut app, key(KeyCode::Char('-')));
        handle_key_event(&mut app, key(KeyCode::Char('g')));
        assert_eq!(active_key(&app), "fruits");
        assert!(!app.tree.node(app.tree.active().unwrap()).expanded);
    }

    #[test]
    fn typing_in_filter_mode_edits_query() {
        let mut app = setup_app();
        handle_key_event(&mut app, key(KeyCode::Char('/')));
        assert!(app.filter_input.editing);
        for c in "ban".chars() {
            handle_key_event(&mut app, key(KeyCode::Char(c)));
        }
        // 'q' is text while editing.
        handle_key_event(&mut app, key(KeyCode::Char('q')));
        assert!(!app.should_quit);
        handle_key_event(&mut app, key(KeyCode::Backspace));
        assert_eq!(app.filter_input.query, "ban");
        assert!(app.is_filter_pending());

        handle_key_event(&mut app, key(KeyCode::Enter));
        assert!(!app.filter_input.editing);
        assert!(app.tree.is_filter_active());
        assert_eq!(app.tree.last_match_count(), 1);

        handle_key_event(&mut app, key(KeyCode::Esc));
        assert!(!app.tree.is_filter_active());
        assert!(app.filter_input.is_empty());
    }

    #[test]
    fn ctrl_u_clears_query() {
        let mut app = setup_app();
        handle_key_event(&mut app, key(KeyCode::Char('/')));
        handle_key_event(&mut app, key(KeyCode::Char('a')));
        handle_key_event(&mut app, ctrl('u'));
        assert!(app.filter_input.is_empty());
        assert!(app.filter_input.editing);
    }

    #[test]
    fn toggle_keys_update_options() {
        let mut app = setup_app();
        handle_key_event(&mut app, key(KeyCode::Char('F')));
        assert!(app.filter_options.fuzzy);
        handle_key_event(&mut app, key(KeyCode::Char('b')));
        assert!(app.branch_mode);
        handle_key_event(&mut app, key(KeyCode::Char('L')));
        assert!(app.filter_options.leaves_only);
        handle_key_event(&mut app, key(KeyCode::Char('e')));
        assert!(app.filter_options.hide_expanders);
        handle_key_event(&mut app, key(KeyCode::Char('c')));
        assert!(!app.filter_options.counter);
    }

    #[test]
    fn select_key_marks_node() {
        let mut app = setup_app();
        handle_key_event(&mut app, key(KeyCode::Char('x')));
        assert!(app.tree.node(app.tree.active().unwrap()).selected);
    }

    #[test]
    fn mouse_wheel_scrolls_window() {
        let mut app = setup_app();
        let root = app.tree.root();
        let more = (0..40).map(|i| NodeData::new(format!("item {i}"))).collect();
        app.tree.add_children(root, more).unwrap();
        app.sync_viewport();
        handle_mouse_event(
            &mut app,
            MouseEvent {
                kind: MouseEventKind::ScrollDown,
                column: 0,
                row: 0,
                modifiers: KeyModifiers::NONE,
            },
        );
        assert_eq!(app.viewport.scroll_top(), 3);
    }
}
