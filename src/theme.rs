//! Theme data model: built-in palettes and resolution from config.
//!
//! The theme system provides two built-in palettes (dark and light) and
//! supports custom color overrides from the config file.

use ratatui::style::Color;

use crate::config::{ThemeColorsConfig, ThemeConfig};

// ── Runtime theme colors ─────────────────────────────────────────────────────

/// All runtime colors used in the UI.
///
/// Constructed from a config-level `ThemeConfig` via `resolve_theme()`.
#[derive(Debug, Clone, PartialEq)]
pub struct ThemeColors {
    // Tree panel
    pub tree_bg: Color,
    pub tree_fg: Color,
    pub tree_selected_bg: Color,
    pub tree_selected_fg: Color,
    pub tree_branch_fg: Color,
    pub tree_leaf_fg: Color,
    /// Rows a dim-mode filter did not match.
    pub tree_dim_fg: Color,
    pub tree_guide_fg: Color,

    // Filter highlighting
    pub match_bg: Color,
    pub match_fg: Color,
    pub counter_fg: Color,

    // Status bar
    pub status_bg: Color,
    pub status_fg: Color,

    // Borders & chrome
    pub border_fg: Color,
    pub border_focused_fg: Color,
    pub filter_bg: Color,

    // Semantic colors (not configurable, consistent across themes)
    pub error_fg: Color,
    pub warning_fg: Color,
    pub success_fg: Color,
    pub info_fg: Color,
    pub accent_fg: Color,
    pub dim_fg: Color,
}

// ── Built-in palettes ────────────────────────────────────────────────────────

/// Dark theme using Catppuccin Mocha palette.
pub fn dark_theme() -> ThemeColors {
    ThemeColors {
        tree_bg: Color::Reset,
        tree_fg: Color::Rgb(205, 214, 244),          // #cdd6f4 (text)
        tree_selected_bg: Color::Rgb(69, 71, 90),    // #45475a (surface1)
        tree_selected_fg: Color::Rgb(205, 214, 244), // #cdd6f4
        tree_branch_fg: Color::Rgb(137, 180, 250),   // #89b4fa (blue)
        tree_leaf_fg: Color::Rgb(205, 214, 244),     // #cdd6f4
        tree_dim_fg: Color::Rgb(88, 91, 112),        // #585b70 (surface2)
        tree_guide_fg: Color::Rgb(108, 112, 134),    // #6c7086 (overlay0)

        match_bg: Color::Rgb(249, 226, 175), // #f9e2af (yellow)
        match_fg: Color::Rgb(30, 30, 46),    // #1e1e2e (base)
        counter_fg: Color::Rgb(250, 179, 135), // #fab387 (peach)

        status_bg: Color::Rgb(30, 30, 46), // #1e1e2e (base)
        status_fg: Color::Rgb(205, 214, 244),

        border_fg: Color::Rgb(88, 91, 112), // #585b70 (surface2)
        border_focused_fg: Color::Rgb(137, 180, 250), // #89b4fa (blue)
        filter_bg: Color::Rgb(49, 50, 68),  // #313244 (surface0)

        error_fg: Color::Rgb(243, 139, 168),   // #f38ba8 (red)
        warning_fg: Color::Rgb(249, 226, 175), // #f9e2af (yellow)
        success_fg: Color::Rgb(166, 227, 161), // #a6e3a1 (green)
        info_fg: Color::Rgb(137, 180, 250),    // #89b4fa (blue)
        accent_fg: Color::Rgb(203, 166, 247),  // #cba6f7 (mauve)
        dim_fg: Color::Rgb(108, 112, 134),     // #6c7086
    }
}

/// Light theme using Catppuccin Latte palette.
pub fn light_theme() -> ThemeColors {
    ThemeColors {
        tree_bg: Color::Reset,
        tree_fg: Color::Rgb(76, 79, 105),            // #4c4f69 (text)
        tree_selected_bg: Color::Rgb(204, 208, 218), // #ccd0da (surface1)
        tree_selected_fg: Color::Rgb(76, 79, 105),
        tree_branch_fg: Color::Rgb(30, 102, 245), // #1e66f5 (blue)
        tree_leaf_fg: Color::Rgb(76, 79, 105),
        tree_dim_fg: Color::Rgb(172, 176, 190),   // #acb0be (surface2)
        tree_guide_fg: Color::Rgb(156, 160, 176), // #9ca0b0 (overlay0)

        match_bg: Color::Rgb(223, 142, 29),  // #df8e1d (yellow)
        match_fg: Color::Rgb(239, 241, 245), // #eff1f5 (base)
        counter_fg: Color::Rgb(254, 100, 11), // #fe640b (peach)

        status_bg: Color::Rgb(239, 241, 245), // #eff1f5 (base)
        status_fg: Color::Rgb(76, 79, 105),

        border_fg: Color::Rgb(172, 176, 190), // #acb0be (surface2)
        border_focused_fg: Color::Rgb(30, 102, 245),
        filter_bg: Color::Rgb(230, 233, 239), // #e6e9ef (surface0)

        error_fg: Color::Rgb(210, 15, 57),    // #d20f39 (red)
        warning_fg: Color::Rgb(223, 142, 29), // #df8e1d (yellow)
        success_fg: Color::Rgb(64, 160, 43),  // #40a02b (green)
        info_fg: Color::Rgb(30, 102, 245),
        accent_fg: Color::Rgb(136, 57, 239), // #8839ef (mauve)
        dim_fg: Color::Rgb(156, 160, 176),
    }
}

// ── Color parsing ────────────────────────────────────────────────────────────

/// Parse a hex color string like `"#aabbcc"` into a `ratatui::style::Color`.
/// Returns `None` for malformed input.
pub fn parse_hex_color(hex: &str) -> Option<Color> {
    let hex = hex.strip_prefix('#').unwrap_or(hex);
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some(Color::Rgb(r, g, b))
}

/// Overwrite `slot` when `hex` is present and valid.
fn override_color(slot: &mut Color, hex: Option<&String>) {
    if let Some(color) = hex.and_then(|h| parse_hex_color(h)) {
        *slot = color;
    }
}

// ── Theme resolution ─────────────────────────────────────────────────────────

/// Resolve the final `ThemeColors` from config.
///
/// - `"dark"` (default): dark Catppuccin palette
/// - `"light"`: light Catppuccin palette
/// - `"custom"`: start from dark palette, then override with custom hex values
pub fn resolve_theme(config: &ThemeConfig) -> ThemeColors {
    let scheme = config.scheme.as_deref().unwrap_or("dark");
    match scheme {
        "light" => light_theme(),
        "custom" => {
            let mut theme = dark_theme();
            if let Some(custom) = &config.custom {
                apply_custom_colors(&mut theme, custom);
            }
            theme
        }
        _ => dark_theme(),
    }
}

/// Apply custom hex color overrides on top of an existing theme.
fn apply_custom_colors(theme: &mut ThemeColors, custom: &ThemeColorsConfig) {
    override_color(&mut theme.tree_bg, custom.tree_bg.as_ref());
    override_color(&mut theme.tree_fg, custom.tree_fg.as_ref());
    override_color(&mut theme.tree_selected_bg, custom.tree_selected_bg.as_ref());
    override_color(&mut theme.tree_selected_fg, custom.tree_selected_fg.as_ref());
    override_color(&mut theme.tree_branch_fg, custom.tree_branch_fg.as_ref());
    override_color(&mut theme.tree_leaf_fg, custom.tree_leaf_fg.as_ref());
    override_color(&mut theme.tree_dim_fg, custom.tree_dim_fg.as_ref());
    override_color(&mut theme.match_bg, custom.match_bg.as_ref());
    override_color(&mut theme.match_fg, custom.match_fg.as_ref());
    override_color(&mut theme.status_bg, custom.status_bg.as_ref());
    override_color(&mut theme.status_fg, custom.status_fg.as_ref());
    override_color(&mut theme.border_fg, custom.border_fg.as_ref());
    override_color(&mut theme.filter_bg, custom.filter_bg.as_ref());
}

// ── Tests ────────────────────────────────────────────────────────────────────
