//! Application configuration: TOML file loading, CLI overrides, and defaults.
//!
//! Resolution order (first found wins, values merge/override):
//! 1. CLI flags (`--config`, `--fuzzy`, `--mode`, etc.)
//! 2. `$VTREE_CONFIG` environment variable (path to config file)
//! 3. Project-local `.vtree.toml` in the current working directory
//! 4. Global `~/.config/vtree/config.toml`
//! 5. Built-in defaults

use std::path::{Path, PathBuf};

use log::warn;
use serde::Deserialize;

use crate::tree::filter::{FilterMode, FilterOptions};

// ── Section configs ──────────────────────────────────────────────────────────

/// General application settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable mouse support.
    pub mouse: Option<bool>,
    /// Event poll interval in milliseconds.
    pub tick_rate_ms: Option<u64>,
}

/// Tree panel settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TreeConfig {
    /// Treat titles as plain text (true) or as markup (false).
    pub escape_titles: Option<bool>,
    /// Terminal lines per row.
    pub row_height: Option<usize>,
    /// Rows rendered beyond each edge of the visible window.
    pub prefetch_rows: Option<usize>,
    /// Expand the top-level nodes after the initial load.
    pub expand_root_children: Option<bool>,
}

/// Filter settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct FilterConfig {
    /// "hide" or "dim".
    pub mode: Option<String>,
    pub fuzzy: Option<bool>,
    pub leaves_only: Option<bool>,
    pub auto_expand: Option<bool>,
    pub highlight: Option<bool>,
    pub hide_expanders: Option<bool>,
    pub no_data: Option<bool>,
    pub auto_apply: Option<bool>,
    pub counter: Option<bool>,
    pub hide_expanded_counter: Option<bool>,
    /// Idle time after the last keystroke before the filter runs.
    pub debounce_ms: Option<u64>,
}

/// Color settings for a single theme palette.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ThemeColorsConfig {
    pub tree_bg: Option<String>,
    pub tree_fg: Option<String>,
    pub tree_selected_bg: Option<String>,
    pub tree_selected_fg: Option<String>,
    pub tree_branch_fg: Option<String>,
    pub tree_leaf_fg: Option<String>,
    pub tree_dim_fg: Option<String>,
    pub match_bg: Option<String>,
    pub match_fg: Option<String>,
    pub status_bg: Option<String>,
    pub status_fg: Option<String>,
    pub border_fg: Option<String>,
    pub filter_bg: Option<String>,
}

/// Theme configuration section.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ThemeConfig {
    /// Color scheme: "dark", "light", "custom".
    pub scheme: Option<String>,
    /// Custom color overrides.
    pub custom: Option<ThemeColorsConfig>,
}

// ── Top-level config ─────────────────────────────────────────────────────────

/// Top-level application configuration.
///
/// All fields are optional so that partial configs from different sources
/// can be merged together (CLI overrides file, file overrides defaults).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub tree: TreeConfig,
    pub filter: FilterConfig,
    pub theme: ThemeConfig,
}

// ── Default constants ────────────────────────────────────────────────────────

/// Default filter input debounce in milliseconds.
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;
/// Default rows rendered past each edge of the window.
pub const DEFAULT_PREFETCH_ROWS: usize = 5;
/// Default event poll interval in milliseconds.
pub const DEFAULT_TICK_RATE_MS: u64 = 50;

// ── Config file locator ──────────────────────────────────────────────────────

/// Return the list of candidate config file paths in priority order.
///
/// Does NOT include the CLI `--config` path; that is handled separately.
fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(env_path) = std::env::var("VTREE_CONFIG") {
        paths.push(PathBuf::from(env_path));
    }

    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join(".vtree.toml"));
    }

    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("vtree").join("config.toml"));
    }

    paths
}

/// Try to read and parse a TOML config file. Returns `None` if the file
/// doesn't exist or can't be parsed (with a logged warning).
fn load_file(path: &Path) -> Option<AppConfig> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str::<AppConfig>(&content) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            warn!("failed to parse config file {}: {}", path.display(), e);
            None
        }
    }
}

// ── Merge logic ──────────────────────────────────────────────────────────────

impl AppConfig {
    /// Merge `other` on top of `self`; `other`'s `Some` values win.
    pub fn merge(self, other: &AppConfig) -> AppConfig {
        let (f, o) = (self.filter, &other.filter);
        AppConfig {
            general: GeneralConfig {
                mouse: other.general.mouse.or(self.general.mouse),
                tick_rate_ms: other.general.tick_rate_ms.or(self.general.tick_rate_ms),
            },
            tree: TreeConfig {
                escape_titles: other.tree.escape_titles.or(self.tree.escape_titles),
                row_height: other.tree.row_height.or(self.tree.row_height),
                prefetch_rows: other.tree.prefetch_rows.or(self.tree.prefetch_rows),
                expand_root_children: other
                    .tree
                    .expand_root_children
                    .or(self.tree.expand_root_children),
            },
            filter: FilterConfig {
                mode: o.mode.clone().or(f.mode),
                fuzzy: o.fuzzy.or(f.fuzzy),
                leaves_only: o.leaves_only.or(f.leaves_only),
                auto_expand: o.auto_expand.or(f.auto_expand),
                highlight: o.highlight.or(f.highlight),
                hide_expanders: o.hide_expanders.or(f.hide_expanders),
                no_data: o.no_data.or(f.no_data),
                auto_apply: o.auto_apply.or(f.auto_apply),
                counter: o.counter.or(f.counter),
                hide_expanded_counter: o.hide_expanded_counter.or(f.hide_expanded_counter),
                debounce_ms: o.debounce_ms.or(f.debounce_ms),
            },
            theme: ThemeConfig {
                scheme: other.theme.scheme.clone().or(self.theme.scheme),
                custom: other.theme.custom.clone().or(self.theme.custom),
            },
        }
    }

    /// Load the final merged configuration.
    ///
    /// `cli_config_path` is an explicit config file path from `--config`.
    /// `cli_overrides` are partial overrides derived from CLI flags.
    pub fn load(cli_config_path: Option<&Path>, cli_overrides: Option<&AppConfig>) -> AppConfig {
        let mut config = AppConfig::default();

        // Lowest priority first so higher ones overwrite.
        for path in candidate_paths().iter().rev() {
            if let Some(file_cfg) = load_file(path) {
                config = config.merge(&file_cfg);
            }
        }

        if let Some(cli_path) = cli_config_path {
            match load_file(cli_path) {
                Some(file_cfg) => config = config.merge(&file_cfg),
                None => warn!("config file {} not loaded", cli_path.display()),
            }
        }

        if let Some(overrides) = cli_overrides {
            config = config.merge(overrides);
        }

        config
    }

    // ── Convenience getters with built-in defaults ──────────────────────────

    /// Whether mouse support is enabled.
    pub fn mouse_enabled(&self) -> bool {
        self.general.mouse.unwrap_or(true)
    }

    pub fn tick_rate_ms(&self) -> u64 {
        self.general.tick_rate_ms.unwrap_or(DEFAULT_TICK_RATE_MS)
    }

    pub fn escape_titles(&self) -> bool {
        self.tree.escape_titles.unwrap_or(true)
    }

    pub fn row_height(&self) -> usize {
        self.tree.row_height.unwrap_or(1).max(1)
    }

    pub fn prefetch_rows(&self) -> usize {
        self.tree.prefetch_rows.unwrap_or(DEFAULT_PREFETCH_ROWS)
    }

    pub fn expand_root_children(&self) -> bool {
        self.tree.expand_root_children.unwrap_or(false)
    }

    /// Filter mode; unknown values fall back to hide.
    pub fn filter_mode(&self) -> FilterMode {
        match self.filter.mode.as_deref().map(str::parse::<FilterMode>) {
            Some(Ok(mode)) => mode,
            Some(Err(e)) => {
                warn!("{e}");
                FilterMode::Hide
            }
            None => FilterMode::Hide,
        }
    }

    /// Filter debounce interval in milliseconds.
    pub fn debounce_ms(&self) -> u64 {
        self.filter.debounce_ms.unwrap_or(DEFAULT_DEBOUNCE_MS)
    }

    /// Filter options from the `[filter]` section.
    pub fn filter_options(&self) -> FilterOptions {
        let defaults = FilterOptions::default();
        let f = &self.filter;
        FilterOptions {
            mode: self.filter_mode(),
            fuzzy: f.fuzzy.unwrap_or(defaults.fuzzy),
            leaves_only: f.leaves_only.unwrap_or(defaults.leaves_only),
            // Hidden matches under collapsed branches are easy to miss.
            auto_expand: f.auto_expand.unwrap_or(true),
            highlight: f.highlight.unwrap_or(defaults.highlight),
            hide_expanders: f.hide_expanders.unwrap_or(defaults.hide_expanders),
            no_data: f.no_data.unwrap_or(defaults.no_data),
            auto_apply: f.auto_apply.unwrap_or(defaults.auto_apply),
            counter: f.counter.unwrap_or(defaults.counter),
            hide_expanded_counter: f
                .hide_expanded_counter
                .unwrap_or(defaults.hide_expanded_counter),
        }
    }

    /// Theme scheme: "dark", "light", or "custom".
    pub fn theme_scheme(&self) -> &str {
        self.theme.scheme.as_deref().unwrap_or("dark")
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_values() {
        let cfg = AppConfig::default();
        assert!(cfg.mouse_enabled());
        assert_eq!(cfg.tick_rate_ms(), 50);
        assert!(cfg.escape_titles());
        assert_eq!(cfg.row_height(), 1);
        assert_eq!(cfg.prefetch_rows(), 5);
        assert!(!cfg.expand_root_children());
        assert_eq!(cfg.filter_mode(), FilterMode::Hide);
        assert_eq!(cfg.debounce_ms(), 300);
        assert_eq!(cfg.theme_scheme(), "dark");

        let opts = cfg.filter_options();
        assert!(opts.auto_expand);
        assert!(opts.highlight);
        assert!(opts.auto_apply);
        assert!(!opts.fuzzy);
    }

    #[test]
    fn test_toml_parsing_full() {
        let toml = r#"
[general]
mouse = false
tick_rate_ms = 16

[tree]
escape_titles = false
row_height = 2
prefetch_rows = 10
expand_root_children = true

[filter]
mode = "dim"
fuzzy = true
leaves_only = true
auto_expand = false
highlight = false
hide_expanders = true
no_data = false
auto_apply = false
counter = false
hide_expanded_counter = false
debounce_ms = 150

[theme]
scheme = "light"
"#;
        let cfg: AppConfig = toml::from_str(toml).expect("parse failed");
        assert!(!cfg.mouse_enabled());
        assert_eq!(cfg.tick_rate_ms(), 16);
        assert!(!cfg.escape_titles());
        assert_eq!(cfg.row_height(), 2);
        assert_eq!(cfg.prefetch_rows(), 10);
        assert!(cfg.expand_root_children());
        assert_eq!(cfg.debounce_ms(), 150);
        assert_eq!(cfg.theme_scheme(), "light");
        assert_eq!(
            cfg.filter_options(),
            FilterOptions {
                mode: FilterMode::Dim,
                fuzzy: true,
                leaves_only: true,
                auto_expand: false,
                highlight: false,
                hide_expanders: true,
                no_data: false,
                auto_apply: false,
                counter: false,
                hide_expanded_counter: false,
            }
        );
    }

    #[test]
    fn test_toml_parsing_partial() {
        let toml = r#"
[filter]
fuzzy = true
"#;
        let cfg: AppConfig = toml::from_str(toml).expect("parse failed");
        assert!(cfg.filter_options().fuzzy);
        // Everything else should be defaults
        assert_eq!(cfg.filter_mode(), FilterMode::Hide);
        assert_eq!(cfg.row_height(), 1);
    }

    #[test]
    fn test_toml_parsing_empty() {
        let cfg: AppConfig = toml::from_str("").expect("parse failed");
        assert!(cfg.escape_titles());
        assert_eq!(cfg.prefetch_rows(), DEFAULT_PREFETCH_ROWS);
    }

    #[test]
    fn test_unknown_mode_falls_back_to_hide() {
        let cfg: AppConfig = toml::from_str("[filter]\nmode = \"fade\"").expect("parse");
        assert_eq!(cfg.filter_mode(), FilterMode::Hide);
    }

    #[test]
    fn test_zero_row_height_is_clamped() {
        let cfg: AppConfig = toml::from_str("[tree]\nrow_height = 0").expect("parse");
        assert_eq!(cfg.row_height(), 1);
    }

    #[test]
    fn test_merge_overrides() {
        let base = AppConfig {
            tree: TreeConfig {
                row_height: Some(2),
                prefetch_rows: Some(3),
                ..Default::default()
            },
            filter: FilterConfig {
                fuzzy: Some(false),
                debounce_ms: Some(100),
                ..Default::default()
            },
            ..Default::default()
        };

        let over = AppConfig {
            tree: TreeConfig {
                row_height: Some(1),
                ..Default::default()
            },
            filter: FilterConfig {
                fuzzy: Some(true),
                ..Default::default()
            },
            ..Default::default()
        };

        let merged = base.merge(&over);
        assert_eq!(merged.row_height(), 1); // overridden
        assert_eq!(merged.prefetch_rows(), 3); // from base
        assert!(merged.filter_options().fuzzy); // overridden
        assert_eq!(merged.debounce_ms(), 100); // from base
    }

    #[test]
    fn test_merge_none_does_not_clear_some() {
        let base = AppConfig {
            filter: FilterConfig {
                mode: Some("dim".into()),
                debounce_ms: Some(500),
                ..Default::default()
            },
            ..Default::default()
        };
        let over = AppConfig::default();

        let merged = base.merge(&over);
        assert_eq!(merged.filter_mode(), FilterMode::Dim);
        assert_eq!(merged.debounce_ms(), 500);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg_path = dir.path().join("test-config.toml");
        let mut f = std::fs::File::create(&cfg_path).expect("create");
        writeln!(
            f,
            r#"
[tree]
prefetch_rows = 8

[filter]
mode = "dim"
"#
        )
        .expect("write");

        let cfg = load_file(&cfg_path).expect("load");
        assert_eq!(cfg.prefetch_rows(), 8);
        assert_eq!(cfg.filter_mode(), FilterMode::Dim);
        // Unset fields fall through to defaults
        assert_eq!(cfg.row_height(), 1);
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_file(Path::new("/nonexistent/config.toml"));
        assert!(result.is_none());
    }

    #[test]
    fn test_load_invalid_toml_returns_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg_path = dir.path().join("bad.toml");
        std::fs::write(&cfg_path, "this is { not valid toml").expect("write");
        assert!(load_file(&cfg_path).is_none());
    }

    #[test]
    fn test_load_with_cli_overrides() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg_path = dir.path().join("config.toml");
        std::fs::write(
            &cfg_path,
            r#"
[tree]
escape_titles = false

[filter]
leaves_only = true
"#,
        )
        .expect("write");

        let cli_overrides = AppConfig {
            filter: FilterConfig {
                leaves_only: Some(false),
                ..Default::default()
            },
            ..Default::default()
        };

        let cfg = AppConfig::load(Some(&cfg_path), Some(&cli_overrides));
        // CLI override wins
        assert!(!cfg.filter_options().leaves_only);
        // File value preserved (not overridden by CLI)
        assert!(!cfg.escape_titles());
    }

    #[test]
    fn test_theme_custom_colors() {
        let toml = r##"
[theme]
scheme = "custom"

[theme.custom]
tree_bg = "#1a1b26"
match_bg = "#e0af68"
"##;
        let cfg: AppConfig = toml::from_str(toml).expect("parse");
        assert_eq!(cfg.theme_scheme(), "custom");
        let custom = cfg.theme.custom.as_ref().expect("custom present");
        assert_eq!(custom.tree_bg.as_deref(), Some("#1a1b26"));
        assert_eq!(custom.match_bg.as_deref(), Some("#e0af68"));
        assert!(custom.status_bg.is_none());
    }
}
