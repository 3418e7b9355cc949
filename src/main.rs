use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::info;

use vtree_tui::app::App;
use vtree_tui::config::AppConfig;
use vtree_tui::error::{AppError, Result};
use vtree_tui::event::{Event, EventHandler};
use vtree_tui::handler;
use vtree_tui::tree::loader::{DataSource, JsonFileSource, SyntheticSource};
use vtree_tui::tui::{install_panic_hook, Tui};
use vtree_tui::ui;

/// A virtualized, filterable tree view for the terminal.
#[derive(Parser, Debug)]
#[command(name = "vtree", version, about)]
struct Cli {
    /// JSON file with the top-level node records
    data: Option<PathBuf>,

    /// Show a generated tree of this depth instead of reading a file
    #[arg(long, value_name = "DEPTH", conflicts_with = "data")]
    generate: Option<usize>,

    /// Children per branch for --generate
    #[arg(long, value_name = "N", default_value_t = 10)]
    fanout: usize,

    /// Load generated branches lazily, one level per expand
    #[arg(long)]
    lazy: bool,

    /// Simulated latency per generated load
    #[arg(long, value_name = "MS", default_value_t = 0)]
    latency_ms: u64,

    /// Config file (overrides the default search locations)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Use fuzzy matching for the filter
    #[arg(long)]
    fuzzy: bool,

    /// Filter mode: hide or dim
    #[arg(long, value_name = "MODE")]
    mode: Option<String>,

    /// Only match nodes without loaded children
    #[arg(long)]
    leaves_only: bool,

    /// Treat titles as markup instead of plain text
    #[arg(long)]
    no_escape_titles: bool,

    /// Write logs to this file (set RUST_LOG to adjust the level)
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

impl Cli {
    /// Settings given on the command line, layered over the config file.
    fn overrides(&self) -> AppConfig {
        let mut config = AppConfig::default();
        config.filter.mode = self.mode.clone();
        if self.fuzzy {
            config.filter.fuzzy = Some(true);
        }
        if self.leaves_only {
            config.filter.leaves_only = Some(true);
        }
        if self.no_escape_titles {
            config.tree.escape_titles = Some(false);
        }
        config
    }

    fn data_source(&self) -> Result<Arc<dyn DataSource>> {
        if let Some(depth) = self.generate {
            let source = SyntheticSource::new(self.fanout, depth, self.lazy)
                .with_latency(Duration::from_millis(self.latency_ms));
            return Ok(Arc::new(source));
        }
        match &self.data {
            Some(path) => Ok(Arc::new(JsonFileSource::new(path)?)),
            None => Err(AppError::InvalidPath(
                "no data file given (use --generate <DEPTH> for a generated tree)".into(),
            )),
        }
    }
}

/// The terminal owns stdout, so logs only go to a file.
fn init_logging(path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(file)))
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.log_file {
        init_logging(path)?;
    }
    let config = AppConfig::load(cli.config.as_deref(), Some(&cli.overrides()));
    let source = cli.data_source()?;
    info!("starting with {}", source.describe());

    install_panic_hook();

    let mut events = EventHandler::new(Duration::from_millis(config.tick_rate_ms()));
    let mut app = App::new(&config, source, events.sender());
    app.load_root();

    let mut tui = Tui::new(config.mouse_enabled())?;

    loop {
        tui.draw(|frame| ui::render(&mut app, frame))?;

        match events.next().await? {
            Event::Key(key) => handler::handle_key_event(&mut app, key),
            Event::Mouse(mouse) => handler::handle_mouse_event(&mut app, mouse),
            Event::Tick => app.on_tick(),
            Event::Resize(_, _) => {}
            Event::LoadComplete {
                node,
                token,
                result,
            } => app.handle_load_complete(node, token, result),
        }

        if app.should_quit {
            break;
        }
    }

    tui.restore()?;
    Ok(())
}
