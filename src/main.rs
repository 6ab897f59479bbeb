use clap::Parser;
use ratatui::{backend::CrosstermBackend, Terminal};
use std::sync::Arc;
use std::{io, time::Duration};
use tokio::sync::mpsc;

use keytree::async_task::{self, Task, TaskResult};
use keytree::cli::{Cli, Commands};
use keytree::config::Config;
use keytree::error::{KeytreeError, Result};
use keytree::event::{self, InputEvent};
use keytree::main_lib;
use keytree::overlay::Overlay;
use keytree::storage::{JsonFileStore, KeyValueStore, MemoryStore, Preferences};
use keytree::surface::TerminalSurface;
use keytree::theme::get_theme;
use keytree::ui;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logger only if KEYTREE_LOG environment variable is set
    if let Ok(log_file) = std::env::var("KEYTREE_LOG") {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .map_err(|e| KeytreeError::Generic(format!("cannot open log file {}: {}", log_file, e)))?;
        env_logger::Builder::new()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .filter_level(log::LevelFilter::Debug)
            .init();

        log::info!("keytree starting up");
    } else if cli.verbose && !matches!(cli.command, None | Some(Commands::Run { .. })) {
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Debug)
            .init();
    }

    let config = main_lib::load_config(cli.config.as_deref())?;

    match cli.command.unwrap_or(Commands::Run { tree: None }) {
        Commands::Run { tree } => run_interactive(tree.as_deref(), config).await,
        Commands::Execute {
            tree,
            keys,
            output,
            screenshot,
            width,
            height,
        } => {
            main_lib::execute_command(
                tree.as_deref(),
                &config,
                &keys,
                output.as_deref(),
                screenshot,
                width,
                height,
            )
            .await
        }
        Commands::Search { tree, query, limit } => {
            main_lib::search_command(tree.as_deref(), &query, &config, limit)
        }
        Commands::Validate { tree } => {
            if !main_lib::validate_command(tree.as_deref())? {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

async fn run_interactive(tree_path: Option<&str>, config: Config) -> Result<()> {
    let tree = main_lib::load_tree(tree_path)?;

    let store: Arc<dyn KeyValueStore> = match config.storage_path() {
        Some(path) => {
            log::info!("main: persisting to {:?}", path);
            Arc::new(JsonFileStore::open(path))
        }
        None => {
            log::warn!("main: no data directory, preferences will not persist");
            Arc::new(MemoryStore::new())
        }
    };
    let prefs = Preferences::new(store);

    let mut overlay = Overlay::new(tree, prefs.clone(), &config)?;
    overlay.mount(Box::new(TerminalSurface::new()))?;
    let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;

    // Setup async task channels
    let (task_sender, task_receiver) = mpsc::channel::<Task>(32);
    let (result_sender, mut result_receiver) = mpsc::channel::<TaskResult>(32);

    // Start background worker
    let worker_handle = tokio::spawn(async_task::run_worker(
        task_receiver,
        result_sender,
        overlay.loader().clone(),
    ));

    let outcome = event_loop(
        &mut overlay,
        &mut terminal,
        &config,
        &prefs,
        &task_sender,
        &mut result_receiver,
    )
    .await;

    // Cleanup
    worker_handle.abort();
    overlay.unmount()?;
    terminal.show_cursor()?;

    outcome
}

async fn event_loop(
    overlay: &mut Overlay,
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    config: &Config,
    prefs: &Preferences,
    task_sender: &mpsc::Sender<Task>,
    result_receiver: &mut mpsc::Receiver<TaskResult>,
) -> Result<()> {
    let tick_rate = Duration::from_millis(100);
    let mut revisions = overlay.navigator().subscribe();
    let mut needs_redraw = true;

    loop {
        if needs_redraw || revisions.has_changed().unwrap_or(false) {
            revisions.borrow_and_update();
            let theme = get_theme(prefs.theme());
            if overlay.is_visible() {
                let geometry = prefs.window_geometry();
                let view = overlay.view_model().clone();
                terminal.draw(|f| ui::draw(f, &view, &theme, geometry))?;
            } else {
                terminal.draw(|f| ui::draw_hidden(f, &theme, config.keys.activate))?;
            }
            needs_redraw = false;
        }

        // Handle events with timeout
        if crossterm::event::poll(tick_rate)? {
            let input = event::translate(&crossterm::event::read()?, &config.keys);
            match input {
                InputEvent::Key(key) => {
                    for request in overlay.handle_key(key) {
                        if let Err(e) = task_sender.send(Task::ResolveDirectory(request)).await {
                            log::error!("main: worker is gone: {}", e);
                            return Err(KeytreeError::Generic("load worker stopped".to_string()));
                        }
                    }
                }
                InputEvent::Activate => {
                    overlay.activate();
                }
                InputEvent::FocusGained => overlay.focus(),
                InputEvent::FocusLost => overlay.blur(),
                InputEvent::Redraw => terminal.clear()?,
                InputEvent::Quit => break,
                InputEvent::Ignored => {}
            }
            needs_redraw = input != InputEvent::Ignored;
        }

        // Handle async task results
        while let Ok(result) = result_receiver.try_recv() {
            main_lib::handle_task_result(overlay, result);
        }
    }

    Ok(())
}
