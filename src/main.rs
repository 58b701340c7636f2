mod address;
mod backends;
mod config;
mod connection;
mod filter;
mod friendly;
mod keybindings;
mod refresh;
mod stats;
mod ui;

use anyhow::Result;
use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use serde::Serialize;
use std::io;
use std::time::{Duration, Instant};
use tokio::signal;

use crate::backends::SourceKind;
use crate::backends::connections::{ConnectionAcquirer, detect_sources, is_privileged};
use crate::backends::interfaces::InterfaceSelection;
use crate::config::Config;
use crate::connection::ConnectionRecord;
use crate::filter::{FilterState, Matcher, SortMode};
use crate::friendly::FriendlyNameResolver;
use crate::keybindings::Action;
use crate::refresh::{RefreshReport, RefreshScheduler, Refresher};
use crate::stats::ConnectionStats;
use crate::ui::{AppState, InputMode};

/// Longest the TUI waits for input before checking the scheduler again
const INPUT_POLL: Duration = Duration::from_millis(250);

/// NetShow - A TUI monitor for TCP connections with friendly service names
#[derive(Parser, Debug)]
#[command(name = "netshow")]
#[command(version)]
#[command(about = "TCP connection monitor with friendly service names", long_about = None)]
struct Args {
    /// Seconds between refreshes (default: from config, 3)
    #[arg(long, value_name = "SECS")]
    interval: Option<u64>,

    /// Filter text: case-insensitive regex, or plain text if not a valid regex
    #[arg(long, value_name = "TEXT")]
    filter: Option<String>,

    /// Sort order
    #[arg(long, value_enum)]
    sort: Option<SortMode>,

    /// Interface for bandwidth (default: all interfaces)
    #[arg(long, value_name = "NAME")]
    interface: Option<String>,

    /// Don't show emojis
    #[arg(long)]
    no_emojis: bool,

    /// Print the connection table once and exit (skips TUI)
    #[arg(long, conflicts_with = "watch")]
    once: bool,

    /// Print records as JSON - requires --once
    #[arg(long, requires = "once")]
    json: bool,

    /// Re-print the connection table every interval until Ctrl+C (skips TUI)
    #[arg(long)]
    watch: bool,

    /// List connection sources and exit
    #[arg(long)]
    list_sources: bool,

    /// Don't save settings on exit
    #[arg(long)]
    no_save: bool,
}

/// Config values with CLI overrides applied
#[derive(Debug, Clone)]
struct Settings {
    interval: Duration,
    filter: String,
    sort: SortMode,
    interface: InterfaceSelection,
    show_emojis: bool,
}

impl Settings {
    fn resolve(args: &Args, config: &Config) -> Self {
        let interval_secs = args.interval.unwrap_or(config.refresh_interval_secs).max(1);
        Self {
            interval: Duration::from_secs(interval_secs),
            filter: args.filter.clone().unwrap_or_else(|| config.filter.clone()),
            sort: args.sort.unwrap_or(config.default_sort),
            interface: InterfaceSelection::from_name(
                args.interface.as_deref().or(config.interface.as_deref()),
            ),
            show_emojis: config.show_emojis && !args.no_emojis,
        }
    }

    fn refresher(&self) -> Refresher {
        let acquirer = ConnectionAcquirer::new(FriendlyNameResolver::with_global_cache());
        Refresher::new(
            acquirer,
            FilterState::new(&self.filter, self.sort),
            self.interface.clone(),
        )
    }
}

fn print_available_sources() {
    println!("NetShow v{} - Connection Sources\n", env!("CARGO_PKG_VERSION"));

    println!(
        "Running as: {}",
        if is_privileged() { "root" } else { "regular user" }
    );
    println!();

    for source in detect_sources() {
        let status = if source.available {
            "✅ available"
        } else {
            "❌ unavailable"
        };
        println!(
            "  {:10} {:10} [priority: {:?}] {}",
            source.name,
            format!("{:?}", source.kind),
            source.priority,
            status
        );
    }

    println!();
    println!("The privileged source needs root. Without it, lsof is used and only");
    println!("your own processes' sockets are attributed.");
}

/// `--json` output
#[derive(Serialize)]
struct JsonOutput<'a> {
    source: Option<SourceKind>,
    total: usize,
    stats: &'a ConnectionStats,
    connections: &'a [ConnectionRecord],
}

fn print_table(report: &RefreshReport, show_emojis: bool) {
    println!(
        "{:<8} {:<28} {:<20} {:<24} {:<24} STATUS",
        "PID", "SERVICE", "PROCESS", "LOCAL ADDRESS", "REMOTE ADDRESS"
    );
    for record in &report.records {
        let status = if show_emojis {
            format!("{} {}", record.status.icon(), record.status)
        } else {
            record.status.to_string()
        };
        println!(
            "{:<8} {:<28} {:<20} {:<24} {:<24} {}",
            record.pid_label(),
            record.friendly_name,
            record.process_name,
            record.local_address,
            record.remote_address,
            status
        );
    }

    let stats = &report.stats;
    let source = report
        .source_used
        .map(|source| source.to_string())
        .unwrap_or_else(|| "-".to_string());
    println!();
    println!(
        "{} of {} connection(s): {} established, {} listening, {} time-wait (via {})",
        stats.total, report.total, stats.established, stats.listening, stats.time_wait, source
    );
}

fn run_once(settings: &Settings, json: bool) -> Result<()> {
    let mut refresher = settings.refresher();
    let report = refresher.refresh()?;

    if json {
        let output = JsonOutput {
            source: report.source_used,
            total: report.total,
            stats: &report.stats,
            connections: &report.records,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_table(&report, settings.show_emojis);
    }

    Ok(())
}

async fn run_watch(settings: &Settings) -> Result<()> {
    let mut refresher = settings.refresher();
    let mut ticker = tokio::time::interval(settings.interval);

    println!(
        "Refreshing every {}s. Press Ctrl+C to stop...",
        settings.interval.as_secs()
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = signal::ctrl_c() => {
                println!("\nStopped.");
                return Ok(());
            }
        }

        println!("\n--- {} ---", chrono::Local::now().format("%H:%M:%S"));

        // Refresh off the runtime so Ctrl+C is still answered while lsof runs
        let task = tokio::task::spawn_blocking(move || {
            let result = refresher.refresh();
            (refresher, result)
        });
        let (returned, result) = tokio::select! {
            joined = task => joined?,
            _ = signal::ctrl_c() => {
                // The runtime would wait for the blocking refresh on shutdown
                println!("\nStopped.");
                std::process::exit(0);
            }
        };
        refresher = returned;

        match result {
            Ok(report) => {
                print_table(&report, settings.show_emojis);
                if let Some(bandwidth) = report.bandwidth {
                    let rate = bandwidth
                        .bytes_per_sec
                        .map(stats::format_rate)
                        .unwrap_or_else(|| "--".to_string());
                    println!(
                        "Bandwidth [{}]: {} ({} sent, {} received since boot)",
                        bandwidth.interface,
                        rate,
                        bandwidth.totals.bytes_sent,
                        bandwidth.totals.bytes_recv
                    );
                }
            }
            Err(e) => eprintln!("Refresh failed: {}", e),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    if std::env::var("RUST_LOG").is_ok() {
        pretty_env_logger::formatted_builder()
            .parse_default_env()
            .init();
    }

    // Handle --list-sources
    if args.list_sources {
        print_available_sources();
        return Ok(());
    }

    let mut config = Config::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config, using defaults: {:#}", e);
        Config::default()
    });
    let settings = Settings::resolve(&args, &config);
    log::debug!("Settings: {:?}", settings);

    if args.once {
        return run_once(&settings, args.json);
    }

    if args.watch {
        return run_watch(&settings).await;
    }

    // Setup terminal for TUI mode
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = AppState::new(
        settings.show_emojis,
        &settings.filter,
        settings.sort,
        settings.interface.clone(),
    );
    let mut refresher = settings.refresher();
    let mut scheduler = RefreshScheduler::new(settings.interval, Instant::now());

    // Run the app
    let res = run_app(&mut terminal, &mut app, &mut refresher, &mut scheduler);

    // Save session settings before exit (unless --no-save specified)
    if !args.no_save {
        config.default_sort = refresher.filter().sort();
        config.show_emojis = app.show_emojis;
        config.interface = refresher.interface().name().map(str::to_string);
        if let Err(e) = config.save() {
            log::warn!("Failed to save config: {}", e);
        }
    }

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        log::error!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut AppState,
    refresher: &mut Refresher,
    scheduler: &mut RefreshScheduler,
) -> Result<()> {
    loop {
        if scheduler.take_due(Instant::now()) {
            match refresher.refresh() {
                Ok(report) => {
                    app.status_message = format!(
                        "Showing {} of {} connection(s)",
                        report.records.len(),
                        report.total
                    );
                    app.apply_report(report);
                }
                Err(e) => {
                    // Keep showing the previous records
                    log::warn!("Refresh failed: {}", e);
                    app.status_message = format!("Refresh failed: {}", e);
                }
            }
        }

        // Draw UI
        terminal.draw(|f| ui::draw_ui(f, app))?;

        // Handle input until the next refresh could be due
        let timeout = scheduler.time_until_due(Instant::now()).min(INPUT_POLL);
        if !event::poll(timeout)? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        if handle_key(key, app, refresher, scheduler) == Flow::Quit {
            return Ok(());
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

fn handle_key(
    key: KeyEvent,
    app: &mut AppState,
    refresher: &mut Refresher,
    scheduler: &mut RefreshScheduler,
) -> Flow {
    // Ctrl+C always quits
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Flow::Quit;
    }

    // If help is shown, any key closes it
    if app.show_help {
        app.show_help = false;
        return Flow::Continue;
    }

    if app.detail.is_some() {
        match keybindings::action_for(key) {
            Some(Action::Back) | Some(Action::ShowDetails) | Some(Action::Quit) => {
                app.close_details();
                scheduler.resume();
            }
            Some(Action::Refresh) => scheduler.request(),
            _ => {}
        }
        return Flow::Continue;
    }

    if app.input_mode == InputMode::Filter {
        match key.code {
            KeyCode::Enter => app.input_mode = InputMode::Normal,
            KeyCode::Esc => {
                app.input_mode = InputMode::Normal;
                app.filter_input.clear();
            }
            KeyCode::Backspace => {
                app.filter_input.pop();
            }
            KeyCode::Char(c) => app.filter_input.push(c),
            _ => return Flow::Continue,
        }
        if refresher.set_filter_text(&app.filter_input) {
            scheduler.filter_changed(Instant::now());
            if matches!(refresher.filter().matcher(), Matcher::Literal(_)) {
                app.status_message = "Not a valid regex, matching as plain text".to_string();
            }
        }
        return Flow::Continue;
    }

    let Some(action) = keybindings::action_for(key) else {
        return Flow::Continue;
    };

    match action {
        Action::Quit | Action::ForceQuit => return Flow::Quit,
        Action::Refresh => {
            scheduler.request();
            app.status_message = "Refreshing...".to_string();
        }
        Action::StartFilter => app.input_mode = InputMode::Filter,
        Action::SortByStatus | Action::SortByProcess => {
            let requested = if action == Action::SortByStatus {
                SortMode::Status
            } else {
                SortMode::Process
            };
            app.sort = app.sort.toggled(requested);
            refresher.set_sort(app.sort);
            app.apply_report(refresher.reapply());
            app.status_message = format!("Sort: {}", app.sort);
        }
        Action::CycleInterface => {
            app.interface = refresher.cycle_interface();
            app.bandwidth = None;
            app.status_message = format!("Bandwidth interface: {}", app.interface);
        }
        Action::ToggleEmojis => app.show_emojis = !app.show_emojis,
        Action::ShowDetails => {
            if app.open_details() {
                scheduler.pause();
            } else {
                app.status_message = "No connection selected".to_string();
            }
        }
        Action::Back => {
            if !refresher.filter().text().is_empty() {
                app.filter_input.clear();
                refresher.set_filter_text("");
                scheduler.filter_changed(Instant::now());
            }
        }
        Action::ToggleHelp => app.show_help = true,
        Action::Up => app.select_previous(),
        Action::Down => app.select_next(),
    }

    Flow::Continue
}
