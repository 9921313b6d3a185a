//! ISS tracker TUI - live map of the tracked position
//!
//! Draws a world map with the current marker and shows:
//! - Latitude, longitude and observation time readouts
//! - Loading indicator while a refresh is in flight
//! - Toast notifications for failures and connectivity changes
//!
//! Keys: `r` refresh now, `+`/`-` zoom, `q`/Esc quit.
//! Logs go to a file so they don't tear the terminal.

use clap::Parser;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use iss_tracker::domain::notification::NotificationLevel;
use iss_tracker::infra::{Config, Metrics};
use iss_tracker::io::{ConnectivityMonitor, HttpPositionSource};
use iss_tracker::services::view::viewport;
use iss_tracker::services::{
    DashboardState, RefreshCycle, RenderSettings, SharedDashboard, Tracker, TriggerHandle,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{
        canvas::{Canvas, Map, MapResolution},
        Block, Borders, List, ListItem, Paragraph,
    },
    Frame, Terminal,
};
use std::fs::File;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const SPINNER: [&str; 4] = ["|", "/", "-", "\\"];

/// ISS tracker dashboard
#[derive(Parser, Debug)]
#[command(name = "iss-tracker-tui", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,

    /// Log file (the terminal is taken by the dashboard)
    #[arg(long, default_value = "iss-tracker-tui.log")]
    log_file: String,
}

/// Static labels for the frame, resolved once from config
struct Chrome {
    label: String,
    symbol: String,
    attribution: String,
    max_zoom: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_file = File::create(&args.log_file)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::sync::Mutex::new(log_file))
        .with_ansi(false)
        .with_target(false)
        .init();

    let config = Config::load_from_path(&args.config);
    info!(
        git_hash = %env!("GIT_HASH"),
        config_file = %config.config_file(),
        endpoint = %config.endpoint(),
        "tui_starting"
    );

    let dashboard = SharedDashboard::new(config.default_zoom(), config.toast_duration());
    let cycle = Arc::new(RefreshCycle::new(
        Arc::new(HttpPositionSource::from_config(&config)?),
        Arc::new(dashboard.clone()),
        Arc::new(Metrics::new()),
        RenderSettings::from_config(&config),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (mut tracker, trigger) = Tracker::new(&config, cycle);

    if config.connectivity_enabled() {
        match ConnectivityMonitor::for_endpoint(
            config.endpoint(),
            config.probe_interval(),
            config.probe_timeout(),
        ) {
            Ok(monitor) => {
                let (conn_tx, conn_rx) = mpsc::channel(8);
                let conn_shutdown = shutdown_rx.clone();
                tokio::spawn(async move {
                    monitor.run(conn_tx, conn_shutdown).await;
                });
                tracker = tracker.with_connectivity(conn_rx);
            }
            Err(e) => error!(error = %e, "connectivity_monitor_disabled"),
        }
    }

    let tracker_handle = tokio::spawn(tracker.run(shutdown_rx));

    let chrome = Chrome {
        label: config.marker_label().to_string(),
        symbol: config.marker_symbol().to_string(),
        attribution: config.attribution().to_string(),
        max_zoom: config.max_zoom(),
    };

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_ui(&mut terminal, &dashboard, &trigger, &chrome).await;

    let _ = shutdown_tx.send(true);
    tracker_handle.abort();
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    info!("tui_stopped");
    result
}

async fn run_ui(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    dashboard: &SharedDashboard,
    trigger: &TriggerHandle,
    chrome: &Chrome,
) -> anyhow::Result<()> {
    let tick_rate = Duration::from_millis(100);
    let started = Instant::now();
    let mut last_tick = Instant::now();

    loop {
        let frame = (started.elapsed().as_millis() / 250) as usize % SPINNER.len();
        dashboard.with_state(|s| {
            s.prune_toasts(Instant::now());
            terminal.draw(|f| draw_ui(f, s, chrome, frame))
        })?;

        let timeout = tick_rate.saturating_sub(last_tick.elapsed());
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                        KeyCode::Char('r') => {
                            if !trigger.request_refresh() {
                                error!("manual_refresh_rejected");
                            }
                        }
                        KeyCode::Char('+') | KeyCode::Char('=') => {
                            dashboard.with_state(|s| s.zoom_in(chrome.max_zoom))
                        }
                        KeyCode::Char('-') => dashboard.with_state(|s| s.zoom_out()),
                        _ => {}
                    }
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
        }
    }
}

fn draw_ui(f: &mut Frame, state: &DashboardState, chrome: &Chrome, frame: usize) {
    let main_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Map + side panel
            Constraint::Length(1), // Attribution
        ])
        .split(f.area());

    draw_header(f, main_chunks[0], state, chrome, frame);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(40), Constraint::Length(34)])
        .split(main_chunks[1]);

    draw_map(f, body[0], state, chrome);

    let side = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(9), Constraint::Min(0)])
        .split(body[1]);

    draw_readouts(f, side[0], state);
    draw_toasts(f, side[1], state);

    let footer = Paragraph::new(Line::from(vec![
        Span::styled(format!(" {}", chrome.attribution), Style::default().fg(Color::DarkGray)),
        Span::raw("  |  r: refresh  +/-: zoom  q: quit"),
    ]));
    f.render_widget(footer, main_chunks[2]);
}

fn draw_header(f: &mut Frame, area: Rect, state: &DashboardState, chrome: &Chrome, frame: usize) {
    let (status_text, status_color) = if state.loading {
        (format!("{} LOADING", SPINNER[frame]), Color::Yellow)
    } else {
        ("IDLE".to_string(), Color::Green)
    };

    let last = state
        .last_update
        .map(|t| format!("{}s ago", t.elapsed().as_secs()))
        .unwrap_or_else(|| "never".to_string());

    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            format!("{} Tracker ", chrome.label),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::raw("| "),
        Span::styled(status_text, Style::default().fg(status_color)),
        Span::raw(" | Last update: "),
        Span::raw(last),
        Span::raw(" | Updates: "),
        Span::styled(format!("{}", state.updates), Style::default().fg(Color::Yellow)),
        Span::styled(format!("  {}", env!("GIT_HASH")), Style::default().fg(Color::DarkGray)),
    ]))
    .block(Block::default().borders(Borders::ALL));

    f.render_widget(header, area);
}

fn draw_map(f: &mut Frame, area: Rect, state: &DashboardState, chrome: &Chrome) {
    let (x_bounds, y_bounds) = viewport(state.center, state.zoom);
    let marker = state.marker;
    let has_fix = state.updates > 0;
    // Popup sits a little below the marker, scaled to the visible span
    let popup_offset = (y_bounds[1] - y_bounds[0]) / 20.0;

    let canvas = Canvas::default()
        .block(
            Block::default()
                .title(format!(" Map (zoom {}) ", state.zoom))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Blue)),
        )
        .marker(symbols::Marker::Braille)
        .x_bounds(x_bounds)
        .y_bounds(y_bounds)
        .paint(|ctx| {
            ctx.draw(&Map { color: Color::DarkGray, resolution: MapResolution::High });
            if !has_fix {
                return;
            }
            ctx.layer();
            ctx.print(
                marker.longitude,
                marker.latitude,
                Span::styled(
                    format!("{} {}", chrome.symbol, chrome.label),
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                ),
            );
            if let Some(popup) = &state.popup {
                ctx.print(
                    marker.longitude,
                    marker.latitude - popup_offset,
                    Span::styled(popup.clone(), Style::default().fg(Color::White)),
                );
            }
        });

    f.render_widget(canvas, area);
}

fn draw_readouts(f: &mut Frame, area: Rect, state: &DashboardState) {
    let value = |text: &str| {
        if text.is_empty() {
            Span::styled("-", Style::default().fg(Color::DarkGray))
        } else {
            Span::styled(text.to_string(), Style::default().fg(Color::Cyan))
        }
    };

    let lines = vec![
        Line::from(vec![Span::raw("Latitude:  "), value(&state.latitude_text)]),
        Line::from(vec![Span::raw("Longitude: "), value(&state.longitude_text)]),
        Line::from(vec![Span::raw("Time:      "), value(&state.timestamp_text)]),
        Line::from(""),
        Line::from(format!(
            "Centre:    {:.2}, {:.2}",
            state.center.latitude, state.center.longitude
        )),
        Line::from(format!("Zoom:      {}", state.zoom)),
    ];

    let readouts = Paragraph::new(lines).block(
        Block::default()
            .title(" Position ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );

    f.render_widget(readouts, area);
}

fn draw_toasts(f: &mut Frame, area: Rect, state: &DashboardState) {
    let now = Instant::now();
    let items: Vec<ListItem> = state
        .visible_toasts(now)
        .map(|n| {
            let (icon, color) = match n.level {
                NotificationLevel::Info => ("i", Color::Green),
                NotificationLevel::Warning => ("!", Color::Yellow),
                NotificationLevel::Error => ("✗", Color::Red),
            };
            ListItem::new(Line::from(vec![
                Span::styled(icon, Style::default().fg(color).add_modifier(Modifier::BOLD)),
                Span::raw(format!(" {}", n.message)),
            ]))
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .title(" Notifications ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Magenta)),
    );

    f.render_widget(list, area);
}
