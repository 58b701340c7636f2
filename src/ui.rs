use crate::backends::SourceKind;
use crate::backends::interfaces::InterfaceSelection;
use crate::backends::process::ProcessDetails;
use crate::connection::ConnectionRecord;
use crate::filter::SortMode;
use crate::refresh::RefreshReport;
use crate::stats::{self, Bandwidth, ConnectionStats};
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    /// Typing into the filter line
    Filter,
}

/// Selected connection plus whatever could be learned about its process
pub struct DetailView {
    pub record: ConnectionRecord,
    pub details: ProcessDetails,
}

pub struct AppState {
    pub records: Vec<ConnectionRecord>,
    pub table_state: TableState,
    pub input_mode: InputMode,
    pub filter_input: String,
    pub show_help: bool,
    pub detail: Option<DetailView>,
    pub status_message: String,
    pub show_emojis: bool,
    pub stats: ConnectionStats,
    /// Record count before filtering
    pub total: usize,
    pub bandwidth: Option<Bandwidth>,
    pub source: Option<SourceKind>,
    pub sort: SortMode,
    pub interface: InterfaceSelection,
}

impl AppState {
    pub fn new(show_emojis: bool, filter: &str, sort: SortMode, interface: InterfaceSelection) -> Self {
        Self {
            records: Vec::new(),
            table_state: TableState::default(),
            input_mode: InputMode::Normal,
            filter_input: filter.to_string(),
            show_help: false,
            detail: None,
            status_message: String::from("NetShow started. Press 'h' for help."),
            show_emojis,
            stats: ConnectionStats::default(),
            total: 0,
            bandwidth: None,
            source: None,
            sort,
            interface,
        }
    }

    /// Publish a new record set. The cursor stays on the same row index,
    /// clamped to the new length.
    pub fn apply_report(&mut self, report: RefreshReport) {
        self.records = report.records;
        self.total = report.total;
        self.stats = report.stats;
        if report.bandwidth.is_some() {
            self.bandwidth = report.bandwidth;
        }
        if report.source_used.is_some() {
            self.source = report.source_used;
        }

        let selected = match (self.table_state.selected(), self.records.len()) {
            (_, 0) => None,
            (Some(index), len) => Some(index.min(len - 1)),
            (None, _) => Some(0),
        };
        self.table_state.select(selected);
    }

    pub fn select_next(&mut self) {
        if self.records.is_empty() {
            return;
        }

        let new_index = match self.table_state.selected() {
            None => 0, // If nothing selected, select first item
            Some(idx) => (idx + 1) % self.records.len(),
        };
        self.table_state.select(Some(new_index));
    }

    pub fn select_previous(&mut self) {
        if self.records.is_empty() {
            return;
        }

        let new_index = match self.table_state.selected() {
            None => 0,
            Some(0) => self.records.len() - 1,
            Some(idx) => idx - 1,
        };
        self.table_state.select(Some(new_index));
    }

    pub fn selected_record(&self) -> Option<&ConnectionRecord> {
        self.table_state
            .selected()
            .and_then(|idx| self.records.get(idx))
    }

    /// Open the detail view for the selected row. Returns false if nothing is selected.
    pub fn open_details(&mut self) -> bool {
        let Some(record) = self.selected_record().cloned() else {
            return false;
        };
        let details = record.pid.map(ProcessDetails::lookup).unwrap_or_default();
        self.detail = Some(DetailView { record, details });
        true
    }

    pub fn close_details(&mut self) {
        self.detail = None;
    }
}

pub fn draw_ui(f: &mut Frame, app: &mut AppState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(5),    // Connection table
            Constraint::Length(1), // Filter line
            Constraint::Length(3), // Status bar
        ])
        .split(f.area());

    draw_header(f, chunks[0], app);
    draw_connection_table(f, chunks[1], app);
    draw_filter_line(f, chunks[2], app);
    draw_status_bar(f, chunks[3], app);

    if let Some(detail) = &app.detail {
        draw_detail_view(f, f.area(), detail, app.show_emojis);
    }

    // Help overlay
    if app.show_help {
        draw_help_overlay(f, f.area());
    }
}

fn draw_header(f: &mut Frame, area: Rect, app: &AppState) {
    let title = if app.show_emojis {
        "🌐 NetShow - TCP Connection Monitor"
    } else {
        "NetShow - TCP Connection Monitor"
    };
    let source = match app.source {
        Some(source) => format!("  source: {}", source),
        None => "  source: -".to_string(),
    };

    let header = Paragraph::new(Line::from(vec![
        Span::styled(title, Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::styled(source, Style::default().fg(Color::Gray)),
    ]))
    .block(Block::default().borders(Borders::ALL));

    f.render_widget(header, area);
}

fn draw_connection_table(f: &mut Frame, area: Rect, app: &mut AppState) {
    let header = Row::new(
        ["PID", "Service", "Process", "Local Address", "Remote Address", "Status"]
            .into_iter()
            .map(|title| Cell::from(title).style(Style::default().add_modifier(Modifier::BOLD))),
    );

    let rows = app.records.iter().map(|record| {
        let status = if app.show_emojis {
            format!("{} {}", record.status.icon(), record.status)
        } else {
            record.status.to_string()
        };

        Row::new(vec![
            Cell::from(record.pid_label()),
            Cell::from(record.friendly_name.clone()).style(Style::default().fg(Color::White)),
            Cell::from(record.process_name.clone()).style(Style::default().fg(Color::Gray)),
            Cell::from(record.local_address.clone()).style(Style::default().fg(Color::Green)),
            Cell::from(record.remote_address.clone()).style(Style::default().fg(Color::Yellow)),
            Cell::from(status).style(status_style(record)),
        ])
    });

    let widths = [
        Constraint::Length(8),
        Constraint::Percentage(20),
        Constraint::Percentage(15),
        Constraint::Percentage(22),
        Constraint::Percentage(22),
        Constraint::Min(12),
    ];

    let title = format!(
        "Connections ({} of {}, sort: {})",
        app.records.len(),
        app.total,
        app.sort
    );

    let table = Table::new(rows, widths)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("▶ ");

    f.render_stateful_widget(table, area, &mut app.table_state);
}

fn status_style(record: &ConnectionRecord) -> Style {
    use crate::connection::TcpStatus;

    match record.status {
        TcpStatus::Established => Style::default().fg(Color::Green),
        TcpStatus::Listen => Style::default().fg(Color::Cyan),
        TcpStatus::TimeWait | TcpStatus::CloseWait => Style::default().fg(Color::Yellow),
        _ => Style::default().fg(Color::Gray),
    }
}

fn draw_filter_line(f: &mut Frame, area: Rect, app: &AppState) {
    let line = match app.input_mode {
        InputMode::Filter => Line::from(vec![
            Span::styled("Filter: ", Style::default().fg(Color::Yellow)),
            Span::raw(&app.filter_input),
            Span::styled("█", Style::default().fg(Color::Yellow)),
            Span::styled("  [Enter] Done  [Esc] Clear", Style::default().fg(Color::DarkGray)),
        ]),
        InputMode::Normal if !app.filter_input.is_empty() => Line::from(vec![
            Span::styled("Filter: ", Style::default().fg(Color::Gray)),
            Span::raw(&app.filter_input),
        ]),
        InputMode::Normal => Line::from(""),
    };

    f.render_widget(Paragraph::new(line), area);
}

fn draw_status_bar(f: &mut Frame, area: Rect, app: &AppState) {
    let bandwidth = match &app.bandwidth {
        Some(Bandwidth {
            bytes_per_sec: Some(rate),
            packets_per_sec,
            interface,
            ..
        }) => format!(
            "{} {:.0} pkt/s [{}]",
            stats::format_rate(*rate),
            packets_per_sec.unwrap_or_default(),
            interface
        ),
        _ => format!("-- [{}]", app.interface),
    };

    let mut spans = vec![
        Span::styled(
            format!("EST {}", app.stats.established),
            Style::default().fg(Color::Green),
        ),
        Span::raw("  "),
        Span::styled(
            format!("LISTEN {}", app.stats.listening),
            Style::default().fg(Color::Cyan),
        ),
        Span::raw("  "),
        Span::styled(
            format!("TIME_WAIT {}", app.stats.time_wait),
            Style::default().fg(Color::Yellow),
        ),
        Span::raw(format!("  total {}  |  ", app.stats.total)),
        Span::styled(bandwidth, Style::default().fg(Color::Magenta)),
        Span::raw("  |  "),
    ];

    // Auto-generate hints from centralized keybindings
    for (key, description) in crate::keybindings::get_status_bar_keybindings() {
        spans.push(Span::styled(
            format!("[{}]", key),
            Style::default().fg(Color::Yellow),
        ));
        spans.push(Span::raw(format!(" {} ", description)));
    }

    spans.push(Span::raw("|  "));
    spans.push(Span::styled(
        &app.status_message,
        Style::default().fg(Color::Gray),
    ));

    let status =
        Paragraph::new(vec![Line::from(spans)]).block(Block::default().borders(Borders::ALL));

    f.render_widget(status, area);
}

fn draw_detail_view(f: &mut Frame, area: Rect, detail: &DetailView, show_emojis: bool) {
    let record = &detail.record;
    let details = &detail.details;
    let label = Style::default().fg(Color::Yellow);
    let missing = || "-".to_string();

    let field = |name: &'static str, value: String| {
        Line::from(vec![
            Span::styled(format!("{:16}", name), label),
            Span::raw(value),
        ])
    };

    let status = if show_emojis {
        format!("{} {}", record.status.icon(), record.status)
    } else {
        record.status.to_string()
    };

    let mut lines = vec![
        Line::from(Span::styled(
            "Connection",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        field("Service", record.friendly_name.clone()),
        field("Process", record.process_name.clone()),
        field("PID", record.pid_label()),
        field("Local", record.local_address.clone()),
        field("Remote", record.remote_address.clone()),
        field("Status", status),
        Line::from(""),
        Line::from(Span::styled(
            "Process",
            Style::default().add_modifier(Modifier::BOLD),
        )),
    ];

    if details.is_empty() {
        lines.push(Line::from(Span::styled(
            "Process details unavailable (exited or access denied)",
            Style::default().fg(Color::DarkGray),
        )));
    } else {
        lines.extend([
            field("Name", details.name.clone().unwrap_or_else(missing)),
            field(
                "Executable",
                details
                    .exe
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(missing),
            ),
            field("Command", details.command_line.clone().unwrap_or_else(missing)),
            field(
                "Started",
                details
                    .created
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(missing),
            ),
            field("State", details.status.clone().unwrap_or_else(missing)),
            field("User", details.user.clone().unwrap_or_else(missing)),
            field(
                "Working dir",
                details
                    .cwd
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(missing),
            ),
            field(
                "Threads",
                details.threads.map(|n| n.to_string()).unwrap_or_else(missing),
            ),
            field(
                "CPU",
                details
                    .cpu_percent
                    .map(|cpu| format!("{:.1}%", cpu))
                    .unwrap_or_else(missing),
            ),
            field(
                "Memory",
                details
                    .memory_percent
                    .map(|mem| format!("{:.1}%", mem))
                    .unwrap_or_else(missing),
            ),
            field(
                "TCP sockets",
                details
                    .connection_count
                    .map(|n| n.to_string())
                    .unwrap_or_else(missing),
            ),
        ]);

        if let Some(files) = &details.open_files {
            lines.push(field("Open files", files.len().to_string()));
            for path in files.iter().take(10) {
                lines.push(Line::from(format!("  {}", path.display())));
            }
            if files.len() > 10 {
                lines.push(Line::from(format!("  ... and {} more", files.len() - 10)));
            }
        }
    }

    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "[Esc] Back",
        Style::default().fg(Color::DarkGray),
    )));

    let view = Paragraph::new(lines)
        .style(Style::default().bg(Color::Black).fg(Color::White))
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("Details: {}", record.friendly_name))
                .style(Style::default().fg(Color::Cyan)),
        );

    let view_area = centered_rect(80, 80, area);
    f.render_widget(Clear, view_area);
    f.render_widget(view, view_area);
}

fn draw_help_overlay(f: &mut Frame, area: Rect) {
    // Auto-generate help text from centralized keybindings
    let mut help_text = vec![
        Line::from(""),
        Line::from(Span::styled(
            "NetShow - Keyboard Shortcuts",
            Style::default().add_modifier(Modifier::BOLD),
        )),
    ];

    let mut current_category = None;
    for binding in crate::keybindings::get_all_keybindings() {
        if current_category != Some(binding.category) {
            current_category = Some(binding.category);
            help_text.push(Line::from(""));
            help_text.push(Line::from(Span::styled(
                binding.category.title(),
                Style::default().fg(Color::Yellow),
            )));
        }
        help_text.push(Line::from(format!(
            "  {:12} - {}",
            binding.key, binding.description
        )));
    }

    help_text.push(Line::from(""));
    help_text.push(Line::from("Press any key to close..."));

    let help = Paragraph::new(help_text)
        .style(Style::default().bg(Color::Black).fg(Color::White))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Help")
                .style(Style::default().fg(Color::Cyan)),
        );

    let help_area = centered_rect(60, 70, area);
    f.render_widget(Clear, help_area);
    f.render_widget(help, help_area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
