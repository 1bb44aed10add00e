mod app;

use std::io;
use std::sync::Arc;
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, Paragraph, Wrap},
    Frame, Terminal,
};
use tokio::sync::watch;

use app::{truncate, y_bounds, AppState, ForecastState};
use powerlaw_dashboard::config::{Config, ConstantsMode};
use powerlaw_dashboard::dashboard::{format_date, format_usd, ChartFrame};
use powerlaw_dashboard::fetcher::{now_ms, ApiClient, SeriesFetcher};
use powerlaw_dashboard::model::{ConstantsSource, Valuation};
use powerlaw_dashboard::refresh::{RefreshHandle, SeriesRefresher};
use powerlaw_dashboard::telemetry::{FetchLatency, RefreshHealth};
use powerlaw_dashboard::types::{PriceScale, SeriesSnapshot};

const SCRUBBER_STEP: f64 = 2.0;

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> io::Result<()> {
    let cfg = Config::from_env().map_err(io::Error::other)?;

    let latency = Arc::new(FetchLatency::new());
    let client = Arc::new(ApiClient::from_config(&cfg, Arc::clone(&latency)).map_err(io::Error::other)?);
    let fetcher = Arc::new(SeriesFetcher::new(
        Arc::clone(&client),
        cfg.constants.clone(),
        cfg.fallback_seed,
    ));
    let source = match cfg.constants_mode {
        ConstantsMode::Local => ConstantsSource::Local(cfg.constants.clone()),
        ConstantsMode::Remote => ConstantsSource::Remote(Arc::clone(&client)),
    };

    let health = Arc::new(RefreshHealth::new());
    let handle = SeriesRefresher::new(fetcher, cfg.refresh_interval, Arc::clone(&health)).spawn();
    let mut app = AppState::new(client.base_url().to_string());

    // Terminal setup
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let ctx = Telemetry {
        latency: &latency,
        health: &health,
        refresh_secs: cfg.refresh_interval.as_secs(),
    };
    let result = run_loop(&mut terminal, &mut app, &handle, &source, &ctx).await;

    // Restore terminal regardless of result
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    handle.stop().await;
    result
}

struct Telemetry<'a> {
    latency: &'a FetchLatency,
    health: &'a RefreshHealth,
    refresh_secs: u64,
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

async fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut AppState,
    handle: &RefreshHandle,
    source: &ConstantsSource,
    ctx: &Telemetry<'_>,
) -> io::Result<()> {
    let poll_interval = Duration::from_millis(250);
    let mut snapshots: watch::Receiver<Option<Arc<SeriesSnapshot>>> = handle.subscribe();

    loop {
        if snapshots.has_changed().unwrap_or(false) {
            let latest = snapshots.borrow_and_update().clone();
            if let Some(snapshot) = latest {
                app.set_snapshot(snapshot, now_ms());
            }
        }
        app.poll_forecast();
        app.update_forecast(source);

        terminal.draw(|f| render(f, app, ctx))?;

        if !event::poll(poll_interval)? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        match key.code {
            KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => return Ok(()),
            KeyCode::Char('r') | KeyCode::Char('R') => handle.request_refresh(),
            KeyCode::Char('t') => app.controls.next_timeframe(),
            KeyCode::Char('l') => app.controls.toggle_scale(),
            KeyCode::Char('a') => app.controls.toggle_advanced(),
            KeyCode::Left => app.controls.move_scrubber(-SCRUBBER_STEP),
            KeyCode::Right => app.controls.move_scrubber(SCRUBBER_STEP),
            KeyCode::Char('[') => app.controls.step_year(-1),
            KeyCode::Char(']') => app.controls.step_year(1),
            KeyCode::Char('s') => app.prepare_share(),
            _ => continue,
        }
        app.rebuild(now_ms());
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render(f: &mut Frame, app: &AppState, ctx: &Telemetry<'_>) {
    let area = f.area();

    // Outer vertical split: header | alert | chart | panels | share | footer
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // header
            Constraint::Length(3), // valuation alert
            Constraint::Min(10),   // chart
            Constraint::Length(7), // forecast + time machine
            Constraint::Length(4), // share
            Constraint::Length(1), // footer
        ])
        .split(area);

    render_header(f, app, ctx, chunks[0]);
    render_alert(f, app, chunks[1]);
    render_chart(f, app, chunks[2]);
    render_panels(f, app, chunks[3]);
    render_share(f, app, chunks[4]);
    render_footer(f, ctx, chunks[5]);
}

fn bordered(title: &str) -> Block<'_> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(Span::styled(
            title,
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ))
}

fn render_header(f: &mut Frame, app: &AppState, ctx: &Telemetry<'_>, area: Rect) {
    let (status_text, status_color) = match (&app.summary, ctx.health.fallback_active()) {
        (None, _) => ("◌ loading".to_string(), Color::Yellow),
        (Some(_), false) => ("● live".to_string(), Color::Green),
        (Some(_), true) => (
            format!("✗ simulated ({} failed)", ctx.health.consecutive_failures()),
            Color::Red,
        ),
    };

    let price = app
        .summary
        .as_ref()
        .and_then(|s| s.current_price)
        .map_or("—".to_string(), format_usd);
    let deviation = app
        .summary
        .as_ref()
        .and_then(|s| s.deviation)
        .map_or("—".to_string(), |d| format!("{d:+.1}% vs model"));
    let latency = ctx
        .latency
        .percentiles_ms()
        .map_or("—".to_string(), |(p50, _, p99)| format!("p50 {p50:.0}ms / p99 {p99:.0}ms"));

    let spans = vec![
        Span::styled(
            " BTC Power Law  ",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::styled(status_text, Style::default().fg(status_color)),
        Span::raw("  │  "),
        Span::styled(price, Style::default().fg(Color::White).add_modifier(Modifier::BOLD)),
        Span::raw("  │  "),
        Span::styled(deviation, Style::default().fg(Color::White)),
        Span::raw("  │  "),
        Span::styled(latency, Style::default().fg(Color::DarkGray)),
        Span::raw("  │  "),
        Span::styled(truncate(&app.base_url, 32), Style::default().fg(Color::DarkGray)),
    ];

    let paragraph = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::DarkGray)));
    f.render_widget(paragraph, area);
}

fn render_alert(f: &mut Frame, app: &AppState, area: Rect) {
    let Some(summary) = &app.summary else {
        f.render_widget(Paragraph::new("Loading price history…").block(bordered(" VALUATION ")), area);
        return;
    };

    let mut spans = match (summary.valuation, summary.deviation) {
        (Some(v), Some(d)) => {
            let color = match v {
                Valuation::Overvalued => Color::Red,
                Valuation::Undervalued => Color::Green,
                Valuation::Neutral => Color::Yellow,
            };
            vec![
                Span::styled(format!(" {} ", v.headline()), Style::default().fg(color).add_modifier(Modifier::BOLD)),
                Span::raw(v.description(d)),
            ]
        }
        _ => vec![Span::styled(" No model comparison available", Style::default().fg(Color::DarkGray))],
    };
    if let Some(notice) = summary.notice() {
        spans.push(Span::raw("  │  "));
        spans.push(Span::styled(notice, Style::default().fg(Color::Yellow)));
    }

    let paragraph = Paragraph::new(Line::from(spans))
        .wrap(Wrap { trim: true })
        .block(bordered(" VALUATION "));
    f.render_widget(paragraph, area);
}

fn render_chart(f: &mut Frame, app: &AppState, area: Rect) {
    let title = format!(
        " PRICE vs MODEL  [{}]  [{}]{} ",
        app.controls.timeframe,
        app.controls.scale,
        if app.controls.advanced { "  [advanced]" } else { "" },
    );
    let Some(frame) = app.chart.as_ref().filter(|c| !c.points.is_empty()) else {
        f.render_widget(Paragraph::new("No data in range").block(bordered(&title)), area);
        return;
    };

    let actual = frame.plot(|p| p.actual_price);
    let model = frame.plot(|p| p.model_price);
    let overlays = overlay_series(frame);

    let mut plotted: Vec<&[(f64, f64)]> = vec![actual.as_slice(), model.as_slice()];
    plotted.extend(overlays.iter().map(|(_, _, d)| d.as_slice()));
    let [y_lo, y_hi] = y_bounds(plotted);

    let x_lo = frame.points.first().map_or(0.0, |p| p.timestamp as f64);
    let x_hi = frame.points.last().map_or(1.0, |p| p.timestamp as f64).max(x_lo + 1.0);

    let halvings: Vec<[(f64, f64); 2]> = frame
        .overlays
        .as_ref()
        .map(|o| o.halvings.iter().map(|&t| [(t as f64, y_lo), (t as f64, y_hi)]).collect())
        .unwrap_or_default();

    let mut datasets = vec![
        line_dataset("Actual", Color::Yellow, &actual),
        line_dataset("Model", Color::Cyan, &model),
    ];
    for (name, color, data) in &overlays {
        datasets.push(line_dataset(name, *color, data));
    }
    for h in &halvings {
        datasets.push(line_dataset("", Color::Magenta, h));
    }

    let x_labels = vec![
        format_date(x_lo as i64),
        format_date(((x_lo + x_hi) / 2.0) as i64),
        format_date(x_hi as i64),
    ];
    let y_labels: Vec<String> = [y_lo, (y_lo + y_hi) / 2.0, y_hi]
        .iter()
        .map(|&y| match frame.scale {
            PriceScale::Logarithmic => format_usd(10f64.powf(y)),
            PriceScale::Linear => format_usd(y),
        })
        .collect();

    let chart = Chart::new(datasets)
        .block(bordered(&title))
        .x_axis(
            Axis::default()
                .style(Style::default().fg(Color::DarkGray))
                .bounds([x_lo, x_hi])
                .labels(x_labels),
        )
        .y_axis(
            Axis::default()
                .style(Style::default().fg(Color::DarkGray))
                .bounds([y_lo, y_hi])
                .labels(y_labels),
        );
    f.render_widget(chart, area);
}

/// Advanced overlays as named, coloured plot series. Empty outside advanced mode.
fn overlay_series(frame: &ChartFrame) -> Vec<(&'static str, Color, Vec<(f64, f64)>)> {
    let Some(o) = &frame.overlays else {
        return Vec::new();
    };
    let dense = |v: &[f64]| v.iter().copied().map(Some).collect::<Vec<_>>();
    vec![
        ("+30%", Color::Red, frame.plot_overlay(&dense(o.upper_band.as_slice()))),
        ("-30%", Color::Green, frame.plot_overlay(&dense(o.lower_band.as_slice()))),
        ("Support", Color::Blue, frame.plot_overlay(&dense(o.support.as_slice()))),
        ("MA200", Color::LightMagenta, frame.plot_overlay(&o.ma_short)),
        ("MA350", Color::LightBlue, frame.plot_overlay(&o.ma_long)),
    ]
}

fn line_dataset<'a>(name: &'a str, color: Color, data: &'a [(f64, f64)]) -> Dataset<'a> {
    Dataset::default()
        .name(name)
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(color))
        .data(data)
}

fn render_panels(f: &mut Frame, app: &AppState, area: Rect) {
    let halves = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);

    render_forecast(f, app, halves[0]);
    render_time_machine(f, app, halves[1]);
}

fn render_forecast(f: &mut Frame, app: &AppState, area: Rect) {
    let title = format!(" FORECAST {} ", app.controls.forecast_year);
    let label = Style::default().fg(Color::DarkGray);
    let lines = match &app.forecast {
        ForecastState::Pending => vec![Line::from("Waiting for data…")],
        ForecastState::Unavailable(e) => vec![
            Line::from(Span::styled("Forecast unavailable", Style::default().fg(Color::Red))),
            Line::from(Span::styled(truncate(e, 60), label)),
        ],
        ForecastState::Ready(p) => {
            let mut lines = vec![
                Line::from(vec![
                    Span::styled("Base projection  ", label),
                    Span::styled(format_usd(p.base_projection), Style::default().add_modifier(Modifier::BOLD)),
                ]),
                Line::from(vec![
                    Span::styled("Range (90%)      ", label),
                    Span::raw(format!("{} – {}", format_usd(p.lower_bound), format_usd(p.upper_bound))),
                ]),
            ];
            if let Some(stats) = p.historical_deviation {
                lines.push(Line::from(vec![
                    Span::styled("Hist. deviation  ", label),
                    Span::raw(format!("{:+.1}% avg, σ {:.1}%", stats.average, stats.standard_deviation)),
                ]));
            }
            lines
        }
    };
    f.render_widget(Paragraph::new(lines).block(bordered(&title)), area);
}

fn render_time_machine(f: &mut Frame, app: &AppState, area: Rect) {
    let title = format!(" TIME MACHINE {:.0}% ", app.controls.scrubber);
    let label = Style::default().fg(Color::DarkGray);
    let lines = match &app.reading {
        None => vec![Line::from("No data")],
        Some(r) => vec![
            Line::from(vec![
                Span::styled("Date    ", label),
                Span::raw(format_date(r.point.timestamp)),
            ]),
            Line::from(vec![
                Span::styled("Actual  ", label),
                Span::raw(format_usd(r.point.actual_price)),
            ]),
            Line::from(vec![
                Span::styled("Model   ", label),
                Span::raw(format_usd(r.point.model_price)),
            ]),
            Line::from(r.describe()),
        ],
    };
    f.render_widget(Paragraph::new(lines).block(bordered(&title)), area);
}

fn render_share(f: &mut Frame, app: &AppState, area: Rect) {
    let lines = match &app.share {
        None => vec![Line::from(Span::styled(
            "Press [s] to compose a share message",
            Style::default().fg(Color::DarkGray),
        ))],
        Some((text, url)) => vec![
            Line::from(text.as_str()),
            Line::from(Span::styled(url.as_str(), Style::default().fg(Color::Blue))),
        ],
    };
    let paragraph = Paragraph::new(lines).wrap(Wrap { trim: false }).block(bordered(" SHARE "));
    f.render_widget(paragraph, area);
}

fn render_footer(f: &mut Frame, ctx: &Telemetry<'_>, area: Rect) {
    let key = Style::default().fg(Color::Yellow);
    let line = Line::from(vec![
        Span::styled(" [q] ", key),
        Span::raw("quit  "),
        Span::styled("[r] ", key),
        Span::raw("refresh  "),
        Span::styled("[t] ", key),
        Span::raw("timeframe  "),
        Span::styled("[l] ", key),
        Span::raw("log/linear  "),
        Span::styled("[a] ", key),
        Span::raw("advanced  "),
        Span::styled("[←→] ", key),
        Span::raw("time machine  "),
        Span::styled("[ [ ] ] ", key),
        Span::raw("year  "),
        Span::styled("[s] ", key),
        Span::raw("share  "),
        Span::styled(
            format!("auto-refresh: {}s", ctx.refresh_secs),
            Style::default().fg(Color::DarkGray),
        ),
    ]);
    f.render_widget(Paragraph::new(line).style(Style::default().fg(Color::White)), area);
}
