//! Plain-terminal rendering of a `DashboardView`.

use std::io::Write;

use signalslice_core::gauges::ANOMALY_VALUE;
use signalslice_core::{DashboardView, Event, IndexGauge, Severity};
use thiserror::Error;

use crate::context::{BOLD, DIM, mode_style, paint, severity_style};

/// How long a notice stays on screen.
pub const NOTICE_TTL_MS: u64 = 5_000;

const SPARK: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("render io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("panel not in layout: {0}")]
    MissingPanel(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Panel {
    Header,
    Gauges,
    Stats,
    Notice,
    Feed,
}

impl Panel {
    pub const ALL: [Self; 5] = [
        Self::Header,
        Self::Gauges,
        Self::Stats,
        Self::Notice,
        Self::Feed,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Header => "header",
            Self::Gauges => "gauges",
            Self::Stats => "stats",
            Self::Notice => "notice",
            Self::Feed => "feed",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(name.trim()))
    }
}

pub trait Renderer {
    fn render(&mut self, view: &DashboardView<'_>) -> Result<(), RenderError>;
}

pub struct TerminalRenderer<W: Write> {
    out: W,
    use_color: bool,
    clear_screen: bool,
    panels: Vec<Panel>,
}

impl<W: Write> TerminalRenderer<W> {
    pub fn new(out: W, use_color: bool) -> Self {
        Self {
            out,
            use_color,
            clear_screen: use_color,
            panels: Panel::ALL.to_vec(),
        }
    }

    /// Restrict the layout. An empty list keeps every panel.
    pub fn with_panels(mut self, panels: Vec<Panel>) -> Self {
        if !panels.is_empty() {
            self.panels = panels;
        }
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn frame(&self, view: &DashboardView<'_>) -> String {
        let c = self.use_color;
        let mut frame = String::new();
        for panel in &self.panels {
            match panel {
                Panel::Header => {
                    let badge = format!("[{}]", view.mode);
                    frame.push_str(&format!(
                        "{}  {}  {}\n\n",
                        paint("SignalSlice", BOLD, c),
                        paint(&badge, mode_style(view.mode), c),
                        view.wall_time.format("%H:%M:%S"),
                    ));
                }
                Panel::Gauges => {
                    for gauge in [view.pizza, view.gay_bar] {
                        frame.push_str(&format_gauge(gauge, c));
                        frame.push('\n');
                    }
                    frame.push('\n');
                }
                Panel::Stats => {
                    let stats = view.stats;
                    let mut line = format!(
                        "Scans {} | Anomalies {} | Locations {} | Last scan: {}",
                        stats.scan_count,
                        stats.anomaly_count,
                        stats.active_locations,
                        last_scan_label(stats.minutes_since_scan(view.now_ms)),
                    );
                    if stats.scanning {
                        line.push_str(" | scanning...");
                    }
                    frame.push_str(&line);
                    frame.push_str("\n\n");
                }
                Panel::Notice => {
                    if let Some(notice) = view.notice {
                        if view.now_ms.saturating_sub(notice.raised_ms) < NOTICE_TTL_MS {
                            let text = format!("» {}", notice.text);
                            frame.push_str(&paint(&text, severity_style(notice.severity), c));
                            frame.push_str("\n\n");
                        }
                    }
                }
                Panel::Feed => {
                    frame.push_str(&paint("── Activity ──", BOLD, c));
                    frame.push('\n');
                    if view.events.is_empty() {
                        frame.push_str("(no activity yet)\n");
                    }
                    for event in view.events.iter() {
                        frame.push_str(&format_event_line(event, c));
                        frame.push('\n');
                    }
                }
            }
        }
        frame.push('\n');
        frame.push_str(&paint("[s] scan  [r] retry  [q] quit", DIM, c));
        frame.push('\n');
        frame
    }
}

impl<W: Write> Renderer for TerminalRenderer<W> {
    fn render(&mut self, view: &DashboardView<'_>) -> Result<(), RenderError> {
        if !self.panels.contains(&Panel::Feed) {
            return Err(RenderError::MissingPanel(Panel::Feed.name()));
        }
        let frame = self.frame(view);
        if self.clear_screen {
            // Clear screen + cursor home
            self.out.write_all(b"\x1b[2J\x1b[H")?;
        }
        self.out.write_all(frame.as_bytes())?;
        self.out.flush()?;
        Ok(())
    }
}

// ---- Formatting helpers ----

/// `HH:MM:SS  CATEGORY    message`
pub fn format_event_line(event: &Event, use_color: bool) -> String {
    let stamp = event.occurred_at().format("%H:%M:%S").to_string();
    format!(
        "{}  {:<10} {}",
        paint(&stamp, DIM, use_color),
        event.category().as_str(),
        paint(event.message(), severity_style(event.severity()), use_color),
    )
}

pub fn last_scan_label(minutes: Option<u64>) -> String {
    match minutes {
        None => "Never".to_string(),
        Some(0) => "Just completed".to_string(),
        Some(1) => "1 min ago".to_string(),
        Some(n) => format!("{n} min ago"),
    }
}

pub fn format_change(change_percent: Option<f64>) -> String {
    match change_percent {
        Some(change) => format!("{change:+.1}%"),
        None => "--".to_string(),
    }
}

/// Threat label for an index on the 0-10 scale.
pub fn threat_level(value: f64) -> (&'static str, Severity) {
    let percent = value * 10.0;
    if percent < 30.0 {
        ("LOW", Severity::Success)
    } else if percent < 70.0 {
        ("MODERATE", Severity::Warning)
    } else {
        ("HIGH", Severity::Critical)
    }
}

/// One bar per chart point, scaled to the 0-10 index range.
pub fn sparkline(values: impl Iterator<Item = f64>) -> String {
    values
        .map(|v| {
            let scaled = (v.clamp(0.0, 10.0) / 10.0 * (SPARK.len() - 1) as f64).round();
            SPARK[(scaled as usize).min(SPARK.len() - 1)]
        })
        .collect()
}

fn format_gauge(gauge: &IndexGauge, use_color: bool) -> String {
    let (threat, severity) = threat_level(gauge.value());
    let marker = if gauge.is_anomalous() || gauge.value() > ANOMALY_VALUE {
        paint(" !", severity_style(Severity::Critical), use_color)
    } else {
        String::new()
    };
    format!(
        "{:<14} {:>5.2}  {:>7}  {:<8}  {}{}",
        gauge.kind().label(),
        gauge.value(),
        format_change(gauge.change_percent()),
        paint(threat, severity_style(severity), use_color),
        sparkline(gauge.history().map(|p| p.value)),
        marker,
    )
}
