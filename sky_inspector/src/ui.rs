use std::collections::VecDeque;

use ratatui::layout::{Constraint, Direction, Layout, Margin};
use ratatui::prelude::Rect;
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Frame;

use sky_bridge::{
    ActiveLight, BackgroundStrategy, BridgeMetrics, BridgeMode, CelestialBody, CommandOutcome,
    LinearColor, SkyState,
};

pub struct UiState {
    pub logs: VecDeque<String>,
    pub max_logs: usize,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            logs: VecDeque::new(),
            max_logs: 8,
        }
    }
}

impl UiState {
    pub fn push_log<S: Into<String>>(&mut self, line: S) {
        let mut text: String = line.into();
        while text.ends_with('\n') || text.ends_with('\r') {
            text.pop();
        }
        if text.is_empty() {
            return;
        }
        self.logs.push_front(text);
        while self.logs.len() > self.max_logs {
            self.logs.pop_back();
        }
    }
}

/// Copy of the frame loop's resources taken once per redraw.
pub struct BridgeView {
    pub mode: BridgeMode,
    pub background: BackgroundStrategy,
    pub reachable: bool,
    pub state: Option<SkyState>,
    pub last_command: Option<(&'static str, CommandOutcome)>,
    pub light: ActiveLight,
    pub flare: bool,
    pub metrics: BridgeMetrics,
    pub fov_deg: f64,
    pub yaw_deg: f32,
    pub pitch_deg: f32,
}

pub fn draw_ui(frame: &mut Frame, state: &UiState, view: &BridgeView) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(9),
            Constraint::Length(9),
            Constraint::Min(5),
        ])
        .split(frame.size());
    let middle = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(rows[1]);
    let lower = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(rows[2]);

    draw_header(frame, rows[0], view);
    draw_sky(frame, middle[0], view);
    draw_light(frame, middle[1], view);
    draw_commands(frame, lower[0]);
    draw_metrics(frame, lower[1], view);
    draw_logs(frame, rows[3], state);
}

fn boxed(frame: &mut Frame, area: Rect, title: &str, lines: Vec<Line>) {
    let block = Block::default().borders(Borders::ALL).title(title.to_string());
    let paragraph = Paragraph::new(lines).wrap(Wrap { trim: false });
    frame.render_widget(block, area);
    frame.render_widget(
        paragraph,
        area.inner(&Margin {
            vertical: 1,
            horizontal: 1,
        }),
    );
}

fn draw_header(frame: &mut Frame, area: Rect, view: &BridgeView) {
    let mode_color = match view.mode {
        BridgeMode::Live => Color::Green,
        BridgeMode::Snapshot => Color::Yellow,
    };
    let (link, link_color) = if view.reachable {
        ("reachable", Color::Green)
    } else {
        ("offline", Color::Red)
    };
    let line = Line::from(vec![
        Span::styled(view.mode.to_string(), Style::default().fg(mode_color)),
        Span::raw(format!(" | background {:?} | remote ", view.background)),
        Span::styled(link, Style::default().fg(link_color)),
        Span::raw(" | q to exit"),
    ]);
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Sky Bridge Inspector");
    let text = Paragraph::new(line).wrap(Wrap { trim: true });
    frame.render_widget(block, area);
    frame.render_widget(
        text,
        area.inner(&Margin {
            vertical: 1,
            horizontal: 1,
        }),
    );
}

fn body_line(name: &'static str, body: &CelestialBody) -> Line<'static> {
    let color = if body.altitude > 0.0 {
        Color::White
    } else {
        Color::DarkGray
    };
    Line::from(vec![
        Span::styled(format!("{name:<6}"), Style::default().fg(Color::Yellow)),
        Span::styled(
            format!(
                "alt {:>7.2}  az {:>7.2}  mag {:>6.2} ({:>6.2})",
                body.altitude, body.azimuth, body.magnitude, body.magnitude_extincted
            ),
            Style::default().fg(color),
        ),
    ])
}

fn draw_sky(frame: &mut Frame, area: Rect, view: &BridgeView) {
    let lines = match &view.state {
        Some(sky) => vec![
            Line::from(format!("JD {:.5}  rate {}", sky.time.julian_day, sky.time.time_rate)),
            Line::from(format!("UTC {}", sky.time.utc)),
            body_line("Sun", &sky.sun),
            body_line("Moon", &sky.moon),
            body_line("Venus", &sky.venus),
            Line::from(format!(
                "moon lit {:.0}%  ambient {:.3}",
                sky.moon_illumination * 100.0,
                sky.ambient_intensity
            )),
        ],
        None => vec![Line::from(Span::styled(
            "no sky state yet",
            Style::default().fg(Color::DarkGray),
        ))],
    };
    boxed(frame, area, "Sky", lines);
}

fn color_text(color: LinearColor) -> String {
    format!("{:.2} {:.2} {:.2}", color.r, color.g, color.b)
}

fn draw_light(frame: &mut Frame, area: Rect, view: &BridgeView) {
    let light = &view.light;
    let impostor = match light.impostor {
        Some(impostor) => format!("scale {:.2}", impostor.scale),
        None => "hidden".to_string(),
    };
    let lines = vec![
        Line::from(vec![
            Span::styled("source  ", Style::default().fg(Color::Yellow)),
            Span::raw(format!("{} ({})", light.source, if light.enabled { "on" } else { "off" })),
        ]),
        Line::from(format!(
            "dir     alt {:.2} az {:.2}",
            light.direction.altitude.to_degrees(),
            light.direction.azimuth.to_degrees()
        )),
        Line::from(format!("color   {}", color_text(light.color))),
        Line::from(format!("ambient {}", color_text(light.ambient))),
        Line::from(format!("shadows {:?}  intensity {:.1}", light.shadows, light.intensity)),
        Line::from(format!(
            "flare   {}  sun disk {}",
            if view.flare { "visible" } else { "hidden" },
            impostor
        )),
        Line::from(format!(
            "camera  yaw {:.0} pitch {:.0} fov {:.1}",
            view.yaw_deg, view.pitch_deg, view.fov_deg
        )),
    ];
    boxed(frame, area, "Light", lines);
}

fn draw_commands(frame: &mut Frame, area: Rect) {
    let entries = [
        ("l", "toggle live / snapshot"),
        ("+ -", "shift time one hour (0 stops)"),
        ("a g m", "atmosphere, ground, moon scale"),
        ("r s", "skybox script, reload snapshot"),
        ("arrows [ ]", "turn camera, zoom"),
        (", .", "light exposure down / up"),
        ("q", "exit inspector"),
    ];
    let lines = entries
        .iter()
        .map(|(key, help)| {
            Line::from(vec![
                Span::styled(format!("{key:<11}"), Style::default().fg(Color::Yellow)),
                Span::raw(*help),
            ])
        })
        .collect();
    boxed(frame, area, "Commands", lines);
}

fn draw_metrics(frame: &mut Frame, area: Rect, view: &BridgeView) {
    let metrics = &view.metrics;
    let last = match &view.last_command {
        Some((request, CommandOutcome::Applied)) => format!("{request}: applied"),
        Some((request, CommandOutcome::Dropped(reason))) => format!("{request}: dropped {reason:?}"),
        Some((request, CommandOutcome::Rejected(body))) => format!("{request}: rejected {body}"),
        Some((request, CommandOutcome::Failed(err))) => format!("{request}: {err}"),
        None => "-".to_string(),
    };
    let lines = vec![
        Line::from(format!("frames {}", metrics.frames)),
        Line::from(format!(
            "sky updates {}  unavailable {}",
            metrics.sky_updates, metrics.sky_unavailable
        )),
        Line::from(format!(
            "mode changes {}  light changes {}",
            metrics.mode_transitions, metrics.light_source_changes
        )),
        Line::from(format!(
            "commands {} ({} dropped)",
            metrics.commands_completed, metrics.commands_dropped
        )),
        Line::from(format!("last {last}")),
    ];
    boxed(frame, area, "Metrics", lines);
}

fn draw_logs(frame: &mut Frame, area: Rect, state: &UiState) {
    let lines: Vec<Line> = state
        .logs
        .iter()
        .map(|entry| Line::from(Span::raw(entry.as_str())))
        .collect();
    boxed(frame, area, "Logs", lines);
}
