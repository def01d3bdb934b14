use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};

use bevy::math::Vec3;
use bevy::prelude::App;
use color_eyre::Result;
use crossterm::event::{self, Event, KeyCode};
use ratatui::backend::CrosstermBackend;
use ratatui::prelude::*;
use sky_bridge::{
    run_frame, set_exposure, BridgeLink, BridgeMetrics, BridgeRequest, CameraView, FlareState,
    LightCache, LightResolver, SceneSky,
};
use tracing::{info, warn};

use crate::ui::{draw_ui, BridgeView, UiState};

const YAW_STEP_DEG: f32 = 5.0;
const PITCH_STEP_DEG: f32 = 5.0;
const FOV_STEP: f64 = 1.25;
const MIN_FOV: f64 = 1.0;
const MAX_FOV: f64 = 120.0;
const EXPOSURE_STEP: f32 = 0.1;

/// Properties and actions reachable from single keys.
const MOON_SCALE_PROPERTY: &str = "SolarSystem.flagMoonScale";
const GROUND_ACTION: &str = "actionShow_Ground";
const ATMOSPHERE_ACTION: &str = "actionShow_Atmosphere";

pub struct InspectorApp {
    terminal: Terminal<CrosstermBackend<std::io::Stdout>>,
    ui_state: UiState,
    frame_loop: App,
    log_receiver: Receiver<String>,
    yaw_deg: f32,
    pitch_deg: f32,
    frame_interval: Duration,
}

impl InspectorApp {
    pub fn new(frame_loop: App, log_receiver: Receiver<String>) -> Result<Self> {
        let stdout = std::io::stdout();
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        crossterm::terminal::enable_raw_mode()?;
        terminal.clear()?;
        terminal.hide_cursor()?;
        Ok(Self {
            terminal,
            ui_state: UiState::default(),
            frame_loop,
            log_receiver,
            yaw_deg: 0.0,
            pitch_deg: 10.0,
            frame_interval: Duration::from_millis(33),
        })
    }

    pub fn run(mut self) -> Result<()> {
        let mut last_draw = Instant::now();
        let mut last_frame = Instant::now();
        self.apply_camera();

        loop {
            if last_frame.elapsed() >= self.frame_interval {
                run_frame(&mut self.frame_loop);
                last_frame = Instant::now();
            }

            while let Ok(line) = self.log_receiver.try_recv() {
                self.ui_state.push_log(line);
            }

            if last_draw.elapsed() >= Duration::from_millis(100) {
                let view = self.capture();
                self.terminal
                    .draw(|frame| draw_ui(frame, &self.ui_state, &view))?;
                last_draw = Instant::now();
            }

            if event::poll(Duration::from_millis(20))? {
                if let Event::Key(key) = event::read()? {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => break,
                        KeyCode::Char('l') => self.request(BridgeRequest::ToggleMode),
                        KeyCode::Char('=') | KeyCode::Char('+') => {
                            self.request(BridgeRequest::ShiftTime { hours: 1.0 })
                        }
                        KeyCode::Char('-') | KeyCode::Char('_') => {
                            self.request(BridgeRequest::ShiftTime { hours: -1.0 })
                        }
                        KeyCode::Char('0') => {
                            self.request(BridgeRequest::SetTimeRate { rate: 0.0 })
                        }
                        KeyCode::Char('r') => self.request(BridgeRequest::RunSkyboxScript),
                        KeyCode::Char('s') => self.request(BridgeRequest::ReloadSnapshot),
                        KeyCode::Char('m') => self.request(BridgeRequest::ToggleProperty {
                            id: MOON_SCALE_PROPERTY.to_string(),
                        }),
                        KeyCode::Char('g') => self.request(BridgeRequest::DoAction {
                            id: GROUND_ACTION.to_string(),
                        }),
                        KeyCode::Char('a') => self.request(BridgeRequest::DoAction {
                            id: ATMOSPHERE_ACTION.to_string(),
                        }),
                        KeyCode::Char(',') => self.expose(-EXPOSURE_STEP),
                        KeyCode::Char('.') => self.expose(EXPOSURE_STEP),
                        KeyCode::Char('[') => self.zoom(1.0 / FOV_STEP),
                        KeyCode::Char(']') => self.zoom(FOV_STEP),
                        KeyCode::Left => self.turn(-YAW_STEP_DEG, 0.0),
                        KeyCode::Right => self.turn(YAW_STEP_DEG, 0.0),
                        KeyCode::Up => self.turn(0.0, PITCH_STEP_DEG),
                        KeyCode::Down => self.turn(0.0, -PITCH_STEP_DEG),
                        _ => {}
                    }
                }
            }
        }

        self.terminal.show_cursor()?;
        crossterm::terminal::disable_raw_mode()?;
        Ok(())
    }

    fn request(&mut self, request: BridgeRequest) {
        let label = request.label();
        if self.frame_loop.world.resource::<BridgeLink>().send(request) {
            info!("Requested {}", label);
        } else {
            warn!("Bridge worker is gone; {} not sent", label);
            self.ui_state.push_log("Bridge worker stopped");
        }
    }

    fn expose(&mut self, step: f32) {
        let current = self.frame_loop.world.resource::<LightResolver>().exposure();
        set_exposure(&mut self.frame_loop.world, current + step);
    }

    fn zoom(&mut self, factor: f64) {
        let mut camera = self.frame_loop.world.resource_mut::<CameraView>();
        camera.fov_deg = (camera.fov_deg * factor).clamp(MIN_FOV, MAX_FOV);
    }

    fn turn(&mut self, yaw: f32, pitch: f32) {
        self.yaw_deg = (self.yaw_deg + yaw).rem_euclid(360.0);
        self.pitch_deg = (self.pitch_deg + pitch).clamp(-90.0, 90.0);
        self.apply_camera();
    }

    fn apply_camera(&mut self) {
        let (yaw, pitch) = (self.yaw_deg.to_radians(), self.pitch_deg.to_radians());
        let forward = Vec3::new(pitch.cos() * yaw.sin(), pitch.sin(), pitch.cos() * yaw.cos());
        self.frame_loop.world.resource_mut::<CameraView>().forward = forward;
    }

    fn capture(&self) -> BridgeView {
        let world = &self.frame_loop.world;
        let sky = world.resource::<SceneSky>();
        BridgeView {
            mode: sky.mode,
            background: sky.background,
            reachable: sky.reachable,
            state: sky.state.clone(),
            last_command: sky.last_command.clone(),
            light: world.resource::<LightCache>().light_or_fallback(),
            flare: world.resource::<FlareState>().visible,
            metrics: world.resource::<BridgeMetrics>().clone(),
            fov_deg: world.resource::<CameraView>().fov_deg,
            yaw_deg: self.yaw_deg,
            pitch_deg: self.pitch_deg,
        }
    }
}
