// SPDX-License-Identifier: GPL-3.0-only

//! Terminal-based camera viewer
//!
//! Renders the preview with Unicode half-block characters and outlines the
//! detected quadrilateral: green when it has a target aspect, yellow otherwise.

use crate::Config;
use crate::backends::camera::{CameraFrame, ExposureMode, FocusMode, Point, SessionPreset};
use crate::detection::Quadrilateral;
use crate::pipelines::video::RecordingState;
use crate::session::{CameraCoordinator, CameraEvent, CameraSetupResult, FreezeFrame};

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Terminal, backend::CrosstermBackend, buffer::Buffer, layout::Rect, style::Color,
    widgets::Widget,
};
use std::io::{self, stdout};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

const EXPOSURE_STEP: f32 = 0.25;

/// Run the terminal camera viewer
pub fn run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let mut coordinator = CameraCoordinator::from_config(config)?;

    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, &mut coordinator);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    coordinator.turn_camera_off();
    result
}

struct ViewerState {
    frame_widget: FrameWidget,
    status_message: String,
    show_help: bool,
    exposure: f32,
}

impl ViewerState {
    fn new() -> Self {
        Self {
            frame_widget: FrameWidget::default(),
            status_message: String::from("Starting camera..."),
            show_help: false,
            exposure: 0.0,
        }
    }

    fn freeze(&mut self, image: Option<FreezeFrame>) {
        self.frame_widget.freeze = image.map(|img| {
            let (width, height) = img.dimensions();
            Arc::new(CameraFrame::from_rgba(
                width,
                height,
                img.into_raw(),
                Duration::ZERO,
            ))
        });
    }
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    coordinator: &mut CameraCoordinator,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut state = ViewerState::new();

    if coordinator.setup_result() == CameraSetupResult::NotDetermined {
        coordinator.request_access_to_camera();
    } else {
        coordinator.configure_camera();
    }

    loop {
        while let Some(event) = coordinator.try_next_event() {
            handle_event(coordinator, &mut state, event);
        }
        state.frame_widget.frame = coordinator.latest_frame();
        if !coordinator.is_configuring() {
            state.frame_widget.freeze = None;
        }

        terminal.draw(|f| {
            let area = f.area();

            // Reserve bottom line for status
            let camera_area = Rect {
                x: area.x,
                y: area.y,
                width: area.width,
                height: area.height.saturating_sub(1),
            };
            f.render_widget(&state.frame_widget, camera_area);

            let status_area = Rect {
                x: area.x,
                y: area.height.saturating_sub(1),
                width: area.width,
                height: 1,
            };
            let message = if state.show_help {
                help_message(coordinator.preset())
            } else {
                format!("{} | {}", mode_summary(coordinator), state.status_message)
            };
            f.render_widget(StatusBar { message: &message }, status_area);
        })?;

        if event::poll(Duration::from_millis(16))?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
                break;
            }
            match key.code {
                KeyCode::Char('q') => break,
                KeyCode::Char('h') => state.show_help = !state.show_help,
                KeyCode::Char('p') => {
                    if coordinator.preset() == SessionPreset::Photo {
                        coordinator.capture_photo();
                    } else {
                        state.status_message = String::from("Switch to photo mode with 'm'");
                    }
                }
                KeyCode::Char('r') => match coordinator.recording_state() {
                    _ if coordinator.preset() != SessionPreset::Video => {
                        state.status_message = String::from("Switch to video mode with 'm'");
                    }
                    RecordingState::Recording => coordinator.pause_recording(),
                    RecordingState::Idle | RecordingState::Paused => {
                        coordinator.start_recording()
                    }
                },
                KeyCode::Char('f') => coordinator.finish_recording(),
                KeyCode::Char('m') => {
                    if coordinator.recording_state() == RecordingState::Idle {
                        let freeze = coordinator.change_camera_preset();
                        state.freeze(freeze);
                    } else {
                        state.status_message = String::from("Finish the recording first");
                    }
                }
                KeyCode::Char('s') => {
                    let freeze = coordinator.change_camera();
                    state.freeze(freeze);
                }
                KeyCode::Char('l') => {
                    let mode = coordinator.change_flash_mode();
                    state.status_message = format!("Flash: {:?}", mode);
                }
                KeyCode::Char('+') | KeyCode::Char('=') => {
                    state.exposure = (state.exposure + EXPOSURE_STEP).min(1.0);
                    coordinator.update_exposure(state.exposure);
                    state.status_message = format!("Exposure: {:+.2}", state.exposure);
                }
                KeyCode::Char('-') => {
                    state.exposure = (state.exposure - EXPOSURE_STEP).max(-1.0);
                    coordinator.update_exposure(state.exposure);
                    state.status_message = format!("Exposure: {:+.2}", state.exposure);
                }
                KeyCode::Char('a') => {
                    coordinator.focus(
                        FocusMode::AutoFocus,
                        ExposureMode::AutoExpose,
                        Point::center(),
                        true,
                    );
                    state.exposure = 0.0;
                    state.status_message = String::from("Focus locked on center");
                }
                _ => {}
            }
        }
    }

    Ok(())
}

fn handle_event(coordinator: &mut CameraCoordinator, state: &mut ViewerState, event: CameraEvent) {
    match event {
        CameraEvent::AccessRequestFinished { granted } => {
            if granted {
                coordinator.configure_camera();
            } else {
                state.status_message = String::from("Camera access denied");
            }
        }
        CameraEvent::ConfigurationFinished { result, device } => {
            if result == CameraSetupResult::Success {
                info!(?device, "Camera configured");
                coordinator.turn_camera_on();
            } else {
                state.status_message = format!("Camera unavailable: {:?}", result);
            }
        }
        CameraEvent::CameraStarted { running } => {
            state.status_message = if running {
                String::from("'h' help")
            } else {
                String::from("Camera failed to start")
            };
        }
        CameraEvent::CameraChanged { device, switched } => {
            state.status_message = match (device, switched) {
                (Some(device), true) => format!("Using {}", device.name),
                _ => String::from("No other camera"),
            };
        }
        CameraEvent::QuadrilateralDetected {
            quadrilateral,
            is_target_aspect,
        } => {
            state.frame_widget.quad = quadrilateral.map(|q| (q, is_target_aspect));
        }
        CameraEvent::SubjectAreaChanged => {
            state.exposure = 0.0;
            state.status_message = String::from("Refocusing");
        }
        CameraEvent::PhotoWillCapture { .. } => {
            state.status_message = String::from("Capturing...");
        }
        CameraEvent::PhotoCaptured {
            error: Some(error), ..
        } => {
            error!(%error, "Photo capture failed");
            state.status_message = format!("Error: {}", error);
        }
        CameraEvent::PhotoSaved { result, .. } => {
            state.status_message = match result {
                Ok(path) => format!("Saved: {}", path.display()),
                Err(e) => format!("Error: {}", e),
            };
        }
        CameraEvent::RecordingFinished { result } => {
            state.status_message = match result {
                Ok(path) => format!("Saved: {}", path.display()),
                Err(e) => format!("Error: {}", e),
            };
        }
        _ => {}
    }
}

fn mode_summary(coordinator: &CameraCoordinator) -> String {
    match coordinator.preset() {
        SessionPreset::Photo => format!("PHOTO flash:{:?}", coordinator.flash_mode()),
        SessionPreset::Video => match coordinator.recording_state() {
            RecordingState::Idle => String::from("VIDEO"),
            RecordingState::Recording => String::from("VIDEO ● REC"),
            RecordingState::Paused => String::from("VIDEO ❚❚ PAUSED"),
        },
    }
}

fn help_message(preset: SessionPreset) -> String {
    let capture = match preset {
        SessionPreset::Photo => "p: Photo | l: Flash",
        SessionPreset::Video => "r: Record/Pause | f: Finish",
    };
    format!(
        "{} | m: Mode | s: Switch | a: Focus | +/-: Exposure | h: Help | q: Quit",
        capture
    )
}

/// Widget that renders a camera frame using half-block characters
#[derive(Default)]
struct FrameWidget {
    frame: Option<Arc<CameraFrame>>,
    /// Shown instead of `frame` while the session reconfigures
    freeze: Option<Arc<CameraFrame>>,
    quad: Option<(Quadrilateral, bool)>,
}

/// Placement of the scaled frame inside the widget area
struct Layout {
    x_offset: u16,
    y_offset: u16,
    width: u16,
    height: u16,
    x_scale: f64,
    y_scale: f64,
}

impl Layout {
    fn fit(frame: &CameraFrame, area: Rect) -> Option<Self> {
        if frame.width == 0 || frame.height == 0 {
            return None;
        }
        // Each terminal cell displays 2 vertical pixels
        let frame_aspect = frame.width as f64 / frame.height as f64;
        let term_width = area.width as f64;
        let term_height = (area.height * 2) as f64;

        let (width, height) = if term_width / term_height > frame_aspect {
            let h = term_height;
            ((h * frame_aspect) as u16, (h / 2.0) as u16)
        } else {
            let w = term_width;
            (w as u16, (w / frame_aspect / 2.0) as u16)
        };
        if width == 0 || height == 0 {
            return None;
        }

        Some(Self {
            x_offset: area.x + area.width.saturating_sub(width) / 2,
            y_offset: area.y + area.height.saturating_sub(height) / 2,
            width,
            height,
            x_scale: frame.width as f64 / width as f64,
            y_scale: frame.height as f64 / (height * 2) as f64,
        })
    }

    /// Terminal cell holding a frame pixel
    fn cell_for(&self, x: f32, y: f32) -> (u16, u16) {
        let tx = (x as f64 / self.x_scale).clamp(0.0, (self.width - 1) as f64) as u16;
        let ty = (y as f64 / self.y_scale / 2.0).clamp(0.0, (self.height - 1) as f64) as u16;
        (self.x_offset + tx, self.y_offset + ty)
    }
}

impl Widget for &FrameWidget {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let Some(frame) = self.freeze.as_ref().or(self.frame.as_ref()) else {
            let msg = "Waiting for camera...";
            let x = area.x + (area.width.saturating_sub(msg.len() as u16)) / 2;
            let y = area.y + area.height / 2;
            if y < area.y + area.height && x < area.x + area.width {
                buf.set_string(x, y, msg, ratatui::style::Style::default());
            }
            return;
        };
        let Some(layout) = Layout::fit(frame, area) else {
            return;
        };

        // Upper half (▀) colored with fg, lower half with bg
        for ty in 0..layout.height {
            for tx in 0..layout.width {
                let term_x = layout.x_offset + tx;
                let term_y = layout.y_offset + ty;
                if term_x >= area.x + area.width || term_y >= area.y + area.height {
                    continue;
                }

                let src_x = (tx as f64 * layout.x_scale) as u32;
                let src_y_top = (ty as f64 * 2.0 * layout.y_scale) as u32;
                let src_y_bottom = ((ty as f64 * 2.0 + 1.0) * layout.y_scale) as u32;

                if let Some(cell) = buf.cell_mut((term_x, term_y)) {
                    cell.set_char('▀');
                    cell.set_fg(sample_pixel(frame, src_x, src_y_top));
                    cell.set_bg(sample_pixel(frame, src_x, src_y_bottom));
                }
            }
        }

        if self.freeze.is_none()
            && let Some((quad, target)) = &self.quad
        {
            let color = if *target { Color::Green } else { Color::Yellow };
            draw_outline(buf, &layout, quad, color);
        }
    }
}

fn draw_outline(buf: &mut Buffer, layout: &Layout, quad: &Quadrilateral, color: Color) {
    let corners = quad.corners();
    for i in 0..4 {
        let (a, b) = (corners[i], corners[(i + 1) % 4]);
        let (ax, ay) = layout.cell_for(a.x, a.y);
        let (bx, by) = layout.cell_for(b.x, b.y);
        let steps = (ax.abs_diff(bx)).max(ay.abs_diff(by)).max(1);
        for step in 0..=steps {
            let t = step as f32 / steps as f32;
            let x = (ax as f32 + (bx as f32 - ax as f32) * t).round() as u16;
            let y = (ay as f32 + (by as f32 - ay as f32) * t).round() as u16;
            if let Some(cell) = buf.cell_mut((x, y)) {
                cell.set_char('█');
                cell.set_fg(color);
            }
        }
    }
}

fn sample_pixel(frame: &CameraFrame, x: u32, y: u32) -> Color {
    let x = x.min(frame.width.saturating_sub(1));
    let y = y.min(frame.height.saturating_sub(1));
    let idx = (y * frame.stride + x * 4) as usize;
    match frame.data.get(idx..idx + 3) {
        Some(px) => Color::Rgb(px[0], px[1], px[2]),
        None => Color::Black,
    }
}

/// Status bar widget
struct StatusBar<'a> {
    message: &'a str,
}

impl Widget for StatusBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        for x in area.x..area.x + area.width {
            if let Some(cell) = buf.cell_mut((x, area.y)) {
                cell.set_char(' ');
                cell.set_bg(Color::DarkGray);
            }
        }

        let text: String = self.message.chars().take(area.width as usize).collect();
        buf.set_string(
            area.x,
            area.y,
            text,
            ratatui::style::Style::default()
                .fg(Color::White)
                .bg(Color::DarkGray),
        );
    }
}
