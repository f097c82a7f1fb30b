//! Event handling for the winit window
//!
//! Converts raw winit events into the handful of inputs the player reacts
//! to. Click positions are normalized to the window so they can be tested
//! against button rectangles directly.

use winit::dpi::PhysicalSize;
use winit::event::{ElementState, MouseButton, WindowEvent as WinitWindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Inputs the player acts on
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WindowEvent {
    /// Close button, Escape
    Exit,

    /// New inner size in physical pixels
    Resized { width: u32, height: u32 },

    /// Left click, both coordinates in 0.0..=1.0
    Click { x: f32, y: f32 },

    ToggleFullscreen,
}

/// Event handler for converting winit events to player events
#[derive(Debug, Default)]
pub struct EventHandler {
    /// Last known cursor position in physical pixels
    cursor: (f64, f64),
}

impl EventHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Translate one winit event; `size` is the window's current inner size
    pub fn handle_event(&mut self, event: &WinitWindowEvent, size: PhysicalSize<u32>) -> Option<WindowEvent> {
        match event {
            WinitWindowEvent::CloseRequested => Some(WindowEvent::Exit),

            WinitWindowEvent::Resized(size) => Some(WindowEvent::Resized {
                width: size.width,
                height: size.height,
            }),

            WinitWindowEvent::CursorMoved { position, .. } => {
                self.cursor = (position.x, position.y);
                None
            }

            WinitWindowEvent::MouseInput {
                state: ElementState::Pressed,
                button: MouseButton::Left,
                ..
            } => normalize(self.cursor, size).map(|(x, y)| WindowEvent::Click { x, y }),

            WinitWindowEvent::KeyboardInput { event, .. } => {
                if event.state != ElementState::Pressed || event.repeat {
                    return None;
                }
                match event.physical_key {
                    PhysicalKey::Code(code) => convert_key_code(code),
                    PhysicalKey::Unidentified(_) => None,
                }
            }

            _ => None,
        }
    }
}

fn convert_key_code(code: KeyCode) -> Option<WindowEvent> {
    match code {
        KeyCode::Escape => Some(WindowEvent::Exit),
        KeyCode::KeyF => Some(WindowEvent::ToggleFullscreen),
        _ => None,
    }
}

/// Cursor position as a fraction of the window, `None` outside it
pub fn normalize(cursor: (f64, f64), size: PhysicalSize<u32>) -> Option<(f32, f32)> {
    if size.width == 0 || size.height == 0 {
        return None;
    }

    let x = cursor.0 / f64::from(size.width);
    let y = cursor.1 / f64::from(size.height);
    if !(0.0..=1.0).contains(&x) || !(0.0..=1.0).contains(&y) {
        return None;
    }
    Some((x as f32, y as f32))
}
