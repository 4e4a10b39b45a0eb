use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Instant;

use softbuffer::Surface;
use winit::application::ApplicationHandler;
use winit::dpi::{PhysicalPosition, PhysicalSize};
use winit::event::{ElementState, MouseButton, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow};
use winit::window::{Fullscreen, Window, WindowId};

use crate::loader::DiskSource;
use crate::session::{Flow, Session};
use crate::ui::state::{key_input, InputState};
use crate::view::WindowAdapter;

pub mod render;
pub mod state;

// ---------------------------------------------------------------------------
// Window adapter
// ---------------------------------------------------------------------------

/// A winit window as the session sees it.
pub struct WinitWindow {
    window: Arc<Window>,
    /// Last pointer position inside the window, client coordinates.
    cursor: Option<PhysicalPosition<f64>>,
}

impl WinitWindow {
    pub fn new(window: Arc<Window>) -> Self {
        Self {
            window,
            cursor: None,
        }
    }
}

impl WindowAdapter for WinitWindow {
    fn set_fullscreen(&mut self, on: bool) {
        self.window
            .set_fullscreen(on.then_some(Fullscreen::Borderless(None)));
    }

    fn set_cursor_visible(&mut self, visible: bool) {
        self.window.set_cursor_visible(visible);
    }

    // Outer and inner sizes agree until the window manager has decorated
    // the window; treat that as not known yet.
    fn frame_extents(&self) -> Option<(u32, u32)> {
        let outer = self.window.outer_size();
        let inner = self.window.inner_size();
        if outer == inner || self.window.fullscreen().is_some() {
            return None;
        }
        Some((
            outer.width.saturating_sub(inner.width),
            outer.height.saturating_sub(inner.height),
        ))
    }

    fn resize(&mut self, width: u32, height: u32) {
        let _ = self
            .window
            .request_inner_size(PhysicalSize::new(width.max(1), height.max(1)));
    }

    fn position(&self) -> Option<(i32, i32)> {
        self.window.outer_position().ok().map(|p| (p.x, p.y))
    }

    fn move_to(&mut self, x: i32, y: i32) {
        self.window.set_outer_position(PhysicalPosition::new(x, y));
    }

    fn pointer(&self) -> Option<(i32, i32)> {
        let cursor = self.cursor?;
        let origin = self.window.inner_position().ok()?;
        Some((origin.x + cursor.x as i32, origin.y + cursor.y as i32))
    }

    fn set_title(&mut self, title: &str) {
        self.window.set_title(title);
    }

    fn request_redraw(&mut self) {
        self.window.request_redraw();
    }
}

// ---------------------------------------------------------------------------
// Application handler (winit 0.30 style)
// ---------------------------------------------------------------------------

pub struct App {
    pub session: Session<DiskSource>,
    pub input: InputState,
    pub window: Option<WinitWindow>,
    pub context: Option<softbuffer::Context<Arc<Window>>>,
    pub surface: Option<Surface<Arc<Window>, Arc<Window>>>,
    /// Where a middle-button drag was last seen.
    pub drag: Option<PhysicalPosition<f64>>,
}

impl App {
    pub fn new(session: Session<DiskSource>) -> Self {
        Self {
            session,
            input: InputState::new(),
            window: None,
            context: None,
            surface: None,
            drag: None,
        }
    }

    fn redraw(&mut self) {
        let (Some(win), Some(surface)) = (self.window.as_ref(), self.surface.as_mut()) else {
            return;
        };
        let size = win.window.inner_size();
        let (Some(w), Some(h)) = (NonZeroU32::new(size.width), NonZeroU32::new(size.height)) else {
            return;
        };
        if let Err(e) = surface.resize(w, h) {
            log::error!("Can't resize surface: {}", e);
            return;
        }
        match surface.buffer_mut() {
            Ok(mut buffer) => {
                render::compose(&mut buffer, w.get(), h.get(), &self.session);
                if let Err(e) = buffer.present() {
                    log::error!("Can't present frame: {}", e);
                }
            }
            Err(e) => log::error!("Can't get frame buffer: {}", e),
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Some(monitor) = event_loop.primary_monitor() {
            let size = monitor.size();
            self.session.set_screen(size.width, size.height);
        }

        let (w, h) = self.session.window_size().unwrap_or((640, 480));
        let attrs = Window::default_attributes()
            .with_title(self.session.window_title())
            .with_inner_size(PhysicalSize::new(w.max(1), h.max(1)));
        let window = Arc::new(event_loop.create_window(attrs).expect("create window"));
        let context = softbuffer::Context::new(Arc::clone(&window)).expect("create context");
        let surface = Surface::new(&context, Arc::clone(&window)).expect("create surface");

        if let Some(monitor) = window.current_monitor() {
            let size = monitor.size();
            log::debug!("Screen is {}x{}", size.width, size.height);
            self.session.set_screen(size.width, size.height);
        }

        let mut win = WinitWindow::new(Arc::clone(&window));
        self.session.attach(&mut win);
        self.session.start_slideshow(Instant::now());

        self.window = Some(win);
        self.context = Some(context);
        self.surface = Some(surface);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }

            WindowEvent::Resized(_) => {
                if let Some(win) = self.window.as_mut() {
                    win.request_redraw();
                }
            }

            WindowEvent::CursorMoved { position, .. } => {
                let Some(win) = self.window.as_mut() else {
                    return;
                };
                win.cursor = Some(position);
                if let Some(from) = self.drag {
                    self.drag = Some(position);
                    let dx = (position.x - from.x).round() as i32;
                    let dy = (position.y - from.y).round() as i32;
                    if self.session.pan_by(dx, dy) {
                        win.request_redraw();
                    }
                }
            }

            WindowEvent::CursorLeft { .. } => {
                if let Some(win) = self.window.as_mut() {
                    win.cursor = None;
                }
            }

            WindowEvent::MouseInput {
                state,
                button: MouseButton::Middle,
                ..
            } => {
                self.drag = match state {
                    ElementState::Pressed => self.window.as_ref().and_then(|w| w.cursor),
                    ElementState::Released => None,
                };
            }

            WindowEvent::KeyboardInput { event, .. } => {
                if event.state != ElementState::Pressed {
                    return;
                }
                let Some(key) = key_input(&event.logical_key) else {
                    return;
                };
                let Some(win) = self.window.as_mut() else {
                    return;
                };
                if self.input.handle(key, &mut self.session, win) {
                    event_loop.exit();
                }
            }

            WindowEvent::RedrawRequested => self.redraw(),

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(win) = self.window.as_mut() {
            if self.input.is_browsing() {
                let flow = self.session.tick(Instant::now(), win);
                if flow != Flow::Continue && self.input.follow(flow, &mut self.session, win) {
                    event_loop.exit();
                    return;
                }
            }
        }

        match self.session.slideshow_deadline() {
            Some(when) => event_loop.set_control_flow(ControlFlow::WaitUntil(when)),
            None => event_loop.set_control_flow(ControlFlow::Wait),
        }
    }
}
