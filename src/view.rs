use crate::transform::fit_to_box;

// ---------------------------------------------------------------------------
// Modes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayMode {
    #[default]
    Normal,
    Presentation,
    Keywords,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScaleMode {
    /// Native size, shrunk to fit the screen if it has to be.
    #[default]
    Normal,
    /// Fill the screen, enlarging if needed.
    FullScreen,
    /// Native size even if it overflows.
    FullSize,
    /// Native size times `ratio`.
    ImageRatio,
    /// Fit a box of `ratio` times the screen.
    ScreenRatio,
    /// Longer edge no bigger than `ratio` pixels.
    Fixed,
}

/// The display/scale/ratio triple. `ratio` is a multiplier in the two
/// ratio modes and a pixel bound in `Fixed`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewModes {
    pub display: DisplayMode,
    pub scale: ScaleMode,
    pub ratio: f64,
}

impl Default for ViewModes {
    fn default() -> Self {
        Self {
            display: DisplayMode::Normal,
            scale: ScaleMode::Normal,
            ratio: 1.0,
        }
    }
}

impl ViewModes {
    pub fn new(display: DisplayMode, scale: ScaleMode, ratio: f64) -> Self {
        Self { display, scale, ratio }
    }

    pub fn with_display(self, display: DisplayMode) -> Self {
        Self { display, ..self }
    }

    pub fn with_scale(self, scale: ScaleMode, ratio: f64) -> Self {
        Self { scale, ratio, ..self }
    }
}

// ---------------------------------------------------------------------------
// Screen geometry
// ---------------------------------------------------------------------------

/// Guess at window decorations until the window manager tells us.
const DEFAULT_FRAME: (u32, u32) = (10, 28);

const NORMAL_SLOP: u32 = 5;
const FULLSCREEN_SLOP: u32 = 20;
const KEYWORD_SCREEN_FRACTION: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenGeometry {
    pub phys_width: u32,
    pub phys_height: u32,
    frame: Option<(u32, u32)>,
}

impl ScreenGeometry {
    pub fn new(phys_width: u32, phys_height: u32) -> Self {
        Self {
            phys_width,
            phys_height,
            frame: None,
        }
    }

    pub fn frame(&self) -> (u32, u32) {
        self.frame.unwrap_or(DEFAULT_FRAME)
    }

    pub fn have_frame(&self) -> bool {
        self.frame.is_some()
    }

    /// Cache the first real frame size we get; later probes are ignored.
    pub fn learn_frame(&mut self, probe: Option<(u32, u32)>) -> bool {
        match (self.frame, probe) {
            (None, Some(f)) => {
                log::debug!("Window frame size: {}x{}", f.0, f.1);
                self.frame = Some(f);
                true
            }
            _ => false,
        }
    }

    /// Area an image may occupy in `display` mode.
    pub fn usable(&self, display: DisplayMode) -> (u32, u32) {
        match display {
            DisplayMode::Presentation => (self.phys_width.max(1), self.phys_height.max(1)),
            _ => {
                let (fw, fh) = self.frame();
                (
                    self.phys_width.saturating_sub(fw).max(1),
                    self.phys_height.saturating_sub(fh).max(1),
                )
            }
        }
    }
}

/// Pixel bound used while the keyword panel is showing.
pub fn keyword_fixed_size(usable: (u32, u32)) -> f64 {
    usable.0.min(usable.1) as f64 * KEYWORD_SCREEN_FRACTION
}

// ---------------------------------------------------------------------------
// Sizing policy
// ---------------------------------------------------------------------------

fn scale_by(size: (u32, u32), ratio: f64) -> (u32, u32) {
    (
        ((size.0 as f64 * ratio).round() as u32).max(1),
        ((size.1 as f64 * ratio).round() as u32).max(1),
    )
}

fn fill_ratio(native: (u32, u32), area: (u32, u32)) -> f64 {
    (area.0 as f64 / native.0 as f64).min(area.1 as f64 / native.1 as f64)
}

fn fits(size: (u32, u32), area: (u32, u32)) -> bool {
    size.0 <= area.0 && size.1 <= area.1
}

/// Keep `current` when it is within `slop` pixels of `target` (and inside
/// `bound`, if any), so tiny size changes don't cost a rescale.
fn settle(
    current: (u32, u32),
    target: (u32, u32),
    slop: u32,
    bound: Option<(u32, u32)>,
) -> (u32, u32) {
    let close = current.0.abs_diff(target.0) + current.1.abs_diff(target.1) < slop;
    let inside = bound.is_none_or(|b| fits(current, b));
    if current.0 > 0 && current.1 > 0 && close && inside {
        current
    } else {
        target
    }
}

/// Size to display an image of `native` size (already in its displayed
/// orientation) given what is on screen now. Pure: same inputs, same answer,
/// and feeding the answer back as `current` gives it again.
pub fn plan_size(
    native: (u32, u32),
    current: (u32, u32),
    modes: &ViewModes,
    usable: (u32, u32),
) -> (u32, u32) {
    if native.0 == 0 || native.1 == 0 {
        return native;
    }
    let (nw, nh) = native;
    let (sw, sh) = usable;

    match modes.scale {
        ScaleMode::FullSize => native,
        ScaleMode::Normal => settle(current, fit_to_box(nw, nh, sw, sh), NORMAL_SLOP, Some(usable)),
        ScaleMode::FullScreen => {
            let target = scale_by(native, fill_ratio(native, usable));
            let target = fit_to_box(target.0, target.1, sw, sh);
            settle(current, target, FULLSCREEN_SLOP, Some(usable))
        }
        ScaleMode::ImageRatio => settle(current, scale_by(native, modes.ratio), NORMAL_SLOP, None),
        ScaleMode::ScreenRatio => {
            let area = scale_by(usable, modes.ratio);
            let target = if modes.ratio <= 1.0 {
                fit_to_box(nw, nh, area.0, area.1)
            } else {
                let grown = scale_by(native, fill_ratio(native, area));
                fit_to_box(grown.0, grown.1, area.0, area.1)
            };
            settle(current, target, NORMAL_SLOP, Some(area))
        }
        ScaleMode::Fixed => {
            let bound = (modes.ratio.round() as u32).max(1);
            fit_to_box(nw, nh, bound, bound)
        }
    }
}

// ---------------------------------------------------------------------------
// Window placement
// ---------------------------------------------------------------------------

fn place_axis(pos: i32, len: u32, screen: u32, pointer: Option<i32>) -> i32 {
    let len = len as i32;
    let max = (screen as i32 - len).max(0);
    let mut p = pos.clamp(0, max);
    if let Some(ptr) = pointer {
        if ptr < p {
            p = ptr;
        } else if ptr >= p + len {
            p = ptr - len + 1;
        }
        p = p.clamp(0, max);
    }
    p
}

/// Where a window of `size` should go so it stays on screen, moving as
/// little as possible. `pointer` is given when the pointer was over the
/// window before the resize; the window then stays under it so
/// focus-follows-mouse doesn't lose focus. Windows bigger than the screen
/// stay put.
pub fn place_window(
    pos: (i32, i32),
    size: (u32, u32),
    usable: (u32, u32),
    pointer: Option<(i32, i32)>,
) -> (i32, i32) {
    if !fits(size, usable) {
        return pos;
    }
    (
        place_axis(pos.0, size.0, usable.0, pointer.map(|p| p.0)),
        place_axis(pos.1, size.1, usable.1, pointer.map(|p| p.1)),
    )
}

/// Keep a dragged image from leaving the screen along one axis. An image
/// smaller than the screen stays fully visible; a bigger one always covers
/// it.
pub fn clamp_pan(pos: i32, image: u32, screen: u32) -> i32 {
    let room = screen as i64 - image as i64;
    (pos as i64).clamp(room.min(0), room.max(0)) as i32
}

// ---------------------------------------------------------------------------
// Window adapter
// ---------------------------------------------------------------------------

/// Everything the viewer asks of the windowing system. Window-manager
/// quirks (frame probing, focus, fullscreen differences) stay behind this.
pub trait WindowAdapter {
    fn set_fullscreen(&mut self, on: bool);
    fn set_cursor_visible(&mut self, visible: bool);
    /// Decoration size, if the window manager has reported it yet.
    fn frame_extents(&self) -> Option<(u32, u32)>;
    fn resize(&mut self, width: u32, height: u32);
    fn position(&self) -> Option<(i32, i32)>;
    fn move_to(&mut self, x: i32, y: i32);
    /// Pointer position in screen coordinates, if it is over the window.
    fn pointer(&self) -> Option<(i32, i32)>;
    fn set_title(&mut self, title: &str);
    fn request_redraw(&mut self);
}
