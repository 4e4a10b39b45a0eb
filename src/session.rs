use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::commands::Command;
use crate::error::{Result, ViewerError};
use crate::imglist::{ImageId, ImageList, ImageRecord};
use crate::loader::{format_date, ImageSource};
use crate::notes::{write_report, CaptionStore, MAX_FLAGS};
use crate::transform::{normalize_degrees, scale_and_rotate, turned, Interpolation, PixelBuffer};
use crate::view::{
    clamp_pan, keyword_fixed_size, place_window, plan_size, DisplayMode, ScaleMode, ScreenGeometry,
    ViewModes, WindowAdapter,
};

/// Height of the flag strip under the image in keyword mode.
pub const KEYWORD_PANEL_HEIGHT: u32 = 40;

const ZOOM_STEP: f64 = 1.25;
const DEFAULT_FIXED_SIZE: f64 = 800.0;

// ---------------------------------------------------------------------------
// Results handed back to the UI
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nav {
    Moved,
    /// Asked to go past the last image; nothing changed.
    AtEnd,
    /// Nothing left to show.
    Empty,
}

/// Questions the UI has to ask before a command can finish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
    ConfirmDelete(PathBuf),
    Caption(String),
    Comment(String),
    /// Which flag to label comes next, then the label itself.
    PickKeyword,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    Continue,
    AtEnd,
    Quit,
    Prompt(Prompt),
}

// ---------------------------------------------------------------------------
// Slideshow timer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct Slideshow {
    delay: Option<Duration>,
    repeat: bool,
    deadline: Option<Instant>,
}

impl Slideshow {
    pub fn new(delay: Option<Duration>, repeat: bool) -> Self {
        Self {
            delay,
            repeat,
            deadline: None,
        }
    }

    pub fn arm(&mut self, now: Instant) {
        if let Some(delay) = self.delay {
            self.deadline = Some(now + delay);
        }
    }

    /// A fire that was pending becomes a no-op.
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn due(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|d| now >= d)
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Options {
    pub modes: ViewModes,
    pub interpolation: Interpolation,
    pub captions: Option<CaptionStore>,
    /// Labels for flags 0, 1, ... in the report.
    pub keywords: Vec<String>,
    pub slideshow: Option<Duration>,
    pub repeat: bool,
    /// Pixel bound used when switching to `ScaleMode::Fixed`.
    pub fixed_size: f64,
    pub presentation_size: Option<(u32, u32)>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            modes: ViewModes::default(),
            interpolation: Interpolation::default(),
            captions: None,
            keywords: Vec::new(),
            slideshow: None,
            repeat: false,
            fixed_size: DEFAULT_FIXED_SIZE,
            presentation_size: None,
        }
    }
}

/// All viewer state: the image list, the view modes and the screen. Every
/// operation goes through here; the UI only translates events.
pub struct Session<S: ImageSource> {
    source: S,
    list: ImageList,
    modes: ViewModes,
    /// Scale to go back to when keyword mode ends.
    restore_scale: (ScaleMode, f64),
    geometry: ScreenGeometry,
    interpolation: Interpolation,
    captions: Option<CaptionStore>,
    /// The shared caption file as it was read at startup.
    shared_captions: Vec<(PathBuf, String)>,
    keywords: Vec<String>,
    fixed_size: f64,
    presentation_size: Option<(u32, u32)>,
    slideshow: Slideshow,
    notice: Option<String>,
    /// Drag offset from the centered position in presentation mode.
    pan: (i32, i32),
}

impl<S: ImageSource> Session<S> {
    pub fn new(
        source: S,
        files: Vec<PathBuf>,
        geometry: ScreenGeometry,
        opts: Options,
    ) -> Result<Self> {
        let mut list = ImageList::new();
        for file in files {
            list.append(ImageRecord::new(file));
        }

        let shared_captions = match &opts.captions {
            Some(store) => store.load_shared()?,
            None => Vec::new(),
        };
        let by_path: HashMap<&Path, &str> = shared_captions
            .iter()
            .map(|(file, caption)| (file.as_path(), caption.as_str()))
            .collect();
        for id in list.ids() {
            if let Some(rec) = list.get_mut(id) {
                if let Some(caption) = by_path.get(rec.path.as_path()) {
                    rec.caption = Some(caption.to_string());
                }
            }
        }

        let mut session = Self {
            source,
            list,
            modes: opts.modes,
            restore_scale: (opts.modes.scale, opts.modes.ratio),
            geometry,
            interpolation: opts.interpolation,
            captions: opts.captions,
            shared_captions,
            keywords: opts.keywords,
            fixed_size: opts.fixed_size,
            presentation_size: opts.presentation_size,
            slideshow: Slideshow::new(opts.slideshow, opts.repeat),
            notice: None,
            pan: (0, 0),
        };
        if session.modes.display == DisplayMode::Keywords {
            let bound = keyword_fixed_size(session.usable());
            session.modes = session.modes.with_scale(ScaleMode::Fixed, bound);
        }
        Ok(session)
    }

    pub fn list(&self) -> &ImageList {
        &self.list
    }

    pub fn modes(&self) -> ViewModes {
        self.modes
    }

    pub fn geometry(&self) -> &ScreenGeometry {
        &self.geometry
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// Label of flag `note`, empty when it has none.
    pub fn keyword(&self, note: u32) -> &str {
        self.keywords
            .get(note as usize)
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Label flag `note`; empty text removes the label.
    pub fn set_keyword(&mut self, note: u32, text: &str) {
        if note >= MAX_FLAGS {
            return;
        }
        let n = note as usize;
        if self.keywords.len() <= n {
            self.keywords.resize(n + 1, String::new());
        }
        self.keywords[n] = text.trim().to_string();
        while self.keywords.last().is_some_and(|k| k.is_empty()) {
            self.keywords.pop();
        }
        log::debug!("Keyword {} is now {:?}", note, self.keyword(note));
    }

    pub fn current_record(&self) -> Option<&ImageRecord> {
        self.list.current_record()
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn set_notice(&mut self, text: impl Into<String>) {
        self.notice = Some(text.into());
    }

    /// Returns true if there was a notice to dismiss.
    pub fn dismiss_notice(&mut self) -> bool {
        self.notice.take().is_some()
    }

    pub fn slideshow_deadline(&self) -> Option<Instant> {
        self.slideshow.deadline()
    }

    /// Area the current image may use.
    pub fn usable(&self) -> (u32, u32) {
        match (self.modes.display, self.presentation_size) {
            (DisplayMode::Presentation, Some(size)) => size,
            (display, _) => self.geometry.usable(display),
        }
    }

    /// The monitor changed (or is known for the first time).
    pub fn set_screen(&mut self, width: u32, height: u32) {
        self.geometry.phys_width = width;
        self.geometry.phys_height = height;
    }

    // -----------------------------------------------------------------------
    // Loading and transforming
    // -----------------------------------------------------------------------

    /// Metadata rotation, date and per-image caption, read on first visit.
    fn read_metadata(&mut self, id: ImageId) {
        let Some(rec) = self.list.get(id) else {
            return;
        };
        if rec.exif_rot.is_some() {
            return;
        }
        let meta = self.source.metadata(&rec.path);
        let caption = match &self.captions {
            Some(store) if rec.caption.is_none() => {
                store.load_for(&rec.path).unwrap_or_else(|e| {
                    log::warn!("Can't read caption for {}: {}", rec.path.display(), e);
                    None
                })
            }
            _ => None,
        };

        if let Some(rec) = self.list.get_mut(id) {
            rec.exif_rot = Some(meta.rotation);
            rec.cur_rot = meta.rotation;
            rec.date = meta.date;
            if caption.is_some() {
                rec.caption = caption;
                rec.caption_on_disk = true;
            }
        }
    }

    /// Decode `path` and bring it to `want_rot` at the planned size.
    fn from_file(
        &self,
        path: &Path,
        want_rot: u32,
        current: (u32, u32),
        usable: (u32, u32),
    ) -> Result<(PixelBuffer, (u32, u32))> {
        let raw = self.source.decode(path)?;
        let native = turned(raw.size(), want_rot);
        let target = plan_size(native, current, &self.modes, usable);
        let out = scale_and_rotate(&raw, 0, want_rot, target, self.interpolation)?;
        Ok((out.unwrap_or(raw), native))
    }

    /// Make record `id` show `want_rot` degrees at the size the view modes
    /// call for. Nothing on the record changes unless this succeeds.
    fn show(&mut self, id: ImageId, want_rot: u32) -> Result<()> {
        let usable = self.usable();
        let rec = self.list.get(id).ok_or(ViewerError::Empty)?;
        let delta = (want_rot + 360 - rec.cur_rot) % 360;
        let current = turned(rec.cur_size(), delta);

        let (out, native) = match &rec.pixels {
            None => self.from_file(&rec.path, want_rot, current, usable)?,
            Some(pixels) => {
                let native = turned(rec.true_size(), delta);
                let target = plan_size(native, current, &self.modes, usable);
                let grows = target.0 > current.0 || target.1 > current.1;
                if grows && current != native {
                    log::debug!(
                        "Re-reading {} for {}x{}",
                        rec.path.display(),
                        target.0,
                        target.1
                    );
                    self.from_file(&rec.path, want_rot, current, usable)?
                } else {
                    match scale_and_rotate(pixels, rec.cur_rot, want_rot, target, self.interpolation)? {
                        Some(out) => (out, native),
                        None => return Ok(()),
                    }
                }
            }
        };

        log::debug!(
            "{}: {}x{} shown at {}x{}, rotation {}",
            rec.path.display(),
            native.0,
            native.1,
            out.width(),
            out.height(),
            want_rot
        );
        if let Some(rec) = self.list.get_mut(id) {
            rec.set_pixels(out, want_rot, native);
        }
        Ok(())
    }

    /// Re-plan the current image after a mode or screen change.
    pub fn refresh(&mut self) -> Result<()> {
        let Some(rec) = self.list.current_record() else {
            return Ok(());
        };
        let rot = rec.cur_rot;
        match self.list.current() {
            Some(id) => self.show(id, rot),
            None => Ok(()),
        }
    }

    // -----------------------------------------------------------------------
    // Navigation
    // -----------------------------------------------------------------------

    /// Load and show `id`, skipping forward (or back) over files that can't
    /// be decoded. Those are dropped from the list for good.
    fn visit(&mut self, mut id: ImageId, forward: bool) -> Result<Nav> {
        loop {
            self.read_metadata(id);
            let want = self.list.get(id).map(|r| r.cur_rot).unwrap_or(0);
            match self.show(id, want) {
                Ok(()) => break,
                Err(ViewerError::Decode { path, reason }) => {
                    log::warn!("Skipping {}: {}", path.display(), reason);
                    self.notice = Some(format!("Can't open {}", path.display()));

                    let was_tail = self.list.tail() == Some(id);
                    let next = if forward {
                        self.list.next(id)
                    } else {
                        self.list.prev(id)
                    };
                    self.list.remove(id);
                    match next {
                        Some(n) if n != id && !self.list.is_empty() => id = n,
                        _ => return Ok(Nav::Empty),
                    }
                    if forward && was_tail && !self.slideshow.repeat && self.list.current().is_some() {
                        return Ok(Nav::AtEnd);
                    }
                }
                Err(e) => return Err(e),
            }
        }

        if let Some(prev) = self.list.current().filter(|&p| p != id) {
            if let Some(rec) = self.list.get_mut(prev) {
                rec.unload();
            }
        }
        self.list.set_current(Some(id));
        self.pan = (0, 0);
        if let Some(pos) = self.list.position(id) {
            log::debug!("Now showing image {} of {}", pos, self.list.len());
        }
        Ok(Nav::Moved)
    }

    pub fn first_image(&mut self) -> Result<Nav> {
        match self.list.head() {
            Some(id) => self.visit(id, true),
            None => Ok(Nav::Empty),
        }
    }

    pub fn last_image(&mut self) -> Result<Nav> {
        match self.list.tail() {
            Some(id) => self.visit(id, false),
            None => Ok(Nav::Empty),
        }
    }

    /// Stops at the last image unless the slideshow repeats.
    pub fn next_image(&mut self) -> Result<Nav> {
        let Some(cur) = self.list.current() else {
            return self.first_image();
        };
        if self.list.tail() == Some(cur) && !self.slideshow.repeat {
            return Ok(Nav::AtEnd);
        }
        match self.list.next(cur) {
            Some(next) => self.visit(next, true),
            None => Ok(Nav::Empty),
        }
    }

    pub fn prev_image(&mut self) -> Result<Nav> {
        let Some(cur) = self.list.current() else {
            return self.last_image();
        };
        match self.list.prev(cur) {
            Some(prev) => self.visit(prev, false),
            None => Ok(Nav::Empty),
        }
    }

    // -----------------------------------------------------------------------
    // Rotation
    // -----------------------------------------------------------------------

    /// Turn the current image to an absolute rotation.
    pub fn set_rotation(&mut self, degrees: i32) -> Result<()> {
        let id = self.list.current().ok_or(ViewerError::Empty)?;
        let want = normalize_degrees(degrees)?;
        self.show(id, want)
    }

    /// Turn the current image by `delta` more degrees.
    pub fn rotate_by(&mut self, delta: i32) -> Result<()> {
        let cur = self.list.current_record().ok_or(ViewerError::Empty)?.cur_rot;
        self.set_rotation(cur as i32 + delta)
    }

    // -----------------------------------------------------------------------
    // Annotations
    // -----------------------------------------------------------------------

    pub fn toggle_flag(&mut self, note: u32) {
        if let Some(rec) = self.list.current_record_mut() {
            rec.toggle_flag(note);
        }
    }

    pub fn set_comment(&mut self, text: &str) {
        if let Some(rec) = self.list.current_record_mut() {
            rec.set_comment(text);
        }
    }

    pub fn set_caption(&mut self, text: &str) {
        if let Some(rec) = self.list.current_record_mut() {
            rec.set_caption(text);
        }
    }

    /// Remove the current file from disk and from the list, then show the
    /// next image (wrapping to the first). If the file can't be removed the
    /// record stays and the error comes back.
    pub fn delete_current(&mut self) -> Result<Nav> {
        let id = self.list.current().ok_or(ViewerError::Empty)?;
        let path = self
            .list
            .get(id)
            .map(|r| r.path.clone())
            .ok_or(ViewerError::Empty)?;

        self.source.remove(&path).map_err(|source| ViewerError::Delete {
            path: path.clone(),
            source,
        })?;
        log::info!("Deleted {}", path.display());

        let next = self.list.next(id).filter(|&n| n != id);
        if let Some(rec) = self.list.get_mut(id) {
            rec.deleted = true;
        }
        self.list.remove(id);
        let Some(next) = next else {
            return Ok(Nav::Empty);
        };
        match self.visit(next, true) {
            Ok(nav) => Ok(nav),
            Err(e) => {
                // The deleted image is gone either way; park on a
                // neighbour even though it couldn't be shown.
                if self.list.current().is_none() {
                    let fallback = Some(next)
                        .filter(|&n| self.list.contains(n))
                        .or_else(|| self.list.head());
                    self.list.set_current(fallback);
                }
                Err(e)
            }
        }
    }

    // -----------------------------------------------------------------------
    // View modes
    // -----------------------------------------------------------------------

    fn apply_display(&mut self, display: DisplayMode, win: &mut dyn WindowAdapter) {
        let presenting = display == DisplayMode::Presentation;
        win.set_fullscreen(presenting);
        win.set_cursor_visible(!presenting);
        if !presenting {
            self.geometry.learn_frame(win.frame_extents());
        }
    }

    /// Switch display/scale modes and re-plan the current image. If the
    /// image can't be transformed everything is put back as it was.
    pub fn set_view_modes(
        &mut self,
        requested: ViewModes,
        win: &mut dyn WindowAdapter,
    ) -> Result<()> {
        if requested == self.modes {
            return Ok(());
        }
        let old = self.modes;
        let display_changed = requested.display != old.display;
        if display_changed {
            self.apply_display(requested.display, win);
        }

        let mut next = requested;
        if requested.display == DisplayMode::Keywords && old.display != DisplayMode::Keywords {
            let bound = keyword_fixed_size(self.geometry.usable(DisplayMode::Keywords));
            next = next.with_scale(ScaleMode::Fixed, bound);
        }
        self.modes = next;

        if let Err(e) = self.refresh() {
            log::warn!("Can't switch to {:?}: {}", next, e);
            self.modes = old;
            if display_changed {
                self.apply_display(old.display, win);
            }
            return Err(e);
        }
        log::debug!("View modes {:?} -> {:?}", old, next);
        self.pan = (0, 0);
        self.sync_window(win);
        Ok(())
    }

    fn ratio_for(&self, scale: ScaleMode) -> f64 {
        match scale {
            ScaleMode::Fixed => self.fixed_size,
            ScaleMode::ImageRatio | ScaleMode::ScreenRatio if self.modes.scale == scale => {
                self.modes.ratio
            }
            _ => 1.0,
        }
    }

    fn set_scale(&mut self, scale: ScaleMode, win: &mut dyn WindowAdapter) -> Result<()> {
        let requested = self.modes.with_scale(scale, self.ratio_for(scale));
        self.set_view_modes(requested, win)
    }

    fn zoom(&mut self, factor: f64, win: &mut dyn WindowAdapter) -> Result<()> {
        let requested = if self.modes.scale == ScaleMode::ScreenRatio {
            self.modes
                .with_scale(ScaleMode::ScreenRatio, self.modes.ratio * factor)
        } else {
            let shown = self
                .list
                .current_record()
                .filter(|r| r.true_width > 0)
                .map(|r| r.cur_width as f64 / r.true_width as f64)
                .unwrap_or(1.0);
            self.modes.with_scale(ScaleMode::ImageRatio, shown * factor)
        };
        self.set_view_modes(requested, win)
    }

    /// Go into `target` display mode, or back to normal if already there.
    fn toggle_display(&mut self, target: DisplayMode, win: &mut dyn WindowAdapter) -> Result<()> {
        let display = if self.modes.display == target {
            DisplayMode::Normal
        } else {
            target
        };
        let mut requested = self.modes.with_display(display);
        if self.modes.display == DisplayMode::Keywords {
            requested = requested.with_scale(self.restore_scale.0, self.restore_scale.1);
        } else if display == DisplayMode::Keywords {
            self.restore_scale = (self.modes.scale, self.modes.ratio);
        }
        self.set_view_modes(requested, win)
    }

    // -----------------------------------------------------------------------
    // Window
    // -----------------------------------------------------------------------

    /// Client area the window should have, or `None` in presentation mode
    /// or with nothing loaded.
    pub fn window_size(&self) -> Option<(u32, u32)> {
        if self.modes.display == DisplayMode::Presentation {
            return None;
        }
        let rec = self.list.current_record().filter(|r| r.is_loaded())?;
        let (w, h) = rec.cur_size();
        Some(match self.modes.display {
            DisplayMode::Keywords => (w.max(KEYWORD_PANEL_HEIGHT * 5), h + KEYWORD_PANEL_HEIGHT),
            _ => (w, h),
        })
    }

    fn centered(&self, rec: &ImageRecord) -> (i32, i32) {
        let (pw, ph) = self
            .presentation_size
            .unwrap_or((self.geometry.phys_width, self.geometry.phys_height));
        (
            (pw as i32 - rec.cur_width as i32) / 2,
            (ph as i32 - rec.cur_height as i32) / 2,
        )
    }

    /// Where the image goes inside the window. Only presentation mode
    /// centers (plus any drag); the window hugs the image otherwise.
    pub fn draw_offset(&self) -> (i32, i32) {
        if self.modes.display != DisplayMode::Presentation {
            return (0, 0);
        }
        let Some(rec) = self.list.current_record() else {
            return (0, 0);
        };
        let (cx, cy) = self.centered(rec);
        (
            clamp_pan(cx + self.pan.0, rec.cur_width, self.geometry.phys_width),
            clamp_pan(cy + self.pan.1, rec.cur_height, self.geometry.phys_height),
        )
    }

    /// Drag the image in presentation mode. Returns true if it moved.
    pub fn pan_by(&mut self, dx: i32, dy: i32) -> bool {
        if self.modes.display != DisplayMode::Presentation {
            return false;
        }
        let Some(centered) = self.list.current_record().map(|rec| self.centered(rec)) else {
            return false;
        };
        let before = self.draw_offset();
        self.pan = (self.pan.0 + dx, self.pan.1 + dy);
        let after = self.draw_offset();
        // Store what is actually shown so dragging back responds at once.
        self.pan = (after.0 - centered.0, after.1 - centered.1);
        after != before
    }

    pub fn window_title(&self) -> String {
        let Some(id) = self.list.current() else {
            return "picnote".to_string();
        };
        let Some(rec) = self.list.get(id) else {
            return "picnote".to_string();
        };
        let name = rec
            .path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| rec.path.to_string_lossy());
        let mut title = format!(
            "picnote: {} ({}x{}) {}/{}",
            name,
            rec.true_width,
            rec.true_height,
            self.list.position(id).unwrap_or(0),
            self.list.len()
        );
        if let Some(date) = &rec.date {
            let _ = write!(title, " {}", format_date(date));
        }
        if self.modes.display == DisplayMode::Keywords && !self.keywords.is_empty() {
            // Labelled flags; a star marks the ones set on this image.
            title.push_str(" |");
            for (n, label) in self.keywords.iter().enumerate().filter(|(_, k)| !k.is_empty()) {
                let mark = if rec.has_flag(n as u32) { "*" } else { "" };
                let _ = write!(title, " {}:{}{}", n, label, mark);
            }
        }
        if let Some(notice) = &self.notice {
            let _ = write!(title, " [{}]", notice);
        }
        title
    }

    /// Resize and place the window around the current image.
    pub fn sync_window(&mut self, win: &mut dyn WindowAdapter) {
        win.set_title(&self.window_title());
        if let Some((w, h)) = self.window_size() {
            let pointer = win.pointer();
            win.resize(w, h);
            if let Some(pos) = win.position() {
                let (fw, fh) = self.geometry.frame();
                let screen = (self.geometry.phys_width, self.geometry.phys_height);
                let (x, y) = place_window(pos, (w + fw, h + fh), screen, pointer);
                if (x, y) != pos {
                    win.move_to(x, y);
                }
            }
        }
        win.request_redraw();
    }

    /// First contact with a real window: match it to the display mode and
    /// re-plan with the real screen and frame sizes.
    pub fn attach(&mut self, win: &mut dyn WindowAdapter) {
        if self.modes.display == DisplayMode::Presentation {
            self.apply_display(DisplayMode::Presentation, win);
        } else {
            self.geometry.learn_frame(win.frame_extents());
        }
        if self.modes.display == DisplayMode::Keywords {
            let bound = keyword_fixed_size(self.usable());
            self.modes = self.modes.with_scale(ScaleMode::Fixed, bound);
        }
        if let Err(e) = self.refresh() {
            log::warn!("{}", e);
            self.notice = Some(e.to_string());
        }
        self.sync_window(win);
    }

    /// Multi-line description of the current image.
    pub fn info(&self) -> String {
        let Some(id) = self.list.current() else {
            return "No image".to_string();
        };
        let Some(rec) = self.list.get(id) else {
            return "No image".to_string();
        };
        let mut s = String::new();
        let _ = writeln!(s, "File: {}", rec.path.display());
        let _ = writeln!(
            s,
            "Image {} of {}",
            self.list.position(id).unwrap_or(0),
            self.list.len()
        );
        let _ = writeln!(
            s,
            "Size: {}x{} (showing {}x{})",
            rec.true_width, rec.true_height, rec.cur_width, rec.cur_height
        );
        let _ = writeln!(
            s,
            "Rotation: {} (EXIF {})",
            rec.cur_rot,
            rec.exif_rot.unwrap_or(0)
        );
        if let Some(date) = &rec.date {
            let _ = writeln!(s, "Date: {}", format_date(date));
        }
        let flags = rec.flag_string();
        if !flags.is_empty() {
            let _ = writeln!(s, "{}", flags);
        }
        if let Some(caption) = &rec.caption {
            let _ = writeln!(s, "Caption: {}", caption);
        }
        if let Some(comment) = &rec.comment {
            let _ = writeln!(s, "Comment: {}", comment);
        }
        s
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    fn after_nav(&mut self, nav: Nav, now: Instant, win: &mut dyn WindowAdapter) -> Flow {
        match nav {
            Nav::Moved => {
                self.slideshow.arm(now);
                self.sync_window(win);
                Flow::Continue
            }
            Nav::AtEnd => Flow::AtEnd,
            Nav::Empty => Flow::Quit,
        }
    }

    fn dispatch(&mut self, cmd: Command, win: &mut dyn WindowAdapter) -> Result<Flow> {
        let now = Instant::now();
        let flow = match cmd {
            Command::NextImage => {
                let nav = self.next_image()?;
                return Ok(self.after_nav(nav, now, win));
            }
            Command::PrevImage => {
                let nav = self.prev_image()?;
                return Ok(self.after_nav(nav, now, win));
            }
            Command::FirstImage => {
                let nav = self.first_image()?;
                return Ok(self.after_nav(nav, now, win));
            }
            Command::LastImage => {
                let nav = self.last_image()?;
                return Ok(self.after_nav(nav, now, win));
            }
            Command::Rotate(delta) => {
                self.rotate_by(delta)?;
                Flow::Continue
            }
            Command::ToggleFlag(note) => {
                self.toggle_flag(note as u32);
                Flow::Continue
            }
            Command::SetScaleMode(scale) => {
                self.set_scale(scale, win)?;
                Flow::Continue
            }
            Command::ToggleScaleMode(scale) => {
                let scale = if self.modes.scale == scale {
                    ScaleMode::Normal
                } else {
                    scale
                };
                self.set_scale(scale, win)?;
                Flow::Continue
            }
            Command::ZoomIn => {
                self.zoom(ZOOM_STEP, win)?;
                Flow::Continue
            }
            Command::ZoomOut => {
                self.zoom(1.0 / ZOOM_STEP, win)?;
                Flow::Continue
            }
            Command::TogglePresentation => {
                self.toggle_display(DisplayMode::Presentation, win)?;
                Flow::Continue
            }
            Command::ToggleKeywords => {
                self.toggle_display(DisplayMode::Keywords, win)?;
                Flow::Continue
            }
            Command::Delete => {
                let rec = self.list.current_record().ok_or(ViewerError::Empty)?;
                Flow::Prompt(Prompt::ConfirmDelete(rec.path.clone()))
            }
            Command::EditCaption => {
                let rec = self.list.current_record().ok_or(ViewerError::Empty)?;
                Flow::Prompt(Prompt::Caption(rec.caption.clone().unwrap_or_default()))
            }
            Command::EditComment => {
                let rec = self.list.current_record().ok_or(ViewerError::Empty)?;
                Flow::Prompt(Prompt::Comment(rec.comment.clone().unwrap_or_default()))
            }
            Command::EditKeyword => Flow::Prompt(Prompt::PickKeyword),
            Command::ShowInfo => {
                print!("{}", self.info());
                Flow::Continue
            }
            Command::Quit => return Ok(Flow::Quit),
        };
        self.sync_window(win);
        Ok(flow)
    }

    /// Run one user command. User input stops a pending slideshow advance;
    /// moving to another image starts the timer again. Failures become a
    /// notice and the session carries on.
    pub fn apply(&mut self, cmd: Command, win: &mut dyn WindowAdapter) -> Flow {
        self.slideshow.cancel();
        match self.dispatch(cmd, win) {
            Ok(flow) => flow,
            Err(ViewerError::Empty) => Flow::Quit,
            Err(e) => self.report_error(e, win),
        }
    }

    fn report_error(&mut self, e: ViewerError, win: &mut dyn WindowAdapter) -> Flow {
        log::warn!("{}", e);
        self.notice = Some(e.to_string());
        win.set_title(&self.window_title());
        win.request_redraw();
        Flow::Continue
    }

    /// The user said yes to deleting the current file.
    pub fn confirm_delete(&mut self, win: &mut dyn WindowAdapter) -> Flow {
        match self.delete_current() {
            Ok(nav) => self.after_nav(nav, Instant::now(), win),
            Err(e) => self.report_error(e, win),
        }
    }

    /// Advance the slideshow if its time has come.
    pub fn tick(&mut self, now: Instant, win: &mut dyn WindowAdapter) -> Flow {
        if !self.slideshow.due(now) {
            return Flow::Continue;
        }
        self.slideshow.cancel();
        match self.next_image() {
            Ok(nav) => self.after_nav(nav, now, win),
            Err(e) => self.report_error(e, win),
        }
    }

    /// Start the slideshow clock, if there is a slideshow.
    pub fn start_slideshow(&mut self, now: Instant) {
        self.slideshow.arm(now);
    }

    /// End of session: the report goes to `out`, captions go to disk.
    pub fn finish(&self, out: &mut impl Write) -> io::Result<()> {
        write_report(out, &self.list, &self.keywords)?;
        if let Some(store) = &self.captions {
            let saved = store.save(&self.list, &self.shared_captions)?;
            log::info!("Saved {} captions", saved);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::*;
    use crate::loader::ImageMeta;
    use crate::transform::test_pattern;
    use crate::view::testing::FakeWindow;

    #[derive(Default)]
    struct FakeSource {
        sizes: HashMap<PathBuf, (u32, u32)>,
        rotations: HashMap<PathBuf, u32>,
        refuse_delete: bool,
        /// Files whose reads fail outright rather than being unreadable images.
        io_errors: Vec<PathBuf>,
        removed: RefCell<Vec<PathBuf>>,
        decodes: Cell<usize>,
    }

    impl FakeSource {
        fn with(images: &[(&str, (u32, u32))]) -> Self {
            Self {
                sizes: images
                    .iter()
                    .map(|(name, size)| (PathBuf::from(name), *size))
                    .collect(),
                ..Default::default()
            }
        }
    }

    impl ImageSource for FakeSource {
        fn decode(&self, path: &Path) -> Result<PixelBuffer> {
            self.decodes.set(self.decodes.get() + 1);
            if self.io_errors.iter().any(|p| p == path) {
                return Err(io::Error::other("device went away").into());
            }
            match self.sizes.get(path) {
                Some(&(w, h)) => Ok(test_pattern(w, h, 3)),
                None => Err(ViewerError::Decode {
                    path: path.to_path_buf(),
                    reason: "not an image".to_string(),
                }),
            }
        }

        fn metadata(&self, path: &Path) -> ImageMeta {
            ImageMeta {
                rotation: self.rotations.get(path).copied().unwrap_or(0),
                date: None,
            }
        }

        fn remove(&self, path: &Path) -> io::Result<()> {
            if self.refuse_delete {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"));
            }
            self.removed.borrow_mut().push(path.to_path_buf());
            Ok(())
        }
    }

    fn session_with(source: FakeSource, files: &[&str], opts: Options) -> Session<FakeSource> {
        let files = files.iter().map(PathBuf::from).collect();
        Session::new(source, files, ScreenGeometry::new(1600, 1200), opts).unwrap()
    }

    fn abc() -> Session<FakeSource> {
        let source = FakeSource::with(&[("A.jpg", (8, 6)), ("B.jpg", (40, 30)), ("C.jpg", (30, 40))]);
        session_with(source, &["A.jpg", "B.jpg", "C.jpg"], Options::default())
    }

    fn current_name<S: ImageSource>(s: &Session<S>) -> PathBuf {
        s.current_record().unwrap().path.clone()
    }

    fn names<S: ImageSource>(s: &Session<S>) -> Vec<PathBuf> {
        s.list().iter().map(|(_, r)| r.path.clone()).collect()
    }

    #[test]
    fn two_quarter_turns_make_a_half_turn() {
        let mut s = abc();
        assert_eq!(s.first_image().unwrap(), Nav::Moved);
        let original = s.current_record().unwrap().pixels.clone().unwrap();
        assert_eq!(s.current_record().unwrap().cur_size(), (8, 6));

        s.rotate_by(90).unwrap();
        assert_eq!(s.current_record().unwrap().cur_rot, 90);
        assert_eq!(s.current_record().unwrap().cur_size(), (6, 8));
        s.rotate_by(90).unwrap();

        let rec = s.current_record().unwrap();
        assert_eq!(rec.cur_rot, 180);
        assert_eq!(rec.cur_size(), (8, 6));
        assert_eq!(rec.true_size(), (8, 6));
        assert_eq!(rec.pixels.as_ref(), Some(&original.rotated_by(180).unwrap()));

        s.rotate_by(90).unwrap();
        s.rotate_by(90).unwrap();
        let rec = s.current_record().unwrap();
        assert_eq!(rec.cur_rot, 0);
        assert_eq!(rec.pixels.as_ref(), Some(&original));
    }

    #[test]
    fn rotation_is_absolute() {
        let mut s = abc();
        s.first_image().unwrap();
        s.set_rotation(270).unwrap();
        s.set_rotation(-90).unwrap();
        assert_eq!(s.current_record().unwrap().cur_rot, 270);
        s.rotate_by(-270).unwrap();
        assert_eq!(s.current_record().unwrap().cur_rot, 0);
        assert!(matches!(
            s.set_rotation(45),
            Err(ViewerError::Transform(_))
        ));
        assert_eq!(s.current_record().unwrap().cur_rot, 0);
    }

    #[test]
    fn fixed_bound_sizes_each_image() {
        let source = FakeSource::with(&[("wide.jpg", (800, 600)), ("tall.jpg", (400, 800))]);
        let opts = Options {
            modes: ViewModes::new(DisplayMode::Normal, ScaleMode::Fixed, 200.0),
            ..Default::default()
        };
        let mut s = session_with(source, &["wide.jpg", "tall.jpg"], opts);
        let mut win = FakeWindow::default();

        s.first_image().unwrap();
        assert_eq!(s.current_record().unwrap().cur_size(), (200, 150));
        assert_eq!(s.current_record().unwrap().true_size(), (800, 600));

        assert_eq!(s.apply(Command::NextImage, &mut win), Flow::Continue);
        assert_eq!(s.current_record().unwrap().cur_size(), (100, 200));
        assert_eq!(win.size, (100, 200));
        assert!(win.title.contains("tall.jpg"));
    }

    #[test]
    fn exif_rotation_is_applied_on_first_load() {
        let mut source = FakeSource::with(&[("A.jpg", (8, 6))]);
        source.rotations.insert(PathBuf::from("A.jpg"), 90);
        let mut s = session_with(source, &["A.jpg"], Options::default());
        s.first_image().unwrap();
        let rec = s.current_record().unwrap();
        assert_eq!(rec.cur_rot, 90);
        assert_eq!(rec.exif_rot, Some(90));
        assert_eq!(rec.cur_size(), (6, 8));
    }

    #[test]
    fn deleting_the_current_image_moves_on() {
        let mut s = abc();
        s.first_image().unwrap();
        s.next_image().unwrap();
        assert_eq!(current_name(&s), PathBuf::from("B.jpg"));

        assert_eq!(s.delete_current().unwrap(), Nav::Moved);
        assert_eq!(current_name(&s), PathBuf::from("C.jpg"));
        assert_eq!(names(&s), ["A.jpg", "C.jpg"].map(PathBuf::from));
        assert_eq!(*s.source.removed.borrow(), vec![PathBuf::from("B.jpg")]);

        // Deleting the last one wraps round.
        assert_eq!(s.delete_current().unwrap(), Nav::Moved);
        assert_eq!(current_name(&s), PathBuf::from("A.jpg"));

        assert_eq!(s.delete_current().unwrap(), Nav::Empty);
        assert!(s.list().is_empty());
        assert!(s.current_record().is_none());
    }

    #[test]
    fn refused_delete_keeps_the_record() {
        let mut source = FakeSource::with(&[("A.jpg", (8, 6)), ("B.jpg", (8, 6))]);
        source.refuse_delete = true;
        let mut s = session_with(source, &["A.jpg", "B.jpg"], Options::default());
        let mut win = FakeWindow::default();
        s.first_image().unwrap();

        assert!(matches!(s.delete_current(), Err(ViewerError::Delete { .. })));
        assert_eq!(s.list().len(), 2);
        assert_eq!(current_name(&s), PathBuf::from("A.jpg"));

        assert_eq!(s.confirm_delete(&mut win), Flow::Continue);
        assert!(s.notice().is_some_and(|n| n.contains("A.jpg")));
        assert_eq!(s.list().len(), 2);
    }

    #[test]
    fn delete_keeps_a_current_image_when_the_next_fails() {
        let mut source = FakeSource::with(&[("A.jpg", (8, 6)), ("B.jpg", (8, 6)), ("C.jpg", (8, 6))]);
        source.io_errors = vec![PathBuf::from("B.jpg")];
        let mut s = session_with(source, &["A.jpg", "B.jpg", "C.jpg"], Options::default());
        let mut win = FakeWindow::default();
        s.first_image().unwrap();

        assert_eq!(s.confirm_delete(&mut win), Flow::Continue);
        assert_eq!(s.list().len(), 2);
        assert_eq!(current_name(&s), PathBuf::from("B.jpg"));
        assert!(s.notice().is_some_and(|n| n.contains("device went away")));

        // Commands still work instead of ending the session.
        assert_eq!(s.apply(Command::Rotate(90), &mut win), Flow::Continue);
        assert_eq!(s.list().len(), 2);
        assert_eq!(s.apply(Command::NextImage, &mut win), Flow::Continue);
        assert_eq!(current_name(&s), PathBuf::from("C.jpg"));
        assert!(s.current_record().unwrap().is_loaded());
    }

    #[test]
    fn unreadable_files_are_skipped() {
        let source = FakeSource::with(&[("A.jpg", (8, 6)), ("C.jpg", (8, 6))]);
        let mut s = session_with(source, &["A.jpg", "bad.jpg", "C.jpg"], Options::default());
        s.first_image().unwrap();
        assert_eq!(s.next_image().unwrap(), Nav::Moved);
        assert_eq!(current_name(&s), PathBuf::from("C.jpg"));
        assert_eq!(s.list().len(), 2);
        assert!(s.notice().is_some());

        // Backwards too.
        let source = FakeSource::with(&[("A.jpg", (8, 6)), ("C.jpg", (8, 6))]);
        let mut s = session_with(source, &["A.jpg", "bad.jpg", "C.jpg"], Options::default());
        s.last_image().unwrap();
        assert_eq!(s.prev_image().unwrap(), Nav::Moved);
        assert_eq!(current_name(&s), PathBuf::from("A.jpg"));
    }

    #[test]
    fn nothing_readable_means_empty() {
        let mut s = session_with(FakeSource::default(), &["x.jpg", "y.jpg"], Options::default());
        assert_eq!(s.first_image().unwrap(), Nav::Empty);
        assert!(s.list().is_empty());

        let mut s = session_with(FakeSource::default(), &[], Options::default());
        assert_eq!(s.first_image().unwrap(), Nav::Empty);
    }

    #[test]
    fn next_stops_at_the_end_unless_repeating() {
        let mut s = abc();
        s.last_image().unwrap();
        assert_eq!(s.next_image().unwrap(), Nav::AtEnd);
        assert_eq!(current_name(&s), PathBuf::from("C.jpg"));

        let source = FakeSource::with(&[("A.jpg", (8, 6)), ("B.jpg", (8, 6))]);
        let opts = Options {
            repeat: true,
            ..Default::default()
        };
        let mut s = session_with(source, &["A.jpg", "B.jpg"], opts);
        s.last_image().unwrap();
        assert_eq!(s.next_image().unwrap(), Nav::Moved);
        assert_eq!(current_name(&s), PathBuf::from("A.jpg"));
    }

    #[test]
    fn moving_on_releases_the_previous_buffer() {
        let mut s = abc();
        s.first_image().unwrap();
        s.next_image().unwrap();
        let head = s.list().head().unwrap();
        let first = s.list().get(head).unwrap();
        assert!(!first.is_loaded());
        assert_eq!(first.cur_size(), (8, 6));
        assert!(s.current_record().unwrap().is_loaded());
    }

    #[test]
    fn failed_mode_change_rolls_back() {
        let mut s = abc();
        let mut win = FakeWindow::default();
        s.first_image().unwrap();
        let before = s.current_record().unwrap().pixels.clone();
        let modes = s.modes();

        let huge = ViewModes::new(DisplayMode::Presentation, ScaleMode::ImageRatio, 1e10);
        assert!(matches!(
            s.set_view_modes(huge, &mut win),
            Err(ViewerError::Transform(_))
        ));
        assert_eq!(s.modes(), modes);
        assert_eq!(s.current_record().unwrap().pixels, before);
        assert_eq!(s.current_record().unwrap().cur_size(), (8, 6));
        assert!(!win.fullscreen);
        assert!(!win.cursor_hidden);

        assert_eq!(s.apply(Command::SetScaleMode(ScaleMode::FullScreen), &mut win), Flow::Continue);
        assert!(s.notice().is_none());
        assert_eq!(s.modes().scale, ScaleMode::FullScreen);

        // Zoomed far past what fits in memory: through a command the
        // failure is only a notice and the old modes stay.
        s.modes = s.modes.with_scale(ScaleMode::ScreenRatio, 1e10);
        let modes = s.modes();
        let shown = s.current_record().unwrap().cur_size();
        assert_eq!(s.apply(Command::ZoomIn, &mut win), Flow::Continue);
        assert!(s.notice().is_some());
        assert_eq!(s.modes(), modes);
        assert_eq!(s.current_record().unwrap().cur_size(), shown);
    }

    #[test]
    fn unchanged_modes_are_a_no_op() {
        let mut s = abc();
        let mut win = FakeWindow::default();
        s.first_image().unwrap();
        s.set_view_modes(s.modes(), &mut win).unwrap();
        assert_eq!(win.redraws, 0);
        assert_eq!(win.title, "");
    }

    #[test]
    fn keyword_mode_forces_a_fixed_size() {
        let source = FakeSource::with(&[("A.jpg", (3000, 2000))]);
        let mut s = session_with(source, &["A.jpg"], Options::default());
        let mut win = FakeWindow::default();
        s.first_image().unwrap();
        assert_eq!(s.current_record().unwrap().cur_size(), (1590, 1060));

        assert_eq!(s.apply(Command::ToggleKeywords, &mut win), Flow::Continue);
        let modes = s.modes();
        assert_eq!(modes.display, DisplayMode::Keywords);
        assert_eq!(modes.scale, ScaleMode::Fixed);
        assert!((modes.ratio - 1172.0 * 0.95).abs() < 1e-6);
        assert_eq!(s.current_record().unwrap().cur_size(), (1113, 742));
        assert_eq!(win.size, (1113, 742 + KEYWORD_PANEL_HEIGHT));

        // Staying in keyword mode, the requested scale is honoured.
        let full = ViewModes::new(DisplayMode::Keywords, ScaleMode::FullSize, 1.0);
        s.set_view_modes(full, &mut win).unwrap();
        assert_eq!(s.modes(), full);

        // Leaving restores what was in effect before.
        s.apply(Command::ToggleKeywords, &mut win);
        assert_eq!(s.modes(), ViewModes::default());
        assert_eq!(s.current_record().unwrap().cur_size(), (1590, 1060));
    }

    #[test]
    fn starting_in_keyword_mode() {
        let opts = Options {
            modes: ViewModes::default().with_display(DisplayMode::Keywords),
            ..Default::default()
        };
        let mut s = session_with(FakeSource::default(), &[], opts);
        assert_eq!(s.modes().scale, ScaleMode::Fixed);

        // The real monitor is only known once there is a window.
        s.set_screen(1000, 800);
        s.attach(&mut FakeWindow::default());
        let expected = keyword_fixed_size(s.usable());
        assert_eq!(s.modes().scale, ScaleMode::Fixed);
        assert_eq!(s.modes().ratio, expected);
        assert!(expected < 800.0);
    }

    #[test]
    fn presentation_mode_centers_the_image() {
        let mut s = abc();
        let mut win = FakeWindow::default();
        s.first_image().unwrap();
        assert_eq!(s.draw_offset(), (0, 0));

        s.apply(Command::TogglePresentation, &mut win);
        assert!(win.fullscreen);
        assert!(win.cursor_hidden);
        assert_eq!(s.usable(), (1600, 1200));
        assert_eq!(s.draw_offset(), ((1600 - 8) / 2, (1200 - 6) / 2));
        assert_eq!(s.window_size(), None);

        s.apply(Command::TogglePresentation, &mut win);
        assert!(!win.fullscreen);
        assert!(!win.cursor_hidden);
        assert_eq!(s.draw_offset(), (0, 0));
    }

    #[test]
    fn dragging_pans_within_the_screen() {
        let source = FakeSource::with(&[("A.jpg", (400, 300)), ("B.jpg", (400, 300))]);
        let mut s = session_with(source, &["A.jpg", "B.jpg"], Options::default());
        let mut win = FakeWindow::default();
        s.first_image().unwrap();
        assert!(!s.pan_by(10, 10));

        s.apply(Command::TogglePresentation, &mut win);
        assert_eq!(s.draw_offset(), (600, 450));
        assert!(s.pan_by(-50, 20));
        assert_eq!(s.draw_offset(), (550, 470));

        // Stops at the screen edge, and coming back starts right away.
        assert!(s.pan_by(-5000, 0));
        assert_eq!(s.draw_offset(), (0, 470));
        assert!(!s.pan_by(-10, 0));
        assert!(s.pan_by(10, 0));
        assert_eq!(s.draw_offset(), (10, 470));

        // A new image starts centered.
        s.apply(Command::NextImage, &mut win);
        assert_eq!(s.draw_offset(), (600, 450));
    }

    #[test]
    fn presentation_size_overrides_the_screen() {
        let source = FakeSource::with(&[("A.jpg", (100, 100))]);
        let opts = Options {
            modes: ViewModes::default().with_display(DisplayMode::Presentation),
            presentation_size: Some((1024, 768)),
            ..Default::default()
        };
        let mut s = session_with(source, &["A.jpg"], opts);
        s.first_image().unwrap();
        assert_eq!(s.usable(), (1024, 768));
        assert_eq!(s.draw_offset(), (462, 334));
    }

    #[test]
    fn growing_past_the_buffer_rereads_the_file() {
        let source = FakeSource::with(&[("A.jpg", (800, 600))]);
        let opts = Options {
            modes: ViewModes::new(DisplayMode::Normal, ScaleMode::Fixed, 200.0),
            ..Default::default()
        };
        let mut s = session_with(source, &["A.jpg"], opts);
        let mut win = FakeWindow::default();
        s.first_image().unwrap();
        assert_eq!(s.source.decodes.get(), 1);

        s.apply(Command::SetScaleMode(ScaleMode::Normal), &mut win);
        assert_eq!(s.source.decodes.get(), 2);
        assert_eq!(s.current_record().unwrap().cur_size(), (800, 600));

        // Shrinking works from memory.
        s.apply(Command::ToggleScaleMode(ScaleMode::Fixed), &mut win);
        assert_eq!(s.source.decodes.get(), 2);
        assert_eq!(s.current_record().unwrap().cur_size(), (800, 600));
        assert_eq!(s.modes().ratio, DEFAULT_FIXED_SIZE);
    }

    #[test]
    fn refresh_twice_changes_nothing() {
        let mut s = abc();
        s.first_image().unwrap();
        s.refresh().unwrap();
        let before = s.current_record().unwrap().pixels.clone();
        s.refresh().unwrap();
        assert_eq!(s.current_record().unwrap().pixels, before);
        assert_eq!(s.source.decodes.get(), 1);
    }

    #[test]
    fn zoom_switches_to_image_ratio() {
        let mut s = abc();
        let mut win = FakeWindow::default();
        s.first_image().unwrap();
        s.next_image().unwrap();
        s.apply(Command::ZoomIn, &mut win);
        assert_eq!(s.modes().scale, ScaleMode::ImageRatio);
        assert_eq!(s.current_record().unwrap().cur_size(), (50, 38));
        s.apply(Command::ZoomOut, &mut win);
        assert_eq!(s.current_record().unwrap().cur_size(), (40, 30));
    }

    #[test]
    fn flags_and_text_through_commands() {
        let mut s = abc();
        let mut win = FakeWindow::default();
        s.first_image().unwrap();

        s.apply(Command::ToggleFlag(3), &mut win);
        assert!(s.current_record().unwrap().has_flag(3));
        s.apply(Command::ToggleFlag(3), &mut win);
        assert_eq!(s.current_record().unwrap().note_flags, 0);

        assert_eq!(
            s.apply(Command::EditComment, &mut win),
            Flow::Prompt(Prompt::Comment(String::new()))
        );
        s.set_comment("blurry");
        s.set_caption("At the beach");
        assert_eq!(
            s.apply(Command::EditCaption, &mut win),
            Flow::Prompt(Prompt::Caption("At the beach".to_string()))
        );
        assert_eq!(
            s.apply(Command::Delete, &mut win),
            Flow::Prompt(Prompt::ConfirmDelete(PathBuf::from("A.jpg")))
        );
        assert!(s.info().contains("Comment: blurry"));
        assert_eq!(s.apply(Command::Quit, &mut win), Flow::Quit);
    }

    #[test]
    fn keyword_labels_are_edited_in_session() {
        let mut s = abc();
        let mut win = FakeWindow::default();
        s.first_image().unwrap();
        assert_eq!(s.apply(Command::EditKeyword, &mut win), Flow::Prompt(Prompt::PickKeyword));

        s.set_keyword(2, "  family ");
        assert_eq!(s.keywords(), ["", "", "family"]);
        assert_eq!(s.keyword(2), "family");
        assert_eq!(s.keyword(7), "");

        s.apply(Command::ToggleKeywords, &mut win);
        s.apply(Command::ToggleFlag(2), &mut win);
        assert!(win.title.contains(" | 2:family*"));

        // Clearing the highest label shrinks the list again.
        s.set_keyword(2, "");
        assert!(s.keywords().is_empty());
        s.set_keyword(MAX_FLAGS, "ignored");
        assert!(s.keywords().is_empty());

        s.set_keyword(0, "work");
        let mut out = Vec::new();
        s.toggle_flag(0);
        s.finish(&mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().contains("Note 0 (work): A.jpg"));
    }

    #[test]
    fn finish_reports_rotations_and_flags() {
        let opts = Options {
            keywords: vec!["family".to_string()],
            ..Default::default()
        };
        let source = FakeSource::with(&[("A.jpg", (8, 6)), ("B.jpg", (8, 6))]);
        let mut s = session_with(source, &["A.jpg", "B.jpg"], opts);
        s.first_image().unwrap();
        s.rotate_by(90).unwrap();
        s.toggle_flag(0);

        let mut out = Vec::new();
        s.finish(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Rotate 90 (CW): A.jpg"));
        assert!(text.contains("Note 0 (family): A.jpg"));
        assert!(!text.contains("B.jpg"));
    }

    #[test]
    fn captions_round_trip_through_a_shared_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("captions.txt");
        std::fs::write(&store, "A.jpg: Old caption\nother.jpg: keep me\n").unwrap();

        let opts = Options {
            captions: Some(CaptionStore::from_pattern(&store.to_string_lossy())),
            ..Default::default()
        };
        let mut s = session_with(abc().source, &["A.jpg", "B.jpg"], opts);
        s.first_image().unwrap();
        assert_eq!(
            s.current_record().unwrap().caption.as_deref(),
            Some("Old caption")
        );
        s.next_image().unwrap();
        s.set_caption("New one");
        s.finish(&mut io::sink()).unwrap();

        let written = std::fs::read_to_string(&store).unwrap();
        assert_eq!(written, "A.jpg: Old caption\nother.jpg: keep me\nB.jpg: New one\n");
    }

    #[test]
    fn cleared_caption_stays_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("A.jpg");
        let caption_file = dir.path().join("A.jpg.txt");
        std::fs::write(&caption_file, "old\n").unwrap();

        let source = FakeSource::with(&[(image.to_str().unwrap(), (8, 6))]);
        let opts = Options {
            captions: Some(CaptionStore::from_pattern("%s.txt")),
            ..Default::default()
        };
        let mut s = session_with(source, &[image.to_str().unwrap()], opts);
        s.first_image().unwrap();
        assert_eq!(s.current_record().unwrap().caption.as_deref(), Some("old"));

        s.set_caption("");
        s.finish(&mut io::sink()).unwrap();
        assert!(!caption_file.exists());
    }

    #[test]
    fn slideshow_advances_and_input_cancels() {
        let opts = Options {
            slideshow: Some(Duration::from_secs(3)),
            ..Default::default()
        };
        let source = FakeSource::with(&[("A.jpg", (8, 6)), ("B.jpg", (8, 6))]);
        let mut s = session_with(source, &["A.jpg", "B.jpg"], opts);
        let mut win = FakeWindow::default();
        s.first_image().unwrap();

        let t0 = Instant::now();
        s.start_slideshow(t0);
        assert_eq!(s.slideshow_deadline(), Some(t0 + Duration::from_secs(3)));
        assert_eq!(s.tick(t0 + Duration::from_secs(1), &mut win), Flow::Continue);
        assert_eq!(current_name(&s), PathBuf::from("A.jpg"));

        assert_eq!(s.tick(t0 + Duration::from_secs(3), &mut win), Flow::Continue);
        assert_eq!(current_name(&s), PathBuf::from("B.jpg"));
        assert!(s.slideshow_deadline().is_some());

        // Any key stops the pending advance.
        s.apply(Command::ToggleFlag(1), &mut win);
        assert_eq!(s.slideshow_deadline(), None);
        assert_eq!(s.tick(t0 + Duration::from_secs(60), &mut win), Flow::Continue);
        assert_eq!(current_name(&s), PathBuf::from("B.jpg"));
    }

    #[test]
    fn slideshow_timer() {
        let mut show = Slideshow::new(None, false);
        let now = Instant::now();
        show.arm(now);
        assert!(!show.due(now));

        let mut show = Slideshow::new(Some(Duration::from_millis(10)), false);
        show.arm(now);
        assert!(!show.due(now));
        assert!(show.due(now + Duration::from_millis(10)));
        show.cancel();
        assert!(!show.due(now + Duration::from_secs(1)));
    }

    #[test]
    fn window_is_kept_on_screen() {
        let source = FakeSource::with(&[("A.jpg", (400, 300))]);
        let mut s = session_with(source, &["A.jpg"], Options::default());
        let mut win = FakeWindow {
            pos: (1500, 1100),
            ..Default::default()
        };
        s.first_image().unwrap();
        s.attach(&mut win);
        assert_eq!(win.size, (400, 300));
        assert_eq!(win.pos, (1600 - 410, 1200 - 328));
    }
}
