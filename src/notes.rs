use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::imglist::{ImageList, ImageRecord};

/// Bits available in `note_flags`.
pub const MAX_FLAGS: u32 = 31;

// ---------------------------------------------------------------------------
// Per-image annotations
// ---------------------------------------------------------------------------

fn non_empty(text: &str) -> Option<String> {
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

impl ImageRecord {
    pub fn toggle_flag(&mut self, note: u32) {
        if note < MAX_FLAGS {
            self.note_flags ^= 1 << note;
        }
    }

    pub fn has_flag(&self, note: u32) -> bool {
        note < MAX_FLAGS && self.note_flags & (1 << note) != 0
    }

    /// Empty text clears the comment.
    pub fn set_comment(&mut self, text: &str) {
        self.comment = non_empty(text);
    }

    pub fn set_caption(&mut self, text: &str) {
        self.caption = non_empty(text);
    }

    /// "Flags: 0 3 7", or an empty string when nothing is set.
    pub fn flag_string(&self) -> String {
        let set: Vec<String> = (0..MAX_FLAGS)
            .filter(|&n| self.has_flag(n))
            .map(|n| n.to_string())
            .collect();
        if set.is_empty() {
            String::new()
        } else {
            format!("Flags: {}", set.join(" "))
        }
    }
}

// ---------------------------------------------------------------------------
// End-of-session report
// ---------------------------------------------------------------------------

/// Quote a file name for a space-separated list if it needs it.
fn quote(name: &str) -> Cow<'_, str> {
    if name.chars().any(|c| c.is_whitespace() || c == '"' || c == '\'') {
        Cow::Owned(format!("\"{}\"", name.replace('"', "\\\"")))
    } else {
        Cow::Borrowed(name)
    }
}

#[derive(Default)]
struct Groups {
    rot90: Vec<String>,
    rot270: Vec<String>,
    rot180: Vec<String>,
    unrotated: Vec<String>,
    mismatched: Vec<String>,
    flags: Vec<Vec<String>>,
}

/// Print comments, then the files grouped by rotation, disagreement with
/// the metadata rotation, and flag. `keywords[n]` labels flag `n`.
pub fn write_report(out: &mut impl Write, list: &ImageList, keywords: &[String]) -> io::Result<()> {
    let mut groups = Groups {
        flags: vec![Vec::new(); MAX_FLAGS as usize],
        ..Default::default()
    };

    for (_, img) in list.iter().filter(|(_, img)| !img.deleted) {
        let name = img.path.to_string_lossy();
        if let Some(comment) = &img.comment {
            writeln!(out, "{}: {}", name, comment)?;
        }
        let quoted = quote(&name).into_owned();

        for (n, files) in groups.flags.iter_mut().enumerate() {
            if img.has_flag(n as u32) {
                files.push(quoted.clone());
            }
        }

        match img.cur_rot {
            90 => groups.rot90.push(quoted.clone()),
            180 => groups.rot180.push(quoted.clone()),
            270 => groups.rot270.push(quoted.clone()),
            _ => {}
        }

        match img.exif_rot {
            Some(exif) if exif != 0 && img.cur_rot == 0 => groups.unrotated.push(quoted),
            Some(exif) if exif != img.cur_rot => groups.mismatched.push(quoted),
            _ => {}
        }
    }

    let mut section = |title: &str, files: &[String]| -> io::Result<()> {
        if files.is_empty() {
            return Ok(());
        }
        writeln!(out, "\n{}: {}", title, files.join(" "))
    };
    section("Rotate 90 (CW)", &groups.rot90)?;
    section("Rotate -90 (CCW)", &groups.rot270)?;
    section("Rotate 180", &groups.rot180)?;
    section("Rotate 0 (EXIF says otherwise)", &groups.unrotated)?;
    section("Rotation differs from EXIF", &groups.mismatched)?;
    for (n, files) in groups.flags.iter().enumerate() {
        let title = match keywords.get(n).filter(|k| !k.is_empty()) {
            Some(label) => format!("Note {} ({})", n, label),
            None => format!("Note {}", n),
        };
        section(&title, files)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Captions
// ---------------------------------------------------------------------------

/// Where captions live. A pattern containing `%s` gives one file per image
/// (the image path replaces `%s`); anything else names a single shared
/// file of `filename: caption` lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptionStore {
    PerImage { pattern: String },
    Shared { path: PathBuf },
}

impl CaptionStore {
    pub fn from_pattern(pattern: &str) -> Self {
        if pattern.contains("%s") {
            CaptionStore::PerImage {
                pattern: pattern.to_string(),
            }
        } else {
            CaptionStore::Shared {
                path: PathBuf::from(pattern),
            }
        }
    }

    fn per_image_path(pattern: &str, image: &Path) -> PathBuf {
        PathBuf::from(pattern.replace("%s", &image.to_string_lossy()))
    }

    /// Read every caption from the shared file, in file order. A missing
    /// file is empty.
    pub fn load_shared(&self) -> io::Result<Vec<(PathBuf, String)>> {
        let CaptionStore::Shared { path } = self else {
            return Ok(Vec::new());
        };
        let text = match fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        Ok(text
            .lines()
            .filter_map(|line| line.split_once(": "))
            .filter(|(_, caption)| !caption.trim().is_empty())
            .map(|(file, caption)| (PathBuf::from(file), caption.trim().to_string()))
            .collect())
    }

    /// Read the caption file belonging to one image, if there is one.
    pub fn load_for(&self, image: &Path) -> io::Result<Option<String>> {
        let CaptionStore::PerImage { pattern } = self else {
            return Ok(None);
        };
        match fs::read_to_string(Self::per_image_path(pattern, image)) {
            Ok(t) => Ok(non_empty(&t)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Write captions back. `earlier` is what the shared file held when the
    /// session started; entries for images outside `list` are kept as they
    /// were. Per-image files whose caption was cleared are removed.
    /// Returns how many captions were written.
    pub fn save(&self, list: &ImageList, earlier: &[(PathBuf, String)]) -> io::Result<usize> {
        match self {
            CaptionStore::PerImage { pattern } => {
                let mut written = 0;
                for (_, img) in list.iter().filter(|(_, img)| !img.deleted) {
                    let path = Self::per_image_path(pattern, &img.path);
                    match &img.caption {
                        Some(caption) => {
                            fs::write(&path, format!("{}\n", caption))?;
                            log::debug!("Wrote caption {}", path.display());
                            written += 1;
                        }
                        None if img.caption_on_disk => match fs::remove_file(&path) {
                            Ok(()) => log::debug!("Removed caption {}", path.display()),
                            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                            Err(e) => return Err(e),
                        },
                        None => {}
                    }
                }
                Ok(written)
            }
            CaptionStore::Shared { path } => {
                let lines = merge_shared(list, earlier);
                let mut file = io::BufWriter::new(fs::File::create(path)?);
                for (image, caption) in &lines {
                    let one_line = caption.replace('\n', " ");
                    writeln!(file, "{}: {}", image.display(), one_line)?;
                }
                file.flush()?;
                log::debug!("Wrote {} captions to {}", lines.len(), path.display());
                Ok(lines.len())
            }
        }
    }
}

/// The shared file's entries with this session's edits applied. Existing
/// lines keep their place; new captions follow in list order.
fn merge_shared<'a>(list: &'a ImageList, earlier: &'a [(PathBuf, String)]) -> Vec<(&'a Path, &'a str)> {
    let session: HashMap<&Path, Option<&str>> = list
        .iter()
        .map(|(_, img)| {
            let caption = if img.deleted { None } else { img.caption.as_deref() };
            (img.path.as_path(), caption)
        })
        .collect();

    let mut seen = HashSet::new();
    let mut lines = Vec::new();
    for (image, caption) in earlier {
        if !seen.insert(image.as_path()) {
            continue;
        }
        match session.get(image.as_path()) {
            Some(Some(now)) => lines.push((image.as_path(), *now)),
            Some(None) => {}
            None => lines.push((image.as_path(), caption.as_str())),
        }
    }
    for (_, img) in list.iter().filter(|(_, img)| !img.deleted) {
        if let Some(caption) = img.caption.as_deref() {
            if seen.insert(img.path.as_path()) {
                lines.push((img.path.as_path(), caption));
            }
        }
    }
    lines
}
