use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use exif::{In, Tag, Value};
use image::GenericImageView;

use crate::error::{Result, ViewerError};
use crate::transform::PixelBuffer;

// ---------------------------------------------------------------------------
// What the session needs from the outside world
// ---------------------------------------------------------------------------

/// Facts read from a file's metadata. Missing metadata is all defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageMeta {
    /// Clockwise degrees the picture should be turned: 0, 90, 180 or 270.
    pub rotation: u32,
    pub date: Option<NaiveDateTime>,
}

pub trait ImageSource {
    fn decode(&self, path: &Path) -> Result<PixelBuffer>;
    fn metadata(&self, path: &Path) -> ImageMeta;
    fn remove(&self, path: &Path) -> io::Result<()>;
}

/// Images on the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiskSource;

impl ImageSource for DiskSource {
    fn decode(&self, path: &Path) -> Result<PixelBuffer> {
        decode_image(path)
    }

    fn metadata(&self, path: &Path) -> ImageMeta {
        read_meta(path)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

fn decode_image(path: &Path) -> Result<PixelBuffer> {
    let img = image::open(path).map_err(|e| ViewerError::Decode {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let (width, height) = img.dimensions();
    let (channels, bytes) = if img.color().has_alpha() {
        (4u8, img.into_rgba8().into_raw())
    } else {
        (3u8, img.into_rgb8().into_raw())
    };
    log::debug!(
        "Decoded {} ({}x{}, {} channels)",
        path.display(),
        width,
        height,
        channels
    );
    Ok(PixelBuffer::from_raw(
        width,
        height,
        channels,
        width as usize * channels as usize,
        bytes,
    )?)
}

// ---------------------------------------------------------------------------
// EXIF
// ---------------------------------------------------------------------------

/// Clockwise rotation for an EXIF orientation code. Mirrored codes are
/// treated as unrotated.
pub fn orientation_to_rotation(code: u32) -> u32 {
    match code {
        3 => 180,
        6 => 90,
        8 => 270,
        _ => 0,
    }
}

fn exif_date(exif: &exif::Exif) -> Option<NaiveDateTime> {
    let field = exif
        .get_field(Tag::DateTimeOriginal, In::PRIMARY)
        .or_else(|| exif.get_field(Tag::DateTime, In::PRIMARY))?;
    let Value::Ascii(ref parts) = field.value else {
        return None;
    };
    let dt = exif::DateTime::from_ascii(parts.first()?).ok()?;
    NaiveDate::from_ymd_opt(dt.year as i32, dt.month as u32, dt.day as u32)?.and_hms_opt(
        dt.hour as u32,
        dt.minute as u32,
        dt.second as u32,
    )
}

fn read_meta(path: &Path) -> ImageMeta {
    let Ok(file) = File::open(path) else {
        return ImageMeta::default();
    };
    let mut reader = BufReader::new(file);
    let exif = match exif::Reader::new().read_from_container(&mut reader) {
        Ok(exif) => exif,
        Err(e) => {
            log::debug!("No EXIF in {}: {}", path.display(), e);
            return ImageMeta::default();
        }
    };

    let rotation = exif
        .get_field(Tag::Orientation, In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .map(orientation_to_rotation)
        .unwrap_or(0);

    ImageMeta {
        rotation,
        date: exif_date(&exif),
    }
}

/// Date as shown in the title bar and info output.
pub fn format_date(date: &NaiveDateTime) -> String {
    date.format("%Y-%m-%d %H:%M:%S").to_string()
}
