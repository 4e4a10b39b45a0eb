use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::commands::HELP_KEYS;
use crate::notes::CaptionStore;
use crate::session::Options;
use crate::transform::Interpolation;
use crate::view::{DisplayMode, ScaleMode, ViewModes};

#[derive(Parser, Debug)]
#[command(
    name = "picnote",
    about = "A lightweight image viewer for sorting, rotating and annotating photos",
    after_help = HELP_KEYS
)]
pub struct Cli {
    /// Files or directories to view
    #[arg(required_unless_present = "file_list")]
    pub paths: Vec<PathBuf>,

    /// Load file list from a text file (one path per line)
    #[arg(short = 'L', long, value_name = "FILE")]
    pub file_list: Option<PathBuf>,

    /// Recurse into subdirectories
    #[arg(short, long)]
    pub recursive: bool,

    /// Follow symbolic links (default: false)
    #[arg(long)]
    pub follow_links: bool,

    /// Debug logging
    #[arg(short, long)]
    pub debug: bool,

    /// Start in presentation mode (full screen, no window decorations)
    #[arg(short, long)]
    pub presentation: bool,

    /// Screen size to center on in presentation mode, e.g. 1024x768
    #[arg(short = 'P', long, value_name = "WxH", value_parser = parse_size)]
    pub presentation_size: Option<(u32, u32)>,

    /// Start in keyword mode
    #[arg(short, long)]
    pub keywords: bool,

    /// Label for the next note flag in the report (repeatable: flag 0, 1, ...)
    #[arg(short = 'K', long = "keyword", value_name = "LABEL")]
    pub keyword_labels: Vec<String>,

    /// Caption file; with %s, one file per image (%s is the image path)
    #[arg(short, long, value_name = "PATTERN")]
    pub captions: Option<String>,

    /// Advance to the next image every SECONDS
    #[arg(short, long, value_name = "SECONDS", value_parser = parse_delay)]
    pub slideshow: Option<Duration>,

    /// Go back to the first image after the last one
    #[arg(long)]
    pub repeat: bool,

    /// Longest edge in fixed-size scaling
    #[arg(long, value_name = "PX", default_value = "800")]
    pub fixed_size: u32,

    /// Bilinear scaling instead of nearest neighbour
    #[arg(long)]
    pub smooth: bool,
}

fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", s))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<u32>()
            .ok()
            .filter(|&n| n > 0)
            .ok_or_else(|| format!("bad size '{}'", s))
    };
    Ok((parse(w)?, parse(h)?))
}

fn parse_delay(s: &str) -> Result<Duration, String> {
    let secs: f64 = s
        .trim()
        .parse()
        .map_err(|_| format!("expected a number of seconds, got '{}'", s))?;
    if secs <= 0.0 {
        return Err(format!("delay must be positive, got '{}'", s));
    }
    Duration::try_from_secs_f64(secs).map_err(|_| format!("delay '{}' is out of range", s))
}

impl Cli {
    /// Session settings implied by the flags.
    pub fn options(&self) -> Options {
        let display = if self.keywords {
            DisplayMode::Keywords
        } else if self.presentation {
            DisplayMode::Presentation
        } else {
            DisplayMode::Normal
        };
        Options {
            modes: ViewModes::new(display, ScaleMode::Normal, 1.0),
            interpolation: if self.smooth {
                Interpolation::Bilinear
            } else {
                Interpolation::Nearest
            },
            captions: self.captions.as_deref().map(CaptionStore::from_pattern),
            keywords: self.keyword_labels.clone(),
            slideshow: self.slideshow,
            repeat: self.repeat,
            fixed_size: self.fixed_size.max(1) as f64,
            presentation_size: self.presentation_size,
        }
    }
}
