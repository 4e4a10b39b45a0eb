use std::fs;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::time::Instant;

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "tga", "tiff", "tif", "webp", "ico", "pnm", "pbm",
    "pgm", "ppm", "pam", "dds", "hdr", "exr", "ff", "qoi",
];

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn is_symlink(p: &Path) -> bool {
    fs::symlink_metadata(p)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

/// Build the working set, in order: the file list (if any), then each
/// path. Files named explicitly are kept whatever their extension, so the
/// decoder gets the final say; directories contribute only image files,
/// sorted.
pub fn collect_images(
    paths: &[PathBuf],
    file_list: Option<&Path>,
    recursive: bool,
    follow_links: bool,
) -> io::Result<Vec<PathBuf>> {
    let start_time = Instant::now();
    let mut files = Vec::new();

    if let Some(list_path) = file_list {
        let reader = io::BufReader::new(fs::File::open(list_path)?);
        for line in reader.lines() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let p = PathBuf::from(trimmed);
            if !follow_links && is_symlink(&p) {
                continue;
            }
            if p.is_file() {
                files.push(p);
            } else {
                log::warn!("Skipping {}: not a file", p.display());
            }
        }
    }

    for path in paths {
        if !follow_links && is_symlink(path) {
            continue;
        }
        if path.is_dir() {
            scan_dir(path, recursive, follow_links, &mut files);
        } else {
            files.push(path.clone());
        }
    }

    log::info!(
        "Found {} images in {:.2}s",
        files.len(),
        start_time.elapsed().as_secs_f64()
    );
    Ok(files)
}

fn scan_dir(dir: &Path, recursive: bool, follow_links: bool, out: &mut Vec<PathBuf>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("Can't read {}: {}", dir.display(), e);
            return;
        }
    };
    let mut files = Vec::new();
    let mut subdirs = Vec::new();

    for entry in entries.filter_map(|e| e.ok()) {
        let Ok(ft) = entry.file_type() else {
            continue;
        };
        if ft.is_symlink() && !follow_links {
            continue;
        }

        let p = entry.path();
        if p.is_file() && is_image_file(&p) {
            files.push(p);
        } else if recursive && p.is_dir() {
            subdirs.push(p);
        }
    }

    files.sort();
    log::debug!("Scanning {:?}: {} images", dir, files.len());
    out.extend(files);

    if recursive {
        subdirs.sort();
        for sub in subdirs {
            scan_dir(&sub, true, follow_links, out);
        }
    }
}
