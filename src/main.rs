mod cli;
mod commands;
mod error;
mod files;
mod imglist;
mod loader;
mod notes;
mod session;
mod transform;
mod ui;
mod view;

use std::io;
use std::process::ExitCode;

use clap::Parser;
use winit::event_loop::EventLoop;

use crate::cli::Cli;
use crate::error::ViewerError;
use crate::files::collect_images;
use crate::loader::DiskSource;
use crate::session::{Nav, Session};
use crate::ui::App;
use crate::view::ScreenGeometry;

// Until the window exists and a monitor can be asked.
const PLACEHOLDER_SCREEN: (u32, u32) = (1920, 1080);

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut logger = env_logger::Builder::from_default_env();
    if cli.debug {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    let files = match collect_images(&cli.paths, cli.file_list.as_deref(), cli.recursive, cli.follow_links) {
        Ok(files) => files,
        Err(e) => {
            log::error!("Can't build the file list: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if files.is_empty() {
        log::error!("No image files found.");
        return ExitCode::FAILURE;
    }
    log::info!("{} files to view", files.len());

    let geometry = ScreenGeometry::new(PLACEHOLDER_SCREEN.0, PLACEHOLDER_SCREEN.1);
    let mut session = match Session::new(DiskSource, files, geometry, cli.options()) {
        Ok(s) => s,
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    match session.first_image() {
        Ok(Nav::Empty) | Err(ViewerError::Empty) => {
            log::error!("None of the files could be decoded.");
            return ExitCode::FAILURE;
        }
        Ok(_) => {}
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
    }

    let event_loop = EventLoop::new().expect("create event loop");
    let mut app = App::new(session);
    if let Err(e) = event_loop.run_app(&mut app) {
        log::error!("Event loop failed: {}", e);
    }

    if let Err(e) = app.session.finish(&mut io::stdout().lock()) {
        log::error!("Can't write the report: {}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
