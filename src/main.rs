extern crate backend;
extern crate clap;
extern crate crossterm;
extern crate tracing;
extern crate tracing_subscriber;
extern crate unicode_segmentation;
extern crate unicode_width;

mod term_ui;

use std::error::Error;
use std::fs::File;
use std::path::Path;
use std::sync::Mutex;

use clap::{App, Arg};
use tracing::info;
use tracing_subscriber::EnvFilter;

use backend::{Config, Editor};

use crate::term_ui::TermUI;

const DEFAULT_LOG_FILTER: &str = "ledit=info,backend=info";

fn main() -> Result<(), Box<dyn Error>> {
    // Parse command line arguments.
    let args = App::new("Ledit")
        .version(env!("CARGO_PKG_VERSION"))
        .about("A small terminal text editor")
        .arg(
            Arg::with_name("file")
                .help("File to open")
                .required(false)
                .index(1),
        )
        .arg(
            Arg::with_name("log")
                .long("log")
                .value_name("FILE")
                .help("Writes log output to FILE (filtered by RUST_LOG)")
                .takes_value(true),
        )
        .get_matches();

    // The terminal belongs to the ui, so logging only goes to a file.
    if let Some(path) = args.value_of("log") {
        let file = File::create(path)?;
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
            )
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .init();
    }

    let config = Config::from_env();
    let editor = match args.value_of("file") {
        Some(path) => Editor::open(Path::new(path), config)?,
        None => Editor::new(config),
    };
    info!(
        file = ?editor.file_path(),
        lines = editor.buffer().line_count(),
        "starting"
    );

    // Run the editor.  The ui restores the terminal when it's dropped.
    let mut ui = TermUI::new(editor)?;
    ui.main_ui_loop()?;

    Ok(())
}
