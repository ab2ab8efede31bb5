extern crate smallvec;
extern crate thiserror;
extern crate tracing;
extern crate unicode_segmentation;

pub mod buffer;
pub mod config;
pub mod editor;
pub mod error;
pub mod history;

pub use crate::buffer::Rope;
pub use crate::config::Config;
pub use crate::editor::Editor;
pub use crate::error::{Error, Result};
pub use crate::history::{EditKind, History, OperationRecord, Position};
