//! Applause engine core.
//!
//! The crate is organized leaves-first: containers and the error model at the
//! bottom, then messaging and logging, then resources and timers, then the
//! scene and networking, and the frame orchestrator ([`engine::Engine`]) on
//! top tying them into a deterministic per-frame sequence.

pub mod bus;
pub mod cli;
pub mod engine;
pub mod error;
pub mod glue;
pub mod input;
pub mod librarian;
pub mod logger;
pub mod net;
pub mod scene;
pub mod settings;
pub mod track;

pub use error::{Error, ErrorKind};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
