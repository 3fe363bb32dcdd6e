//! NormalMaker: layer painting and arrow-driven normal-map generation.
//!
//! The [`layers::LayerStore`] owns an ordered stack of backend-resident layers
//! and drives the paint, normal-generation and combine passes through the
//! [`gpu::LayerBackend`] trait.  [`editor::Editor`] adds the session rules
//! shared by the GUI and the headless CLI.

pub mod app;
pub mod arrows;
pub mod camera;
pub mod cli;
pub mod components;
pub mod debug_lines;
pub mod editor;
pub mod error;
pub mod gpu;
pub mod io;
pub mod layers;
pub mod logger;
pub mod project;
pub mod settings;

pub use editor::Editor;
pub use error::{Error, Result};
pub use layers::{BrushMode, Layer, LayerStore};
