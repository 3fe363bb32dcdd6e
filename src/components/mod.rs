pub mod arrows;
pub mod layers;

pub use arrows::ArrowsPanel;
pub use layers::{LayerAppAction, LayersPanel};
