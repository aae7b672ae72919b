//! Collaborative sketching: geometry helpers, local state and the
//! synchronization protocol.

pub mod region;
pub mod state;
pub mod surface;
pub mod sync;
pub mod throttle;

pub use region::{Canvas, region_for_path};
pub use state::{History, LocalSketchState};
pub use surface::{Raster, Surface};
pub use sync::SketchSync;
