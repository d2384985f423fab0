//! HTTP API handlers for kashi-align

pub mod align;
pub mod health;

pub use align::{align_lyrics, align_routes};
pub use health::{health_routes, liveness};
