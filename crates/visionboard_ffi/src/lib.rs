//! Flutter bridge for VisionBoard core.

pub mod api;
