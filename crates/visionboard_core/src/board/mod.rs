//! Toolkit-independent presentation state for the vision board.
//!
//! # Responsibility
//! - Keep the grid's data (sorted Dreams, flip state, zoom) in sync with the store.
//! - Compute grid geometry from one layout profile instead of per-platform code.
//! - Drive the editor sheet's create/edit/cancel/save lifecycle.
//!
//! # Invariants
//! - Board and editor never surface save failures; they log them.
//! - Re-fetches happen only after a store notification or an own commit.

pub mod card;
pub mod editor;
pub mod image;
pub mod layout;
pub mod view;

pub use card::{CardFace, CardModel, FlipState, NO_DESCRIPTION_LABEL, UNTITLED_LABEL};
pub use editor::{EditorError, EditorSession};
pub use image::{load_image, sniff_image_format, ImageError, ImageFormat, ImageSource};
pub use layout::{
    CardFrame, GridLayout, LayoutEngine, LayoutMetrics, LayoutProfile, PointerKind, ScreenClass,
    ZoomLevel, GOLDEN_RATIO,
};
pub use view::DreamBoard;
