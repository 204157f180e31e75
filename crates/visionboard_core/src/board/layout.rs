//! Adaptive grid geometry.
//!
//! # Invariants
//! - A grid always has at least one column.
//! - Card height is card width times the golden ratio.
//! - Zoom is stored in tenths, so repeated steps never drift.

use serde::{Deserialize, Serialize};

pub const GOLDEN_RATIO: f64 = 1.618_033_988_749_895;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenClass {
    Compact,
    Regular,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerKind {
    /// Mouse or trackpad.
    Fine,
    Touch,
}

/// Capabilities of the device the board is drawn on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutProfile {
    pub screen: ScreenClass,
    pub pointer: PointerKind,
}

impl LayoutProfile {
    pub fn desktop() -> Self {
        Self {
            screen: ScreenClass::Regular,
            pointer: PointerKind::Fine,
        }
    }

    pub fn phone() -> Self {
        Self {
            screen: ScreenClass::Compact,
            pointer: PointerKind::Touch,
        }
    }

    pub fn tablet() -> Self {
        Self {
            screen: ScreenClass::Regular,
            pointer: PointerKind::Touch,
        }
    }
}

/// Card width scale factor from the zoom slider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ZoomLevel {
    tenths: u8,
}

impl ZoomLevel {
    pub const MIN: f64 = 0.5;
    pub const MAX: f64 = 2.0;
    pub const STEP: f64 = 0.1;

    const MIN_TENTHS: u8 = 5;
    const MAX_TENTHS: u8 = 20;

    /// Clamps to `[0.5, 2.0]` and snaps to the nearest 0.1; NaN maps to 1.0.
    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            return Self::default();
        }
        let clamped = value.clamp(Self::MIN, Self::MAX);
        Self {
            tenths: (clamped * 10.0).round() as u8,
        }
    }

    pub fn value(self) -> f64 {
        f64::from(self.tenths) / 10.0
    }

    pub fn zoom_in(self) -> Self {
        Self {
            tenths: (self.tenths + 1).min(Self::MAX_TENTHS),
        }
    }

    pub fn zoom_out(self) -> Self {
        Self {
            tenths: self.tenths.saturating_sub(1).max(Self::MIN_TENTHS),
        }
    }
}

impl Default for ZoomLevel {
    fn default() -> Self {
        Self { tenths: 10 }
    }
}

/// Spacing constants, in logical points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutMetrics {
    /// Minimum card width at zoom 1.0 for fine-pointer grids.
    pub min_card_width: f64,
    pub spacing: f64,
    pub padding: f64,
    pub compact_padding: f64,
    /// Touch grids switch from one to two columns at this width.
    pub touch_breakpoint: f64,
}

impl Default for LayoutMetrics {
    fn default() -> Self {
        Self {
            min_card_width: 200.0,
            spacing: 16.0,
            padding: 16.0,
            compact_padding: 8.0,
            touch_breakpoint: 600.0,
        }
    }
}

/// Position of one card inside the grid's content area.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CardFrame {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Computed grid geometry for one container width.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridLayout {
    pub columns: u32,
    pub card_width: f64,
    pub card_height: f64,
    pub spacing: f64,
    pub padding: f64,
}

impl GridLayout {
    pub fn rows_for(&self, card_count: usize) -> usize {
        card_count.div_ceil(self.columns as usize)
    }

    /// Frame of the card at `index` in row-major order.
    pub fn frame_for(&self, index: usize) -> CardFrame {
        let columns = self.columns as usize;
        let column = (index % columns) as f64;
        let row = (index / columns) as f64;
        CardFrame {
            x: self.padding + column * (self.card_width + self.spacing),
            y: self.padding + row * (self.card_height + self.spacing),
            width: self.card_width,
            height: self.card_height,
        }
    }

    /// Scrollable content height for `card_count` cards.
    pub fn content_height(&self, card_count: usize) -> f64 {
        let rows = self.rows_for(card_count) as f64;
        if rows == 0.0 {
            return self.padding * 2.0;
        }
        self.padding * 2.0 + rows * self.card_height + (rows - 1.0) * self.spacing
    }
}

/// Single layout engine parameterized by device profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutEngine {
    profile: LayoutProfile,
    metrics: LayoutMetrics,
}

impl LayoutEngine {
    pub fn new(profile: LayoutProfile) -> Self {
        Self::with_metrics(profile, LayoutMetrics::default())
    }

    pub fn with_metrics(profile: LayoutProfile, metrics: LayoutMetrics) -> Self {
        Self { profile, metrics }
    }

    pub fn profile(&self) -> LayoutProfile {
        self.profile
    }

    pub fn layout(&self, container_width: f64, zoom: ZoomLevel) -> GridLayout {
        let padding = match self.profile.screen {
            ScreenClass::Compact => self.metrics.compact_padding,
            ScreenClass::Regular => self.metrics.padding,
        };
        let spacing = self.metrics.spacing;
        let usable = (container_width - padding * 2.0).max(0.0);

        let columns = match self.profile.pointer {
            PointerKind::Fine => {
                let min_width = self.metrics.min_card_width * zoom.value();
                ((usable + spacing) / (min_width + spacing)).floor().max(1.0) as u32
            }
            PointerKind::Touch => {
                let base = if container_width < self.metrics.touch_breakpoint {
                    1.0
                } else {
                    2.0
                };
                (base / zoom.value()).round().max(1.0) as u32
            }
        };

        let gutters = spacing * f64::from(columns.saturating_sub(1));
        let card_width = ((usable - gutters) / f64::from(columns)).max(0.0);
        GridLayout {
            columns,
            card_width,
            card_height: card_width * GOLDEN_RATIO,
            spacing,
            padding,
        }
    }
}
