//! Card faces and flip state.

use crate::model::dream::{Dream, DreamId};
use std::collections::BTreeSet;

pub const UNTITLED_LABEL: &str = "Untitled";
pub const NO_DESCRIPTION_LABEL: &str = "No Description";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardFace {
    /// Image with the title over it.
    Front,
    /// Description text.
    Back,
}

impl CardFace {
    pub fn flipped(self) -> Self {
        match self {
            Self::Front => Self::Back,
            Self::Back => Self::Front,
        }
    }
}

/// Render-ready view of one Dream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardModel<'a> {
    pub id: DreamId,
    pub face: CardFace,
    pub title: &'a str,
    pub description: &'a str,
    /// `None` renders the placeholder glyph.
    pub image: Option<&'a [u8]>,
}

impl<'a> CardModel<'a> {
    pub fn new(dream: &'a Dream, face: CardFace) -> Self {
        Self {
            id: dream.id,
            face,
            title: non_empty_or(&dream.title, UNTITLED_LABEL),
            description: non_empty_or(&dream.description, NO_DESCRIPTION_LABEL),
            image: dream.image_data.as_deref(),
        }
    }
}

fn non_empty_or<'a>(value: &'a str, fallback: &'static str) -> &'a str {
    if value.is_empty() {
        fallback
    } else {
        value
    }
}

/// Which cards currently show their back face.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlipState {
    flipped: BTreeSet<DreamId>,
}

impl FlipState {
    pub fn face(&self, id: DreamId) -> CardFace {
        if self.flipped.contains(&id) {
            CardFace::Back
        } else {
            CardFace::Front
        }
    }

    /// Flips one card and returns its new face.
    pub fn toggle(&mut self, id: DreamId) -> CardFace {
        if !self.flipped.remove(&id) {
            self.flipped.insert(id);
        }
        self.face(id)
    }

    /// Forgets cards that are no longer on the board.
    pub fn retain_ids(&mut self, live: &BTreeSet<DreamId>) {
        self.flipped.retain(|id| live.contains(id));
    }

    pub fn flipped_count(&self) -> usize {
        self.flipped.len()
    }
}
