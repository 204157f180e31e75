//! Editor sheet session for one Dream.
//!
//! # Invariants
//! - The session edits the board's view context; nothing reaches the store
//!   until `save`.
//! - Cancelling a new Dream with an empty title leaves no trace; `discard`
//!   drops a new Dream whatever its title.

use super::image::{load_image, ImageError, ImageFormat, ImageSource};
use super::view::DreamBoard;
use crate::model::dream::{Dream, DreamId};
use crate::store::StoreError;
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug)]
pub enum EditorError {
    Image(ImageError),
    Store(StoreError),
}

impl Display for EditorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Image(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for EditorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Image(err) => Some(err),
            Self::Store(err) => Some(err),
        }
    }
}

impl From<ImageError> for EditorError {
    fn from(value: ImageError) -> Self {
        Self::Image(value)
    }
}

impl From<StoreError> for EditorError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Borrow of the board while the editor sheet is open.
pub struct EditorSession<'a> {
    board: &'a mut DreamBoard,
    id: DreamId,
    is_new: bool,
}

impl<'a> EditorSession<'a> {
    pub(crate) fn new(board: &'a mut DreamBoard, id: DreamId, is_new: bool) -> Self {
        Self { board, id, is_new }
    }

    pub fn dream_id(&self) -> DreamId {
        self.id
    }

    /// Whether the session was opened through "create".
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Current in-context value of the edited Dream.
    pub fn dream(&mut self) -> Result<Dream, EditorError> {
        self.board
            .context_mut()
            .dream(self.id)?
            .ok_or(EditorError::Store(StoreError::NotFound(self.id)))
    }

    pub fn set_title(&mut self, title: impl Into<String>) -> Result<(), EditorError> {
        Ok(self.board.context_mut().set_title(self.id, title)?)
    }

    pub fn set_description(&mut self, description: impl Into<String>) -> Result<(), EditorError> {
        Ok(self.board.context_mut().set_description(self.id, description)?)
    }

    /// Loads an image from `source` and stores its bytes on the Dream.
    ///
    /// A rejected image leaves the current one untouched.
    pub fn set_image(&mut self, source: ImageSource) -> Result<ImageFormat, EditorError> {
        let (bytes, format) = match load_image(source) {
            Ok(loaded) => loaded,
            Err(err) => {
                warn!(
                    "event=editor_image module=board status=rejected dream_id={} error={}",
                    self.id, err
                );
                return Err(err.into());
            }
        };
        let size = bytes.len();
        self.board
            .context_mut()
            .set_image_data(self.id, Some(bytes))?;
        info!(
            "event=editor_image module=board status=ok dream_id={} format={} bytes={}",
            self.id,
            format.as_str(),
            size
        );
        Ok(format)
    }

    pub fn clear_image(&mut self) -> Result<(), EditorError> {
        Ok(self.board.context_mut().set_image_data(self.id, None)?)
    }

    /// Saves the view context. Failures are logged, not surfaced.
    pub fn save(self) -> bool {
        let saved = self.board.context_mut().save_or_log();
        self.board.refresh_or_log();
        info!(
            "event=editor_save module=board status={} dream_id={} is_new={}",
            if saved { "ok" } else { "error" },
            self.id,
            self.is_new
        );
        saved
    }

    /// Closes the sheet without saving.
    pub fn cancel(self) {
        let context = self.board.context_mut();
        let outcome = if self.is_new {
            let untitled = context
                .dream(self.id)
                .ok()
                .flatten()
                .map_or(true, |dream| dream.title.is_empty());
            if untitled {
                context.delete(self.id).map(|_| "discarded")
            } else {
                Ok("kept_pending")
            }
        } else {
            context.refresh(self.id).map(|_| "reverted")
        };
        match outcome {
            Ok(action) => info!(
                "event=editor_cancel module=board status=ok dream_id={} action={}",
                self.id, action
            ),
            Err(err) => warn!(
                "event=editor_cancel module=board status=error dream_id={} error={}",
                self.id, err
            ),
        }
        self.board.refresh_or_log();
    }

    /// Drops everything this session changed, whatever the title holds.
    ///
    /// A new Dream is removed from the context; an existing one is reverted
    /// to its stored values.
    pub fn discard(self) {
        let context = self.board.context_mut();
        let outcome = if self.is_new {
            context.delete(self.id).map(|_| "discarded")
        } else {
            context.refresh(self.id).map(|_| "reverted")
        };
        match outcome {
            Ok(action) => info!(
                "event=editor_discard module=board status=ok dream_id={} action={}",
                self.id, action
            ),
            Err(err) => warn!(
                "event=editor_discard module=board status=error dream_id={} error={}",
                self.id, err
            ),
        }
        self.board.refresh_or_log();
    }
}
