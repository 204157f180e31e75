//! FFI use-case API for the Flutter board.
//!
//! # Responsibility
//! - Own the process's single store and board (composition root).
//! - Expose use-case level calls with envelope responses for Dart.
//!
//! # Invariants
//! - Exported functions never panic across the FFI boundary.
//! - Failures come back as `ok=false` envelopes with a message.

use log::{info, warn};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, OnceLock};
use uuid::Uuid;
use visionboard_core::board::sniff_image_format;
use visionboard_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, ping as ping_inner,
    Dream, DreamBoard, DreamId, ImageSource, LayoutProfile, PersistentStore, StoreConfig,
};

const BOARD_DB_FILE_NAME: &str = "visionboard.sqlite3";
static BOARD_DB_PATH: OnceLock<PathBuf> = OnceLock::new();
static BOARD: Mutex<Option<DreamBoard>> = Mutex::new(None);

/// Health check for bridge wiring.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Starts rolling file logs once per process.
///
/// `level` is one of `trace|debug|info|warn|error`; `log_dir` must be an
/// absolute path. Returns an empty string on success, the error otherwise.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err.to_string(),
    }
}

/// One card as Dart sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardDreamItem {
    pub id: String,
    pub title: String,
    pub description: String,
    /// Raw bytes; `None` renders the placeholder.
    pub image_data: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardListResponse {
    pub ok: bool,
    /// Dreams sorted by title, then id.
    pub items: Vec<BoardDreamItem>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardActionResponse {
    pub ok: bool,
    pub dream_id: Option<String>,
    pub message: String,
}

impl BoardActionResponse {
    fn success(message: impl Into<String>, dream_id: Option<DreamId>) -> Self {
        Self {
            ok: true,
            dream_id: dream_id.map(|id| id.to_string()),
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            dream_id: None,
            message: message.into(),
        }
    }
}

/// Grid geometry for one container width.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardLayoutResponse {
    pub ok: bool,
    pub columns: u32,
    pub card_width: f64,
    pub card_height: f64,
    pub spacing: f64,
    pub padding: f64,
    /// Zoom actually applied after clamping and snapping.
    pub zoom: f64,
    pub message: String,
}

/// Opens the board store at `VISIONBOARD_DB_PATH` (or a temp-dir file).
///
/// `profile` is `desktop|phone|tablet`. Calling again while open is a no-op.
///
/// # FFI contract
/// - Sync call; may create the database file.
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn board_open(profile: String) -> BoardActionResponse {
    let profile = match parse_profile(&profile) {
        Ok(profile) => profile,
        Err(message) => return BoardActionResponse::failure(message),
    };
    let mut slot = match lock_board() {
        Ok(slot) => slot,
        Err(message) => return BoardActionResponse::failure(message),
    };
    if slot.is_some() {
        return BoardActionResponse::success("Board already open.", None);
    }
    match open_board(profile) {
        Ok(board) => {
            *slot = Some(board);
            BoardActionResponse::success("Board opened.", None)
        }
        Err(message) => BoardActionResponse::failure(message),
    }
}

/// Lists Dreams after merging any pending store notifications.
#[flutter_rust_bridge::frb(sync)]
pub fn board_list() -> BoardListResponse {
    match with_board(|board| {
        board.poll_changes();
        Ok(board.dreams().iter().map(to_item).collect::<Vec<_>>())
    }) {
        Ok(items) => BoardListResponse {
            ok: true,
            message: format!("{} dream(s).", items.len()),
            items,
        },
        Err(message) => BoardListResponse {
            ok: false,
            items: Vec::new(),
            message,
        },
    }
}

/// Creates and saves a Dream in one step.
#[flutter_rust_bridge::frb(sync)]
pub fn board_create_dream(
    title: String,
    description: String,
    image_data: Option<Vec<u8>>,
) -> BoardActionResponse {
    if let Err(message) = check_image(image_data.as_deref()) {
        return BoardActionResponse::failure(message);
    }
    let result = with_board(|board| {
        let mut editor = board.create_dream();
        let id = editor.dream_id();
        let filled = editor
            .set_title(title.trim())
            .and_then(|_| editor.set_description(description))
            .and_then(|_| match image_data {
                Some(bytes) => editor.set_image(ImageSource::Picked(bytes)).map(|_| ()),
                None => Ok(()),
            });
        if let Err(err) = filled {
            editor.discard();
            return Err(format!("board_create_dream failed: {err}"));
        }
        if editor.save() {
            Ok(id)
        } else {
            Err("board_create_dream failed: save rejected, see logs".to_string())
        }
    });
    match result {
        Ok(id) => BoardActionResponse::success("Dream created.", Some(id)),
        Err(message) => BoardActionResponse::failure(message),
    }
}

/// Replaces a Dream's fields and saves.
///
/// `image_data = None` keeps the current image unless `clear_image` is set.
#[flutter_rust_bridge::frb(sync)]
pub fn board_update_dream(
    dream_id: String,
    title: String,
    description: String,
    image_data: Option<Vec<u8>>,
    clear_image: bool,
) -> BoardActionResponse {
    let id = match parse_dream_id(&dream_id) {
        Ok(id) => id,
        Err(message) => return BoardActionResponse::failure(message),
    };
    if let Err(message) = check_image(image_data.as_deref()) {
        return BoardActionResponse::failure(message);
    }
    let result = with_board(|board| {
        let mut editor = board
            .edit_dream(id)
            .map_err(|err| format!("board_update_dream failed: {err}"))?;
        let filled = editor
            .set_title(title.trim())
            .and_then(|_| editor.set_description(description))
            .and_then(|_| match (image_data, clear_image) {
                (Some(bytes), _) => editor.set_image(ImageSource::Picked(bytes)).map(|_| ()),
                (None, true) => editor.clear_image(),
                (None, false) => Ok(()),
            });
        if let Err(err) = filled {
            editor.cancel();
            return Err(format!("board_update_dream failed: {err}"));
        }
        if editor.save() {
            Ok(())
        } else {
            Err("board_update_dream failed: save rejected, see logs".to_string())
        }
    });
    match result {
        Ok(()) => BoardActionResponse::success("Dream updated.", Some(id)),
        Err(message) => BoardActionResponse::failure(message),
    }
}

#[flutter_rust_bridge::frb(sync)]
pub fn board_delete_dream(dream_id: String) -> BoardActionResponse {
    let id = match parse_dream_id(&dream_id) {
        Ok(id) => id,
        Err(message) => return BoardActionResponse::failure(message),
    };
    match with_board(|board| Ok(board.delete_dream(id))) {
        Ok(true) => BoardActionResponse::success("Dream deleted.", Some(id)),
        Ok(false) => BoardActionResponse::failure("board_delete_dream failed: see logs"),
        Err(message) => BoardActionResponse::failure(message),
    }
}

/// Triggers a background sync; results show up in the next `board_list`.
#[flutter_rust_bridge::frb(sync)]
pub fn board_force_sync() -> BoardActionResponse {
    match with_board(|board| Ok(board.force_sync().is_some())) {
        Ok(true) => BoardActionResponse::success("Sync started.", None),
        Ok(false) => BoardActionResponse::failure(
            "board_force_sync did not start: a sync is already running or see logs",
        ),
        Err(message) => BoardActionResponse::failure(message),
    }
}

/// Applies `zoom` to the board and returns the grid for `container_width`.
#[flutter_rust_bridge::frb(sync)]
pub fn board_layout(container_width: f64, zoom: f64) -> BoardLayoutResponse {
    match with_board(|board| {
        let applied = board.set_zoom(zoom);
        Ok((board.grid(container_width), applied.value()))
    }) {
        Ok((grid, zoom)) => BoardLayoutResponse {
            ok: true,
            columns: grid.columns,
            card_width: grid.card_width,
            card_height: grid.card_height,
            spacing: grid.spacing,
            padding: grid.padding,
            zoom,
            message: String::new(),
        },
        Err(message) => BoardLayoutResponse {
            ok: false,
            columns: 0,
            card_width: 0.0,
            card_height: 0.0,
            spacing: 0.0,
            padding: 0.0,
            zoom: 1.0,
            message,
        },
    }
}

fn lock_board() -> Result<MutexGuard<'static, Option<DreamBoard>>, String> {
    BOARD
        .lock()
        .map_err(|_| "board state poisoned by an earlier panic".to_string())
}

/// Runs `f` against the open board, opening a desktop board on first use.
fn with_board<T>(f: impl FnOnce(&mut DreamBoard) -> Result<T, String>) -> Result<T, String> {
    let mut slot = lock_board()?;
    if slot.is_none() {
        *slot = Some(open_board(LayoutProfile::desktop())?);
    }
    match slot.as_mut() {
        Some(board) => f(board),
        None => Err("board is not open".to_string()),
    }
}

fn open_board(profile: LayoutProfile) -> Result<DreamBoard, String> {
    let db_path = resolve_board_db_path();
    // The app has no use without its store; an unopenable file aborts.
    let store = PersistentStore::open_or_abort(StoreConfig::file(&db_path));
    let board =
        DreamBoard::new(store, profile).map_err(|err| format!("board fetch failed: {err}"))?;
    info!(
        "event=ffi_board_open module=ffi status=ok dreams={}",
        board.len()
    );
    Ok(board)
}

fn resolve_board_db_path() -> PathBuf {
    BOARD_DB_PATH
        .get_or_init(|| {
            if let Ok(raw) = std::env::var("VISIONBOARD_DB_PATH") {
                let trimmed = raw.trim();
                if !trimmed.is_empty() {
                    return PathBuf::from(trimmed);
                }
            }
            std::env::temp_dir().join(BOARD_DB_FILE_NAME)
        })
        .clone()
}

fn parse_profile(raw: &str) -> Result<LayoutProfile, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "desktop" => Ok(LayoutProfile::desktop()),
        "phone" => Ok(LayoutProfile::phone()),
        "tablet" => Ok(LayoutProfile::tablet()),
        other => Err(format!(
            "unsupported layout profile `{other}`; expected desktop|phone|tablet"
        )),
    }
}

fn parse_dream_id(raw: &str) -> Result<DreamId, String> {
    let trimmed = raw.trim();
    Uuid::parse_str(trimmed)
        .ok()
        .map(DreamId::from_uuid)
        .filter(|id| !id.is_nil())
        .ok_or_else(|| format!("invalid dream id `{trimmed}`"))
}

fn check_image(bytes: Option<&[u8]>) -> Result<(), String> {
    match bytes {
        Some(bytes) if sniff_image_format(bytes).is_none() => {
            warn!(
                "event=ffi_image module=ffi status=rejected bytes={}",
                bytes.len()
            );
            Err("image data is not a recognized image format".to_string())
        }
        _ => Ok(()),
    }
}

fn to_item(dream: &Dream) -> BoardDreamItem {
    BoardDreamItem {
        id: dream.id.to_string(),
        title: dream.title.clone(),
        description: dream.description.clone(),
        image_data: dream.image_data.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        board_create_dream, board_delete_dream, board_layout, board_list, board_open,
        board_update_dream, core_version, init_logging, ping,
    };
    use std::time::{SystemTime, UNIX_EPOCH};

    const PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }

    #[test]
    fn init_logging_rejects_bad_input() {
        assert!(!init_logging("info".to_string(), String::new()).is_empty());
        assert!(!init_logging("verbose".to_string(), "tmp/logs".to_string()).is_empty());
    }

    #[test]
    fn board_open_rejects_unknown_profile() {
        let response = board_open("watch".to_string());
        assert!(!response.ok);
        assert!(response.message.contains("watch"));
    }

    #[test]
    fn create_update_delete_round() {
        let title = unique_token("kyoto");
        let created = board_create_dream(title.clone(), "spring".to_string(), None);
        assert!(created.ok, "{}", created.message);
        let id = created.dream_id.clone().unwrap();

        let listed = board_list();
        assert!(listed.items.iter().any(|item| item.id == id && item.title == title));

        let updated = board_update_dream(
            id.clone(),
            format!("{title} again"),
            "autumn".to_string(),
            Some(PNG_HEADER.to_vec()),
            false,
        );
        assert!(updated.ok, "{}", updated.message);
        let item = board_list()
            .items
            .into_iter()
            .find(|item| item.id == id)
            .unwrap();
        assert_eq!(item.description, "autumn");
        assert_eq!(item.image_data.as_deref(), Some(PNG_HEADER));

        assert!(board_delete_dream(id.clone()).ok);
        assert!(!board_list().items.iter().any(|item| item.id == id));
    }

    #[test]
    fn create_rejects_unknown_image_bytes() {
        let response = board_create_dream(
            unique_token("bad-image"),
            String::new(),
            Some(b"plain".to_vec()),
        );
        assert!(!response.ok);
    }

    #[test]
    fn update_rejects_malformed_id() {
        let response = board_update_dream(
            "not-a-uuid".to_string(),
            "x".to_string(),
            String::new(),
            None,
            false,
        );
        assert!(!response.ok);
        assert!(response.message.contains("invalid dream id"));
    }

    #[test]
    fn layout_clamps_zoom() {
        let response = board_layout(1000.0, 5.0);
        assert!(response.ok, "{}", response.message);
        assert_eq!(response.zoom, 2.0);
        assert!(response.columns >= 1);
    }

    fn unique_token(prefix: &str) -> String {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time went backwards")
            .as_nanos();
        format!("{prefix}-{nanos}")
    }
}
