//! Image acquisition for the editor sheet.
//!
//! # Responsibility
//! - Turn file-picker, drag-drop and photo-picker inputs into image bytes.
//! - Reject payloads that do not carry a known image signature.
//!
//! # Invariants
//! - Bytes are stored as given; no re-encoding happens in core.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

/// Where the editor's new image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// File chosen in an open panel.
    File(PathBuf),
    /// Files dropped on the image well; the first usable one wins.
    Dropped(Vec<PathBuf>),
    /// Bytes handed over by a photo picker.
    Picked(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Tiff,
    Bmp,
    WebP,
    Heif,
}

impl ImageFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Gif => "gif",
            Self::Tiff => "tiff",
            Self::Bmp => "bmp",
            Self::WebP => "webp",
            Self::Heif => "heif",
        }
    }
}

#[derive(Debug)]
pub enum ImageError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Empty,
    Unrecognized,
    /// None of the dropped files was a readable image.
    NoUsableDrop(usize),
}

impl Display for ImageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read image `{}`: {source}", path.display())
            }
            Self::Empty => write!(f, "image payload is empty"),
            Self::Unrecognized => write!(f, "payload is not a recognized image format"),
            Self::NoUsableDrop(count) => {
                write!(f, "none of the {count} dropped item(s) is a readable image")
            }
        }
    }
}

impl Error for ImageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

const HEIF_BRANDS: &[&[u8; 4]] = &[b"heic", b"heix", b"hevc", b"hevx", b"mif1", b"msf1", b"avif"];

/// Identifies an image encoding from its leading bytes.
pub fn sniff_image_format(bytes: &[u8]) -> Option<ImageFormat> {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some(ImageFormat::Png);
    }
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some(ImageFormat::Jpeg);
    }
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        return Some(ImageFormat::Gif);
    }
    if bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*") {
        return Some(ImageFormat::Tiff);
    }
    if bytes.len() >= 12 && bytes.starts_with(b"RIFF") && &bytes[8..12] == b"WEBP" {
        return Some(ImageFormat::WebP);
    }
    if bytes.len() >= 12 && &bytes[4..8] == b"ftyp" {
        let brand = &bytes[8..12];
        if HEIF_BRANDS.iter().any(|known| brand == known.as_slice()) {
            return Some(ImageFormat::Heif);
        }
    }
    if bytes.starts_with(b"BM") && bytes.len() >= 14 {
        return Some(ImageFormat::Bmp);
    }
    None
}

/// Loads and validates image bytes from `source`.
pub fn load_image(source: ImageSource) -> Result<(Vec<u8>, ImageFormat), ImageError> {
    match source {
        ImageSource::Picked(bytes) => validate(bytes),
        ImageSource::File(path) => read_file(path),
        ImageSource::Dropped(paths) => {
            let count = paths.len();
            paths
                .into_iter()
                .find_map(|path| read_file(path).ok())
                .ok_or(ImageError::NoUsableDrop(count))
        }
    }
}

fn read_file(path: PathBuf) -> Result<(Vec<u8>, ImageFormat), ImageError> {
    let bytes = std::fs::read(&path).map_err(|source| ImageError::Io { path, source })?;
    validate(bytes)
}

fn validate(bytes: Vec<u8>) -> Result<(Vec<u8>, ImageFormat), ImageError> {
    if bytes.is_empty() {
        return Err(ImageError::Empty);
    }
    let format = sniff_image_format(&bytes).ok_or(ImageError::Unrecognized)?;
    Ok((bytes, format))
}

#[cfg(test)]
mod tests {
    use super::{load_image, sniff_image_format, ImageError, ImageFormat, ImageSource};

    const PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];

    #[test]
    fn sniffs_common_signatures() {
        assert_eq!(sniff_image_format(PNG_HEADER), Some(ImageFormat::Png));
        assert_eq!(
            sniff_image_format(&[0xFF, 0xD8, 0xFF, 0xE0]),
            Some(ImageFormat::Jpeg)
        );
        assert_eq!(sniff_image_format(b"GIF89a..."), Some(ImageFormat::Gif));
        assert_eq!(
            sniff_image_format(b"RIFF\0\0\0\0WEBPVP8 "),
            Some(ImageFormat::WebP)
        );
        assert_eq!(
            sniff_image_format(b"\0\0\0\x18ftypheic\0\0\0\0"),
            Some(ImageFormat::Heif)
        );
        assert_eq!(sniff_image_format(b"plain text"), None);
    }

    #[test]
    fn picked_bytes_are_validated() {
        let (bytes, format) = load_image(ImageSource::Picked(PNG_HEADER.to_vec())).unwrap();
        assert_eq!(bytes, PNG_HEADER);
        assert_eq!(format, ImageFormat::Png);

        assert!(matches!(
            load_image(ImageSource::Picked(Vec::new())),
            Err(ImageError::Empty)
        ));
        assert!(matches!(
            load_image(ImageSource::Picked(b"not an image".to_vec())),
            Err(ImageError::Unrecognized)
        ));
    }

    #[test]
    fn drop_uses_first_readable_image() {
        let dir = tempfile::tempdir().unwrap();
        let text = dir.path().join("notes.txt");
        let image = dir.path().join("cover.png");
        std::fs::write(&text, b"hello").unwrap();
        std::fs::write(&image, PNG_HEADER).unwrap();

        let (bytes, _) = load_image(ImageSource::Dropped(vec![
            dir.path().join("missing.png"),
            text,
            image,
        ]))
        .unwrap();
        assert_eq!(bytes, PNG_HEADER);
    }

    #[test]
    fn drop_without_images_reports_count() {
        let err = load_image(ImageSource::Dropped(vec!["/nonexistent/a.png".into()])).unwrap_err();
        assert!(matches!(err, ImageError::NoUsableDrop(1)));
    }
}
