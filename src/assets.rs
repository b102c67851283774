//! Asset classification
//!
//! Maps a file name to the repository sub-folder it is published under.

use serde::Serialize;

/// Asset category, one per destination sub-folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Img,
    Video,
    Music,
    Font,
}

impl AssetKind {
    /// Classify by extension, case-insensitively. `None` means not allowed.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let (_, ext) = name.rsplit_once('.')?;
        match ext.to_ascii_lowercase().as_str() {
            "png" | "jpg" | "jpeg" | "gif" | "webp" | "svg" | "ico" | "bmp" | "avif" => {
                Some(Self::Img)
            }
            "mp4" | "webm" | "mov" | "mkv" | "avi" | "m4v" => Some(Self::Video),
            "mp3" | "wav" | "ogg" | "m4a" | "aac" => Some(Self::Music),
            "ttf" | "otf" | "woff" | "woff2" | "eot" => Some(Self::Font),
            _ => None,
        }
    }

    pub fn folder(self) -> &'static str {
        match self {
            Self::Img => "img",
            Self::Video => "video",
            Self::Music => "music",
            Self::Font => "font",
        }
    }
}

/// Check that a client-supplied name is a single, plain path segment.
pub fn is_valid_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.chars().any(char::is_control)
}
