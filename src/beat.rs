// src/beat.rs

use crate::bpm::analyze_bpm_for_file;
use crate::decoder;
use crate::error::{Result, StudioError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

const MAX_TITLE_LEN: usize = 20;

/// An instrumental the user records over. The audio itself stays on disk and
/// is decoded on demand; only metadata lives here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Beat {
    pub id: String,
    pub title: String,
    /// Estimated tempo; 0 means detection was inconclusive and the user
    /// should be asked.
    pub bpm: u32,
    pub genre: Option<String>,
    pub source: PathBuf,
    pub cover_image: Option<PathBuf>,
}

impl Beat {
    /// Register an audio file as a beat. Rejects files whose extension is
    /// outside the supported codec set; a file that passes the gate but
    /// fails to decode still imports, with an unknown tempo.
    pub fn import(path: &Path) -> Result<Beat> {
        if !decoder::is_supported_audio(path) {
            return Err(StudioError::DecodeFailure(format!(
                "unsupported audio format: {}",
                path.display()
            )));
        }
        let bpm = analyze_bpm_for_file(path);
        log::info!("imported beat {} at {} BPM", path.display(), bpm);
        Ok(Beat {
            id: format!("beat-{}", Uuid::new_v4()),
            title: title_from_path(path),
            bpm,
            genre: None,
            source: path.to_path_buf(),
            cover_image: None,
        })
    }

    pub fn set_bpm(&mut self, bpm: u32) {
        self.bpm = bpm;
    }
}

/// Display title from the file stem, capped so library rows stay tidy.
fn title_from_path(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Untitled");
    stem.chars().take(MAX_TITLE_LEN).collect()
}
