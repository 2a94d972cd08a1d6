use crate::error::IngestError;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// Local-disk store for received frames
#[derive(Debug, Clone)]
pub struct FrameStore {
    root: PathBuf,
}

impl FrameStore {
    /// Open the store, creating the output directory if it is missing
    pub fn open(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();

        if !root.exists() {
            fs::create_dir_all(&root)?;
            info!(directory = %root.display(), "Created output directory");
        }

        Ok(Self { root })
    }

    /// Directory frames are written into
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Generate the file name for a frame
    /// Format: frame_{sequence:05}_t{device_timestamp}.{extension}
    ///
    /// The sequence number is zero padded so a directory listing sorts in
    /// arrival order.
    pub fn file_name(sequence: u64, device_timestamp: i64, extension: &str) -> String {
        format!(
            "frame_{sequence:05}_t{timestamp}.{extension}",
            sequence = sequence,
            timestamp = device_timestamp,
            extension = extension,
        )
    }

    /// Write a frame and flush it to stable storage.
    ///
    /// Never overwrites: an existing file at the target path is a failure.
    #[instrument(skip(self, bytes), fields(size_bytes = bytes.len()))]
    pub fn store(
        &self,
        sequence: u64,
        device_timestamp: i64,
        extension: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, IngestError> {
        let path = self
            .root
            .join(Self::file_name(sequence, device_timestamp, extension));

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| storage_failure(&path, e))?;

        file.write_all(bytes).map_err(|e| storage_failure(&path, e))?;
        file.sync_all().map_err(|e| storage_failure(&path, e))?;

        debug!(path = %path.display(), "Frame written");

        Ok(path)
    }
}

fn storage_failure(path: &Path, err: std::io::Error) -> IngestError {
    IngestError::StorageFailure(format!("{}: {}", path.display(), err))
}
