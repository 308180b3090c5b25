use std::path::{Path, PathBuf};

use crate::error::FileError;
use crate::transcribe::backend::BackendKind;

/// Output filename for a source file: `<backend>_<stem>.txt`.
pub fn transcript_file_name(kind: BackendKind, source: &Path) -> String {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "transcript".to_string());
    format!("{}_{}.txt", kind.prefix(), stem)
}

/// Writes recovered transcripts under one destination directory.
#[derive(Debug, Clone)]
pub struct TranscriptSink {
    destination: PathBuf,
}

impl TranscriptSink {
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
        }
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Write `text` for `source`, replacing any earlier transcript of the
    /// same name. Returns the path written.
    pub async fn write(&self, kind: BackendKind, source: &Path, text: &str) -> Result<PathBuf, FileError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source: std::io::Error| FileError::Io { path, source }
        };

        tokio::fs::create_dir_all(&self.destination)
            .await
            .map_err(io_err(&self.destination))?;

        let path = self.destination.join(transcript_file_name(kind, source));
        if tokio::fs::try_exists(&path).await.map_err(io_err(&path))? {
            tokio::fs::remove_file(&path).await.map_err(io_err(&path))?;
        }
        tokio::fs::write(&path, text).await.map_err(io_err(&path))?;

        tracing::debug!(path = %path.display(), bytes = text.len(), "Transcript written");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_name_strips_extension() {
        let name = transcript_file_name(BackendKind::Aws, Path::new("/in/weather report.wav"));
        assert_eq!(name, "aws_weather report.txt");
        let name = transcript_file_name(BackendKind::AzureAdvanced, Path::new("clip.mp4"));
        assert_eq!(name, "azureadv_clip.txt");
    }

    #[tokio::test]
    async fn test_write_creates_missing_destination() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("nested").join("out");
        let sink = TranscriptSink::new(&dest);

        let path = sink
            .write(BackendKind::Ibm, Path::new("call.wav"), "hello there")
            .await
            .unwrap();
        assert_eq!(path, dest.join("ibm_call.txt"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "hello there");
    }

    #[tokio::test]
    async fn test_write_replaces_existing_transcript() {
        let tmp = TempDir::new().unwrap();
        let sink = TranscriptSink::new(tmp.path());
        std::fs::write(tmp.path().join("google_call.txt"), "a much longer stale transcript").unwrap();

        let path = sink
            .write(BackendKind::Google, Path::new("call.flac"), "fresh")
            .await
            .unwrap();
        sink.write(BackendKind::Google, Path::new("call.flac"), "fresh")
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "fresh");
    }

    #[tokio::test]
    async fn test_write_into_file_path_fails_with_io_error() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let sink = TranscriptSink::new(&blocker);

        let err = sink
            .write(BackendKind::Azure, Path::new("a.wav"), "text")
            .await
            .unwrap_err();
        assert!(matches!(err, FileError::Io { .. }));
    }
}
