//! File-backed audio output
//!
//! Clips are written to numbered files in an output directory. Playback is
//! complete once the file is on disk; `stop` abandons a write in progress.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Notify;

use voice_tutor_core::{AudioClip, AudioPlayer};

use crate::SpeechError;

/// Audio player that writes clips to disk
pub struct FileAudioSink {
    dir: PathBuf,
    counter: AtomicU64,
    stop: Notify,
}

impl FileAudioSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            counter: AtomicU64::new(0),
            stop: Notify::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn next_path(&self, clip: &AudioClip) -> PathBuf {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let ext = match clip.mime.as_str() {
            "audio/mpeg" => "mp3",
            "audio/wav" | "audio/x-wav" => "wav",
            "audio/ogg" => "ogg",
            _ => "bin",
        };
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S");
        self.dir.join(format!("reply-{}-{:04}.{}", stamp, n, ext))
    }

    async fn write_clip(&self, path: &Path, clip: &AudioClip) -> Result<(), SpeechError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(path, &clip.data).await?;
        Ok(())
    }
}

#[async_trait]
impl AudioPlayer for FileAudioSink {
    async fn play(&self, clip: AudioClip) -> voice_tutor_core::Result<()> {
        let path = self.next_path(&clip);

        tokio::select! {
            result = self.write_clip(&path, &clip) => {
                result?;
                tracing::info!(path = %path.display(), bytes = clip.data.len(), "Reply audio written");
            }
            _ = self.stop.notified() => {
                tracing::debug!(path = %path.display(), "Playback stopped before clip was written");
            }
        }
        Ok(())
    }

    async fn stop(&self) {
        self.stop.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_clips_written_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileAudioSink::new(dir.path().join("audio"));

        sink.play(AudioClip::mpeg(vec![1, 2, 3])).await.unwrap();
        sink.play(AudioClip::new(vec![4], "audio/wav")).await.unwrap();

        let mut names: Vec<String> = std::fs::read_dir(sink.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names.len(), 2);
        assert!(names.iter().any(|n| n.ends_with("-0001.mp3")));
        assert!(names.iter().any(|n| n.ends_with("-0002.wav")));
    }

    #[tokio::test]
    async fn test_stop_without_playback_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileAudioSink::new(dir.path());
        sink.stop().await;
        sink.play(AudioClip::mpeg(vec![9])).await.unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
