use super::CameraBackend;
use crate::error::CameraError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// One observed backend invocation, in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum CameraCall {
    StartRecording(PathBuf, u32),
    StopRecording,
    StartPreview,
    StopPreview,
    ToggleZoom,
    SetOverlay(String),
    Release,
}

#[derive(Default)]
struct MockShared {
    calls: Mutex<Vec<CameraCall>>,
    start_failures: Mutex<VecDeque<CameraError>>,
}

/// Inspection and scripting handle for a [`MockCamera`], held by tests
/// while the controller owns the backend itself.
#[derive(Clone)]
pub struct MockCameraHandle {
    shared: Arc<MockShared>,
}

impl MockCameraHandle {
    /// Snapshot of every call made so far.
    pub fn calls(&self) -> Vec<CameraCall> {
        self.shared.calls.lock().clone()
    }

    /// How many recordings have been attempted.
    pub fn start_attempts(&self) -> usize {
        self.shared
            .calls
            .lock()
            .iter()
            .filter(|c| matches!(c, CameraCall::StartRecording(..)))
            .count()
    }

    /// Queue an error for an upcoming `start_recording`; each queued
    /// error fails exactly one attempt, in order.
    pub fn fail_next_start(&self, error: CameraError) {
        self.shared.start_failures.lock().push_back(error);
    }

    pub fn clear(&self) {
        self.shared.calls.lock().clear();
    }
}

/// Hardware-free camera backend.
///
/// Stands in for a real camera in tests and dry runs: destinations are
/// created as empty files so path handling stays honest, and every call
/// lands in a log the handle can inspect.
pub struct MockCamera {
    shared: Arc<MockShared>,
    recording: bool,
    previewing: bool,
    zoomed: bool,
}

impl MockCamera {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(MockShared::default()),
            recording: false,
            previewing: false,
            zoomed: false,
        }
    }

    pub fn handle(&self) -> MockCameraHandle {
        MockCameraHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    fn record_call(&self, call: CameraCall) {
        self.shared.calls.lock().push(call);
    }
}

impl Default for MockCamera {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CameraBackend for MockCamera {
    fn extension(&self) -> &'static str {
        "mkv"
    }

    async fn start_recording(&mut self, path: &Path, quality: u32) -> Result<(), CameraError> {
        self.record_call(CameraCall::StartRecording(path.to_path_buf(), quality));

        if self.recording {
            return Err(CameraError::rejected("recording already active"));
        }
        if let Some(error) = self.shared.start_failures.lock().pop_front() {
            return Err(error);
        }

        File::create(path).map_err(|e| CameraError::io(path, e))?;
        self.recording = true;
        info!("Started recording: {}", path.display());
        Ok(())
    }

    async fn stop_recording(&mut self) -> Result<(), CameraError> {
        self.record_call(CameraCall::StopRecording);
        self.recording = false;
        Ok(())
    }

    async fn start_preview(&mut self) -> Result<(), CameraError> {
        self.record_call(CameraCall::StartPreview);
        self.previewing = true;
        Ok(())
    }

    async fn stop_preview(&mut self) -> Result<(), CameraError> {
        self.record_call(CameraCall::StopPreview);
        self.previewing = false;
        Ok(())
    }

    async fn toggle_zoom(&mut self) -> Result<(), CameraError> {
        self.record_call(CameraCall::ToggleZoom);
        self.zoomed = !self.zoomed;
        Ok(())
    }

    fn set_timestamp_overlay(&mut self, text: &str) {
        self.record_call(CameraCall::SetOverlay(text.to_string()));
    }

    async fn release(&mut self) -> Result<(), CameraError> {
        self.record_call(CameraCall::Release);
        self.recording = false;
        self.previewing = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_calls_in_order() {
        let mut camera = MockCamera::new();
        let handle = camera.handle();
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("clip.mkv");

        camera.start_recording(&path, 30).await.unwrap();
        camera.toggle_zoom().await.unwrap();
        camera.stop_recording().await.unwrap();

        assert_eq!(
            handle.calls(),
            vec![
                CameraCall::StartRecording(path.clone(), 30),
                CameraCall::ToggleZoom,
                CameraCall::StopRecording,
            ]
        );
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_scripted_failure_consumes_one_attempt() {
        let mut camera = MockCamera::new();
        let handle = camera.handle();
        handle.fail_next_start(CameraError::disconnected("unplugged"));

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("clip.mkv");

        let first = camera.start_recording(&path, 30).await;
        assert!(matches!(first, Err(CameraError::Disconnected { .. })));
        assert!(!path.exists());

        camera.start_recording(&path, 30).await.unwrap();
        assert_eq!(handle.start_attempts(), 2);
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let mut camera = MockCamera::new();
        let dir = tempfile::TempDir::new().unwrap();

        camera
            .start_recording(&dir.path().join("a.mkv"), 30)
            .await
            .unwrap();
        let second = camera.start_recording(&dir.path().join("b.mkv"), 30).await;
        assert!(matches!(second, Err(CameraError::Rejected { .. })));
    }
}
