//! Channel-fed capture engine
//!
//! `ChannelCapture` implements `SpeechCapture` without a microphone: events
//! pushed through its `ChannelCaptureHandle` are delivered to whichever
//! capture is currently running. Ending the capture from the handle mimics
//! a recognizer that stops by itself after a pause.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use voice_tutor_core::{CaptureError, CaptureEvent, CaptureStream, SpeechCapture};

#[derive(Default)]
struct CaptureShared {
    permission_granted: bool,
    permission_requests: usize,
    current: Option<mpsc::UnboundedSender<CaptureEvent>>,
    started_locales: Vec<String>,
    stops: usize,
}

/// Capture engine driven through a handle
pub struct ChannelCapture {
    shared: Arc<Mutex<CaptureShared>>,
}

/// Handle for feeding a `ChannelCapture`
#[derive(Clone)]
pub struct ChannelCaptureHandle {
    shared: Arc<Mutex<CaptureShared>>,
}

impl ChannelCapture {
    /// Create an engine that grants (or refuses) microphone permission
    pub fn new(permission_granted: bool) -> (Self, ChannelCaptureHandle) {
        let shared = Arc::new(Mutex::new(CaptureShared {
            permission_granted,
            ..Default::default()
        }));
        (
            Self {
                shared: shared.clone(),
            },
            ChannelCaptureHandle { shared },
        )
    }
}

#[async_trait]
impl SpeechCapture for ChannelCapture {
    async fn request_permission(&self) -> Result<(), CaptureError> {
        let mut shared = self.shared.lock();
        shared.permission_requests += 1;
        if shared.permission_granted {
            Ok(())
        } else {
            Err(CaptureError::PermissionDenied)
        }
    }

    async fn start(&self, locale: &str) -> Result<CaptureStream, CaptureError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut shared = self.shared.lock();
        if !shared.permission_granted {
            return Err(CaptureError::PermissionDenied);
        }
        shared.started_locales.push(locale.to_string());
        shared.current = Some(tx);
        tracing::trace!(locale, "Channel capture started");
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    async fn stop(&self) {
        let mut shared = self.shared.lock();
        shared.stops += 1;
        shared.current = None;
    }

    fn engine_name(&self) -> &str {
        "channel"
    }
}

impl ChannelCaptureHandle {
    /// Deliver an event to the running capture; false when none is running
    pub fn push(&self, event: CaptureEvent) -> bool {
        let shared = self.shared.lock();
        match shared.current {
            Some(ref tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    pub fn interim(&self, text: impl Into<String>) -> bool {
        self.push(CaptureEvent::Interim(text.into()))
    }

    pub fn final_text(&self, text: impl Into<String>) -> bool {
        self.push(CaptureEvent::Final(text.into()))
    }

    pub fn error(&self, error: CaptureError) -> bool {
        self.push(CaptureEvent::Error(error))
    }

    /// End the running capture as if the engine had stopped by itself
    pub fn end_capture(&self) -> bool {
        self.shared.lock().current.take().is_some()
    }

    pub fn set_permission(&self, granted: bool) {
        self.shared.lock().permission_granted = granted;
    }

    pub fn is_capturing(&self) -> bool {
        self.shared
            .lock()
            .current
            .as_ref()
            .map(|tx| !tx.is_closed())
            .unwrap_or(false)
    }

    /// Number of captures started so far
    pub fn start_count(&self) -> usize {
        self.shared.lock().started_locales.len()
    }

    pub fn started_locales(&self) -> Vec<String> {
        self.shared.lock().started_locales.clone()
    }

    pub fn permission_requests(&self) -> usize {
        self.shared.lock().permission_requests
    }

    pub fn stop_count(&self) -> usize {
        self.shared.lock().stops
    }
}
