//! Remote audio sink
//!
//! Binds negotiated remote audio to the page's single hidden audio element
//! and redirects its output to the selected device when supported.

use std::cell::RefCell;
use std::rc::Rc;

use super::{AudioElement, MediaError, MediaPlatform, MediaStream};

/// Fixed id of the shared remote-audio element
pub const REMOTE_AUDIO_ELEMENT_ID: &str = "c2c-remote-audio";

pub struct RemoteAudioSink {
    platform: Rc<dyn MediaPlatform>,
    element: RefCell<Option<Rc<dyn AudioElement>>>,
}

impl RemoteAudioSink {
    pub fn new(platform: Rc<dyn MediaPlatform>) -> Self {
        Self {
            platform,
            element: RefCell::new(None),
        }
    }

    /// Lazily created element, reused across calls
    fn element(&self) -> Result<Rc<dyn AudioElement>, MediaError> {
        if let Some(el) = self.element.borrow().as_ref() {
            return Ok(el.clone());
        }
        let el = self.platform.audio_element(REMOTE_AUDIO_ELEMENT_ID)?;
        *self.element.borrow_mut() = Some(el.clone());
        Ok(el)
    }

    /// Replace the element's source with a new remote stream
    pub fn attach(&self, stream: &MediaStream) -> Result<(), MediaError> {
        let el = self.element()?;
        tracing::debug!("Attaching remote stream {} to sink", stream.label());
        el.set_src_object(stream);
        Ok(())
    }

    /// Redirect playback to `device_id`. A platform without output-device
    /// selection keeps the default output and reports success.
    pub async fn set_output_device(&self, device_id: &str) -> Result<(), MediaError> {
        let el = self.element()?;
        if !el.supports_sink_id() {
            tracing::debug!("Output device selection unsupported, keeping default output");
            return Ok(());
        }
        let device_id = if device_id.is_empty() { "default" } else { device_id };
        el.set_sink_id(device_id).await
    }
}
