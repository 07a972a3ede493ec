//! Greeting injector
//!
//! Plays a pre-recorded clip to the far end after answer by temporarily
//! replacing the outbound microphone track.

use std::rc::Rc;

use super::{MediaError, MediaPlatform};
use crate::engine::{LiveSession, SessionError};

pub struct GreetingInjector {
    platform: Rc<dyn MediaPlatform>,
    url: String,
}

impl GreetingInjector {
    pub fn new(platform: Rc<dyn MediaPlatform>, url: impl Into<String>) -> Self {
        Self {
            platform,
            url: url.into(),
        }
    }

    /// Play the greeting into `session`.
    ///
    /// Sessions without track replacement are left untouched. Resolves once
    /// playback has ended and the microphone track is restored.
    pub async fn play_into(&self, session: &LiveSession) -> Result<(), MediaError> {
        let bytes = self.platform.fetch(&self.url).await?;
        let context = self.platform.audio_context()?;
        let clip = context.decode(bytes).await?;
        let playback = context.play(&clip)?;

        if !session.supports_track_replacement() {
            tracing::debug!("Session cannot replace tracks, skipping greeting");
            return Ok(());
        }

        session
            .replace_outgoing_track(&playback.track)
            .await
            .map_err(session_error)?;
        tracing::info!("Greeting {} playing into call", self.url);

        // Sender dropped means the context went away; restore either way
        let _ = playback.finished.await;

        match session.restore_microphone_track().await {
            Ok(()) | Err(SessionError::Unsupported(_)) => Ok(()),
            Err(e) => Err(session_error(e)),
        }
    }
}

fn session_error(e: SessionError) -> MediaError {
    MediaError::Platform(e.to_string())
}
