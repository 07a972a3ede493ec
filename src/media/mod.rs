//! Host media platform
//!
//! Device enumeration, the shared remote-audio element and the audio
//! processing used for greetings. In the browser these map onto
//! `navigator.mediaDevices`, `HTMLAudioElement` and `AudioContext`.

mod greeting;
mod sink;

pub use greeting::GreetingInjector;
pub use sink::{RemoteAudioSink, REMOTE_AUDIO_ELEMENT_ID};

use std::any::Any;
use std::rc::Rc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::oneshot;

/// Media errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MediaError {
    #[error("Not supported by this platform: {0}")]
    Unsupported(&'static str),

    #[error("Platform error: {0}")]
    Platform(String),
}

macro_rules! opaque_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone)]
        pub struct $name {
            label: String,
            inner: Rc<dyn Any>,
        }

        impl $name {
            pub fn new<T: Any>(label: impl Into<String>, inner: T) -> Self {
                Self {
                    label: label.into(),
                    inner: Rc::new(inner),
                }
            }

            pub fn label(&self) -> &str {
                &self.label
            }

            /// Borrow the host value this handle wraps
            pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
                self.inner.downcast_ref::<T>()
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_tuple(stringify!($name)).field(&self.label).finish()
            }
        }
    };
}

opaque_handle!(
    /// Negotiated media stream (remote audio)
    MediaStream
);
opaque_handle!(
    /// Single outbound or inbound track
    MediaTrack
);
opaque_handle!(
    /// Decoded audio ready for playback
    AudioClip
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    AudioInput,
    AudioOutput,
    VideoInput,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaDeviceInfo {
    pub device_id: String,
    pub label: String,
    pub kind: DeviceKind,
}

/// Playback of a decoded clip routed into a fresh outbound track
pub struct Playback {
    pub track: MediaTrack,
    /// Resolves when playback ends
    pub finished: oneshot::Receiver<()>,
}

/// The page element remote audio plays through
#[async_trait(?Send)]
pub trait AudioElement {
    fn set_src_object(&self, stream: &MediaStream);

    /// Whether output-device redirection (`setSinkId`) is available
    fn supports_sink_id(&self) -> bool;

    async fn set_sink_id(&self, device_id: &str) -> Result<(), MediaError>;
}

/// One audio-processing context, created fresh per greeting
#[async_trait(?Send)]
pub trait AudioProcessing {
    async fn decode(&self, bytes: Vec<u8>) -> Result<AudioClip, MediaError>;

    /// Start playing the clip into a media-stream destination and return its track
    fn play(&self, clip: &AudioClip) -> Result<Playback, MediaError>;
}

#[async_trait(?Send)]
pub trait MediaPlatform {
    async fn enumerate_devices(&self) -> Result<Vec<MediaDeviceInfo>, MediaError>;

    /// Find or create the hidden, autoplaying element with this id
    fn audio_element(&self, id: &str) -> Result<Rc<dyn AudioElement>, MediaError>;

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, MediaError>;

    fn audio_context(&self) -> Result<Box<dyn AudioProcessing>, MediaError>;

    /// Capture a microphone track from the given input device
    async fn open_microphone(&self, device_id: &str) -> Result<MediaTrack, MediaError>;
}
