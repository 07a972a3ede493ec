//! Browser media platform on `web_sys`

use std::rc::Rc;

use async_trait::async_trait;
use js_sys::{Array, ArrayBuffer, Object, Reflect, Uint8Array};
use tokio::sync::oneshot;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{
    AudioBuffer, AudioContext, Document, HtmlAudioElement, MediaDevices, MediaStreamConstraints, MediaStreamTrack,
    Response,
};

use super::js;
use crate::media::{
    AudioClip, AudioElement, AudioProcessing, DeviceKind, MediaDeviceInfo, MediaError, MediaPlatform, MediaStream,
    MediaTrack, Playback,
};

fn platform_error(e: JsValue) -> MediaError {
    MediaError::Platform(js::describe(&e))
}

fn window() -> Result<web_sys::Window, MediaError> {
    web_sys::window().ok_or(MediaError::Unsupported("window"))
}

fn document() -> Result<Document, MediaError> {
    window()?.document().ok_or(MediaError::Unsupported("document"))
}

fn media_devices() -> Result<MediaDevices, MediaError> {
    window()?
        .navigator()
        .media_devices()
        .map_err(|_| MediaError::Unsupported("navigator.mediaDevices"))
}

#[derive(Default)]
pub struct BrowserPlatform;

impl BrowserPlatform {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait(?Send)]
impl MediaPlatform for BrowserPlatform {
    async fn enumerate_devices(&self) -> Result<Vec<MediaDeviceInfo>, MediaError> {
        let promise = media_devices()?.enumerate_devices().map_err(platform_error)?;
        let list: Array = JsFuture::from(promise).await.map_err(platform_error)?.dyn_into().map_err(platform_error)?;

        let devices = list
            .iter()
            .filter_map(|d| d.dyn_into::<web_sys::MediaDeviceInfo>().ok())
            .filter_map(|d| {
                let kind = match d.kind() {
                    web_sys::MediaDeviceKind::Audioinput => DeviceKind::AudioInput,
                    web_sys::MediaDeviceKind::Audiooutput => DeviceKind::AudioOutput,
                    web_sys::MediaDeviceKind::Videoinput => DeviceKind::VideoInput,
                    _ => return None,
                };
                Some(MediaDeviceInfo {
                    device_id: d.device_id(),
                    label: d.label(),
                    kind,
                })
            })
            .collect();
        Ok(devices)
    }

    fn audio_element(&self, id: &str) -> Result<Rc<dyn AudioElement>, MediaError> {
        let document = document()?;
        if let Some(existing) = document.get_element_by_id(id) {
            if let Ok(el) = existing.dyn_into::<HtmlAudioElement>() {
                return Ok(Rc::new(BrowserAudioElement { el }));
            }
        }

        let el: HtmlAudioElement = document
            .create_element("audio")
            .map_err(platform_error)?
            .dyn_into()
            .map_err(platform_error)?;
        el.set_id(id);
        el.set_autoplay(true);
        el.set_attribute("playsinline", "").map_err(platform_error)?;
        el.style().set_property("display", "none").map_err(platform_error)?;

        let body = document.body().ok_or(MediaError::Unsupported("document.body"))?;
        body.append_child(&el).map_err(platform_error)?;
        tracing::debug!("Created remote audio element #{}", id);

        Ok(Rc::new(BrowserAudioElement { el }))
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, MediaError> {
        let response: Response = JsFuture::from(window()?.fetch_with_str(url))
            .await
            .map_err(platform_error)?
            .dyn_into()
            .map_err(platform_error)?;
        if !response.ok() {
            return Err(MediaError::Platform(format!("{} fetching {}", response.status(), url)));
        }

        let buffer = JsFuture::from(response.array_buffer().map_err(platform_error)?)
            .await
            .map_err(platform_error)?;
        Ok(Uint8Array::new(&buffer).to_vec())
    }

    fn audio_context(&self) -> Result<Box<dyn AudioProcessing>, MediaError> {
        let ctx = AudioContext::new().map_err(|_| MediaError::Unsupported("AudioContext"))?;
        Ok(Box::new(BrowserAudioContext { ctx }))
    }

    async fn open_microphone(&self, device_id: &str) -> Result<MediaTrack, MediaError> {
        let exact = Object::new();
        Reflect::set(&exact, &"exact".into(), &device_id.into()).map_err(platform_error)?;
        let audio = Object::new();
        Reflect::set(&audio, &"deviceId".into(), &exact).map_err(platform_error)?;

        let constraints = MediaStreamConstraints::new();
        constraints.set_audio(&audio);
        constraints.set_video(&JsValue::FALSE);

        let promise = media_devices()?
            .get_user_media_with_constraints(&constraints)
            .map_err(platform_error)?;
        let stream: web_sys::MediaStream = JsFuture::from(promise)
            .await
            .map_err(platform_error)?
            .dyn_into()
            .map_err(platform_error)?;

        let track: MediaStreamTrack = stream
            .get_audio_tracks()
            .get(0)
            .dyn_into()
            .map_err(|_| MediaError::Platform(format!("no audio track from {}", device_id)))?;
        Ok(MediaTrack::new(track.label(), track))
    }
}

struct BrowserAudioElement {
    el: HtmlAudioElement,
}

#[async_trait(?Send)]
impl AudioElement for BrowserAudioElement {
    fn set_src_object(&self, stream: &MediaStream) {
        match stream.downcast_ref::<web_sys::MediaStream>() {
            Some(s) => self.el.set_src_object(Some(s)),
            None => tracing::warn!("Stream {} is not a browser media stream", stream.label()),
        }
    }

    fn supports_sink_id(&self) -> bool {
        !js::get(&self.el, "sinkId").is_undefined() && js::has_method(&self.el, "setSinkId")
    }

    async fn set_sink_id(&self, device_id: &str) -> Result<(), MediaError> {
        js::call_async(&self.el, "setSinkId", &[JsValue::from_str(device_id)])
            .await
            .map(|_| ())
            .map_err(MediaError::Platform)
    }
}

struct BrowserAudioContext {
    ctx: AudioContext,
}

#[async_trait(?Send)]
impl AudioProcessing for BrowserAudioContext {
    async fn decode(&self, bytes: Vec<u8>) -> Result<AudioClip, MediaError> {
        let data: ArrayBuffer = Uint8Array::from(bytes.as_slice()).buffer();
        let promise = self.ctx.decode_audio_data(&data).map_err(platform_error)?;
        let buffer: AudioBuffer = JsFuture::from(promise)
            .await
            .map_err(platform_error)?
            .dyn_into()
            .map_err(platform_error)?;
        Ok(AudioClip::new("greeting", buffer))
    }

    fn play(&self, clip: &AudioClip) -> Result<Playback, MediaError> {
        let buffer = clip
            .downcast_ref::<AudioBuffer>()
            .ok_or_else(|| MediaError::Platform("clip is not a decoded audio buffer".into()))?;

        let source = self.ctx.create_buffer_source().map_err(platform_error)?;
        source.set_buffer(Some(buffer));
        let destination = self.ctx.create_media_stream_destination().map_err(platform_error)?;
        source.connect_with_audio_node(&destination).map_err(platform_error)?;

        let (tx, finished) = oneshot::channel();
        let on_ended = Closure::once_into_js(move || {
            let _ = tx.send(());
        });
        source.set_onended(Some(on_ended.unchecked_ref()));
        source.start().map_err(platform_error)?;

        let track: MediaStreamTrack = destination
            .stream()
            .get_audio_tracks()
            .get(0)
            .dyn_into()
            .map_err(|_| MediaError::Platform("destination produced no audio track".into()))?;

        Ok(Playback {
            track: MediaTrack::new("greeting", track),
            finished,
        })
    }
}
