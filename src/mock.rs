//! Scripted host doubles for tests.
//!
//! Every primitive a double receives is recorded so tests can assert on
//! exactly what the client asked the engine or platform to do.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::engine::{
    DirectCallOptions, DirectSipFactory, DirectUa, DirectUaConfig, EngineHost, ManagedSession, ManagedUa,
    ManagedUaFactory, ManagedUaOptions, RtcSession, SessionError, SessionHandler, UaEvent, UaListener,
};
use crate::headers::SipHeaders;
use crate::media::{
    AudioClip, AudioElement, AudioProcessing, DeviceKind, MediaDeviceInfo, MediaError, MediaPlatform, MediaStream,
    MediaTrack, Playback,
};

/// Delay before the direct UA reports its registration outcome
pub const REGISTRATION_DELAY: Duration = Duration::from_millis(10);

#[derive(Default)]
struct Handlers {
    by_event: RefCell<HashMap<String, Vec<SessionHandler>>>,
}

impl Handlers {
    fn add(&self, event: &str, handler: SessionHandler) {
        self.by_event
            .borrow_mut()
            .entry(event.to_string())
            .or_default()
            .push(handler);
    }

    fn fire(&self, event: &str, payload: &serde_json::Value) {
        let snapshot = self.by_event.borrow().get(event).cloned().unwrap_or_default();
        for handler in snapshot {
            handler(payload);
        }
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockManagedSession {
    handlers: Handlers,
    calls: RefCell<Vec<String>>,
    ended: Cell<bool>,
    failing: Cell<bool>,
    track_replacement: bool,
    remote: Option<MediaStream>,
}

impl MockManagedSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_track_replacement() -> Self {
        Self {
            track_replacement: true,
            ..Self::default()
        }
    }

    pub fn with_remote_stream(label: &str) -> Self {
        Self {
            track_replacement: true,
            remote: Some(MediaStream::new(label, ())),
            ..Self::default()
        }
    }

    pub fn fire(&self, event: &str, payload: &serde_json::Value) {
        if event == "ended" || event == "failed" {
            self.ended.set(true);
        }
        self.handlers.fire(event, payload);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn set_ended(&self) {
        self.ended.set(true);
    }

    /// Make every mid-call control fail
    pub fn fail_controls(&self) {
        self.failing.set(true);
    }

    fn record(&self, call: impl Into<String>) -> Result<(), SessionError> {
        if self.failing.get() {
            return Err(SessionError::Engine("session rejected request".into()));
        }
        self.calls.borrow_mut().push(call.into());
        Ok(())
    }
}

#[async_trait(?Send)]
impl ManagedSession for MockManagedSession {
    fn on(&self, event: &str, handler: SessionHandler) {
        self.handlers.add(event, handler);
    }

    fn host_object(&self) -> Option<&dyn std::any::Any> {
        Some(self)
    }

    fn remote_stream(&self) -> Option<MediaStream> {
        self.remote.clone()
    }

    fn mute(&self) -> Result<(), SessionError> {
        self.record("mute")
    }

    fn unmute(&self) -> Result<(), SessionError> {
        self.record("unmute")
    }

    async fn hold(&self) -> Result<(), SessionError> {
        self.record("hold")
    }

    async fn unhold(&self) -> Result<(), SessionError> {
        self.record("unhold")
    }

    fn is_ended(&self) -> bool {
        self.ended.get()
    }

    async fn bye(&self) -> Result<(), SessionError> {
        self.record("bye")?;
        self.ended.set(true);
        Ok(())
    }

    fn send_dtmf(&self, digits: &str) -> Result<(), SessionError> {
        self.record(format!("sendDTMF:{}", digits))
    }

    fn supports_track_replacement(&self) -> bool {
        self.track_replacement
    }

    async fn replace_outgoing_track(&self, track: &MediaTrack) -> Result<(), SessionError> {
        self.record(format!("replaceOutgoingTrack:{}", track.label()))
    }

    async fn restore_microphone_track(&self) -> Result<(), SessionError> {
        self.record("restoreMicrophoneTrack")
    }
}

#[derive(Default)]
pub struct MockRtcSession {
    handlers: Handlers,
    track_handlers: RefCell<Vec<Rc<dyn Fn(MediaStream)>>>,
    calls: RefCell<Vec<String>>,
    ended: Cell<bool>,
}

impl MockRtcSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fire(&self, event: &str, payload: &serde_json::Value) {
        if event == "ended" || event == "failed" {
            self.ended.set(true);
        }
        self.handlers.fire(event, payload);
    }

    /// Simulate a remote track arriving on the peer connection
    pub fn emit_remote_track(&self, label: &str) {
        let snapshot = self.track_handlers.borrow().clone();
        for handler in snapshot {
            handler(MediaStream::new(label, ()));
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn record(&self, call: &str) -> Result<(), SessionError> {
        self.calls.borrow_mut().push(call.to_string());
        Ok(())
    }
}

impl RtcSession for MockRtcSession {
    fn on(&self, event: &str, handler: SessionHandler) {
        self.handlers.add(event, handler);
    }

    fn host_object(&self) -> Option<&dyn std::any::Any> {
        Some(self)
    }

    fn on_remote_track(&self, handler: Rc<dyn Fn(MediaStream)>) {
        self.track_handlers.borrow_mut().push(handler);
    }

    fn mute(&self) -> Result<(), SessionError> {
        self.record("mute")
    }

    fn unmute(&self) -> Result<(), SessionError> {
        self.record("unmute")
    }

    fn hold(&self) -> Result<(), SessionError> {
        self.record("hold")
    }

    fn unhold(&self) -> Result<(), SessionError> {
        self.record("unhold")
    }

    fn is_ended(&self) -> bool {
        self.ended.get()
    }

    fn terminate(&self) -> Result<(), SessionError> {
        self.ended.set(true);
        self.record("terminate")
    }

    fn send_dtmf(&self, digits: &str) -> Result<(), SessionError> {
        self.calls.borrow_mut().push(format!("sendDTMF:{}", digits));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Engines
// ---------------------------------------------------------------------------

/// Scripted outcome of one direct-UA `start()`
#[derive(Debug, Clone)]
pub enum RegistrationScript {
    Succeed,
    Fail(Option<String>),
    /// Never answer
    Silent,
}

#[derive(Default)]
struct HostLog {
    uas_created: Cell<usize>,
    ua_ops: RefCell<Vec<String>>,
    direct_configs: RefCell<Vec<DirectUaConfig>>,
    managed_options: RefCell<Vec<ManagedUaOptions>>,
    direct_calls: RefCell<Vec<(String, DirectCallOptions)>>,
    managed_calls: RefCell<Vec<(String, SipHeaders)>>,
    registrations: RefCell<VecDeque<RegistrationScript>>,
    listeners: RefCell<Vec<UaListener>>,
    last_rtc: RefCell<Option<Rc<MockRtcSession>>>,
    last_managed: RefCell<Option<Rc<MockManagedSession>>>,
    managed_start_error: RefCell<Option<String>>,
}

impl HostLog {
    fn emit(&self, event: UaEvent) {
        let snapshot = self.listeners.borrow().clone();
        for listener in snapshot {
            listener(event.clone());
        }
    }
}

/// Host exposing any combination of the two engines
pub struct MockHost {
    log: Rc<HostLog>,
    managed: bool,
    direct: bool,
}

impl MockHost {
    pub fn empty() -> Self {
        Self {
            log: Rc::new(HostLog::default()),
            managed: false,
            direct: false,
        }
    }

    pub fn direct() -> Self {
        Self {
            direct: true,
            ..Self::empty()
        }
    }

    pub fn managed() -> Self {
        Self {
            managed: true,
            ..Self::empty()
        }
    }

    pub fn both() -> Self {
        Self {
            managed: true,
            direct: true,
            ..Self::empty()
        }
    }

    /// Queue the outcome of the next direct-UA `start()`; unscripted starts succeed
    pub fn script_registration(&self, script: RegistrationScript) {
        self.log.registrations.borrow_mut().push_back(script);
    }

    pub fn fail_managed_start(&self, cause: &str) {
        *self.log.managed_start_error.borrow_mut() = Some(cause.to_string());
    }

    /// Deliver an unsolicited event from the direct UA
    pub fn emit_ua_event(&self, event: UaEvent) {
        self.log.emit(event);
    }

    pub fn uas_created(&self) -> usize {
        self.log.uas_created.get()
    }

    /// `start`/`stop` invocations across all UAs
    pub fn ua_ops(&self) -> Vec<String> {
        self.log.ua_ops.borrow().clone()
    }

    pub fn direct_configs(&self) -> Vec<DirectUaConfig> {
        self.log.direct_configs.borrow().clone()
    }

    pub fn managed_options(&self) -> Vec<ManagedUaOptions> {
        self.log.managed_options.borrow().clone()
    }

    pub fn direct_calls(&self) -> Vec<(String, DirectCallOptions)> {
        self.log.direct_calls.borrow().clone()
    }

    pub fn managed_calls(&self) -> Vec<(String, SipHeaders)> {
        self.log.managed_calls.borrow().clone()
    }

    pub fn last_rtc_session(&self) -> Option<Rc<MockRtcSession>> {
        self.log.last_rtc.borrow().clone()
    }

    pub fn last_managed_session(&self) -> Option<Rc<MockManagedSession>> {
        self.log.last_managed.borrow().clone()
    }
}

impl EngineHost for MockHost {
    fn managed_ua(&self) -> Option<Rc<dyn ManagedUaFactory>> {
        self.managed
            .then(|| Rc::new(MockManagedFactory { log: self.log.clone() }) as Rc<dyn ManagedUaFactory>)
    }

    fn direct_sip(&self) -> Option<Rc<dyn DirectSipFactory>> {
        self.direct
            .then(|| Rc::new(MockDirectFactory { log: self.log.clone() }) as Rc<dyn DirectSipFactory>)
    }
}

struct MockManagedFactory {
    log: Rc<HostLog>,
}

impl ManagedUaFactory for MockManagedFactory {
    fn create(&self, options: &ManagedUaOptions) -> Result<Box<dyn ManagedUa>, String> {
        self.log.uas_created.set(self.log.uas_created.get() + 1);
        self.log.managed_options.borrow_mut().push(options.clone());
        Ok(Box::new(MockManagedUa { log: self.log.clone() }))
    }
}

struct MockManagedUa {
    log: Rc<HostLog>,
}

#[async_trait(?Send)]
impl ManagedUa for MockManagedUa {
    async fn start(&self) -> Result<(), String> {
        self.log.ua_ops.borrow_mut().push("start".into());
        match self.log.managed_start_error.borrow().clone() {
            Some(cause) => Err(cause),
            None => Ok(()),
        }
    }

    async fn stop(&self) -> Result<(), String> {
        self.log.ua_ops.borrow_mut().push("stop".into());
        Ok(())
    }

    async fn call(&self, target: &str, headers: &SipHeaders) -> Result<Rc<dyn ManagedSession>, String> {
        self.log
            .managed_calls
            .borrow_mut()
            .push((target.to_string(), headers.clone()));
        let session = Rc::new(MockManagedSession::with_remote_stream("remote-1"));
        *self.log.last_managed.borrow_mut() = Some(session.clone());
        Ok(session)
    }
}

struct MockDirectFactory {
    log: Rc<HostLog>,
}

impl DirectSipFactory for MockDirectFactory {
    fn create_ua(&self, config: &DirectUaConfig) -> Result<Rc<dyn DirectUa>, String> {
        self.log.uas_created.set(self.log.uas_created.get() + 1);
        self.log.direct_configs.borrow_mut().push(config.clone());
        Ok(Rc::new(MockDirectUa { log: self.log.clone() }))
    }
}

struct MockDirectUa {
    log: Rc<HostLog>,
}

impl DirectUa for MockDirectUa {
    fn on(&self, listener: UaListener) {
        self.log.listeners.borrow_mut().push(listener);
    }

    fn start(&self) {
        self.log.ua_ops.borrow_mut().push("start".into());
        let script = self
            .log
            .registrations
            .borrow_mut()
            .pop_front()
            .unwrap_or(RegistrationScript::Succeed);

        let log = self.log.clone();
        tokio::task::spawn_local(async move {
            tokio::time::sleep(REGISTRATION_DELAY).await;
            match script {
                RegistrationScript::Succeed => log.emit(UaEvent::Registered),
                RegistrationScript::Fail(cause) => log.emit(UaEvent::RegistrationFailed { cause }),
                RegistrationScript::Silent => {}
            }
        });
    }

    fn stop(&self) {
        self.log.ua_ops.borrow_mut().push("stop".into());
    }

    fn call(&self, target: &str, options: &DirectCallOptions) -> Result<Rc<dyn RtcSession>, String> {
        self.log
            .direct_calls
            .borrow_mut()
            .push((target.to_string(), options.clone()));
        let session = Rc::new(MockRtcSession::new());
        *self.log.last_rtc.borrow_mut() = Some(session.clone());
        self.log.emit(UaEvent::NewRtcSession(session.clone()));
        Ok(session)
    }
}

// ---------------------------------------------------------------------------
// Media
// ---------------------------------------------------------------------------

pub struct MockAudioElement {
    source: RefCell<Option<String>>,
    sink_id: RefCell<Option<String>>,
    supports_sink_id: bool,
    fail_sink_id: Cell<bool>,
}

impl MockAudioElement {
    /// Label of the attached stream
    pub fn source(&self) -> Option<String> {
        self.source.borrow().clone()
    }

    pub fn sink_id(&self) -> Option<String> {
        self.sink_id.borrow().clone()
    }
}

#[async_trait(?Send)]
impl AudioElement for MockAudioElement {
    fn set_src_object(&self, stream: &MediaStream) {
        *self.source.borrow_mut() = Some(stream.label().to_string());
    }

    fn supports_sink_id(&self) -> bool {
        self.supports_sink_id
    }

    async fn set_sink_id(&self, device_id: &str) -> Result<(), MediaError> {
        if self.fail_sink_id.get() {
            return Err(MediaError::Platform(format!("NotFoundError: {}", device_id)));
        }
        *self.sink_id.borrow_mut() = Some(device_id.to_string());
        Ok(())
    }
}

pub struct MockPlatform {
    element: Rc<MockAudioElement>,
    elements_created: Cell<usize>,
    devices: Vec<MediaDeviceInfo>,
    fetched: RefCell<Vec<String>>,
    fail_fetch: Cell<bool>,
    microphones: RefCell<Vec<String>>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::build(true)
    }

    pub fn without_sink_id() -> Self {
        Self::build(false)
    }

    fn build(supports_sink_id: bool) -> Self {
        let device = |id: &str, kind| MediaDeviceInfo {
            device_id: id.to_string(),
            label: id.to_string(),
            kind,
        };
        Self {
            element: Rc::new(MockAudioElement {
                source: RefCell::new(None),
                sink_id: RefCell::new(None),
                supports_sink_id,
                fail_sink_id: Cell::new(false),
            }),
            elements_created: Cell::new(0),
            devices: vec![
                device("mic-1", DeviceKind::AudioInput),
                device("mic-2", DeviceKind::AudioInput),
                device("speaker-1", DeviceKind::AudioOutput),
                device("cam-1", DeviceKind::VideoInput),
            ],
            fetched: RefCell::new(Vec::new()),
            fail_fetch: Cell::new(false),
            microphones: RefCell::new(Vec::new()),
        }
    }

    pub fn element(&self) -> Rc<MockAudioElement> {
        self.element.clone()
    }

    pub fn elements_created(&self) -> usize {
        self.elements_created.get()
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.borrow().clone()
    }

    pub fn fail_fetch(&self) {
        self.fail_fetch.set(true);
    }

    pub fn fail_sink_id(&self) {
        self.element.fail_sink_id.set(true);
    }

    /// Input devices opened through `open_microphone`
    pub fn microphones(&self) -> Vec<String> {
        self.microphones.borrow().clone()
    }
}

#[async_trait(?Send)]
impl MediaPlatform for MockPlatform {
    async fn enumerate_devices(&self) -> Result<Vec<MediaDeviceInfo>, MediaError> {
        Ok(self.devices.clone())
    }

    fn audio_element(&self, _id: &str) -> Result<Rc<dyn AudioElement>, MediaError> {
        self.elements_created.set(self.elements_created.get() + 1);
        Ok(self.element.clone())
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, MediaError> {
        self.fetched.borrow_mut().push(url.to_string());
        if self.fail_fetch.get() {
            return Err(MediaError::Platform(format!("404 fetching {}", url)));
        }
        Ok(vec![0u8; 16])
    }

    fn audio_context(&self) -> Result<Box<dyn AudioProcessing>, MediaError> {
        Ok(Box::new(MockAudioContext))
    }

    async fn open_microphone(&self, device_id: &str) -> Result<MediaTrack, MediaError> {
        self.microphones.borrow_mut().push(device_id.to_string());
        Ok(MediaTrack::new(format!("mic:{}", device_id), ()))
    }
}

struct MockAudioContext;

#[async_trait(?Send)]
impl AudioProcessing for MockAudioContext {
    async fn decode(&self, bytes: Vec<u8>) -> Result<AudioClip, MediaError> {
        Ok(AudioClip::new("clip", bytes))
    }

    fn play(&self, _clip: &AudioClip) -> Result<Playback, MediaError> {
        let (tx, finished) = oneshot::channel();
        let _ = tx.send(());
        Ok(Playback {
            track: MediaTrack::new("greeting", ()),
            finished,
        })
    }
}
