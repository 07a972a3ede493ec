//! Session engines found on `window`
//!
//! Engine A is a managed UA constructor (`window.AudioCodesUA` or
//! `window.JsSIP.AudioCodesUA`); engine B is plain `window.JsSIP`.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use async_trait::async_trait;
use js_sys::{Array, Object, Reflect};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

use super::js;
use crate::engine::{
    DirectCallOptions, DirectSipFactory, DirectUa, DirectUaConfig, EngineHost, ManagedSession, ManagedUa,
    ManagedUaFactory, ManagedUaOptions, RtcSession, SessionError, SessionHandler, UaEvent, UaListener,
};
use crate::headers::SipHeaders;
use crate::media::{MediaStream, MediaTrack};

type Listeners = RefCell<Vec<Closure<dyn FnMut(JsValue)>>>;

/// Looks engines up on the global object at detection time
#[derive(Default)]
pub struct BrowserHost;

impl BrowserHost {
    pub fn new() -> Self {
        Self
    }

    fn global() -> Option<JsValue> {
        web_sys::window().map(JsValue::from)
    }
}

impl EngineHost for BrowserHost {
    fn managed_ua(&self) -> Option<Rc<dyn ManagedUaFactory>> {
        let global = Self::global()?;
        let ctor = js::property(&global, "AudioCodesUA")
            .or_else(|| js::property(&global, "JsSIP").and_then(|jssip| js::property(&jssip, "AudioCodesUA")))?;
        Some(Rc::new(JsManagedFactory { ctor }))
    }

    fn direct_sip(&self) -> Option<Rc<dyn DirectSipFactory>> {
        let jssip = js::property(&Self::global()?, "JsSIP")?;
        Some(Rc::new(JsSipFactory { jssip }))
    }
}

fn subscribe(target: &JsValue, event: &str, listeners: &Listeners, f: impl FnMut(JsValue) + 'static) {
    let closure = Closure::wrap(Box::new(f) as Box<dyn FnMut(JsValue)>);
    if let Err(e) = js::call_method(target, "on", &[JsValue::from_str(event), closure.as_ref().clone()]) {
        tracing::warn!("Cannot subscribe to {}: {}", event, e);
        return;
    }
    listeners.borrow_mut().push(closure);
}

fn session_handler(handler: SessionHandler) -> impl FnMut(JsValue) + 'static {
    move |payload: JsValue| handler(&js::event_json(&payload))
}

fn engine_error(e: String) -> SessionError {
    SessionError::Engine(e)
}

// ---------------------------------------------------------------------------
// Engine A
// ---------------------------------------------------------------------------

struct JsManagedFactory {
    ctor: JsValue,
}

impl ManagedUaFactory for JsManagedFactory {
    fn create(&self, options: &ManagedUaOptions) -> Result<Box<dyn ManagedUa>, String> {
        let options = js::to_js(options)?;

        let ua = match js::construct(&self.ctor, &[options.clone()]) {
            Ok(ua) => ua,
            Err(first) => {
                // Bundles that export the constructor under a property
                let ctor = ["default", "UA", "AudioCodesUA"]
                    .iter()
                    .find_map(|key| js::property(&self.ctor, key).filter(|c| c.is_function()))
                    .ok_or(first)?;
                js::construct(&ctor, &[options])?
            }
        };

        Ok(Box::new(JsManagedUa { ua }))
    }
}

struct JsManagedUa {
    ua: JsValue,
}

#[async_trait(?Send)]
impl ManagedUa for JsManagedUa {
    async fn start(&self) -> Result<(), String> {
        if !js::has_method(&self.ua, "start") {
            return Ok(());
        }
        js::call_async(&self.ua, "start", &[]).await.map(|_| ())
    }

    async fn stop(&self) -> Result<(), String> {
        if !js::has_method(&self.ua, "stop") {
            return Ok(());
        }
        js::call_async(&self.ua, "stop", &[]).await.map(|_| ())
    }

    async fn call(&self, target: &str, headers: &SipHeaders) -> Result<Rc<dyn ManagedSession>, String> {
        let options = Object::new();
        Reflect::set(&options, &"headers".into(), &js::to_js(&headers.to_map())?).map_err(|e| js::describe(&e))?;

        let session = js::call_async(&self.ua, "call", &[JsValue::from_str(target), options.into()]).await?;
        if session.is_undefined() || session.is_null() {
            return Err("managed UA returned no session".to_string());
        }
        Ok(Rc::new(JsManagedSession {
            session,
            listeners: RefCell::new(Vec::new()),
        }))
    }
}

struct JsManagedSession {
    session: JsValue,
    listeners: Listeners,
}

impl JsManagedSession {
    fn invoke(&self, name: &'static str, args: &[JsValue]) -> Result<(), SessionError> {
        if !js::has_method(&self.session, name) {
            return Err(SessionError::Unsupported(name));
        }
        js::call_method(&self.session, name, args).map(|_| ()).map_err(engine_error)
    }

    async fn invoke_async(&self, name: &'static str, args: &[JsValue]) -> Result<(), SessionError> {
        if !js::has_method(&self.session, name) {
            return Err(SessionError::Unsupported(name));
        }
        js::call_async(&self.session, name, args).await.map(|_| ()).map_err(engine_error)
    }
}

#[async_trait(?Send)]
impl ManagedSession for JsManagedSession {
    fn on(&self, event: &str, handler: SessionHandler) {
        subscribe(&self.session, event, &self.listeners, session_handler(handler));
    }

    fn host_object(&self) -> Option<&dyn Any> {
        Some(&self.session)
    }

    fn remote_stream(&self) -> Option<MediaStream> {
        if !js::has_method(&self.session, "getRemoteStream") {
            return None;
        }
        let stream = js::call_method(&self.session, "getRemoteStream", &[]).ok()?;
        let stream: web_sys::MediaStream = stream.dyn_into().ok()?;
        Some(MediaStream::new(stream.id(), stream))
    }

    fn mute(&self) -> Result<(), SessionError> {
        self.invoke("mute", &[js::audio_flag()])
    }

    fn unmute(&self) -> Result<(), SessionError> {
        self.invoke("unmute", &[js::audio_flag()])
    }

    async fn hold(&self) -> Result<(), SessionError> {
        self.invoke_async("hold", &[]).await
    }

    async fn unhold(&self) -> Result<(), SessionError> {
        self.invoke_async("unhold", &[]).await
    }

    fn is_ended(&self) -> bool {
        js::call_method(&self.session, "isEnded", &[])
            .ok()
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    async fn bye(&self) -> Result<(), SessionError> {
        self.invoke_async("bye", &[]).await
    }

    async fn terminate(&self) -> Result<(), SessionError> {
        self.invoke_async("terminate", &[]).await
    }

    fn send_dtmf(&self, digits: &str) -> Result<(), SessionError> {
        self.invoke("sendDTMF", &[JsValue::from_str(digits)])
    }

    fn supports_track_replacement(&self) -> bool {
        js::has_method(&self.session, "replaceOutgoingTrack")
    }

    async fn replace_outgoing_track(&self, track: &MediaTrack) -> Result<(), SessionError> {
        let track = track
            .downcast_ref::<web_sys::MediaStreamTrack>()
            .ok_or_else(|| SessionError::Engine("track is not a browser media track".into()))?;
        self.invoke_async("replaceOutgoingTrack", &[JsValue::from(track.clone())]).await
    }

    async fn restore_microphone_track(&self) -> Result<(), SessionError> {
        self.invoke_async("restoreMicrophoneTrack", &[]).await
    }
}

// ---------------------------------------------------------------------------
// Engine B
// ---------------------------------------------------------------------------

struct JsSipFactory {
    jssip: JsValue,
}

impl DirectSipFactory for JsSipFactory {
    fn create_ua(&self, config: &DirectUaConfig) -> Result<Rc<dyn DirectUa>, String> {
        let socket_ctor = js::property(&self.jssip, "WebSocketInterface")
            .ok_or_else(|| "JsSIP.WebSocketInterface missing".to_string())?;
        let sockets = Array::new();
        for url in &config.sockets {
            sockets.push(&js::construct(&socket_ctor, &[JsValue::from_str(url)])?);
        }

        let configuration = js::to_js(config)?;
        Reflect::set(&configuration, &"sockets".into(), &sockets).map_err(|e| js::describe(&e))?;

        let ua_ctor = js::property(&self.jssip, "UA").ok_or_else(|| "JsSIP.UA missing".to_string())?;
        let ua = js::construct(&ua_ctor, &[configuration])?;

        Ok(Rc::new(JsDirectUa {
            ua,
            listeners: RefCell::new(Vec::new()),
        }))
    }
}

struct JsDirectUa {
    ua: JsValue,
    listeners: Listeners,
}

impl DirectUa for JsDirectUa {
    fn on(&self, listener: UaListener) {
        let l = listener.clone();
        subscribe(&self.ua, "registered", &self.listeners, move |_| l(UaEvent::Registered));

        let l = listener.clone();
        subscribe(&self.ua, "unregistered", &self.listeners, move |_| l(UaEvent::Unregistered));

        let l = listener.clone();
        subscribe(&self.ua, "registrationFailed", &self.listeners, move |e| {
            let cause = js::get(&e, "cause").as_string();
            l(UaEvent::RegistrationFailed { cause })
        });

        subscribe(&self.ua, "newRTCSession", &self.listeners, move |e| {
            if let Some(session) = js::property(&e, "session") {
                listener(UaEvent::NewRtcSession(Rc::new(JsRtcSession::new(session))));
            }
        });
    }

    fn start(&self) {
        if let Err(e) = js::call_method(&self.ua, "start", &[]) {
            tracing::error!("JsSIP UA start failed: {}", e);
        }
    }

    fn stop(&self) {
        if let Err(e) = js::call_method(&self.ua, "stop", &[]) {
            tracing::warn!("JsSIP UA stop failed: {}", e);
        }
    }

    fn call(&self, target: &str, options: &DirectCallOptions) -> Result<Rc<dyn RtcSession>, String> {
        let session = js::call_method(&self.ua, "call", &[JsValue::from_str(target), js::to_js(options)?])?;
        Ok(Rc::new(JsRtcSession::new(session)))
    }
}

struct JsRtcSession {
    session: JsValue,
    listeners: Listeners,
}

impl JsRtcSession {
    fn new(session: JsValue) -> Self {
        Self {
            session,
            listeners: RefCell::new(Vec::new()),
        }
    }

    fn invoke(&self, name: &'static str, args: &[JsValue]) -> Result<(), SessionError> {
        if !js::has_method(&self.session, name) {
            return Err(SessionError::Unsupported(name));
        }
        js::call_method(&self.session, name, args).map(|_| ()).map_err(engine_error)
    }
}

impl RtcSession for JsRtcSession {
    fn on(&self, event: &str, handler: SessionHandler) {
        subscribe(&self.session, event, &self.listeners, session_handler(handler));
    }

    fn host_object(&self) -> Option<&dyn Any> {
        Some(&self.session)
    }

    fn on_remote_track(&self, handler: Rc<dyn Fn(MediaStream)>) {
        let Some(connection) = js::property(&self.session, "connection") else {
            tracing::debug!("Session has no peer connection yet");
            return;
        };
        let Ok(connection) = connection.dyn_into::<web_sys::EventTarget>() else {
            return;
        };

        let closure = Closure::wrap(Box::new(move |event: JsValue| {
            let first = js::get(&event, "streams").dyn_into::<Array>().ok().map(|s| s.get(0));
            if let Some(Ok(stream)) = first.map(|s| s.dyn_into::<web_sys::MediaStream>()) {
                handler(MediaStream::new(stream.id(), stream));
            }
        }) as Box<dyn FnMut(JsValue)>);

        if connection
            .add_event_listener_with_callback("track", closure.as_ref().unchecked_ref())
            .is_ok()
        {
            self.listeners.borrow_mut().push(closure);
        }
    }

    fn mute(&self) -> Result<(), SessionError> {
        self.invoke("mute", &[js::audio_flag()])
    }

    fn unmute(&self) -> Result<(), SessionError> {
        self.invoke("unmute", &[js::audio_flag()])
    }

    fn hold(&self) -> Result<(), SessionError> {
        self.invoke("hold", &[])
    }

    fn unhold(&self) -> Result<(), SessionError> {
        self.invoke("unhold", &[])
    }

    fn is_ended(&self) -> bool {
        js::call_method(&self.session, "isEnded", &[])
            .ok()
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    fn terminate(&self) -> Result<(), SessionError> {
        self.invoke("terminate", &[])
    }

    fn send_dtmf(&self, digits: &str) -> Result<(), SessionError> {
        self.invoke("sendDTMF", &[JsValue::from_str(digits)])
    }
}
