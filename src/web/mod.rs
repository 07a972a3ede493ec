//! Browser bindings
//!
//! Exposes `createClient(config)` to JavaScript. Engines are detected on
//! `window` and media goes through `web_sys`.

mod host;
mod js;
mod platform;

pub use host::BrowserHost;
pub use platform::BrowserPlatform;

use std::cell::RefCell;
use std::rc::Rc;

use js_sys::{Function, Promise};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;

use crate::{Call, CallOptions, Client, ClientConfig, ClientEvent, EventHandler, EventKind};

fn js_error(e: impl std::fmt::Display) -> JsValue {
    JsError::new(&e.to_string()).into()
}

/// Arguments passed to a JS handler for each event
fn event_args(event: &ClientEvent) -> JsValue {
    match event {
        ClientEvent::RegistrationError { cause } => cause.as_deref().map(JsValue::from_str).unwrap_or(JsValue::UNDEFINED),
        ClientEvent::CallAnswered { call_id } => JsValue::from_str(call_id),
        ClientEvent::Warning { message, .. } => JsValue::from_str(message),
        _ => JsValue::UNDEFINED,
    }
}

#[wasm_bindgen(js_name = createClient)]
pub fn create_client(config: JsValue) -> Result<JsClient, JsValue> {
    let config: ClientConfig = serde_json::from_value(js::to_json(&config)).map_err(js_error)?;
    let client = crate::create_client(config, Rc::new(BrowserHost::new()), Rc::new(BrowserPlatform::new()));
    Ok(JsClient {
        client,
        handlers: Rc::new(RefCell::new(Vec::new())),
    })
}

#[derive(serde::Deserialize, Default)]
struct JsCallOptions {
    to: Option<String>,
    #[serde(default)]
    headers: std::collections::BTreeMap<String, String>,
}

#[wasm_bindgen(js_name = Client)]
pub struct JsClient {
    client: Client,
    handlers: Rc<RefCell<Vec<(EventKind, Function, EventHandler)>>>,
}

#[wasm_bindgen(js_class = Client)]
impl JsClient {
    pub fn register(&self) -> Promise {
        let client = self.client.clone();
        future_to_promise(async move {
            client.register().await.map_err(js_error)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    pub fn unregister(&self) -> Promise {
        let client = self.client.clone();
        future_to_promise(async move {
            client.unregister().await;
            Ok(JsValue::UNDEFINED)
        })
    }

    pub fn call(&self, options: JsValue) -> Promise {
        let client = self.client.clone();
        future_to_promise(async move {
            let options: JsCallOptions = if options.is_undefined() || options.is_null() {
                JsCallOptions::default()
            } else {
                serde_json::from_value(js::to_json(&options)).map_err(js_error)?
            };
            let call = client
                .call(CallOptions {
                    to: options.to,
                    headers: options.headers.into_iter().collect(),
                })
                .await
                .map_err(js_error)?;
            Ok(JsCall { call }.into())
        })
    }

    #[wasm_bindgen(js_name = getDevices)]
    pub fn get_devices(&self) -> Promise {
        let client = self.client.clone();
        future_to_promise(async move {
            let devices = client.get_devices().await.map_err(js_error)?;
            js::to_js(&serde_json::json!({
                "mics": devices.mics,
                "speakers": devices.speakers,
            }))
            .map_err(js_error)
        })
    }

    #[wasm_bindgen(js_name = setMicrophone)]
    pub fn set_microphone(&self, device_id: String) -> Promise {
        let client = self.client.clone();
        future_to_promise(async move {
            client.set_microphone(&device_id).await;
            Ok(JsValue::UNDEFINED)
        })
    }

    #[wasm_bindgen(js_name = setOutputDevice)]
    pub fn set_output_device(&self, device_id: String) -> Promise {
        let client = self.client.clone();
        future_to_promise(async move {
            client.set_output_device(&device_id).await;
            Ok(JsValue::UNDEFINED)
        })
    }

    pub fn on(&self, event: &str, handler: Function) -> Result<(), JsValue> {
        let kind: EventKind = event.parse().map_err(js_error)?;
        if self
            .handlers
            .borrow()
            .iter()
            .any(|(k, f, _)| *k == kind && js_sys::Object::is(f, &handler))
        {
            return Ok(());
        }
        let f = handler.clone();
        let wrapped: EventHandler = Rc::new(move |e: &ClientEvent| {
            if let Err(err) = f.call1(&JsValue::NULL, &event_args(e)) {
                tracing::error!("Handler for {} threw: {}", e.kind(), js::describe(&err));
            }
        });
        self.client.on(kind, wrapped.clone());
        self.handlers.borrow_mut().push((kind, handler, wrapped));
        Ok(())
    }

    pub fn off(&self, event: &str, handler: Function) -> Result<(), JsValue> {
        let kind: EventKind = event.parse().map_err(js_error)?;
        let mut handlers = self.handlers.borrow_mut();
        if let Some(pos) = handlers
            .iter()
            .position(|(k, f, _)| *k == kind && js_sys::Object::is(f, &handler))
        {
            let (_, _, wrapped) = handlers.remove(pos);
            self.client.off(kind, &wrapped);
        }
        Ok(())
    }

    pub fn teardown(&self) -> Promise {
        let client = self.client.clone();
        future_to_promise(async move {
            client.teardown().await;
            Ok(JsValue::UNDEFINED)
        })
    }
}

#[wasm_bindgen(js_name = Call)]
pub struct JsCall {
    call: Call,
}

#[wasm_bindgen(js_class = Call)]
impl JsCall {
    #[wasm_bindgen(getter)]
    pub fn id(&self) -> String {
        self.call.id().to_string()
    }

    pub fn hangup(&self) -> Promise {
        let call = self.call.clone();
        future_to_promise(async move {
            call.hangup().await;
            Ok(JsValue::UNDEFINED)
        })
    }

    pub fn mute(&self) {
        self.call.mute();
    }

    pub fn unmute(&self) {
        self.call.unmute();
    }

    pub fn hold(&self) -> Promise {
        let call = self.call.clone();
        future_to_promise(async move {
            call.hold().await;
            Ok(JsValue::UNDEFINED)
        })
    }

    pub fn resume(&self) -> Promise {
        let call = self.call.clone();
        future_to_promise(async move {
            call.resume().await;
            Ok(JsValue::UNDEFINED)
        })
    }

    #[wasm_bindgen(js_name = sendDTMF)]
    pub fn send_dtmf(&self, digits: &str) {
        self.call.send_dtmf(digits);
    }

    /// Hands the handler to the engine session unchanged, so it receives
    /// the engine's own event objects
    pub fn on(&self, event: &str, handler: Function) {
        let subscribed = self.call.with_host_session(|session| match session.downcast_ref::<JsValue>() {
            Some(session) => js::call_method(session, "on", &[JsValue::from_str(event), handler.into()]).map(|_| ()),
            None => Err("session is not a JavaScript object".to_string()),
        });
        if let Some(Err(e)) = subscribed {
            tracing::warn!("Cannot subscribe to {} on call {}: {}", event, self.call.id(), e);
        }
    }
}
