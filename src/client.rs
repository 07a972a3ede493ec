//! Call lifecycle manager
//!
//! Owns registration state, builds the session engine on first use, places
//! calls with the merged header set and hands back [`Call`] handles.
//! Lifecycle events are published on the client's [`EventHub`].

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::call::Call;
use crate::config::ClientConfig;
use crate::engine::{self, EngineContext, EngineHost, EngineKind, SessionEngine, SessionError};
use crate::events::{ClientEvent, EventHandler, EventHub, EventKind, WarningSource};
use crate::headers::SipHeaders;
use crate::media::{DeviceKind, GreetingInjector, MediaDeviceInfo, MediaPlatform, RemoteAudioSink};
use crate::spawn::spawn_local;
use crate::Click2CallError;

/// Registration state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegistrationState {
    #[default]
    Unregistered,
    Registering,
    Registered,
}

impl std::fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistrationState::Unregistered => write!(f, "Unregistered"),
            RegistrationState::Registering => write!(f, "Registering"),
            RegistrationState::Registered => write!(f, "Registered"),
        }
    }
}

/// Per-call options
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Target URI; defaults to the configured bot
    pub to: Option<String>,
    /// Highest-precedence headers for this call only
    pub headers: Vec<(String, String)>,
}

impl CallOptions {
    pub fn to(mut self, target: impl Into<String>) -> Self {
        self.to = Some(target.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Audio devices partitioned by direction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioDevices {
    pub mics: Vec<MediaDeviceInfo>,
    pub speakers: Vec<MediaDeviceInfo>,
}

struct ClientInner {
    config: Rc<ClientConfig>,
    host: Rc<dyn EngineHost>,
    platform: Rc<dyn MediaPlatform>,
    hub: EventHub,
    state: Rc<Cell<RegistrationState>>,
    engine: RefCell<Option<Rc<dyn SessionEngine>>>,
    sink: Rc<RemoteAudioSink>,
    current_call: RefCell<Option<Call>>,
    microphone: RefCell<Option<String>>,
}

/// Click-to-call client. Clones share the same session.
#[derive(Clone)]
pub struct Client {
    inner: Rc<ClientInner>,
}

impl Client {
    pub fn new(config: ClientConfig, host: Rc<dyn EngineHost>, platform: Rc<dyn MediaPlatform>) -> Self {
        let config = config.normalized();
        let microphone = config.audio.input_device_id.clone();

        Self {
            inner: Rc::new(ClientInner {
                sink: Rc::new(RemoteAudioSink::new(platform.clone())),
                config: Rc::new(config),
                host,
                platform,
                hub: EventHub::new(),
                state: Rc::new(Cell::new(RegistrationState::Unregistered)),
                engine: RefCell::new(None),
                current_call: RefCell::new(None),
                microphone: RefCell::new(microphone),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn state(&self) -> RegistrationState {
        self.inner.state.get()
    }

    pub fn is_registered(&self) -> bool {
        self.state() == RegistrationState::Registered
    }

    /// Engine in use, once one has been built
    pub fn engine_kind(&self) -> Option<EngineKind> {
        self.inner.engine.borrow().as_ref().map(|e| e.kind())
    }

    pub fn on(&self, kind: EventKind, handler: EventHandler) {
        self.inner.hub.on(kind, handler);
    }

    pub fn off(&self, kind: EventKind, handler: &EventHandler) {
        self.inner.hub.off(kind, handler);
    }

    /// Return the memoized engine, building it on first use
    fn engine(&self) -> Result<Rc<dyn SessionEngine>, Click2CallError> {
        if let Some(engine) = self.inner.engine.borrow().as_ref() {
            return Ok(engine.clone());
        }

        let engine = engine::build_engine(
            self.inner.host.as_ref(),
            EngineContext {
                config: self.inner.config.clone(),
                hub: self.inner.hub.clone(),
                state: self.inner.state.clone(),
                sink: self.inner.sink.clone(),
            },
        )?;
        *self.inner.engine.borrow_mut() = Some(engine.clone());
        Ok(engine)
    }

    /// Register with the gateway. A no-op when already registered.
    pub async fn register(&self) -> Result<(), Click2CallError> {
        match self.state() {
            RegistrationState::Registered if self.inner.engine.borrow().is_some() => {
                tracing::debug!("Already registered");
                return Ok(());
            }
            RegistrationState::Registering => {
                return Err(Click2CallError::RegistrationInProgress);
            }
            _ => {}
        }

        let engine = match self.inner.config.validate().and_then(|_| self.engine()) {
            Ok(engine) => engine,
            Err(e) => {
                tracing::error!("Cannot register: {}", e);
                self.inner.hub.emit(ClientEvent::RegistrationError {
                    cause: Some(e.to_string()),
                });
                return Err(e);
            }
        };

        self.inner.state.set(RegistrationState::Registering);
        self.inner.hub.emit(ClientEvent::RegistrationAttempt);
        tracing::info!(
            "Registering {} with {} via {}",
            self.inner.config.account_uri(),
            self.inner.config.signaling_endpoint,
            engine.kind()
        );

        match engine.register().await {
            Ok(()) => {
                self.inner.state.set(RegistrationState::Registered);
                tracing::info!("Registration successful");
                self.inner.hub.emit(ClientEvent::RegistrationSuccess);
                Ok(())
            }
            Err(e) => {
                self.inner.state.set(RegistrationState::Unregistered);
                tracing::error!("{}", e);
                let cause = match &e {
                    Click2CallError::RegistrationFailed(cause) => cause.clone(),
                    other => other.to_string(),
                };
                self.inner.hub.emit(ClientEvent::RegistrationError { cause: Some(cause) });
                Err(e)
            }
        }
    }

    /// Best-effort stop of the engine
    pub async fn unregister(&self) {
        let engine = self.inner.engine.borrow().clone();
        if let Some(engine) = engine {
            if let Err(e) = engine.stop().await {
                self.inner.hub.warn(WarningSource::Engine, e.to_string());
            }
        }
        self.inner.state.set(RegistrationState::Unregistered);
    }

    /// Place a call. Registration is not enforced: without a prior
    /// `register()` the engine is built and asked to call directly.
    ///
    /// With `autoGreet` the greeting plays on a local task; natively that
    /// needs a `tokio::task::LocalSet`, otherwise it is skipped with a
    /// [`WarningSource::Greeting`] warning.
    pub async fn call(&self, options: CallOptions) -> Result<Call, Click2CallError> {
        let config = self.inner.config.clone();
        let target = options
            .to
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| config.bot_uri());
        let headers = SipHeaders::for_call(&config, &options.headers);

        if let Err(e) = self.inner.sink.set_output_device(&config.audio.output_device_id).await {
            self.inner.hub.warn(WarningSource::OutputDevice, e.to_string());
        }

        let engine = self.engine()?;
        let session = engine.place_call(&target, &headers).await.map_err(|e| {
            tracing::error!("Placing call to {} failed: {}", target, e);
            e
        })?;

        let call = Call::new(session.clone(), self.inner.hub.clone());
        tracing::info!("Call {} placed to {} ({} headers)", call.id(), target, headers.len());

        let weak = call.downgrade();
        let hub = self.inner.hub.clone();
        let greeting = config
            .auto_greet
            .then(|| Rc::new(GreetingInjector::new(self.inner.platform.clone(), config.greet_url.clone())));

        session.on_lifecycle(Rc::new(move |event| {
            if event != engine::SessionLifecycle::Answered {
                return;
            }
            let Some(call) = weak.upgrade() else { return };
            hub.emit(ClientEvent::CallAnswered {
                call_id: call.id().to_string(),
            });

            if let (Some(injector), Some(session)) = (greeting.clone(), call.session()) {
                let task_hub = hub.clone();
                let scheduled = spawn_local(async move {
                    if let Err(e) = injector.play_into(&session).await {
                        task_hub.warn(WarningSource::Greeting, e.to_string());
                    }
                });
                if !scheduled {
                    hub.warn(WarningSource::Greeting, "no local executor to play the greeting".to_string());
                }
            }
        }));

        *self.inner.current_call.borrow_mut() = Some(call.clone());
        Ok(call)
    }

    /// Most recent call that is still active
    pub fn current_call(&self) -> Option<Call> {
        self.inner
            .current_call
            .borrow()
            .as_ref()
            .filter(|c| c.is_active())
            .cloned()
    }

    pub async fn get_devices(&self) -> Result<AudioDevices, Click2CallError> {
        let devices = self.inner.platform.enumerate_devices().await?;
        let (mics, rest): (Vec<_>, Vec<_>) = devices
            .into_iter()
            .partition(|d| d.kind == DeviceKind::AudioInput);
        let speakers = rest
            .into_iter()
            .filter(|d| d.kind == DeviceKind::AudioOutput)
            .collect();
        Ok(AudioDevices { mics, speakers })
    }

    /// Select the input device. The active call's outbound track is swapped
    /// when its session supports track replacement; otherwise the choice is
    /// only remembered.
    pub async fn set_microphone(&self, device_id: &str) {
        *self.inner.microphone.borrow_mut() = Some(device_id.to_string());

        let Some(call) = self.current_call() else {
            tracing::debug!("No active call, microphone {} remembered", device_id);
            return;
        };
        let Some(session) = call.session() else { return };
        if !session.supports_track_replacement() {
            tracing::debug!("Session cannot replace tracks, microphone {} remembered", device_id);
            return;
        }

        let track = match self.inner.platform.open_microphone(device_id).await {
            Ok(track) => track,
            Err(e) => {
                self.inner.hub.warn(WarningSource::Microphone, e.to_string());
                return;
            }
        };

        match call.replace_outgoing_track(&track).await {
            Ok(()) => tracing::info!("Switched call {} to microphone {}", call.id(), device_id),
            Err(SessionError::Unsupported(_)) => {}
            Err(e) => self.inner.hub.warn(WarningSource::Microphone, e.to_string()),
        }
    }

    /// Preferred input device, if one was configured or selected
    pub fn microphone(&self) -> Option<String> {
        self.inner.microphone.borrow().clone()
    }

    /// Redirect remote audio. Never fails; unsupported platforms keep the
    /// default output.
    pub async fn set_output_device(&self, device_id: &str) {
        if let Err(e) = self.inner.sink.set_output_device(device_id).await {
            self.inner.hub.warn(WarningSource::OutputDevice, e.to_string());
        }
    }

    /// Stop the engine and release it so the next `register()` rebuilds it
    pub async fn teardown(&self) {
        let engine = self.inner.engine.borrow_mut().take();
        if let Some(engine) = engine {
            if let Err(e) = engine.stop().await {
                self.inner.hub.warn(WarningSource::Engine, e.to_string());
            }
        }
        self.inner.current_call.borrow_mut().take();
        self.inner.state.set(RegistrationState::Unregistered);
        tracing::info!("Client torn down");
    }
}
