//! Call handle
//!
//! Wraps exactly one live session and exposes the uniform mid-call control
//! surface. Once the session reports `ended`/`failed`, or after `hangup()`,
//! the handle drops its session and every operation becomes a no-op.

use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use uuid::Uuid;

use crate::engine::{LiveSession, SessionError, SessionHandler, SessionLifecycle};
use crate::events::{EventHub, WarningSource};
use crate::media::MediaTrack;

struct CallInner {
    id: String,
    session: RefCell<Option<LiveSession>>,
    hub: EventHub,
}

#[derive(Clone)]
pub struct Call {
    inner: Rc<CallInner>,
}

impl std::fmt::Debug for Call {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Call")
            .field("id", &self.inner.id)
            .field("active", &self.is_active())
            .finish()
    }
}

impl Call {
    pub(crate) fn new(session: LiveSession, hub: EventHub) -> Self {
        let call = Self {
            inner: Rc::new(CallInner {
                id: Uuid::new_v4().to_string(),
                session: RefCell::new(Some(session.clone())),
                hub,
            }),
        };

        let weak = Rc::downgrade(&call.inner);
        session.on_lifecycle(Rc::new(move |event: SessionLifecycle| {
            if !event.is_terminal() {
                return;
            }
            if let Some(inner) = weak.upgrade() {
                tracing::info!("Call {} ended by engine: {:?}", inner.id, event);
                inner.session.borrow_mut().take();
            }
        }));

        call
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Whether the handle still holds a session that has not ended
    pub fn is_active(&self) -> bool {
        self.session().map_or(false, |s| !s.is_ended())
    }

    pub(crate) fn session(&self) -> Option<LiveSession> {
        self.inner.session.borrow().clone()
    }

    pub(crate) fn downgrade(&self) -> WeakCall {
        WeakCall(Rc::downgrade(&self.inner))
    }

    /// End the call. Idempotent; never fails.
    pub async fn hangup(&self) {
        let Some(session) = self.inner.session.borrow_mut().take() else {
            tracing::debug!("Call {} already released", self.inner.id);
            return;
        };

        if session.is_ended() {
            tracing::debug!("Call {} already ended", self.inner.id);
            return;
        }

        match session.terminate().await {
            Ok(()) => tracing::info!("Call {} hung up", self.inner.id),
            Err(e) => self.warn("hangup", e),
        }
    }

    pub fn mute(&self) {
        if let Some(session) = self.session() {
            if let Err(e) = session.mute() {
                self.warn("mute", e);
            }
        }
    }

    pub fn unmute(&self) {
        if let Some(session) = self.session() {
            if let Err(e) = session.unmute() {
                self.warn("unmute", e);
            }
        }
    }

    pub async fn hold(&self) {
        if let Some(session) = self.session() {
            if let Err(e) = session.hold().await {
                self.warn("hold", e);
            }
        }
    }

    pub async fn resume(&self) {
        if let Some(session) = self.session() {
            if let Err(e) = session.unhold().await {
                self.warn("resume", e);
            }
        }
    }

    pub fn send_dtmf(&self, digits: &str) {
        if let Some(session) = self.session() {
            if let Err(e) = session.send_dtmf(digits) {
                self.warn("sendDTMF", e);
            }
        }
    }

    /// Subscribe directly to the engine's session events
    pub fn on(&self, event: &str, handler: SessionHandler) {
        if let Some(session) = self.session() {
            session.on(event, handler);
        }
    }

    /// Run `f` against the engine's native session object while the call
    /// is active. Lets hosts subscribe with their own callback values.
    pub fn with_host_session<R>(&self, f: impl FnOnce(&dyn Any) -> R) -> Option<R> {
        let session = self.session()?;
        session.host_object().map(f)
    }

    /// Swap the outbound track, e.g. after a microphone change
    pub(crate) async fn replace_outgoing_track(&self, track: &MediaTrack) -> Result<(), SessionError> {
        match self.session() {
            Some(session) => session.replace_outgoing_track(track).await,
            None => Err(SessionError::Unsupported("replaceOutgoingTrack")),
        }
    }

    fn warn(&self, operation: &str, error: SessionError) {
        self.inner.hub.warn(
            WarningSource::CallControl,
            format!("{} on call {} failed: {}", operation, self.inner.id, error),
        );
    }
}

/// Non-owning reference used by session callbacks
#[derive(Clone)]
pub(crate) struct WeakCall(Weak<CallInner>);

impl WeakCall {
    pub fn upgrade(&self) -> Option<Call> {
        self.0.upgrade().map(|inner| Call { inner })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ClientEvent, EventKind};
    use crate::mock::{MockManagedSession, MockRtcSession};
    use serde_json::json;
    use std::cell::Cell;

    #[tokio::test]
    async fn test_hangup_after_engine_ended_is_noop() {
        let managed = Rc::new(MockManagedSession::new());
        let call = Call::new(LiveSession::Managed(managed.clone()), EventHub::new());

        managed.set_ended();
        call.hangup().await;
        call.hangup().await;

        assert!(managed.calls().is_empty());
    }

    #[tokio::test]
    async fn test_hangup_terminates_once() {
        let managed = Rc::new(MockManagedSession::new());
        let call = Call::new(LiveSession::Managed(managed.clone()), EventHub::new());

        call.hangup().await;
        call.hangup().await;

        assert_eq!(managed.calls(), vec!["bye"]);
        assert!(!call.is_active());
    }

    #[tokio::test]
    async fn test_controls_inert_after_failed_event() {
        let rtc = Rc::new(MockRtcSession::new());
        let call = Call::new(LiveSession::Direct(rtc.clone()), EventHub::new());

        call.mute();
        rtc.fire("failed", &json!({"cause": "Rejected"}));
        call.unmute();
        call.hold().await;
        call.send_dtmf("1");
        call.hangup().await;

        assert_eq!(rtc.calls(), vec!["mute"]);
    }

    #[tokio::test]
    async fn test_control_failures_become_warnings() {
        let managed = Rc::new(MockManagedSession::new());
        managed.fail_controls();
        let hub = EventHub::new();
        let warnings = Rc::new(Cell::new(0));
        let w = warnings.clone();
        hub.on(
            EventKind::Warning,
            Rc::new(move |e: &ClientEvent| {
                if matches!(e, ClientEvent::Warning { source: WarningSource::CallControl, .. }) {
                    w.set(w.get() + 1);
                }
            }),
        );

        let call = Call::new(LiveSession::Managed(managed), hub);
        call.mute();
        call.hold().await;
        call.resume().await;

        assert_eq!(warnings.get(), 3);
    }

    #[tokio::test]
    async fn test_controls_forward_to_session() {
        let managed = Rc::new(MockManagedSession::new());
        let call = Call::new(LiveSession::Managed(managed.clone()), EventHub::new());

        call.mute();
        call.unmute();
        call.hold().await;
        call.resume().await;
        call.send_dtmf("12#");

        assert_eq!(managed.calls(), vec!["mute", "unmute", "hold", "unhold", "sendDTMF:12#"]);
    }

    #[test]
    fn test_on_proxies_to_session_events() {
        let rtc = Rc::new(MockRtcSession::new());
        let call = Call::new(LiveSession::Direct(rtc.clone()), EventHub::new());
        let seen = Rc::new(Cell::new(false));
        let s = seen.clone();

        call.on("progress", Rc::new(move |_: &serde_json::Value| s.set(true)));
        rtc.fire("progress", &json!({}));

        assert!(seen.get());
    }

    #[test]
    fn test_host_session_reachable_until_call_ends() {
        let rtc = Rc::new(MockRtcSession::new());
        let call = Call::new(LiveSession::Direct(rtc.clone()), EventHub::new());

        let same = call.with_host_session(|session| {
            session
                .downcast_ref::<MockRtcSession>()
                .is_some_and(|s| std::ptr::eq(s, Rc::as_ptr(&rtc)))
        });
        assert_eq!(same, Some(true));

        rtc.fire("ended", &json!({"cause": "BYE"}));
        assert_eq!(call.with_host_session(|_| ()), None);
    }
}
