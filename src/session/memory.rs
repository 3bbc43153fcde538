//! Thread-safe in-memory [`SessionStore`] implementation.

// self
use crate::{
	_prelude::*,
	auth::{TokenSecret, UserProfile},
	session::{Session, SessionEvent, SessionObserver, SessionStore},
};

type Observers = Arc<RwLock<Vec<Arc<dyn SessionObserver>>>>;

/// Process-wide session held in memory.
#[derive(Clone, Default)]
pub struct MemorySession {
	state: Arc<RwLock<Session>>,
	observers: Observers,
}
impl MemorySession {
	/// Creates a store seeded with an existing session (for example one restored by the UI).
	pub fn with_session(session: Session) -> Self {
		Self { state: Arc::new(RwLock::new(session)), observers: Default::default() }
	}

	/// Creates an authenticated store holding `token`.
	pub fn with_token(token: impl Into<String>) -> Self {
		Self::with_session(Session::authenticated(TokenSecret::new(token), None))
	}

	fn notify(&self, event: SessionEvent) {
		let session = self.state.read().clone();
		let observers = self.observers.read().clone();

		for observer in observers {
			observer.on_session_event(&event, &session);
		}
	}

	fn clear_now(&self) -> bool {
		let mut guard = self.state.write();
		let was_active = guard.is_active();

		*guard = Session { updated_at: Some(OffsetDateTime::now_utc()), ..Session::default() };

		was_active
	}
}
impl SessionStore for MemorySession {
	fn snapshot(&self) -> Session {
		self.state.read().clone()
	}

	fn access_token(&self) -> Option<TokenSecret> {
		self.state.read().access_token.clone()
	}

	fn establish(&self, token: TokenSecret, user: Option<UserProfile>) {
		*self.state.write() = Session::authenticated(token, user);

		self.notify(SessionEvent::Established);
	}

	fn update_access_token(&self, token: TokenSecret) {
		let fingerprint = token.fingerprint();

		{
			let mut guard = self.state.write();
			let user = guard.user.take();

			*guard = Session::authenticated(token, user);
		}

		self.notify(SessionEvent::Refreshed { fingerprint });
	}

	fn update_user(&self, user: UserProfile) {
		let mut guard = self.state.write();

		guard.user = Some(user);
		guard.updated_at = Some(OffsetDateTime::now_utc());
	}

	fn expire(&self, reason: &str) -> bool {
		let cleared = self.clear_now();

		if cleared {
			self.notify(SessionEvent::Expired { reason: reason.to_owned() });
		}

		cleared
	}

	fn end(&self) -> bool {
		let cleared = self.clear_now();

		if cleared {
			self.notify(SessionEvent::Ended);
		}

		cleared
	}

	fn subscribe(&self, observer: Arc<dyn SessionObserver>) {
		self.observers.write().push(observer);
	}
}
impl Debug for MemorySession {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("MemorySession")
			.field("session", &*self.state.read())
			.field("observers", &self.observers.read().len())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn recording(store: &MemorySession) -> Arc<Mutex<Vec<SessionEvent>>> {
		let events = Arc::new(Mutex::new(Vec::new()));
		let sink = events.clone();

		store.subscribe(Arc::new(move |event: &SessionEvent, _: &Session| {
			sink.lock().push(event.clone());
		}));

		events
	}

	#[test]
	fn expire_fires_once_per_active_session() {
		let store = MemorySession::with_token("stale");
		let events = recording(&store);

		assert!(store.expire("refresh failed"));
		assert!(!store.expire("refresh failed again"));

		assert_eq!(
			*events.lock(),
			vec![SessionEvent::Expired { reason: "refresh failed".into() }]
		);
		assert!(!store.snapshot().is_active());
	}

	#[test]
	fn refresh_keeps_user_and_reports_fingerprint() {
		let store = MemorySession::default();
		let events = recording(&store);
		let user: UserProfile =
			serde_json::from_str(r#"{"id":"u1","email":"reader@example.com"}"#)
				.expect("Profile fixture should deserialize.");

		store.establish(TokenSecret::new("first"), Some(user.clone()));
		store.update_access_token(TokenSecret::new("second"));

		let session = store.snapshot();

		assert_eq!(session.access_token, Some(TokenSecret::new("second")));
		assert_eq!(session.user, Some(user));
		assert!(session.is_authenticated);
		assert_eq!(
			*events.lock(),
			vec![
				SessionEvent::Established,
				SessionEvent::Refreshed { fingerprint: TokenSecret::new("second").fingerprint() },
			]
		);
	}

	#[test]
	fn end_reports_sign_out_without_expiry() {
		let store = MemorySession::with_token("token");
		let events = recording(&store);

		assert!(store.end());
		assert_eq!(*events.lock(), vec![SessionEvent::Ended]);
		assert_eq!(store.access_token(), None);
	}
}
