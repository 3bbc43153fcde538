//! Session context injected into every client, plus the built-in in-memory store.
//!
//! Clients never own the session. They read the current access token through
//! [`SessionStore`] and request updates through its explicit methods, which lets
//! several service clients (and the UI layer) share one session while tests inject
//! their own store.

pub mod memory;

pub use memory::MemorySession;

// self
use crate::{
	_prelude::*,
	auth::{TokenSecret, UserProfile},
};

/// Point-in-time copy of the session state.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Session {
	/// Current access token, if any.
	pub access_token: Option<TokenSecret>,
	/// Whether a user is signed in.
	pub is_authenticated: bool,
	/// Profile snapshot of the signed-in user.
	pub user: Option<UserProfile>,
	/// Expiry decoded from the access token's `exp` claim (informational).
	pub expires_at: Option<OffsetDateTime>,
	/// Instant of the last update.
	pub updated_at: Option<OffsetDateTime>,
}
impl Session {
	/// Builds an authenticated session around the provided token.
	pub fn authenticated(token: TokenSecret, user: Option<UserProfile>) -> Self {
		let now = OffsetDateTime::now_utc();

		Self {
			expires_at: token.claims().and_then(|claims| claims.expires_at()),
			access_token: Some(token),
			is_authenticated: true,
			user,
			updated_at: Some(now),
		}
	}

	/// Returns `true` while a token or an authenticated user is held.
	pub fn is_active(&self) -> bool {
		self.is_authenticated || self.access_token.is_some()
	}
}

/// Session lifecycle notifications.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
	/// A login stored a new token and user.
	Established,
	/// A refresh replaced the access token.
	Refreshed {
		/// Fingerprint of the new token.
		fingerprint: String,
	},
	/// No valid session remains; the UI should send the user to sign in.
	Expired {
		/// Human-readable reason.
		reason: String,
	},
	/// The user signed out.
	Ended,
}

/// Receives [`SessionEvent`]s after the session state changed.
pub trait SessionObserver
where
	Self: Send + Sync,
{
	/// Called once per event, outside of any session lock.
	fn on_session_event(&self, event: &SessionEvent, session: &Session);
}
impl<F> SessionObserver for F
where
	F: Fn(&SessionEvent, &Session) + Send + Sync,
{
	fn on_session_event(&self, event: &SessionEvent, session: &Session) {
		self(event, session)
	}
}

/// Session context contract shared by the clients of a storefront.
pub trait SessionStore
where
	Self: Send + Sync,
{
	/// Returns a copy of the current session.
	fn snapshot(&self) -> Session;

	/// Returns the current access token, if any.
	fn access_token(&self) -> Option<TokenSecret> {
		self.snapshot().access_token
	}

	/// Stores a freshly issued token and user after a login.
	fn establish(&self, token: TokenSecret, user: Option<UserProfile>);

	/// Replaces the access token after a refresh, keeping the user snapshot.
	fn update_access_token(&self, token: TokenSecret);

	/// Replaces the user snapshot.
	fn update_user(&self, user: UserProfile);

	/// Clears the session because it can no longer be recovered.
	///
	/// Returns `true` (and notifies observers) only when an active session was cleared, so
	/// the expired event fires at most once per expiry episode.
	fn expire(&self, reason: &str) -> bool;

	/// Clears the session after an explicit sign-out. Returns `true` if it was active.
	fn end(&self) -> bool;

	/// Registers an observer for subsequent events.
	fn subscribe(&self, observer: Arc<dyn SessionObserver>);
}
