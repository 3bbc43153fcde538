//! Service descriptors: validated per-service configuration consumed by clients.
//!
//! A descriptor names one backend service, where it lives, how long requests may take,
//! and which routes play a role in the session protocol (login, refresh, logout, and
//! identity checks). Routes are absolute URLs so a client for the catalog service can
//! recognise the refresh call even though it lives on the user service.

/// Builder API for assembling service descriptors.
pub mod builder;
/// Identifier newtypes.
pub mod id;

pub use builder::*;
pub use id::*;

// crates.io
use url::Position;
// self
use crate::{_prelude::*, api::RequestKind};

/// Default login path.
pub const LOGIN_PATH: &str = "/auth/login";
/// Default refresh path.
pub const REFRESH_PATH: &str = "/auth/refresh-token";
/// Default logout path.
pub const LOGOUT_PATH: &str = "/auth/logout";
/// Default identity path.
pub const IDENTITY_PATH: &str = "/auth/me";
/// Default request content type.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Routes that take part in the session protocol.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRoutes {
	/// Credential exchange; a 401 here is a credential rejection.
	pub login: Url,
	/// Token refresh; authenticated by the transport's cookie, never by a bearer token.
	pub refresh: Url,
	/// Sign-out.
	pub logout: Url,
	/// Identity checks (`/me`); a 401 here expires the session immediately.
	pub identity: Vec<Url>,
}
impl AuthRoutes {
	/// Builds the default routes under `base`.
	pub fn under(base: &Url) -> Self {
		Self {
			login: join_path(base, LOGIN_PATH),
			refresh: join_path(base, REFRESH_PATH),
			logout: join_path(base, LOGOUT_PATH),
			identity: vec![join_path(base, IDENTITY_PATH)],
		}
	}

	/// Classifies a resolved request URL; query strings are ignored.
	pub fn classify(&self, url: &Url) -> RequestKind {
		if same_route(url, &self.login) {
			RequestKind::Login
		} else if same_route(url, &self.refresh) {
			RequestKind::Refresh
		} else if self.identity.iter().any(|route| same_route(url, route)) {
			RequestKind::Identity
		} else {
			RequestKind::Standard
		}
	}

	fn iter(&self) -> impl Iterator<Item = (&'static str, &Url)> {
		[("login", &self.login), ("refresh", &self.refresh), ("logout", &self.logout)]
			.into_iter()
			.chain(self.identity.iter().map(|url| ("identity", url)))
	}
}

/// Immutable service descriptor consumed by [`ApiClient`](crate::client::ApiClient).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceDescriptor {
	/// Service name, used in spans and errors.
	pub id: ServiceId,
	/// Base URL every request path is appended to.
	pub base_url: Url,
	/// Fixed per-request timeout applied by the transport.
	pub timeout: StdDuration,
	/// Content type attached to request bodies that do not set one.
	pub content_type: String,
	/// Session protocol routes.
	pub auth: AuthRoutes,
}
impl ServiceDescriptor {
	/// Default request timeout.
	pub const DEFAULT_TIMEOUT: StdDuration = StdDuration::from_secs(10);

	/// Creates a new builder for the provided identifier.
	pub fn builder(id: ServiceId) -> ServiceDescriptorBuilder {
		ServiceDescriptorBuilder::new(id)
	}

	/// Resolves a request path (optionally carrying a query string) against the base URL.
	pub fn resolve(&self, path: &str) -> Url {
		join_path(&self.base_url, path)
	}
}

/// Appends `path` to the base URL's path, keeping any base path prefix.
pub(crate) fn join_path(base: &Url, path: &str) -> Url {
	let (route, query) = match path.split_once('?') {
		Some((route, query)) => (route, Some(query)),
		None => (path, None),
	};
	let mut url = base.clone();
	let joined = format!(
		"{}/{}",
		base.path().trim_end_matches('/'),
		route.trim_start_matches('/')
	);

	url.set_path(&joined);
	url.set_query(query.filter(|query| !query.is_empty()));
	url.set_fragment(None);

	url
}

fn same_route(left: &Url, right: &Url) -> bool {
	left[..Position::AfterPath] == right[..Position::AfterPath]
}
