//! Request preparation shared by the client's send, replay, and session helpers.

// crates.io
use http::{
	HeaderMap, HeaderValue, Method, Uri,
	header::{AUTHORIZATION, CONTENT_TYPE},
};
// self
use crate::{
	_prelude::*,
	api::{ApiRequest, RequestKind, bearer_value},
	auth::TokenSecret,
	error::ConfigError,
	http::HttpRequest,
	service::ServiceDescriptor,
	session::SessionStore,
};

/// Fully resolved request, kept around so it can be replayed after a refresh.
#[derive(Clone, Debug)]
pub(crate) struct PreparedRequest {
	pub(crate) method: Method,
	pub(crate) url: Url,
	pub(crate) headers: HeaderMap,
	pub(crate) body: Vec<u8>,
	pub(crate) kind: RequestKind,
	/// Set once the request has been through the 401 recovery protocol.
	pub(crate) retried: bool,
	/// Token carried by the last dispatch, if any.
	pub(crate) sent_with: Option<TokenSecret>,
}
impl PreparedRequest {
	/// Resolves `request` against `descriptor` and attaches the session token when the
	/// request kind carries one and the caller did not set `Authorization` itself.
	pub(crate) fn new(
		descriptor: &ServiceDescriptor,
		request: ApiRequest,
		session: &dyn SessionStore,
	) -> Result<Self, ConfigError> {
		let ApiRequest { method, path, mut headers, body } = request;
		let url = Url::parse(&path)
			.ok()
			.filter(|url| matches!(url.scheme(), "http" | "https"))
			.unwrap_or_else(|| descriptor.resolve(&path));
		let kind = descriptor.auth.classify(&url);

		if body.is_some() && !headers.contains_key(CONTENT_TYPE) {
			let value = HeaderValue::from_str(&descriptor.content_type)
				.map_err(|_| ConfigError::InvalidHeader { name: "content-type" })?;

			headers.insert(CONTENT_TYPE, value);
		}

		let mut prepared = Self {
			method,
			url,
			sent_with: caller_bearer(&headers),
			headers,
			body: body.unwrap_or_default(),
			kind,
			retried: false,
		};

		if kind.carries_bearer()
			&& !prepared.headers.contains_key(AUTHORIZATION)
			&& let Some(token) = session.access_token()
		{
			prepared.authorize(&token)?;
		}

		Ok(prepared)
	}

	/// Sets (or overwrites) the bearer header and remembers the token it carries.
	pub(crate) fn authorize(&mut self, token: &TokenSecret) -> Result<(), ConfigError> {
		self.headers.insert(AUTHORIZATION, bearer_value(token)?);
		self.sent_with = Some(token.clone());

		Ok(())
	}

	/// Builds the transport request.
	pub(crate) fn to_http(&self) -> Result<HttpRequest, ConfigError> {
		let uri = self.url.as_str().parse::<Uri>()?;
		let mut request = HttpRequest::new(self.body.clone());

		*request.method_mut() = self.method.clone();
		*request.uri_mut() = uri;
		*request.headers_mut() = self.headers.clone();

		Ok(request)
	}
}

fn caller_bearer(headers: &HeaderMap) -> Option<TokenSecret> {
	headers
		.get(AUTHORIZATION)?
		.to_str()
		.ok()?
		.strip_prefix("Bearer ")
		.map(TokenSecret::new)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		service::{ServiceId, ServiceDescriptor},
		session::MemorySession,
	};

	fn descriptor() -> ServiceDescriptor {
		ServiceDescriptor::builder(ServiceId::new("orders").expect("Service id should be valid."))
			.base_url(Url::parse("https://orders.example.com/api/").expect("URL should parse."))
			.build()
			.expect("Descriptor should build.")
	}

	#[test]
	fn session_token_is_attached_to_standard_requests() {
		let session = MemorySession::with_token("t1");
		let request = ApiRequest::post("orders").body(br#"{"bookId":"b1"}"#.to_vec());
		let prepared =
			PreparedRequest::new(&descriptor(), request, &session).expect("Request should prepare.");

		assert_eq!(prepared.kind, RequestKind::Standard);
		assert_eq!(prepared.url.as_str(), "https://orders.example.com/api/orders");
		assert_eq!(prepared.headers[AUTHORIZATION], "Bearer t1");
		assert_eq!(prepared.headers[CONTENT_TYPE], "application/json");
		assert_eq!(prepared.sent_with, Some(TokenSecret::new("t1")));
	}

	#[test]
	fn login_and_refresh_never_carry_the_session_token() {
		let session = MemorySession::with_token("t1");

		for path in ["auth/login", "auth/refresh-token"] {
			let prepared = PreparedRequest::new(&descriptor(), ApiRequest::post(path), &session)
				.expect("Request should prepare.");

			assert!(!prepared.headers.contains_key(AUTHORIZATION), "{path} must not carry a bearer");
			assert!(prepared.sent_with.is_none());
		}
	}

	#[test]
	fn caller_authorization_is_respected() {
		let session = MemorySession::with_token("t1");
		let request =
			ApiRequest::get("cart").bearer(&TokenSecret::new("admin")).expect("Header should build.");
		let mut prepared =
			PreparedRequest::new(&descriptor(), request, &session).expect("Request should prepare.");

		assert_eq!(prepared.headers[AUTHORIZATION], "Bearer admin");
		assert_eq!(prepared.sent_with, Some(TokenSecret::new("admin")));

		prepared.authorize(&TokenSecret::new("t2")).expect("Token should be a valid header.");

		let request = prepared.to_http().expect("Request should convert.");

		assert_eq!(request.headers()[AUTHORIZATION], "Bearer t2");
		assert_eq!(request.uri(), "https://orders.example.com/api/cart");
		assert!(request.body().is_empty());
	}
}
