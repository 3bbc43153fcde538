//! Request and response models shared by every service client.
//!
//! Services answer with the envelope `{ success, message, data }`. [`ApiResponse::data`]
//! unwraps it into the caller's type, and failed responses are turned into
//! [`Error::Api`] with the server's message.

pub mod envelope;

pub use envelope::*;

// crates.io
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header::AUTHORIZATION};
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	error::{ConfigError, ResponseError},
	http::{HttpResponse, parse_retry_after},
};

/// Role a request plays in the session protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestKind {
	/// Credential exchange.
	Login,
	/// Access token refresh.
	Refresh,
	/// Identity check (`/me`).
	Identity,
	/// Any other service call.
	Standard,
}
impl RequestKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			RequestKind::Login => "login",
			RequestKind::Refresh => "refresh",
			RequestKind::Identity => "identity",
			RequestKind::Standard => "standard",
		}
	}

	/// Whether the session's bearer token is attached to this kind of request.
	pub const fn carries_bearer(self) -> bool {
		matches!(self, RequestKind::Identity | RequestKind::Standard)
	}
}
impl Display for RequestKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Service call described relative to the service's base URL.
#[derive(Clone, Debug)]
pub struct ApiRequest {
	/// HTTP method.
	pub method: Method,
	/// Path (optionally with a query string) appended to the base URL, or an absolute
	/// `http(s)` URL used as is.
	pub path: String,
	/// Caller-supplied headers; an `Authorization` header here suppresses the session token.
	pub headers: HeaderMap,
	/// Optional request body.
	pub body: Option<Vec<u8>>,
}
impl ApiRequest {
	/// Creates a request without body or headers.
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		Self { method, path: path.into(), headers: HeaderMap::new(), body: None }
	}

	/// `GET` request.
	pub fn get(path: impl Into<String>) -> Self {
		Self::new(Method::GET, path)
	}

	/// `POST` request.
	pub fn post(path: impl Into<String>) -> Self {
		Self::new(Method::POST, path)
	}

	/// `PUT` request.
	pub fn put(path: impl Into<String>) -> Self {
		Self::new(Method::PUT, path)
	}

	/// `PATCH` request.
	pub fn patch(path: impl Into<String>) -> Self {
		Self::new(Method::PATCH, path)
	}

	/// `DELETE` request.
	pub fn delete(path: impl Into<String>) -> Self {
		Self::new(Method::DELETE, path)
	}

	/// Serializes `body` as JSON.
	pub fn json<B>(mut self, body: &B) -> Result<Self, ConfigError>
	where
		B: ?Sized + Serialize,
	{
		self.body = Some(serde_json::to_vec(body).map_err(ConfigError::Body)?);

		Ok(self)
	}

	/// Sets a raw body.
	pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
		self.body = Some(body.into());

		self
	}

	/// Adds or replaces a header.
	pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
		self.headers.insert(name, value);

		self
	}

	/// Sets an explicit bearer token instead of the session's.
	pub fn bearer(self, token: &TokenSecret) -> Result<Self, ConfigError> {
		Ok(self.header(AUTHORIZATION, bearer_value(token)?))
	}
}

/// Buffered service response.
#[derive(Clone, Debug)]
pub struct ApiResponse {
	/// HTTP status.
	pub status: StatusCode,
	/// Response headers.
	pub headers: HeaderMap,
	/// Raw body.
	pub body: Vec<u8>,
}
impl ApiResponse {
	/// Converts a transport response.
	pub fn from_http(response: HttpResponse) -> Self {
		let (parts, body) = response.into_parts();

		Self { status: parts.status, headers: parts.headers, body }
	}

	/// Decodes the response envelope; an empty body yields an empty successful envelope.
	pub fn envelope(&self) -> Result<Envelope, ResponseError> {
		Envelope::from_slice(&self.body, self.status.as_u16())
	}

	/// Decodes the envelope and its `data` payload into `T`.
	///
	/// A body reporting `success: false` surfaces as [`Error::Api`] even on a 2xx status.
	pub fn data<T>(&self) -> Result<T>
	where
		T: DeserializeOwned,
	{
		Ok(self.successful_envelope()?.into_data(self.status.as_u16())?)
	}

	/// Decodes the envelope, turning `success: false` into [`Error::Api`].
	pub fn successful_envelope(&self) -> Result<Envelope> {
		let envelope = self.envelope()?;

		if !envelope.success {
			return Err(Error::Api {
				status: self.status.as_u16(),
				message: non_empty(envelope.message).unwrap_or_else(|| self.fallback_message()),
				retry_after: None,
			});
		}

		Ok(envelope)
	}

	/// Reads the access token issued in `data.accessToken`.
	pub fn access_token(&self) -> Result<TokenSecret> {
		Ok(self.successful_envelope()?.access_token(self.status.as_u16())?)
	}

	/// Best-effort human-readable message for a failed response.
	pub fn error_message(&self) -> String {
		serde_json::from_slice::<serde_json::Value>(&self.body)
			.ok()
			.and_then(|value| {
				["message", "error"].into_iter().find_map(|field| {
					value.get(field).and_then(|v| v.as_str()).map(str::to_owned)
				})
			})
			.and_then(non_empty)
			.unwrap_or_else(|| self.fallback_message())
	}

	/// Converts a non-2xx response into [`Error::Api`].
	pub fn into_error(self) -> Error {
		Error::Api {
			status: self.status.as_u16(),
			message: self.error_message(),
			retry_after: parse_retry_after(&self.headers),
		}
	}

	fn fallback_message(&self) -> String {
		self.status
			.canonical_reason()
			.map(str::to_owned)
			.unwrap_or_else(|| format!("HTTP {}", self.status.as_u16()))
	}
}

/// Builds a sensitive `Authorization` header value for `token`.
pub(crate) fn bearer_value(token: &TokenSecret) -> Result<HeaderValue, ConfigError> {
	let mut value = HeaderValue::from_str(&token.bearer())
		.map_err(|_| ConfigError::InvalidHeader { name: "authorization" })?;

	value.set_sensitive(true);

	Ok(value)
}

fn non_empty(message: String) -> Option<String> {
	if message.trim().is_empty() { None } else { Some(message) }
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn response(status: u16, body: &str) -> ApiResponse {
		ApiResponse {
			status: StatusCode::from_u16(status).expect("Fixture status should be valid."),
			headers: HeaderMap::new(),
			body: body.as_bytes().to_vec(),
		}
	}

	#[test]
	fn data_unwraps_envelope_payload() {
		let books: Vec<String> = response(200, r#"{"success":true,"message":"ok","data":["a","b"]}"#)
			.data()
			.expect("Envelope payload should decode.");

		assert_eq!(books, ["a", "b"]);

		response(204, "").data::<()>().expect("Empty bodies should decode as unit.");
	}

	#[test]
	fn unsuccessful_envelope_is_a_business_error() {
		let err = response(200, r#"{"success":false,"message":"Out of stock"}"#)
			.data::<serde_json::Value>()
			.expect_err("success=false must surface as an error.");

		assert!(matches!(err, Error::Api { status: 200, ref message, .. } if message == "Out of stock"));
	}

	#[test]
	fn access_token_must_be_present_and_non_empty() {
		let token = response(200, r#"{"success":true,"data":{"accessToken":"t2"}}"#)
			.access_token()
			.expect("Issued token should be read.");

		assert_eq!(token.expose(), "t2");

		for body in [r#"{"data":{"accessToken":""}}"#, r#"{"data":{}}"#, r#"{"data":null}"#] {
			assert!(matches!(
				response(200, body).access_token(),
				Err(Error::Response(ResponseError::MissingField { field: "accessToken", status: 200 }))
			));
		}
	}

	#[test]
	fn error_message_prefers_server_text() {
		assert_eq!(response(422, r#"{"message":"Invalid ISBN"}"#).error_message(), "Invalid ISBN");
		assert_eq!(response(400, r#"{"error":"Bad cart id"}"#).error_message(), "Bad cart id");
		assert_eq!(response(503, "<html>").error_message(), "Service Unavailable");
	}

	#[test]
	fn malformed_payload_reports_path() {
		let err = response(200, r#"{"data":{"items":[{"quantity":"two"}]}}"#)
			.data::<BTreeMap<String, Vec<BTreeMap<String, u32>>>>()
			.expect_err("Type mismatch should fail.");

		match err {
			Error::Response(ResponseError::Malformed { source, status }) => {
				assert_eq!(status, 200);
				assert_eq!(source.path().to_string(), "items[0].quantity");
			},
			other => panic!("Unexpected error variant: {other:?}."),
		}
	}

	#[test]
	fn bearer_value_is_sensitive() {
		let value = bearer_value(&TokenSecret::new("abc")).expect("Token should be a valid header.");

		assert!(value.is_sensitive());
		assert!(bearer_value(&TokenSecret::new("bad\ntoken")).is_err());
	}
}
