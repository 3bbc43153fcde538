//! Client-level error types shared across services, sessions, and the refresh coordinator.

// self
use crate::_prelude::*;

/// Client-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical client error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS, timeout).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Response body could not be decoded.
	#[error(transparent)]
	Response(#[from] ResponseError),
	/// Local cart change was rejected before reaching the service.
	#[error(transparent)]
	Cart(#[from] crate::cart::CartError),

	/// The login endpoint rejected the supplied credentials.
	#[error("Credentials were rejected: {message}.")]
	CredentialsRejected {
		/// Server-provided message.
		message: String,
	},
	/// No valid session remains; the session has been cleared.
	#[error("Session expired: {reason}.")]
	SessionExpired {
		/// Human-readable reason.
		reason: String,
		/// Refresh failure shared by every request of the expiry episode.
		#[source]
		source: Option<Arc<Error>>,
	},
	/// The request was rejected again after being replayed with a refreshed token.
	#[error("Request was rejected after the access token was refreshed: {message}.")]
	Unauthorized {
		/// Server-provided message.
		message: String,
	},
	/// The refresh this request waited for was dropped before it settled.
	#[error("Token refresh was interrupted before it settled.")]
	RefreshInterrupted,
	/// Ordinary business or validation failure reported by a service.
	#[error("Service responded with HTTP {status}: {message}.")]
	Api {
		/// HTTP status code.
		status: u16,
		/// Server-provided message, or the status' canonical reason.
		message: String,
		/// Retry-After hint, if supplied.
		retry_after: Option<Duration>,
	},
}
impl Error {
	/// Returns `true` when the error means the caller has to sign in again.
	pub fn is_session_expired(&self) -> bool {
		matches!(self, Self::SessionExpired { .. })
	}

	/// HTTP status code attached to the error, when one is known.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Api { status, .. } => Some(*status),
			Self::Response(err) => Some(err.status()),
			Self::CredentialsRejected { .. } | Self::Unauthorized { .. } => Some(401),
			_ => None,
		}
	}
}

/// Configuration and validation failures raised by the client.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Resolved URL could not be turned into a request URI.
	#[error("Request URI is invalid.")]
	InvalidUri(#[from] http::uri::InvalidUri),
	/// A header value (usually the bearer token) contains forbidden characters.
	#[error("Header `{name}` has an invalid value.")]
	InvalidHeader {
		/// Header name.
		name: &'static str,
	},
	/// Request body could not be serialized.
	#[error("Request body could not be serialized.")]
	Body(#[source] serde_json::Error),
	/// A service or catalog identifier is malformed.
	#[error(transparent)]
	Identifier(#[from] crate::service::IdentifierError),
	/// Service descriptor validation failed.
	#[error(transparent)]
	Descriptor(#[from] crate::service::ServiceDescriptorError),
	/// Storefront configuration document could not be parsed.
	#[error("Storefront configuration is invalid.")]
	Document {
		/// Structured parsing failure naming the offending field.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// A configured base URL cannot be parsed.
	#[error("Service URL is invalid.")]
	InvalidUrl(#[from] url::ParseError),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Failures decoding a service response body.
#[derive(Debug, ThisError)]
pub enum ResponseError {
	/// Body is not valid JSON or does not match the expected shape.
	#[error("Service returned malformed JSON (HTTP {status}).")]
	Malformed {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code.
		status: u16,
	},
	/// Envelope did not carry the expected payload.
	#[error("Service response (HTTP {status}) is missing `{field}`.")]
	MissingField {
		/// Missing field name.
		field: &'static str,
		/// HTTP status code.
		status: u16,
	},
}
impl ResponseError {
	/// HTTP status code of the response that failed to decode.
	pub fn status(&self) -> u16 {
		match self {
			Self::Malformed { status, .. } | Self::MissingField { status, .. } => *status,
		}
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the service.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// The request exceeded the configured timeout.
	#[error("Request timed out while calling the service.")]
	Timeout {
		/// Transport-specific timeout error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the service.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}

	/// Wraps a transport-specific timeout error.
	pub fn timeout(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Timeout { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		if e.is_timeout() { Self::timeout(e) } else { Self::network(e) }
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn session_expired_exposes_shared_source() {
		let cause = Arc::new(Error::Api {
			status: 500,
			message: "refresh store offline".into(),
			retry_after: None,
		});
		let err = Error::SessionExpired { reason: cause.to_string(), source: Some(cause.clone()) };

		assert!(err.is_session_expired());
		assert!(err.to_string().contains("refresh store offline"));

		let source = StdError::source(&err).expect("Session expiry should expose the refresh failure.");

		assert_eq!(source.to_string(), cause.to_string());
	}

	#[test]
	fn status_is_reported_for_http_failures() {
		let api = Error::Api { status: 422, message: "Quantity too large".into(), retry_after: None };
		let rejected = Error::CredentialsRejected { message: "Wrong password".into() };
		let transport: Error = TransportError::Io(std::io::Error::other("reset")).into();

		assert_eq!(api.status(), Some(422));
		assert_eq!(rejected.status(), Some(401));
		assert_eq!(transport.status(), None);
	}
}
