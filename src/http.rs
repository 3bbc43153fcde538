//! Transport primitives for service calls.
//!
//! [`ApiTransport`] is the client's only dependency on an HTTP stack. Requests and
//! responses use the [`http`] crate's types with buffered bodies, so an implementation
//! only has to move bytes; bearer tokens, envelopes, and the refresh protocol stay in
//! [`ApiClient`](crate::client::ApiClient).

// crates.io
use http::header::{HeaderMap, RETRY_AFTER};
use time::format_description::well_known::Rfc2822;
// self
use crate::{_prelude::*, error::TransportError};
#[cfg(feature = "reqwest")]
use crate::{error::ConfigError, service::ServiceDescriptor};

/// Outbound request handed to a transport.
pub type HttpRequest = http::Request<Vec<u8>>;
/// Buffered response returned by a transport.
pub type HttpResponse = http::Response<Vec<u8>>;
/// Owned future returned by [`ApiTransport::execute`].
pub type TransportFuture = Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + Send>>;

/// Abstraction over HTTP stacks capable of executing service calls.
///
/// Implementations must be `Send + Sync + 'static` so one transport can be shared by the
/// clients of every service (sharing its cookie jar, which carries the refresh
/// credential). The returned future must own whatever it needs: the refresh coordinator
/// dispatches queued replays from one task and hands the futures to the waiting callers.
///
/// # Dispatch Contract
///
/// The request counts as dispatched once `execute` returned and the future was polled
/// for the first time. Replays after a refresh are handed to `execute` in FIFO order and
/// each one is first polled only after its predecessor was, so implementations may send
/// either eagerly or on first poll.
pub trait ApiTransport
where
	Self: 'static + Send + Sync,
{
	/// Executes `request`, resolving once the full response body is buffered.
	fn execute(&self, request: HttpRequest) -> TransportFuture;
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// The client built by [`ReqwestTransport::for_service`] keeps a cookie store (the refresh
/// endpoint authenticates with an HTTP-only cookie set at login), applies the descriptor's
/// timeout, and does not follow redirects so a 401 is never masked by a login redirect.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	/// Builds a cookie-aware client configured from `descriptor`.
	pub fn for_service(descriptor: &ServiceDescriptor) -> Result<Self, ConfigError> {
		Self::with_timeout(descriptor.timeout)
	}

	/// Builds a cookie-aware client with the provided request timeout.
	pub fn with_timeout(timeout: StdDuration) -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder()
			.cookie_store(true)
			.timeout(timeout)
			.redirect(reqwest::redirect::Policy::none())
			.build()?;

		Ok(Self(client))
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl ApiTransport for ReqwestTransport {
	fn execute(&self, request: HttpRequest) -> TransportFuture {
		let client = self.0.clone();
		let request = reqwest::Request::try_from(request);

		Box::pin(async move {
			let response = client.execute(request?).await?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let mut response_new = HttpResponse::new(response.bytes().await?.to_vec());

			*response_new.status_mut() = status;
			*response_new.headers_mut() = headers;

			Ok(response_new)
		})
	}
}

/// Reads a `Retry-After` header given either as delta seconds or as an HTTP date.
pub(crate) fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let value = headers.get(RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u32>() {
		return Some(Duration::seconds(i64::from(secs)));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}
