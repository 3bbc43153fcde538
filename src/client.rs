//! Bearer-authenticated service client with single-flight refresh and FIFO replay.
//!
//! [`ApiClient`] wraps one backend service. It attaches the session's access token to
//! outbound requests and, when a request is rejected with 401, runs the recovery
//! protocol through the shared [`RefreshCoordinator`]: one refresh per episode, the
//! triggering request replayed first, every request that arrived meanwhile replayed in
//! arrival order, and a single session expiry when the refresh fails.

pub mod refresh;

mod auth;
mod common;

pub use auth::*;
pub use refresh::{RefreshCoordinator, RefreshMetrics};

// crates.io
use http::StatusCode;
// self
use crate::{
	_prelude::*,
	api::{ApiRequest, ApiResponse, RequestKind},
	client::common::PreparedRequest,
	error::ConfigError,
	http::{ApiTransport, HttpResponse, TransportFuture},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	service::ServiceDescriptor,
	session::SessionStore,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;

#[cfg(feature = "reqwest")]
/// Client specialized for the crate's default reqwest transport.
pub type ReqwestApiClient = ApiClient<ReqwestTransport>;

/// Authenticated client for one backend service.
///
/// Clients are cheap to clone. Clients of different services that share a session must
/// also share the [`RefreshCoordinator`] (see [`ApiClient::with_coordinator`]) so a 401
/// from any of them joins the same refresh episode.
pub struct ApiClient<T>
where
	T: ?Sized + ApiTransport,
{
	/// Transport used for every outbound call, including refreshes and replays.
	pub transport: Arc<T>,
	/// Service configuration.
	pub descriptor: ServiceDescriptor,
	/// Session context the client reads tokens from and publishes updates to.
	pub session: Arc<dyn SessionStore>,
	/// Refresh flag and pending queue.
	pub coordinator: Arc<RefreshCoordinator>,
}
impl<T> ApiClient<T>
where
	T: ?Sized + ApiTransport,
{
	/// Creates a client over a caller-provided transport with its own coordinator.
	pub fn with_transport(
		descriptor: ServiceDescriptor,
		session: Arc<dyn SessionStore>,
		transport: impl Into<Arc<T>>,
	) -> Self {
		Self {
			transport: transport.into(),
			descriptor,
			session,
			coordinator: Default::default(),
		}
	}

	/// Replaces the coordinator with one shared by other clients of the same session.
	pub fn with_coordinator(mut self, coordinator: Arc<RefreshCoordinator>) -> Self {
		self.coordinator = coordinator;

		self
	}

	/// Sends `request`, recovering from an expired access token when possible.
	///
	/// Returns the response for any 2xx status. Other statuses surface as
	/// [`Error::Api`]; a 401 goes through the refresh protocol first and surfaces as
	/// [`Error::SessionExpired`], [`Error::CredentialsRejected`], or
	/// [`Error::Unauthorized`] depending on the request and the refresh outcome.
	pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
		const KIND: FlowKind = FlowKind::Request;

		let span = FlowSpan::new(KIND, "send", &self.descriptor.id);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.call(request)).await;

		obs::record_result(KIND, &result);

		result
	}

	/// `GET` returning the decoded `data` payload.
	pub async fn get<R>(&self, path: &str) -> Result<R>
	where
		R: DeserializeOwned,
	{
		self.send(ApiRequest::get(path)).await?.data()
	}

	/// `POST` of a JSON body returning the decoded `data` payload.
	pub async fn post<B, R>(&self, path: &str, body: &B) -> Result<R>
	where
		B: ?Sized + Serialize,
		R: DeserializeOwned,
	{
		self.send(ApiRequest::post(path).json(body)?).await?.data()
	}

	/// `PUT` of a JSON body returning the decoded `data` payload.
	pub async fn put<B, R>(&self, path: &str, body: &B) -> Result<R>
	where
		B: ?Sized + Serialize,
		R: DeserializeOwned,
	{
		self.send(ApiRequest::put(path).json(body)?).await?.data()
	}

	/// `PATCH` of a JSON body returning the decoded `data` payload.
	pub async fn patch<B, R>(&self, path: &str, body: &B) -> Result<R>
	where
		B: ?Sized + Serialize,
		R: DeserializeOwned,
	{
		self.send(ApiRequest::patch(path).json(body)?).await?.data()
	}

	/// `DELETE` returning the decoded `data` payload.
	pub async fn delete<R>(&self, path: &str) -> Result<R>
	where
		R: DeserializeOwned,
	{
		self.send(ApiRequest::delete(path)).await?.data()
	}

	/// Prepares, executes, and status-checks `request` without flow instrumentation.
	pub(crate) async fn call(&self, request: ApiRequest) -> Result<ApiResponse> {
		let prepared = PreparedRequest::new(&self.descriptor, request, self.session.as_ref())?;
		let response = ApiResponse::from_http(self.execute(prepared).await?);

		if response.status.is_success() { Ok(response) } else { Err(response.into_error()) }
	}

	/// Dispatches `prepared` and resolves a 401 according to the request's kind.
	pub(crate) async fn execute(&self, prepared: PreparedRequest) -> Result<HttpResponse> {
		let response = self.dispatch(&prepared)?.await?;

		if response.status() != StatusCode::UNAUTHORIZED {
			return Ok(response);
		}

		match prepared.kind {
			RequestKind::Login =>
				Err(Error::CredentialsRejected { message: rejection_message(response) }),
			RequestKind::Refresh | RequestKind::Identity => Err(self.expire_session(format!(
				"{} request was rejected: {}",
				prepared.kind,
				rejection_message(response)
			))),
			RequestKind::Standard if prepared.retried =>
				Err(Error::Unauthorized { message: rejection_message(response) }),
			RequestKind::Standard => {
				let replayed = self.recover(prepared).await?;

				if replayed.status() == StatusCode::UNAUTHORIZED {
					return Err(Error::Unauthorized { message: rejection_message(replayed) });
				}

				Ok(replayed)
			},
		}
	}

	pub(crate) fn dispatch(&self, prepared: &PreparedRequest) -> Result<TransportFuture, ConfigError> {
		Ok(self.transport.execute(prepared.to_http()?))
	}

	/// Clears the session and builds the error returned to the caller.
	pub(crate) fn expire_session(&self, reason: String) -> Error {
		if self.session.expire(&reason) {
			obs::note("session expired", &reason);
		}

		Error::SessionExpired { reason, source: None }
	}
}
#[cfg(feature = "reqwest")]
impl ApiClient<ReqwestTransport> {
	/// Creates a client with its own cookie-aware reqwest transport.
	///
	/// Clients created this way do not share cookies; use [`Storefront`] to wire several
	/// services to one transport.
	///
	/// [`Storefront`]: crate::storefront::Storefront
	pub fn new(
		descriptor: ServiceDescriptor,
		session: Arc<dyn SessionStore>,
	) -> Result<Self, ConfigError> {
		let transport = ReqwestTransport::for_service(&descriptor)?;

		Ok(Self::with_transport(descriptor, session, transport))
	}
}
impl<T> Clone for ApiClient<T>
where
	T: ?Sized + ApiTransport,
{
	fn clone(&self) -> Self {
		Self {
			transport: Arc::clone(&self.transport),
			descriptor: self.descriptor.clone(),
			session: Arc::clone(&self.session),
			coordinator: Arc::clone(&self.coordinator),
		}
	}
}
impl<T> Debug for ApiClient<T>
where
	T: ?Sized + ApiTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ApiClient")
			.field("descriptor", &self.descriptor)
			.field("coordinator", &self.coordinator)
			.finish()
	}
}

fn rejection_message(response: HttpResponse) -> String {
	ApiResponse::from_http(response).error_message()
}
