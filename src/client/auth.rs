//! Session operations: login, logout, identity checks, and the refresh call itself.

// crates.io
use http::Method;
// self
use crate::{
	_prelude::*,
	api::{ApiRequest, ApiResponse},
	auth::{TokenSecret, UserProfile},
	client::{ApiClient, common::PreparedRequest},
	error::ConfigError,
	http::ApiTransport,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	service::ServiceDescriptorError,
};

/// Login credentials posted to the login route.
#[derive(Clone, Serialize)]
pub struct Credentials {
	/// Account email.
	pub email: String,
	/// Account password.
	pub password: String,
}
impl Credentials {
	/// Creates a credential pair.
	pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
		Self { email: email.into(), password: password.into() }
	}
}
impl Debug for Credentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credentials").field("email", &self.email).field("password", &"***").finish()
	}
}

impl<T> ApiClient<T>
where
	T: ?Sized + ApiTransport,
{
	/// Exchanges `credentials` for a session.
	///
	/// The issued token and user are stored in the session. A 401 surfaces as
	/// [`Error::CredentialsRejected`] and never triggers a refresh.
	pub async fn login(&self, credentials: &Credentials) -> Result<Option<UserProfile>> {
		const KIND: FlowKind = FlowKind::Login;

		let span = FlowSpan::new(KIND, "login", &self.descriptor.id);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let request = ApiRequest::new(Method::POST, self.descriptor.auth.login.as_str())
					.json(credentials)?;
				let response = self.call(request).await?;
				let status = response.status.as_u16();
				let envelope = response.successful_envelope()?;
				let token = envelope.access_token(status)?;
				let user: Option<UserProfile> = envelope.data_field("user", status)?;

				obs::note("session established", &token.fingerprint());
				self.session.establish(token, user.clone());

				Ok(user)
			})
			.await;

		obs::record_result(KIND, &result);

		result
	}

	/// Signs out.
	///
	/// The logout call is best effort: the session is cleared whatever its outcome, and
	/// the call's error (if any) is returned afterwards.
	pub async fn logout(&self) -> Result<()> {
		const KIND: FlowKind = FlowKind::Logout;

		let span = FlowSpan::new(KIND, "logout", &self.descriptor.id);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let request = ApiRequest::new(Method::POST, self.descriptor.auth.logout.as_str());
				let outcome = self.call(request).await.map(drop);

				self.session.end();

				outcome
			})
			.await;

		obs::record_result(KIND, &result);

		result
	}

	/// Fetches the signed-in user and stores it in the session.
	///
	/// A 401 here means the session cannot be recovered: it expires immediately without a
	/// refresh attempt.
	pub async fn me(&self) -> Result<UserProfile> {
		let span = FlowSpan::new(FlowKind::Request, "me", &self.descriptor.id);

		span.instrument(async move {
			let route = self
				.descriptor
				.auth
				.identity
				.first()
				.ok_or(ConfigError::Descriptor(ServiceDescriptorError::MissingIdentityRoute))?;
			let user: UserProfile =
				self.call(ApiRequest::get(route.as_str())).await?.data()?;

			self.session.update_user(user.clone());

			Ok(user)
		})
		.await
	}

	/// Calls the refresh route; the transport's cookie carries the credential.
	///
	/// Any non-2xx status (401 included) is returned as an error for the coordinator to
	/// settle the episode with.
	pub(crate) async fn request_refresh(&self) -> Result<TokenSecret> {
		let request = ApiRequest::new(Method::POST, self.descriptor.auth.refresh.as_str());
		let prepared = PreparedRequest::new(&self.descriptor, request, self.session.as_ref())?;
		let response = ApiResponse::from_http(self.dispatch(&prepared)?.await?);

		if !response.status.is_success() {
			return Err(response.into_error());
		}

		response.access_token()
	}
}
