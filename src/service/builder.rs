// self
use crate::{
	_prelude::*,
	service::{AuthRoutes, DEFAULT_CONTENT_TYPE, ServiceDescriptor, ServiceId},
};

/// Errors raised while constructing or validating descriptors.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ServiceDescriptorError {
	/// Base URL is mandatory.
	#[error("Missing base URL.")]
	MissingBaseUrl,
	/// Endpoints must use HTTPS unless insecure HTTP was explicitly allowed.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// Endpoints must be plain HTTP(S) URLs without fragments.
	#[error("The {endpoint} endpoint is not a usable HTTP URL: {url}.")]
	InvalidEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// The base URL must not carry a query string.
	#[error("The base URL must not carry a query string: {url}.")]
	BaseUrlWithQuery {
		/// Offending base URL.
		url: String,
	},
	/// At least one identity route is required.
	#[error("At least one identity route must be configured.")]
	MissingIdentityRoute,
	/// Requests need a non-zero timeout.
	#[error("Request timeout must be greater than zero.")]
	ZeroTimeout,
	/// The default content type is not a valid header value.
	#[error("Content type `{value}` is not a valid header value.")]
	InvalidContentType {
		/// Rejected value.
		value: String,
	},
}

/// Builder for [`ServiceDescriptor`] values.
#[derive(Debug)]
pub struct ServiceDescriptorBuilder {
	/// Identifier for the descriptor being constructed.
	pub id: ServiceId,
	/// Base URL of the service.
	pub base_url: Option<Url>,
	/// Per-request timeout.
	pub timeout: StdDuration,
	/// Default request content type.
	pub content_type: String,
	/// Session protocol routes; defaults to [`AuthRoutes::under`] the base URL.
	pub auth: Option<AuthRoutes>,
	/// Accept `http://` endpoints (local development and tests).
	pub allow_insecure_http: bool,
}
impl ServiceDescriptorBuilder {
	/// Creates a new builder seeded with the provided identifier.
	pub fn new(id: ServiceId) -> Self {
		Self {
			id,
			base_url: None,
			timeout: ServiceDescriptor::DEFAULT_TIMEOUT,
			content_type: DEFAULT_CONTENT_TYPE.into(),
			auth: None,
			allow_insecure_http: false,
		}
	}

	/// Sets the base URL.
	pub fn base_url(mut self, url: Url) -> Self {
		self.base_url = Some(url);

		self
	}

	/// Overrides the request timeout.
	pub fn timeout(mut self, timeout: StdDuration) -> Self {
		self.timeout = timeout;

		self
	}

	/// Overrides the default content type.
	pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
		self.content_type = content_type.into();

		self
	}

	/// Points the session protocol at explicit routes (for example on another service).
	pub fn auth_routes(mut self, routes: AuthRoutes) -> Self {
		self.auth = Some(routes);

		self
	}

	/// Allows `http://` endpoints.
	pub fn allow_insecure_http(mut self, allow: bool) -> Self {
		self.allow_insecure_http = allow;

		self
	}

	/// Consumes the builder and validates the resulting descriptor.
	pub fn build(self) -> Result<ServiceDescriptor, ServiceDescriptorError> {
		let base_url = self.base_url.ok_or(ServiceDescriptorError::MissingBaseUrl)?;
		let auth = self.auth.unwrap_or_else(|| AuthRoutes::under(&base_url));
		let descriptor = ServiceDescriptor {
			id: self.id,
			base_url,
			timeout: self.timeout,
			content_type: self.content_type,
			auth,
		};

		descriptor.validate(self.allow_insecure_http)?;

		Ok(descriptor)
	}
}

impl ServiceDescriptor {
	/// Validates invariants for the descriptor.
	fn validate(&self, allow_insecure_http: bool) -> Result<(), ServiceDescriptorError> {
		if self.timeout.is_zero() {
			return Err(ServiceDescriptorError::ZeroTimeout);
		}
		if http::HeaderValue::from_str(&self.content_type).is_err() {
			return Err(ServiceDescriptorError::InvalidContentType {
				value: self.content_type.clone(),
			});
		}
		if self.base_url.query().is_some() {
			return Err(ServiceDescriptorError::BaseUrlWithQuery {
				url: self.base_url.to_string(),
			});
		}

		if self.auth.identity.is_empty() {
			return Err(ServiceDescriptorError::MissingIdentityRoute);
		}

		validate_endpoint("base", &self.base_url, allow_insecure_http)?;

		for (name, url) in self.auth.iter() {
			validate_endpoint(name, url, allow_insecure_http)?;
		}

		Ok(())
	}
}

fn validate_endpoint(
	name: &'static str,
	url: &Url,
	allow_insecure_http: bool,
) -> Result<(), ServiceDescriptorError> {
	match url.scheme() {
		_ if url.cannot_be_a_base() || url.fragment().is_some() || url.host().is_none() =>
			Err(ServiceDescriptorError::InvalidEndpoint { endpoint: name, url: url.to_string() }),
		"https" => Ok(()),
		"http" if allow_insecure_http => Ok(()),
		"http" =>
			Err(ServiceDescriptorError::InsecureEndpoint { endpoint: name, url: url.to_string() }),
		_ => Err(ServiceDescriptorError::InvalidEndpoint { endpoint: name, url: url.to_string() }),
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn builder() -> ServiceDescriptorBuilder {
		ServiceDescriptor::builder(ServiceId::new("catalog").expect("Service id should be valid."))
	}

	fn url(value: &str) -> Url {
		Url::parse(value).expect("Fixture URL should parse.")
	}

	#[test]
	fn defaults_are_applied() {
		let descriptor = builder()
			.base_url(url("https://catalog.example.com/api"))
			.build()
			.expect("Descriptor should build with defaults.");

		assert_eq!(descriptor.timeout, ServiceDescriptor::DEFAULT_TIMEOUT);
		assert_eq!(descriptor.content_type, "application/json");
		assert_eq!(
			descriptor.auth.refresh.as_str(),
			"https://catalog.example.com/api/auth/refresh-token"
		);
	}

	#[test]
	fn rejects_insecure_and_malformed_endpoints() {
		let err = builder()
			.base_url(url("http://catalog.example.com"))
			.build()
			.expect_err("Plain HTTP must be rejected by default.");

		assert!(matches!(err, ServiceDescriptorError::InsecureEndpoint { endpoint: "base", .. }));

		builder()
			.base_url(url("http://127.0.0.1:8080"))
			.allow_insecure_http(true)
			.build()
			.expect("Plain HTTP should be accepted when explicitly allowed.");

		let err = builder()
			.base_url(url("https://catalog.example.com/?v=1"))
			.build()
			.expect_err("Base URLs with queries must be rejected.");

		assert!(matches!(err, ServiceDescriptorError::BaseUrlWithQuery { .. }));

		let err = builder()
			.base_url(url("ftp://catalog.example.com"))
			.build()
			.expect_err("Non-HTTP schemes must be rejected.");

		assert!(matches!(err, ServiceDescriptorError::InvalidEndpoint { .. }));
	}

	#[test]
	fn rejects_zero_timeout_and_bad_content_type() {
		let base = url("https://catalog.example.com");

		assert_eq!(
			builder().base_url(base.clone()).timeout(StdDuration::ZERO).build(),
			Err(ServiceDescriptorError::ZeroTimeout)
		);
		assert!(matches!(
			builder().base_url(base).content_type("application/json\n").build(),
			Err(ServiceDescriptorError::InvalidContentType { .. })
		));
		assert_eq!(builder().build(), Err(ServiceDescriptorError::MissingBaseUrl));
	}

	#[test]
	fn auth_routes_are_validated() {
		let base = url("https://catalog.example.com");
		let mut routes = AuthRoutes::under(&url("https://users.example.com"));

		routes.identity.clear();

		assert_eq!(
			builder().base_url(base.clone()).auth_routes(routes.clone()).build(),
			Err(ServiceDescriptorError::MissingIdentityRoute)
		);

		routes.identity.push(url("https://users.example.com/auth/me"));
		routes.refresh = url("http://users.example.com/auth/refresh-token");

		assert!(matches!(
			builder().base_url(base).auth_routes(routes).build(),
			Err(ServiceDescriptorError::InsecureEndpoint { endpoint: "refresh", .. })
		));
	}
}
