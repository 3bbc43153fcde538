//! Storefront facade wiring one client per backend service to a shared session.
//!
//! Every client of a [`Storefront`] shares the same transport (and therefore the cookie
//! jar holding the refresh credential), the same [`SessionStore`], and the same
//! [`RefreshCoordinator`], so a 401 from any service joins one refresh episode.

// self
use crate::{
	_prelude::*,
	auth::UserProfile,
	cart::CartService,
	client::{ApiClient, Credentials, RefreshCoordinator},
	error::ConfigError,
	http::ApiTransport,
	service::{AuthRoutes, DEFAULT_CONTENT_TYPE, ServiceDescriptor, ServiceId, join_path},
	session::SessionStore,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;

/// Storefront client configuration, usually loaded from JSON.
///
/// ```json
/// {
///   "userService": "https://users.example.com/api",
///   "catalogService": "https://catalog.example.com/api",
///   "orderService": "https://orders.example.com/api",
///   "reviewService": "https://reviews.example.com/api",
///   "timeoutMs": 10000
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StorefrontConfig {
	/// User service base URL; hosts the auth routes.
	pub user_service: Url,
	/// Catalog service base URL.
	pub catalog_service: Url,
	/// Order service base URL; hosts the cart.
	pub order_service: Url,
	/// Review service base URL.
	pub review_service: Url,
	/// Per-request timeout in milliseconds.
	#[serde(default = "StorefrontConfig::default_timeout_ms")]
	pub timeout_ms: u64,
	/// Content type attached to request bodies.
	#[serde(default = "StorefrontConfig::default_content_type")]
	pub content_type: String,
	/// Accept `http://` URLs (local development).
	#[serde(default)]
	pub allow_insecure_http: bool,
	/// Auth route paths relative to the user service.
	#[serde(default)]
	pub routes: RouteOverrides,
}
impl StorefrontConfig {
	/// Parses a JSON document; errors name the offending field.
	pub fn from_json(document: &str) -> Result<Self, ConfigError> {
		let mut de = serde_json::Deserializer::from_str(document);

		serde_path_to_error::deserialize(&mut de).map_err(|source| ConfigError::Document { source })
	}

	/// Per-request timeout.
	pub fn timeout(&self) -> StdDuration {
		StdDuration::from_millis(self.timeout_ms)
	}

	/// Auth routes on the user service, with overrides applied.
	pub fn auth_routes(&self) -> AuthRoutes {
		let mut routes = AuthRoutes::under(&self.user_service);
		let overrides = &self.routes;

		if let Some(path) = &overrides.login {
			routes.login = join_path(&self.user_service, path);
		}
		if let Some(path) = &overrides.refresh {
			routes.refresh = join_path(&self.user_service, path);
		}
		if let Some(path) = &overrides.logout {
			routes.logout = join_path(&self.user_service, path);
		}
		if let Some(path) = &overrides.identity {
			routes.identity = vec![join_path(&self.user_service, path)];
		}

		routes
	}

	/// Builds the descriptor of one service.
	pub fn descriptor(&self, id: &str, base_url: &Url) -> Result<ServiceDescriptor, ConfigError> {
		let descriptor = ServiceDescriptor::builder(ServiceId::new(id)?)
			.base_url(base_url.clone())
			.timeout(self.timeout())
			.content_type(self.content_type.clone())
			.auth_routes(self.auth_routes())
			.allow_insecure_http(self.allow_insecure_http)
			.build()?;

		Ok(descriptor)
	}

	fn default_timeout_ms() -> u64 {
		10_000
	}

	fn default_content_type() -> String {
		DEFAULT_CONTENT_TYPE.into()
	}
}

/// Optional auth route paths; unset routes use the defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RouteOverrides {
	/// Login route.
	pub login: Option<String>,
	/// Refresh route.
	pub refresh: Option<String>,
	/// Logout route.
	pub logout: Option<String>,
	/// Identity route.
	pub identity: Option<String>,
}

/// Service clients of the bookstore.
pub struct Storefront<T>
where
	T: ?Sized + ApiTransport,
{
	/// User service (auth and profiles).
	pub users: ApiClient<T>,
	/// Catalog service (books).
	pub catalog: ApiClient<T>,
	/// Order service (cart and orders).
	pub orders: ApiClient<T>,
	/// Review service.
	pub reviews: ApiClient<T>,
	cart: CartService<T>,
}
impl<T> Storefront<T>
where
	T: ?Sized + ApiTransport,
{
	/// Wires the four services to `transport` and `session`.
	pub fn with_transport(
		config: &StorefrontConfig,
		transport: impl Into<Arc<T>>,
		session: Arc<dyn SessionStore>,
	) -> Result<Self, ConfigError> {
		let transport = transport.into();
		let coordinator = Arc::new(RefreshCoordinator::new());
		let client = |id: &str, base_url: &Url| -> Result<ApiClient<T>, ConfigError> {
			let descriptor = config.descriptor(id, base_url)?;

			Ok(ApiClient::with_transport(descriptor, session.clone(), transport.clone())
				.with_coordinator(coordinator.clone()))
		};
		let orders = client("orders", &config.order_service)?;

		Ok(Self {
			users: client("users", &config.user_service)?,
			catalog: client("catalog", &config.catalog_service)?,
			reviews: client("reviews", &config.review_service)?,
			cart: CartService::new(orders.clone()),
			orders,
		})
	}

	/// Session shared by every service client.
	pub fn session(&self) -> &Arc<dyn SessionStore> {
		&self.users.session
	}

	/// Refresh coordinator shared by every service client.
	pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
		&self.users.coordinator
	}

	/// Cart backed by the order service; clones share the same local cart.
	pub fn cart(&self) -> CartService<T> {
		self.cart.clone()
	}

	/// Signs in through the user service.
	pub async fn login(&self, credentials: &Credentials) -> Result<Option<UserProfile>> {
		self.users.login(credentials).await
	}

	/// Signs out through the user service.
	pub async fn logout(&self) -> Result<()> {
		self.users.logout().await
	}

	/// Restores a session from the refresh cookie and loads the signed-in user.
	pub async fn restore(&self) -> Result<UserProfile> {
		self.users.refresh_session().await?;
		self.users.me().await
	}
}
#[cfg(feature = "reqwest")]
impl Storefront<ReqwestTransport> {
	/// Builds a storefront over one cookie-aware reqwest transport.
	pub fn new(config: &StorefrontConfig, session: Arc<dyn SessionStore>) -> Result<Self, ConfigError> {
		let transport = ReqwestTransport::with_timeout(config.timeout())?;

		Self::with_transport(config, transport, session)
	}
}
impl<T> Debug for Storefront<T>
where
	T: ?Sized + ApiTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Storefront")
			.field("users", &self.users.descriptor.base_url)
			.field("catalog", &self.catalog.descriptor.base_url)
			.field("orders", &self.orders.descriptor.base_url)
			.field("reviews", &self.reviews.descriptor.base_url)
			.field("coordinator", self.coordinator())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::service::ServiceDescriptorError;

	const CONFIG: &str = r#"{
		"userService": "https://users.example.com/api",
		"catalogService": "https://catalog.example.com/api",
		"orderService": "https://orders.example.com/api",
		"reviewService": "https://reviews.example.com/api",
		"timeoutMs": 2500,
		"routes": { "refresh": "/auth/refresh" }
	}"#;

	#[test]
	fn config_applies_defaults_and_overrides() {
		let config = StorefrontConfig::from_json(CONFIG).expect("Config should parse.");

		assert_eq!(config.timeout(), StdDuration::from_millis(2_500));
		assert_eq!(config.content_type, "application/json");

		let orders = config
			.descriptor("orders", &config.order_service)
			.expect("Order descriptor should build.");

		assert_eq!(orders.auth.login.as_str(), "https://users.example.com/api/auth/login");
		assert_eq!(orders.auth.refresh.as_str(), "https://users.example.com/api/auth/refresh");
		assert_eq!(orders.resolve("/cart").as_str(), "https://orders.example.com/api/cart");
	}

	#[test]
	fn config_errors_name_the_field() {
		let err = StorefrontConfig::from_json(r#"{"userService":"not a url"}"#)
			.expect_err("Invalid URL should fail.");

		match err {
			ConfigError::Document { source } => assert_eq!(source.path().to_string(), "userService"),
			other => panic!("Unexpected error: {other:?}."),
		}
	}

	#[test]
	fn insecure_urls_need_opt_in() {
		let document = CONFIG.replace("https://catalog", "http://catalog");
		let config = StorefrontConfig::from_json(&document).expect("Config should parse.");

		assert!(matches!(
			config.descriptor("catalog", &config.catalog_service),
			Err(ConfigError::Descriptor(ServiceDescriptorError::InsecureEndpoint { .. }))
		));
	}
}
