//! Shared fixtures: a scripted in-process transport that decides every response when the
//! request is dispatched and can hold selected responses back until a test releases them.

#![allow(dead_code)]

// std
use std::{
	collections::{HashMap, HashSet, VecDeque},
	sync::Arc,
};
// crates.io
use http::{StatusCode, header::AUTHORIZATION};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::Semaphore;
// self
use storefront_client::{
	client::ApiClient,
	error::TransportError,
	http::{ApiTransport, HttpRequest, HttpResponse, TransportFuture},
	service::{ServiceDescriptor, ServiceId},
	session::{MemorySession, Session, SessionEvent, SessionStore},
	url::Url,
};

pub const REFRESH: &str = "/auth/refresh-token";
pub const LOGIN: &str = "/auth/login";
pub const IDENTITY: &str = "/auth/me";

/// Outcome of the next refresh call.
#[derive(Clone, Debug)]
pub enum RefreshOutcome {
	Issue(&'static str),
	Fail(u16),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Call {
	pub method: String,
	pub path: String,
	pub bearer: Option<String>,
}

#[derive(Default)]
struct Script {
	valid: HashSet<String>,
	refresh: VecDeque<RefreshOutcome>,
	always_unauthorized: HashSet<String>,
	failures: HashMap<String, u16>,
	responses: HashMap<String, Value>,
	calls: Vec<Call>,
}
impl Script {
	fn respond(&mut self, request: &HttpRequest, path: &str, bearer: Option<&str>) -> (u16, Value) {
		self.calls.push(Call {
			method: request.method().to_string(),
			path: path.into(),
			bearer: bearer.map(str::to_owned),
		});

		match path {
			REFRESH => match self.refresh.pop_front() {
				Some(RefreshOutcome::Issue(token)) => {
					self.valid.insert(token.into());

					(200, json!({ "success": true, "message": "Token refreshed", "data": { "accessToken": token } }))
				},
				Some(RefreshOutcome::Fail(status)) =>
					(status, json!({ "success": false, "message": "Refresh token expired" })),
				None => (401, json!({ "success": false, "message": "No refresh cookie" })),
			},
			LOGIN => {
				let credentials: Value = serde_json::from_slice(request.body()).unwrap_or_default();

				if credentials["password"] == "secret" {
					self.valid.insert("t1".into());

					(200, json!({
						"success": true,
						"data": {
							"accessToken": "t1",
							"user": { "_id": "u1", "email": credentials["email"], "role": "customer" }
						}
					}))
				} else {
					(401, json!({ "success": false, "message": "Invalid email or password" }))
				}
			},
			_ if self.always_unauthorized.contains(path)
				|| !bearer.is_some_and(|token| self.valid.contains(token)) =>
				(401, json!({ "success": false, "message": "jwt expired" })),
			_ if self.failures.contains_key(path) =>
				(self.failures[path], json!({ "success": false, "message": "Service failure" })),
			_ => {
				let data = self
					.responses
					.get(path)
					.cloned()
					.unwrap_or_else(|| json!({ "path": path, "token": bearer }));

				(200, json!({ "success": true, "message": "ok", "data": data }))
			},
		}
	}
}

/// Backend double: bearer tokens in the valid set pass, every other request gets 401.
///
/// By default a response is decided and recorded when `execute` is called. With
/// [`ScriptedTransport::lazy`] that happens on the first poll of the returned future,
/// like a transport that only sends once polled.
pub struct ScriptedTransport {
	script: Arc<Mutex<Script>>,
	refresh_gate: Arc<Semaphore>,
	holds: Mutex<HashMap<String, Arc<Semaphore>>>,
	lazy: bool,
}
impl ScriptedTransport {
	pub fn new() -> Self {
		Self {
			script: Default::default(),
			refresh_gate: Arc::new(Semaphore::new(1)),
			holds: Default::default(),
			lazy: false,
		}
	}

	/// Refresh responses are held until [`ScriptedTransport::release_refresh`].
	pub fn with_gated_refresh() -> Self {
		Self { refresh_gate: Arc::new(Semaphore::new(0)), ..Self::new() }
	}

	/// Records and answers requests on first poll instead of on dispatch.
	pub fn lazy(self) -> Self {
		Self { lazy: true, ..self }
	}

	pub fn accept(&self, token: &str) {
		self.script.lock().valid.insert(token.into());
	}

	pub fn revoke(&self, token: &str) {
		self.script.lock().valid.remove(token);
	}

	pub fn script_refresh(&self, outcome: RefreshOutcome) {
		self.script.lock().refresh.push_back(outcome);
	}

	pub fn always_reject(&self, path: &str) {
		self.script.lock().always_unauthorized.insert(path.into());
	}

	/// Authorized requests to `path` fail with `status`.
	pub fn fail(&self, path: &str, status: u16) {
		self.script.lock().failures.insert(path.into(), status);
	}

	pub fn respond(&self, path: &str, data: Value) {
		self.script.lock().responses.insert(path.into(), data);
	}

	/// Holds responses to `path` until the returned gate gets a permit.
	pub fn hold(&self, path: &str) -> Arc<Semaphore> {
		self.holds.lock().entry(path.into()).or_insert_with(|| Arc::new(Semaphore::new(0))).clone()
	}

	pub fn release_refresh(&self) {
		self.refresh_gate.add_permits(1);
	}

	pub fn calls(&self) -> Vec<Call> {
		self.script.lock().calls.clone()
	}

	pub fn paths(&self) -> Vec<String> {
		self.calls().into_iter().map(|call| call.path).collect()
	}

	pub fn called(&self, path: &str) -> bool {
		self.calls().iter().any(|call| call.path == path)
	}

	pub fn refresh_calls(&self) -> usize {
		self.calls().iter().filter(|call| call.path == REFRESH).count()
	}

	fn gate(&self, path: &str) -> Option<Arc<Semaphore>> {
		self.holds.lock().get(path).cloned()
	}
}
impl ApiTransport for ScriptedTransport {
	fn execute(&self, request: HttpRequest) -> TransportFuture {
		let path = request.uri().path().trim_start_matches("/api").to_owned();
		let bearer = request
			.headers()
			.get(AUTHORIZATION)
			.and_then(|value| value.to_str().ok())
			.and_then(|value| value.strip_prefix("Bearer "))
			.map(str::to_owned);
		let gate = if path == REFRESH { Some(self.refresh_gate.clone()) } else { self.gate(&path) };
		let script = self.script.clone();
		let decided =
			(!self.lazy).then(|| script.lock().respond(&request, &path, bearer.as_deref()));

		Box::pin(async move {
			let (status, body) = match decided {
				Some(decided) => decided,
				None => {
					let mut script = script.lock();

					script.respond(&request, &path, bearer.as_deref())
				},
			};

			if let Some(gate) = gate {
				let _permit = gate.acquire().await.map_err(TransportError::network)?;
			}

			let mut response = HttpResponse::new(
				serde_json::to_vec(&body).map_err(|err| TransportError::Io(err.into()))?,
			);

			*response.status_mut() =
				StatusCode::from_u16(status).expect("Scripted status should be valid.");

			Ok(response)
		})
	}
}

/// Authenticated client for a fictional `orders` service plus the handles tests inspect.
pub struct Fixture {
	pub transport: Arc<ScriptedTransport>,
	pub session: Arc<MemorySession>,
	pub client: ApiClient<ScriptedTransport>,
	pub events: Arc<Mutex<Vec<SessionEvent>>>,
}
impl Fixture {
	pub fn new(transport: ScriptedTransport, token: Option<&str>) -> Self {
		let transport = Arc::new(transport);
		let session = Arc::new(match token {
			Some(token) => MemorySession::with_token(token),
			None => MemorySession::default(),
		});
		let events = Arc::new(Mutex::new(Vec::new()));
		let sink = events.clone();

		session.subscribe(Arc::new(move |event: &SessionEvent, _: &Session| {
			sink.lock().push(event.clone());
		}));

		let client = ApiClient::with_transport(descriptor("orders"), session.clone(), transport.clone());

		Self { transport, session, client, events }
	}

	pub fn expired_events(&self) -> usize {
		self.events.lock().iter().filter(|event| matches!(event, SessionEvent::Expired { .. })).count()
	}

	pub fn token(&self) -> Option<String> {
		self.session.access_token().map(|token| token.expose().to_owned())
	}
}

pub fn descriptor(id: &str) -> ServiceDescriptor {
	ServiceDescriptor::builder(ServiceId::new(id).expect("Service id should be valid."))
		.base_url(Url::parse("https://shop.test/api").expect("Base URL should parse."))
		.build()
		.expect("Descriptor should build.")
}

/// Yields until `condition` holds.
pub async fn until(condition: impl Fn() -> bool) {
	while !condition() {
		tokio::task::yield_now().await;
	}
}
