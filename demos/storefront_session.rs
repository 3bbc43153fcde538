//! Demonstrates a storefront session against a mock backend: login, an expired access token
//! recovered through the refresh cookie, and the session events a UI would observe.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use serde_json::{Value, json};
// self
use storefront_client::{
	client::Credentials,
	session::{MemorySession, Session, SessionEvent, SessionStore},
	storefront::{Storefront, StorefrontConfig},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let config = StorefrontConfig::from_json(
		&json!({
			"userService": server.url("/users"),
			"catalogService": server.url("/catalog"),
			"orderService": server.url("/orders"),
			"reviewService": server.url("/reviews"),
			"allowInsecureHttp": true
		})
		.to_string(),
	)?;
	let session = Arc::new(MemorySession::default());

	session.subscribe(Arc::new(|event: &SessionEvent, session: &Session| {
		println!("session event: {event:?} (authenticated: {})", session.is_authenticated);
	}));

	server
		.mock_async(|when, then| {
			when.method(POST).path("/users/auth/login");
			then.status(200).header("set-cookie", "refreshToken=demo; Path=/; HttpOnly").json_body(
				json!({
					"success": true,
					"data": {
						"accessToken": "access-1",
						"user": { "_id": "u1", "email": "reader@example.com", "fullName": "Ada" }
					}
				}),
			);
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(GET).path("/catalog/books").header("authorization", "Bearer access-1");
			then.status(401).json_body(json!({ "success": false, "message": "jwt expired" }));
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(POST).path("/users/auth/refresh-token").header("cookie", "refreshToken=demo");
			then.status(200).json_body(json!({ "success": true, "data": { "accessToken": "access-2" } }));
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(GET).path("/catalog/books").header("authorization", "Bearer access-2");
			then.status(200).json_body(json!({
				"success": true,
				"data": [{ "id": "b1", "title": "Dune" }, { "id": "b2", "title": "Emma" }]
			}));
		})
		.await;

	let shop = Storefront::new(&config, session.clone())?;
	let user = shop.login(&Credentials::new("reader@example.com", "hunter2")).await?;

	println!("signed in as {:?}", user.map(|user| user.email));

	let books: Vec<Value> = shop.catalog.get("/books").await?;

	println!("catalog: {books:?}");
	println!(
		"token fingerprint: {:?}",
		session.access_token().map(|token| token.fingerprint())
	);
	println!("refresh metrics: {:?}", shop.coordinator().metrics());

	Ok(())
}
