mod common;

// crates.io
use serde_json::{Value, json};
// self
use common::{Fixture, ScriptedTransport, until};
use storefront_client::{
	cart::{Cart, CartChange, CartItem, CartService},
	service::BookId,
};

fn book(id: &str) -> BookId {
	BookId::new(id).expect("Book id should be valid.")
}

fn line(id: &str, quantity: u32) -> Value {
	json!({ "bookId": id, "title": format!("Book {id}"), "unitPrice": 1000, "quantity": quantity })
}

fn quantities(cart: &Cart) -> Vec<(String, u32)> {
	cart.items.iter().map(|item| (item.book_id.to_string(), item.quantity)).collect()
}

#[tokio::test]
async fn failed_change_keeps_a_change_confirmed_meanwhile() {
	let fixture = Fixture::new(ScriptedTransport::new(), Some("t1"));
	let cart = CartService::new(fixture.client.clone());

	fixture.transport.accept("t1");
	fixture.transport.respond("/cart", json!({ "items": [line("b1", 1)] }));
	fixture.transport.respond("/cart/items/b1", json!({ "items": [line("b1", 5)] }));
	fixture.transport.fail("/cart/items", 500);

	let held = fixture.transport.hold("/cart/items");

	cart.load().await.expect("Cart should load.");

	let (added, updated) = tokio::join!(
		cart.apply(CartChange::Add(CartItem {
			book_id: book("b2"),
			title: "Book b2".into(),
			unit_price: 1_000,
			quantity: 1,
		})),
		async {
			until(|| fixture.transport.called("/cart/items")).await;

			let updated = cart.apply(CartChange::SetQuantity { book_id: book("b1"), quantity: 5 }).await;

			assert_eq!(quantities(&cart.snapshot()), [("b1".to_owned(), 5), ("b2".to_owned(), 1)]);

			held.add_permits(1);

			updated
		},
	);

	assert_eq!(added.expect_err("Held add should fail.").status(), Some(500));
	assert_eq!(quantities(&updated.expect("Update should be confirmed.")), [
		("b1".to_owned(), 5),
		("b2".to_owned(), 1)
	]);
	assert_eq!(quantities(&cart.snapshot()), [("b1".to_owned(), 5)]);
	assert_eq!(cart.totals().subtotal, 5_000);
}

#[tokio::test]
async fn rejected_change_is_withdrawn() {
	let fixture = Fixture::new(ScriptedTransport::new(), Some("t1"));
	let cart = CartService::new(fixture.client.clone());

	fixture.transport.accept("t1");
	fixture.transport.respond("/cart", json!({ "items": [line("b1", 2)], "shippingFee": 300 }));
	fixture.transport.fail("/cart/items/b1", 422);

	cart.load().await.expect("Cart should load.");

	let err = cart
		.apply(CartChange::Remove { book_id: book("b1") })
		.await
		.expect_err("Rejected removal should fail.");

	assert_eq!(err.status(), Some(422));
	assert_eq!(quantities(&cart.snapshot()), [("b1".to_owned(), 2)]);
	assert_eq!(cart.totals().total, 2_300);
}
