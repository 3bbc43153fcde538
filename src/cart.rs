//! Shopping cart with optimistic updates.
//!
//! [`CartService`] applies a [`CartChange`] to its local [`Cart`] before the order service
//! answers, so totals can be shown immediately. The server's cart replaces the local one
//! when the call succeeds; the previous snapshot is restored when it fails.

// self
use crate::{
	_prelude::*,
	client::ApiClient,
	http::ApiTransport,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	service::BookId,
};

const CART_PATH: &str = "/cart";
const CART_ITEMS_PATH: &str = "/cart/items";
const ORDERS_PATH: &str = "/orders";

/// Local cart validation failures.
#[derive(Debug, PartialEq, Eq, ThisError)]
pub enum CartError {
	/// The change refers to a book that is not in the cart.
	#[error("Book {book_id} is not in the cart.")]
	UnknownBook {
		/// Book referenced by the change.
		book_id: BookId,
	},
	/// Books are added with at least one copy.
	#[error("Book {book_id} cannot be added with a quantity of zero.")]
	ZeroQuantity {
		/// Book referenced by the change.
		book_id: BookId,
	},
}

/// Cart line. Prices are in minor currency units.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
	/// Catalog identifier of the book.
	pub book_id: BookId,
	/// Display title.
	#[serde(default)]
	pub title: String,
	/// Price of one copy.
	pub unit_price: u64,
	/// Number of copies.
	pub quantity: u32,
}
impl CartItem {
	/// Price of the whole line.
	pub fn line_total(&self) -> u64 {
		self.unit_price.saturating_mul(u64::from(self.quantity))
	}
}

/// Cart as returned by the order service.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
	/// Lines in insertion order.
	#[serde(default)]
	pub items: Vec<CartItem>,
	/// Flat shipping fee.
	#[serde(default)]
	pub shipping_fee: u64,
	/// Discount granted on the subtotal.
	#[serde(default)]
	pub discount: u64,
}
impl Cart {
	/// Computes the displayed totals.
	///
	/// The discount never exceeds the subtotal, and an empty cart ships for free.
	pub fn totals(&self) -> CartTotals {
		let item_count = self.items.iter().fold(0_u32, |acc, item| acc.saturating_add(item.quantity));
		let subtotal = self.items.iter().fold(0_u64, |acc, item| acc.saturating_add(item.line_total()));
		let discount = self.discount.min(subtotal);
		let shipping = if self.items.is_empty() { 0 } else { self.shipping_fee };

		CartTotals {
			item_count,
			subtotal,
			discount,
			shipping,
			total: (subtotal - discount).saturating_add(shipping),
		}
	}

	/// Applies `change` locally.
	pub fn apply(&mut self, change: &CartChange) -> Result<(), CartError> {
		match change {
			CartChange::Add(item) => {
				if item.quantity == 0 {
					return Err(CartError::ZeroQuantity { book_id: item.book_id.clone() });
				}

				match self.items.iter_mut().find(|line| line.book_id == item.book_id) {
					Some(line) => line.quantity = line.quantity.saturating_add(item.quantity),
					None => self.items.push(item.clone()),
				}
			},
			CartChange::SetQuantity { book_id, quantity: 0 } | CartChange::Remove { book_id } => {
				let position = self.position(book_id)?;

				self.items.remove(position);
			},
			CartChange::SetQuantity { book_id, quantity } => {
				let position = self.position(book_id)?;

				self.items[position].quantity = *quantity;
			},
			CartChange::Clear => self.items.clear(),
		}

		Ok(())
	}

	fn position(&self, book_id: &BookId) -> Result<usize, CartError> {
		self.items
			.iter()
			.position(|line| &line.book_id == book_id)
			.ok_or_else(|| CartError::UnknownBook { book_id: book_id.clone() })
	}
}

/// Totals shown next to the cart.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartTotals {
	/// Number of copies across all lines.
	pub item_count: u32,
	/// Sum of the line totals.
	pub subtotal: u64,
	/// Applied discount.
	pub discount: u64,
	/// Applied shipping fee.
	pub shipping: u64,
	/// Amount due.
	pub total: u64,
}

/// Cart mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CartChange {
	/// Adds a line, or more copies of a book already in the cart.
	Add(CartItem),
	/// Sets the number of copies; zero removes the line.
	SetQuantity {
		/// Book to update.
		book_id: BookId,
		/// New number of copies.
		quantity: u32,
	},
	/// Removes a line.
	Remove {
		/// Book to remove.
		book_id: BookId,
	},
	/// Empties the cart.
	Clear,
}

/// Checkout payload posted to the order service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
	/// Delivery address.
	pub shipping_address: String,
	/// Payment method identifier understood by the order service.
	pub payment_method: String,
	/// Optional note for the order.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub note: Option<String>,
}

/// Order created by a checkout.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
	/// Order identifier.
	#[serde(alias = "_id")]
	pub id: String,
	/// Order status reported by the service.
	#[serde(default)]
	pub status: Option<String>,
	/// Amount charged, in minor currency units.
	#[serde(default)]
	pub total: Option<u64>,
	/// Remaining fields.
	#[serde(flatten)]
	pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AddItemBody<'a> {
	book_id: &'a BookId,
	quantity: u32,
}

#[derive(Serialize)]
struct QuantityBody {
	quantity: u32,
}

/// Last cart confirmed by the order service plus the changes still awaiting an answer.
///
/// The displayed cart is the confirmed one with the pending changes replayed on top, so a
/// failed change only drops itself and never undoes a change confirmed in the meantime.
#[derive(Debug, Default)]
struct CartState {
	confirmed: Cart,
	pending: Vec<(u64, CartChange)>,
	next_change: u64,
}
impl CartState {
	fn view(&self) -> Cart {
		let mut cart = self.confirmed.clone();

		for (_, change) in &self.pending {
			// Skipped until its own call settles when the confirmed cart no longer accepts it.
			let _ = cart.apply(change);
		}

		cart
	}

	fn begin(&mut self, change: &CartChange) -> Result<u64, CartError> {
		self.view().apply(change)?;

		let id = self.next_change;

		self.next_change += 1;
		self.pending.push((id, change.clone()));

		Ok(id)
	}

	fn settle(&mut self, id: u64) {
		self.pending.retain(|(pending, _)| *pending != id);
	}
}

/// Cart bound to the order service client.
pub struct CartService<T>
where
	T: ?Sized + ApiTransport,
{
	client: ApiClient<T>,
	state: Arc<RwLock<CartState>>,
}
impl<T> CartService<T>
where
	T: ?Sized + ApiTransport,
{
	/// Creates an empty cart over `client`.
	pub fn new(client: ApiClient<T>) -> Self {
		Self { client, state: Default::default() }
	}

	/// Copy of the local cart, pending changes included.
	pub fn snapshot(&self) -> Cart {
		self.state.read().view()
	}

	/// Totals of the local cart.
	pub fn totals(&self) -> CartTotals {
		self.snapshot().totals()
	}

	/// Replaces the confirmed cart with the server's.
	pub async fn load(&self) -> Result<Cart> {
		let cart: Cart = self.client.get(CART_PATH).await?;
		let mut state = self.state.write();

		state.confirmed = cart;

		Ok(state.view())
	}

	/// Applies `change` optimistically and confirms it with the order service.
	///
	/// Returns the cart after the change. On failure only this change is withdrawn; changes
	/// confirmed while it was in flight are kept.
	pub async fn apply(&self, change: CartChange) -> Result<Cart> {
		const KIND: FlowKind = FlowKind::Cart;

		let span = FlowSpan::new(KIND, "apply", &self.client.descriptor.id);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let id = self.state.write().begin(&change)?;

				match self.confirm(&change).await {
					Ok(confirmed) => {
						let mut state = self.state.write();

						state.settle(id);

						match confirmed {
							Some(cart) => state.confirmed = cart,
							None => {
								let _ = state.confirmed.apply(&change);
							},
						}

						Ok(state.view())
					},
					Err(err) => {
						obs::note("cart change rolled back", &err);
						self.state.write().settle(id);

						Err(err)
					},
				}
			})
			.await;

		obs::record_result(KIND, &result);

		result
	}

	/// Places an order for the server-side cart and empties the local one.
	pub async fn checkout(&self, request: &CheckoutRequest) -> Result<OrderSummary> {
		const KIND: FlowKind = FlowKind::Cart;

		let span = FlowSpan::new(KIND, "checkout", &self.client.descriptor.id);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let order: OrderSummary = self.client.post(ORDERS_PATH, request).await?;

				self.state.write().confirmed.items.clear();

				Ok(order)
			})
			.await;

		obs::record_result(KIND, &result);

		result
	}

	async fn confirm(&self, change: &CartChange) -> Result<Option<Cart>> {
		match change {
			CartChange::Add(item) =>
				self.client
					.post(CART_ITEMS_PATH, &AddItemBody {
						book_id: &item.book_id,
						quantity: item.quantity,
					})
					.await,
			CartChange::SetQuantity { book_id, quantity } =>
				self.client
					.patch(&item_path(book_id), &QuantityBody { quantity: *quantity })
					.await,
			CartChange::Remove { book_id } => self.client.delete(&item_path(book_id)).await,
			CartChange::Clear => self.client.delete(CART_PATH).await,
		}
	}
}
impl<T> Clone for CartService<T>
where
	T: ?Sized + ApiTransport,
{
	fn clone(&self) -> Self {
		Self { client: self.client.clone(), state: Arc::clone(&self.state) }
	}
}
impl<T> Debug for CartService<T>
where
	T: ?Sized + ApiTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let state = self.state.read();

		f.debug_struct("CartService")
			.field("confirmed", &state.confirmed)
			.field("pending", &state.pending.len())
			.finish()
	}
}

fn item_path(book_id: &BookId) -> String {
	format!("{CART_ITEMS_PATH}/{book_id}")
}
