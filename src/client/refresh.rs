//! Single-flight access token refresh with FIFO replay of queued requests.
//!
//! A request rejected with 401 joins the [`RefreshCoordinator`]. The first one to join
//! while no refresh is in flight receives a [`RefreshLease`] and performs the refresh;
//! every later one is parked in a FIFO queue together with a replay closure. When the
//! lease settles, the queue is taken and the in-flight flag cleared in one critical
//! section, then the leader's own replay is dispatched first and the queued replays
//! follow in enqueue order. Each replay is polled only after the one before it started,
//! so the order holds for transports that send lazily. A failed or abandoned lease
//! releases every parked caller.
//!
//! The flag check, the queue push, and the queue take all happen under one
//! [`parking_lot::Mutex`] that is never held across an `.await`, which keeps the
//! protocol correct on multi-threaded runtimes.

mod metrics;

pub use metrics::RefreshMetrics;

// crates.io
use futures::{channel::oneshot, future};
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	client::{ApiClient, common::PreparedRequest},
	http::{ApiTransport, HttpResponse},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	session::SessionStore,
};

/// Replay of a rejected request that has already been handed to the transport.
pub(crate) type ReplayFuture = Pin<Box<dyn Future<Output = Result<HttpResponse>> + Send>>;
/// Dispatches a replay with the refreshed token.
pub(crate) type ReplayFn = Box<dyn FnOnce(&TokenSecret) -> ReplayFuture + Send>;

/// Outcome delivered to a parked caller.
pub(crate) enum Settlement {
	/// A new token was issued; `replay` is the caller's dispatched replay, if it had one.
	Refreshed { token: TokenSecret, replay: Option<ReplayFuture> },
	/// The refresh failed; every caller of the episode shares the failure.
	Rejected(Arc<Error>),
}

struct Pending {
	replay: Option<ReplayFn>,
	settle: oneshot::Sender<Settlement>,
}

#[derive(Default)]
struct RefreshState {
	refreshing: bool,
	queue: VecDeque<Pending>,
}

/// What a caller joining the coordinator has to do next.
pub(crate) enum Ticket<'a> {
	/// Perform the refresh and settle the lease.
	Lead(RefreshLease<'a>),
	/// Wait for the in-flight refresh.
	Wait(Waiter),
	/// An episode already finished while the rejected request was in flight; replay with
	/// this token without refreshing again.
	Current(TokenSecret),
}

/// Refresh flag + FIFO queue shared by every client of a session.
#[derive(Default)]
pub struct RefreshCoordinator {
	state: Mutex<RefreshState>,
	metrics: RefreshMetrics,
}
impl RefreshCoordinator {
	/// Creates an idle coordinator.
	pub fn new() -> Self {
		Self::default()
	}

	/// Counters for the episodes handled by this coordinator.
	pub fn metrics(&self) -> &RefreshMetrics {
		&self.metrics
	}

	/// Returns `true` while a refresh is in flight.
	pub fn is_refreshing(&self) -> bool {
		self.state.lock().refreshing
	}

	/// Number of callers currently parked behind the in-flight refresh.
	pub fn queued(&self) -> usize {
		self.state.lock().queue.len()
	}

	/// Joins after a request sent with `sent_with` was rejected.
	pub(crate) fn join_rejected(
		&self,
		sent_with: Option<&TokenSecret>,
		session: &dyn SessionStore,
		replay: impl FnOnce() -> ReplayFn,
	) -> Ticket<'_> {
		self.join(|| session.access_token().filter(|current| Some(current) != sent_with), || {
			Some(replay())
		})
	}

	/// Joins for an explicit refresh that has no request to replay.
	pub(crate) fn join_explicit(&self) -> Ticket<'_> {
		self.join(|| None, || None)
	}

	fn join(
		&self,
		current: impl FnOnce() -> Option<TokenSecret>,
		replay: impl FnOnce() -> Option<ReplayFn>,
	) -> Ticket<'_> {
		let mut state = self.state.lock();

		if state.refreshing {
			let (settle, settled) = oneshot::channel();

			state.queue.push_back(Pending { replay: replay(), settle });
			self.metrics.record_queued();
			obs::record_queue_depth(state.queue.len());

			return Ticket::Wait(Waiter(settled));
		}
		if let Some(token) = current() {
			return Ticket::Current(token);
		}

		state.refreshing = true;
		self.metrics.record_attempt();

		Ticket::Lead(RefreshLease { coordinator: self, settled: false })
	}

	fn take_queue(&self) -> VecDeque<Pending> {
		let mut state = self.state.lock();

		state.refreshing = false;
		obs::record_queue_depth(0);

		std::mem::take(&mut state.queue)
	}
}
impl Debug for RefreshCoordinator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let state = self.state.lock();

		f.debug_struct("RefreshCoordinator")
			.field("refreshing", &state.refreshing)
			.field("queued", &state.queue.len())
			.field("metrics", &self.metrics)
			.finish()
	}
}

/// Exclusive right to perform the refresh of the current episode.
///
/// Dropping an unsettled lease (for example when the leading caller's future is
/// cancelled) clears the flag and releases every parked caller with
/// [`Error::RefreshInterrupted`].
pub(crate) struct RefreshLease<'a> {
	coordinator: &'a RefreshCoordinator,
	settled: bool,
}
impl RefreshLease<'_> {
	/// Publishes `token` to the queue: the leader's replay is dispatched first, then every
	/// queued replay in FIFO order.
	pub(crate) fn succeed(
		mut self,
		token: &TokenSecret,
		lead: Option<ReplayFn>,
	) -> Option<ReplayFuture> {
		self.settled = true;

		let queue = self.coordinator.take_queue();
		let mut chain = ReplayChain::default();
		let own = lead.map(|replay| chain.push(replay(token)));

		for pending in queue {
			let replay = pending.replay.map(|replay| chain.push(replay(token)));
			// A receiver dropped by its caller has nothing left to deliver to.
			let _ = pending.settle.send(Settlement::Refreshed { token: token.clone(), replay });
		}

		self.coordinator.metrics.record_success();

		own
	}

	/// Rejects every queued caller with the shared failure.
	pub(crate) fn fail(mut self, error: Arc<Error>) {
		self.settled = true;

		for pending in self.coordinator.take_queue() {
			let _ = pending.settle.send(Settlement::Rejected(error.clone()));
		}

		self.coordinator.metrics.record_failure();
	}
}
impl Drop for RefreshLease<'_> {
	fn drop(&mut self) {
		if !self.settled {
			drop(self.coordinator.take_queue());

			self.coordinator.metrics.record_failure();
		}
	}
}

/// Orders the first poll of each replay after the first poll of the previous one.
///
/// Transports may defer the actual send until their future is polled, and every waiter
/// polls its replay from its own task. A replay therefore waits until its predecessor has
/// been handed to the transport before it is polled itself. A predecessor dropped unpolled
/// releases its successor.
#[derive(Default)]
struct ReplayChain {
	last: Option<oneshot::Receiver<()>>,
}
impl ReplayChain {
	fn push(&mut self, replay: ReplayFuture) -> ReplayFuture {
		let (started, next) = oneshot::channel();
		let after = self.last.replace(next);

		Box::pin(async move {
			if let Some(after) = after {
				let _ = after.await;
			}

			let mut replay = replay;
			let mut started = Some(started);

			future::poll_fn(move |cx| {
				let poll = replay.as_mut().poll(cx);

				if let Some(started) = started.take() {
					let _ = started.send(());
				}

				poll
			})
			.await
		})
	}
}

/// Parked caller waiting for the in-flight refresh to settle.
pub(crate) struct Waiter(oneshot::Receiver<Settlement>);
impl Waiter {
	/// Resolves to the new token and this caller's replay, or to the episode's failure.
	pub(crate) async fn settled(self) -> Result<(TokenSecret, Option<ReplayFuture>)> {
		match self.0.await {
			Ok(Settlement::Refreshed { token, replay }) => Ok((token, replay)),
			Ok(Settlement::Rejected(source)) => Err(expired_by(source)),
			Err(oneshot::Canceled) => Err(Error::RefreshInterrupted),
		}
	}
}

/// Session-expired error shared by every caller of a failed episode.
pub(crate) fn expired_by(source: Arc<Error>) -> Error {
	Error::SessionExpired { reason: failure_reason(&source), source: Some(source) }
}

fn failure_reason(source: &Error) -> String {
	format!("access token refresh failed: {source}")
}

impl<T> ApiClient<T>
where
	T: ?Sized + ApiTransport,
{
	/// Refreshes the access token explicitly, for example to restore a session from the
	/// refresh cookie at start-up.
	///
	/// Joins the in-flight episode when there is one instead of issuing a second refresh
	/// call. A failed refresh expires the session.
	pub async fn refresh_session(&self) -> Result<TokenSecret> {
		let span = FlowSpan::new(FlowKind::Refresh, "refresh_session", &self.descriptor.id);

		span.instrument(async move {
			match self.coordinator.join_explicit() {
				Ticket::Lead(lease) => self.lead(lease, None).await.map(|(token, _)| token),
				Ticket::Wait(waiter) => waiter.settled().await.map(|(token, _)| token),
				Ticket::Current(token) => Ok(token),
			}
		})
		.await
	}

	/// Runs the 401 recovery protocol for a request that has not been retried yet.
	pub(crate) async fn recover(&self, mut prepared: PreparedRequest) -> Result<HttpResponse> {
		prepared.retried = true;

		let sent_with = prepared.sent_with.clone();
		let ticket =
			self.coordinator.join_rejected(sent_with.as_ref(), self.session.as_ref(), || {
				self.replay(prepared.clone())
			});

		match ticket {
			Ticket::Lead(lease) => {
				let (_, replay) = self.lead(lease, Some(prepared)).await?;

				match replay {
					Some(replay) => replay.await,
					None => Err(Error::RefreshInterrupted),
				}
			},
			Ticket::Wait(waiter) => {
				obs::record_flow_outcome(FlowKind::Refresh, FlowOutcome::Queued);

				match waiter.settled().await? {
					(_, Some(replay)) => replay.await,
					(_, None) => Err(Error::RefreshInterrupted),
				}
			},
			Ticket::Current(token) => {
				obs::note("replaying with the token of a finished refresh", &token.fingerprint());

				self.replay(prepared)(&token).await
			},
		}
	}

	/// Performs the refresh call for the episode and settles `lease`.
	async fn lead(
		&self,
		lease: RefreshLease<'_>,
		pending: Option<PreparedRequest>,
	) -> Result<(TokenSecret, Option<ReplayFuture>)> {
		obs::record_flow_outcome(FlowKind::Refresh, FlowOutcome::Attempt);

		match self.request_refresh().await {
			Ok(token) => {
				self.session.update_access_token(token.clone());
				obs::note("access token refreshed", &token.fingerprint());

				let replay = lease.succeed(&token, pending.map(|prepared| self.replay(prepared)));

				obs::record_flow_outcome(FlowKind::Refresh, FlowOutcome::Success);

				Ok((token, replay))
			},
			Err(err) => {
				let source = Arc::new(err);

				self.session.expire(&failure_reason(&source));
				lease.fail(source.clone());
				obs::record_flow_outcome(FlowKind::Refresh, FlowOutcome::Failure);

				Err(expired_by(source))
			},
		}
	}

	/// Builds the replay closure for `prepared`; the transport call happens when it runs.
	fn replay(&self, prepared: PreparedRequest) -> ReplayFn {
		let transport = Arc::clone(&self.transport);

		Box::new(move |token: &TokenSecret| -> ReplayFuture {
			let mut prepared = prepared;
			let dispatched = prepared
				.authorize(token)
				.and_then(|()| prepared.to_http())
				.map(|request| transport.execute(request));

			Box::pin(async move { Ok::<_, Error>(dispatched?.await?) })
		})
	}
}
