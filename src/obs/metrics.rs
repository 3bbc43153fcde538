// self
use crate::{
	_prelude::*,
	obs::{FlowKind, FlowOutcome},
};

/// Counter of flow outcomes, labeled by `flow` and `outcome`.
pub const FLOW_TOTAL: &str = "storefront_client_flow_total";
/// Gauge of callers parked behind the in-flight refresh.
pub const REFRESH_QUEUE_DEPTH: &str = "storefront_client_refresh_queue_depth";

/// Records a flow outcome via the global metrics recorder (when enabled).
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	metrics::counter!(FLOW_TOTAL, "flow" => kind.as_str(), "outcome" => outcome.as_str()).increment(1);
	#[cfg(not(feature = "metrics"))]
	let _ = (kind, outcome);
}

/// Records success or failure of a finished flow.
pub(crate) fn record_result<T>(kind: FlowKind, result: &Result<T>) {
	let outcome = if result.is_ok() { FlowOutcome::Success } else { FlowOutcome::Failure };

	record_flow_outcome(kind, outcome);
}

/// Publishes the number of parked callers; drained episodes report zero.
pub(crate) fn record_queue_depth(depth: usize) {
	#[cfg(feature = "metrics")]
	metrics::gauge!(REFRESH_QUEUE_DEPTH).set(depth as f64);
	#[cfg(not(feature = "metrics"))]
	let _ = depth;
}
