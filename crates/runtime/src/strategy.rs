//! Pure session selection for [`crate::SessionPool::acquire`].

use crate::session::ConnectionKind;

/// What the pool knows about one session already serving the requested path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
	pub kind: ConnectionKind,
	/// Free, open and unleased.
	pub available: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireStrategy {
	/// Lease the candidate at this index.
	Reuse(usize),
	/// Start a new session, copying the layout of the candidate at this index.
	CloneLayout(usize),
	/// Start a new session and ask git for its layout.
	ResolveFresh,
}

/// Picks how to satisfy a request for a `kind` session, given the sessions
/// already serving the path, in pool order.
pub fn resolve_acquire_strategy(candidates: &[Candidate], kind: ConnectionKind) -> AcquireStrategy {
	if let Some(index) = candidates
		.iter()
		.position(|candidate| candidate.available && candidate.kind == kind)
	{
		AcquireStrategy::Reuse(index)
	} else if candidates.is_empty() {
		AcquireStrategy::ResolveFresh
	} else {
		AcquireStrategy::CloneLayout(0)
	}
}
