use std::{mem, ops::Deref};

use serde::{Deserialize, Serialize};

use gsearch_domain::PartitionId;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Caller {
	pub user: String,
}
impl Caller {
	pub fn new(user: impl Into<String>) -> Self {
		Self { user: user.into() }
	}
}

/// Per-request execution context: who is asking and which partition is currently addressed.
///
/// The active partition only changes through [`SearchContext::enter`], whose guard puts the
/// previous partition back when dropped, including on early return and unwinding.
#[derive(Debug, Clone)]
pub struct SearchContext {
	caller: Caller,
	active: PartitionId,
}
impl SearchContext {
	pub fn new(caller: Caller, home: PartitionId) -> Self {
		Self { caller, active: home }
	}

	pub fn caller(&self) -> &Caller {
		&self.caller
	}

	pub fn active_partition(&self) -> &PartitionId {
		&self.active
	}

	pub fn enter(&mut self, partition: PartitionId) -> PartitionGuard<'_> {
		let previous = mem::replace(&mut self.active, partition);

		PartitionGuard { ctx: self, previous: Some(previous) }
	}
}

pub struct PartitionGuard<'a> {
	ctx: &'a mut SearchContext,
	previous: Option<PartitionId>,
}
impl Deref for PartitionGuard<'_> {
	type Target = SearchContext;

	fn deref(&self) -> &Self::Target {
		self.ctx
	}
}
impl Drop for PartitionGuard<'_> {
	fn drop(&mut self) {
		if let Some(previous) = self.previous.take() {
			self.ctx.active = previous;
		}
	}
}
