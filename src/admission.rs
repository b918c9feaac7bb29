//! Admission controller: non-blocking, per-(backend, route_kind) counted semaphores.
//!
//! No queueing (§4.2 Non-goals): `try_acquire` either returns a slot immediately or
//! rejects immediately. The slot releases itself on drop so every exit path — normal
//! completion, upstream error, timeout, or client disconnect — frees the permit without
//! bespoke bookkeeping at each call site.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::registry::{Registry, RouteKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
	/// The semaphore for this key is at zero.
	Overloaded,
	/// No entry exists for this key: the route kind isn't admitted for this backend.
	NotAdmitted,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct AdmissionStatsEntry {
	pub limit: u32,
	pub inflight: u32,
	pub available: u32,
}

struct Entry {
	semaphore: Arc<Semaphore>,
	limit: u32,
}

/// An acquired admission slot. Releases its permit when dropped, from whichever code
/// path drops it first — there is deliberately no explicit `release()` call to forget.
pub struct Slot {
	backend_name: String,
	route_kind: RouteKind,
	_permit: tokio::sync::OwnedSemaphorePermit,
}

impl Slot {
	pub fn backend_name(&self) -> &str {
		&self.backend_name
	}

	pub fn route_kind(&self) -> RouteKind {
		self.route_kind
	}
}

pub struct AdmissionController {
	table: HashMap<(String, RouteKind), Entry>,
}

impl AdmissionController {
	/// Builds one semaphore per `(backend, route_kind)` pair declared in the registry.
	pub fn from_registry(registry: &Registry) -> Self {
		let mut table = HashMap::new();
		for backend in registry.iter() {
			for (route_kind, limit) in &backend.concurrency_limits {
				table.insert(
					(backend.name.clone(), *route_kind),
					Entry {
						semaphore: Arc::new(Semaphore::new(*limit as usize)),
						limit: *limit,
					},
				);
			}
		}
		AdmissionController { table }
	}

	/// Non-blocking. Never awaits, never queues.
	pub fn try_acquire(&self, backend_name: &str, route_kind: RouteKind) -> Result<Slot, RejectReason> {
		let key = (backend_name.to_string(), route_kind);
		let entry = self.table.get(&key).ok_or(RejectReason::NotAdmitted)?;
		let permit = Arc::clone(&entry.semaphore)
			.try_acquire_owned()
			.map_err(|_| RejectReason::Overloaded)?;
		Ok(Slot {
			backend_name: backend_name.to_string(),
			route_kind,
			_permit: permit,
		})
	}

	pub fn stats(&self) -> HashMap<String, AdmissionStatsEntry> {
		self
			.table
			.iter()
			.map(|((backend, route_kind), entry)| {
				let available = entry.semaphore.available_permits() as u32;
				let key = format!("{backend}.{}", route_kind.as_str());
				(
					key,
					AdmissionStatsEntry {
						limit: entry.limit,
						inflight: entry.limit.saturating_sub(available),
						available,
					},
				)
			})
			.collect()
	}
}
