use std::sync::atomic::{AtomicU64, Ordering};

const TAG_BITS: u32 = 3;
const TAG_MASK: u64 = (1 << TAG_BITS) - 1;

const IDLE: u64 = 0;
const PENDING: u64 = 1;
const IN_PROGRESS: u64 = 2;
const INVALID: u64 = 3;
const RESORT: u64 = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildKind {
    Full,
    /// Re-sort translucent quads for a new camera position without remeshing.
    ResortOnly,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// A new task must be submitted.
    Schedule,
    /// An already queued task will pick the request up.
    Coalesced,
    /// The region was closed.
    Closed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FinishOutcome {
    /// The output is current and should be applied.
    Completed,
    /// A newer request arrived meanwhile; discard the output.
    Superseded,
    /// The region was closed; discard the output.
    Invalidated,
}

/// Build state of one region shared between the render thread and workers.
///
/// A single atomic word holds a 3-bit state tag and the ticket of the latest request; all
/// transitions are compare-and-swap, so a superseded or closed build can never publish.
#[derive(Debug, Default)]
pub struct ProtoRegionSlot {
    state: AtomicU64,
}

#[inline]
fn pack(tag: u64, ticket: u64) -> u64 {
    (ticket << TAG_BITS) | tag
}

#[inline]
fn tag(word: u64) -> u64 {
    word & TAG_MASK
}

#[inline]
fn ticket(word: u64) -> u64 {
    word >> TAG_BITS
}

impl ProtoRegionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn transition(&self, f: impl FnMut(u64) -> Option<u64>) -> Result<u64, u64> {
        self.state.fetch_update(Ordering::AcqRel, Ordering::Acquire, f)
    }

    /// Requests a full build stamped with `ticket`.
    pub fn enqueue(&self, ticket: u64) -> EnqueueOutcome {
        let result = self.transition(|word| match tag(word) {
            INVALID => None,
            _ => Some(pack(PENDING, ticket)),
        });
        match result {
            Err(_) => EnqueueOutcome::Closed,
            Ok(prev) if matches!(tag(prev), PENDING | RESORT) => EnqueueOutcome::Coalesced,
            Ok(_) => EnqueueOutcome::Schedule,
        }
    }

    /// Requests a translucency resort. Pending or running full builds already cover it.
    pub fn enqueue_resort(&self) -> EnqueueOutcome {
        let result = self.transition(|word| match tag(word) {
            IDLE => Some(pack(RESORT, ticket(word))),
            _ => None,
        });
        match result {
            Ok(_) => EnqueueOutcome::Schedule,
            Err(prev) if tag(prev) == INVALID => EnqueueOutcome::Closed,
            Err(_) => EnqueueOutcome::Coalesced,
        }
    }

    /// Claims the queued work. `None` when nothing is queued or the region closed.
    pub fn begin(&self) -> Option<(BuildKind, u64)> {
        let prev = self
            .transition(|word| match tag(word) {
                PENDING | RESORT => Some(pack(IN_PROGRESS, ticket(word))),
                _ => None,
            })
            .ok()?;
        let kind = if tag(prev) == PENDING {
            BuildKind::Full
        } else {
            BuildKind::ResortOnly
        };
        Some((kind, ticket(prev)))
    }

    /// Ends the work claimed with `ticket`.
    pub fn finish(&self, ticket_in: u64) -> FinishOutcome {
        let result = self.transition(|word| {
            if tag(word) == IN_PROGRESS && ticket(word) == ticket_in {
                Some(pack(IDLE, ticket_in))
            } else {
                None
            }
        });
        match result {
            Ok(_) => FinishOutcome::Completed,
            Err(word) if tag(word) == INVALID => FinishOutcome::Invalidated,
            Err(_) => FinishOutcome::Superseded,
        }
    }

    /// Abandons claimed work so it can be requested again, e.g. after resource exhaustion.
    pub fn abandon(&self, ticket_in: u64) {
        let _ = self.transition(|word| {
            if tag(word) == IN_PROGRESS && ticket(word) == ticket_in {
                Some(pack(IDLE, ticket_in))
            } else {
                None
            }
        });
    }

    /// Marks the region closed; every later transition fails.
    pub fn invalidate(&self) {
        self.state.store(pack(INVALID, 0), Ordering::Release);
    }

    pub fn is_invalid(&self) -> bool {
        tag(self.state.load(Ordering::Acquire)) == INVALID
    }

    pub fn is_idle(&self) -> bool {
        tag(self.state.load(Ordering::Acquire)) == IDLE
    }
}
