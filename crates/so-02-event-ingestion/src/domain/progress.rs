//! # Ingestion Progress
//!
//! Pure bookkeeping for the ingestion loop:
//!
//! - **Dedup**: an event is admitted only if its position is beyond the last
//!   position already admitted for its kind. Resubscribing from the checkpoint
//!   replays events; those are dropped here.
//! - **Watermarks**: each watched kind reports the block up to which its
//!   subscription has delivered everything. The safe block is the minimum over
//!   the kinds still expected to report. A kind that completed normally stops
//!   counting; a kind that was lost keeps its last watermark, which freezes the
//!   checkpoint until it is back.
//! - **Checkpoint advance**: when the safe block moves beyond the committed
//!   checkpoint, everything at or below it may be folded and persisted.

use std::collections::{BTreeMap, HashMap};

use shared_types::{BlockHeight, Event, EventKind, LogPosition};

/// Per-run ingestion state.
#[derive(Debug, Clone, Default)]
pub struct IngestionProgress {
    last_positions: HashMap<EventKind, LogPosition>,
    watermarks: BTreeMap<EventKind, Option<BlockHeight>>,
    highest_admitted: Option<BlockHeight>,
    committed: Option<BlockHeight>,
}

impl IngestionProgress {
    /// Start from a stored checkpoint, watching `kinds`.
    pub fn resume(committed: Option<BlockHeight>, kinds: &[EventKind]) -> Self {
        Self {
            watermarks: kinds.iter().map(|k| (*k, None)).collect(),
            committed,
            ..Self::default()
        }
    }

    /// First block that still needs processing.
    pub fn resume_block(&self, deployment_block: BlockHeight) -> BlockHeight {
        match self.committed {
            Some(block) => block.saturating_add(1).max(deployment_block),
            None => deployment_block,
        }
    }

    /// Last committed checkpoint.
    pub fn committed(&self) -> Option<BlockHeight> {
        self.committed
    }

    /// Watermark reported for `kind`, if any.
    pub fn watermark(&self, kind: EventKind) -> Option<BlockHeight> {
        self.watermarks.get(&kind).copied().flatten()
    }

    /// Record `event` if it is new for its kind.
    ///
    /// Returns `false` for replays at or before the last admitted position.
    pub fn admit(&mut self, event: &Event) -> bool {
        let position = event.position();
        match self.last_positions.get(&event.kind) {
            Some(last) if position <= *last => false,
            _ => {
                self.last_positions.insert(event.kind, position);
                self.highest_admitted = Some(
                    self.highest_admitted
                        .map_or(event.block_height, |h| h.max(event.block_height)),
                );
                true
            }
        }
    }

    /// `kind` has delivered everything up to `block`. Watermarks never regress.
    pub fn sync(&mut self, kind: EventKind, block: BlockHeight) {
        if let Some(mark) = self.watermarks.get_mut(&kind) {
            *mark = Some(mark.map_or(block, |m| m.max(block)));
        }
    }

    /// `kind` completed normally and will deliver nothing more.
    pub fn retire(&mut self, kind: EventKind) {
        self.watermarks.remove(&kind);
    }

    /// Whether every kind still watched has reported a watermark.
    pub fn all_synced(&self) -> bool {
        self.watermarks.values().all(Option::is_some)
    }

    /// Highest block at or below which every watched kind is complete.
    ///
    /// With every kind retired, all admitted events are final.
    pub fn safe_block(&self) -> Option<BlockHeight> {
        if self.watermarks.is_empty() {
            return self.highest_admitted;
        }
        self.watermarks
            .values()
            .copied()
            .collect::<Option<Vec<_>>>()?
            .into_iter()
            .min()
    }

    /// The checkpoint to write next, if the safe block moved past the
    /// committed one.
    pub fn advance(&self) -> Option<BlockHeight> {
        let safe = self.safe_block()?;
        match self.committed {
            Some(committed) if safe <= committed => None,
            _ => Some(safe),
        }
    }

    /// Mark `block` as durably written.
    pub fn commit(&mut self, block: BlockHeight) {
        self.committed = Some(self.committed.map_or(block, |c| c.max(block)));
    }
}
