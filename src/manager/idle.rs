//! Idle-level evidence table.
//!
//! One slot per possible idle level `0..=max`, each remembering when that
//! level was last observed as a window minimum. A slot is fresh while its
//! stamp is no older than the retention window. The smallest fresh level is
//! the amount of spare capacity the pool has reliably had, which is the
//! signal the manager shrinks on.

use std::time::{Duration, Instant};

/// Last-seen timestamps indexed by idle level.
#[derive(Debug, Clone)]
pub struct IdleLevels {
    last_seen: Vec<Option<Instant>>,
}

impl IdleLevels {
    /// Creates a table covering levels `0..=max`, all stale.
    #[must_use]
    pub fn new(max: u32) -> Self {
        let slots = usize::try_from(max).map_or(usize::MAX, |m| m.saturating_add(1));
        Self {
            last_seen: vec![None; slots],
        }
    }

    /// Marks `level` as observed at `now`. Levels above `max` land in the top slot.
    pub fn stamp(&mut self, level: u32, now: Instant) {
        let top = self.last_seen.len() - 1;
        let idx = usize::try_from(level).map_or(top, |l| l.min(top));
        self.last_seen[idx] = Some(now);
    }

    /// Forgets every level whose stamp is older than `retention` at `now`.
    ///
    /// Returns how many levels went stale.
    pub fn expire(&mut self, now: Instant, retention: Duration) -> usize {
        let mut expired = 0;
        for slot in &mut self.last_seen {
            if let Some(seen) = *slot {
                if now.saturating_duration_since(seen) > retention {
                    *slot = None;
                    expired += 1;
                }
            }
        }
        expired
    }

    /// Returns the smallest fresh level, if any.
    #[must_use]
    pub fn lowest_fresh(&self) -> Option<u32> {
        self.last_seen
            .iter()
            .position(Option::is_some)
            .and_then(|idx| u32::try_from(idx).ok())
    }

    /// Returns the fresh levels in ascending order.
    #[must_use]
    pub fn fresh_levels(&self) -> Vec<u32> {
        self.last_seen
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .filter_map(|(idx, _)| u32::try_from(idx).ok())
            .collect()
    }

    /// Returns the highest level the table can record.
    #[must_use]
    pub fn max_level(&self) -> u32 {
        u32::try_from(self.last_seen.len() - 1).unwrap_or(u32::MAX)
    }
}
