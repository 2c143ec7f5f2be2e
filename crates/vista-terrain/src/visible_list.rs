use vista_geom::epoch::domain::Sort;
use vista_geom::{Epoch, RegionOrigin};

use crate::region::StoredRegion;
use crate::storage::RegionStorage;

/// Regions found visible in the last completed pass, near to far.
#[derive(Clone, Debug, Default)]
pub struct VisibleRegionList {
    regions: Vec<RegionOrigin>,
    sort_epoch_seen: Option<Epoch<Sort>>,
}

impl VisibleRegionList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.regions.clear();
    }

    #[inline]
    pub fn add(&mut self, origin: RegionOrigin) {
        self.regions.push(origin);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<RegionOrigin> {
        self.regions.get(index).copied()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = RegionOrigin> + '_ {
        self.regions.iter().copied()
    }

    #[inline]
    pub fn as_slice(&self) -> &[RegionOrigin] {
        &self.regions
    }

    /// Replaces the contents with another list, reusing the allocation.
    pub fn copy_from(&mut self, other: &VisibleRegionList) {
        self.regions.clear();
        self.regions.extend_from_slice(&other.regions);
    }

    /// Counts regions for which `has_work` holds, e.g. those with something to draw.
    pub fn active_count(&self, mut has_work: impl FnMut(RegionOrigin) -> bool) -> usize {
        self.regions.iter().filter(|&&o| has_work(o)).count()
    }

    /// Asks for a translucent resort of every listed region that has translucent geometry and
    /// has not been resorted for `sort_epoch` yet.
    ///
    /// `schedule` returns whether the resort was actually queued; regions it declines keep
    /// their stamp and are offered again on the next call for the same epoch.
    pub fn schedule_resort<R: StoredRegion>(
        &mut self,
        storage: &mut RegionStorage<R>,
        sort_epoch: Epoch<Sort>,
        mut schedule: impl FnMut(RegionOrigin, &R) -> bool,
    ) -> usize {
        if self.sort_epoch_seen == Some(sort_epoch) {
            return 0;
        }
        let mut scheduled = 0;
        let mut deferred = 0;
        for &origin in &self.regions {
            let Some(stored) = storage.get_mut(origin) else {
                continue;
            };
            let region = stored.terrain();
            if !region.has_translucent() || !region.position.is_sort_needed(sort_epoch) {
                continue;
            }
            if schedule(origin, &*stored) {
                stored
                    .terrain_mut()
                    .position
                    .check_and_update_sort_needed(sort_epoch);
                scheduled += 1;
            } else {
                deferred += 1;
            }
        }
        if deferred == 0 {
            self.sort_epoch_seen = Some(sort_epoch);
        }
        if scheduled > 0 || deferred > 0 {
            log::debug!(
                target: "terrain",
                "scheduled {} translucent resorts, {} deferred",
                scheduled,
                deferred
            );
        }
        scheduled
    }
}

/// Regions casting shadows, with the innermost cascade each one falls in.
#[derive(Clone, Debug, Default)]
pub struct ShadowRegionList {
    entries: Vec<(RegionOrigin, u8)>,
}

impl ShadowRegionList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[inline]
    pub fn add(&mut self, origin: RegionOrigin, cascade: u8) {
        self.entries.push((origin, cascade));
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RegionOrigin, u8)> + '_ {
        self.entries.iter().copied()
    }

    /// Regions to draw into `cascade`: every region whose innermost cascade is at most it.
    pub fn regions_for_cascade(&self, cascade: u8) -> impl Iterator<Item = RegionOrigin> + '_ {
        self.entries
            .iter()
            .filter(move |&&(_, c)| c <= cascade)
            .map(|&(o, _)| o)
    }

    pub fn copy_from(&mut self, other: &ShadowRegionList) {
        self.entries.clear();
        self.entries.extend_from_slice(&other.entries);
    }
}
