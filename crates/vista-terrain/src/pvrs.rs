use hashbrown::HashSet;
use vista_geom::epoch::domain::Pvrs;
use vista_geom::{Epoch, RegionOrigin};

/// Potentially-visible region set: regions bucketed by distance rank and handed out nearest
/// bucket first, insertion order within a bucket.
///
/// A region added with a rank below the bucket being drained joins the current bucket, so
/// nothing is ever skipped. Each region is accepted once per version.
#[derive(Default)]
pub struct PotentiallyVisibleRegionSet {
    buckets: Vec<Vec<RegionOrigin>>,
    members: HashSet<RegionOrigin>,
    bucket: usize,
    index: usize,
    len: usize,
    version: Epoch<Pvrs>,
}

impl PotentiallyVisibleRegionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the region was already in the set.
    pub fn add(&mut self, origin: RegionOrigin, rank: usize) -> bool {
        if !self.members.insert(origin) {
            return false;
        }
        let rank = rank.max(self.bucket);
        if rank >= self.buckets.len() {
            self.buckets.resize_with(rank + 1, Vec::new);
        }
        self.buckets[rank].push(origin);
        self.len += 1;
        true
    }

    pub fn next(&mut self) -> Option<RegionOrigin> {
        while self.bucket < self.buckets.len() {
            let bucket = &self.buckets[self.bucket];
            if self.index < bucket.len() {
                let origin = bucket[self.index];
                self.index += 1;
                return Some(origin);
            }
            self.bucket += 1;
            self.index = 0;
        }
        None
    }

    #[inline]
    pub fn contains(&self, origin: RegionOrigin) -> bool {
        self.members.contains(&origin)
    }

    /// Drops every region and starts a new version.
    pub fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
        self.members.clear();
        self.bucket = 0;
        self.index = 0;
        self.len = 0;
        self.version.bump();
    }

    /// Rewinds iteration without forgetting membership.
    pub fn return_to_start(&mut self) {
        self.bucket = 0;
        self.index = 0;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn version(&self) -> Epoch<Pvrs> {
        self.version
    }
}
