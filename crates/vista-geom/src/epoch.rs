//! Generation counters tagged with the domain they count, so a frustum epoch can never be
//! compared against a camera-origin epoch by accident.

use core::fmt;
use core::marker::PhantomData;

pub mod domain {
    /// Camera moved into a different region.
    pub enum CameraOrigin {}
    /// Frustum orientation or projection changed.
    pub enum FrustumView {}
    /// Camera moved inside its region.
    pub enum FrustumPosition {}
    /// Occlusion raster redrawn from scratch.
    pub enum Visibility {}
    /// Potentially-visible region set rebuilt.
    pub enum Pvrs {}
    /// Light direction changed.
    pub enum Light {}
    /// Translucent resort requested.
    pub enum Sort {}
}

pub struct Epoch<D> {
    value: u64,
    _domain: PhantomData<fn() -> D>,
}

impl<D> Epoch<D> {
    pub const INITIAL: Epoch<D> = Epoch {
        value: 0,
        _domain: PhantomData,
    };

    #[inline]
    pub const fn value(self) -> u64 {
        self.value
    }

    #[inline]
    pub const fn next(self) -> Epoch<D> {
        Epoch {
            value: self.value + 1,
            _domain: PhantomData,
        }
    }

    #[inline]
    pub fn bump(&mut self) -> Epoch<D> {
        self.value += 1;
        *self
    }
}

impl<D> Clone for Epoch<D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<D> Copy for Epoch<D> {}

impl<D> PartialEq for Epoch<D> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<D> Eq for Epoch<D> {}

impl<D> PartialOrd for Epoch<D> {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<D> Ord for Epoch<D> {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        self.value.cmp(&other.value)
    }
}

impl<D> Default for Epoch<D> {
    fn default() -> Self {
        Self::INITIAL
    }
}

impl<D> fmt::Debug for Epoch<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Epoch({})", self.value)
    }
}
