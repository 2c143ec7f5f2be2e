use vista_geom::epoch::domain::Visibility;
use vista_geom::{Epoch, PackedBox, RegionOrigin};

use crate::position::RegionPosition;

/// Visibility verdict for one view, valid for the visibility version it was computed in.
pub type ViewResult = Option<(Epoch<Visibility>, bool)>;

/// Visibility-side state of one terrain region.
#[derive(Clone, Debug)]
pub struct TerrainRegion {
    pub position: RegionPosition,
    bounds: Option<PackedBox>,
    occluders: Vec<PackedBox>,
    has_translucent: bool,
    needs_rebuild: bool,
    closed: bool,
    pub(crate) camera_result: ViewResult,
    pub(crate) shadow_result: ViewResult,
}

impl TerrainRegion {
    pub fn new(origin: RegionOrigin) -> Self {
        Self {
            position: RegionPosition::new(origin),
            bounds: None,
            occluders: Vec::new(),
            has_translucent: false,
            needs_rebuild: true,
            closed: false,
            camera_result: None,
            shadow_result: None,
        }
    }

    #[inline]
    pub fn origin(&self) -> RegionOrigin {
        self.position.origin()
    }

    /// Replaces the occlusion data after a build. `bounds` is `None` for regions with no geometry.
    pub fn set_occlusion_data(
        &mut self,
        bounds: Option<PackedBox>,
        occluders: Vec<PackedBox>,
        has_translucent: bool,
    ) {
        self.bounds = bounds;
        self.occluders = occluders;
        self.has_translucent = has_translucent;
        self.camera_result = None;
        self.shadow_result = None;
    }

    #[inline]
    pub fn bounds(&self) -> Option<PackedBox> {
        self.bounds
    }

    #[inline]
    pub fn occluders(&self) -> &[PackedBox] {
        &self.occluders
    }

    #[inline]
    pub fn has_geometry(&self) -> bool {
        self.bounds.is_some()
    }

    #[inline]
    pub fn has_translucent(&self) -> bool {
        self.has_translucent
    }

    #[inline]
    pub fn needs_rebuild(&self) -> bool {
        self.needs_rebuild
    }

    pub fn mark_needs_rebuild(&mut self) {
        self.needs_rebuild = true;
    }

    pub fn clear_needs_rebuild(&mut self) {
        self.needs_rebuild = false;
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn close(&mut self) {
        self.closed = true;
        self.bounds = None;
        self.occluders.clear();
        self.camera_result = None;
        self.shadow_result = None;
        self.position.close();
    }
}

/// Anything kept in [`crate::RegionStorage`]: owns a [`TerrainRegion`] plus whatever the
/// renderer attaches to it.
pub trait StoredRegion {
    fn create(origin: RegionOrigin) -> Self;
    fn terrain(&self) -> &TerrainRegion;
    fn terrain_mut(&mut self) -> &mut TerrainRegion;

    /// Called when the region leaves render distance or the world unloads.
    fn close(&mut self) {
        self.terrain_mut().close();
    }
}

impl StoredRegion for TerrainRegion {
    fn create(origin: RegionOrigin) -> Self {
        TerrainRegion::new(origin)
    }

    fn terrain(&self) -> &TerrainRegion {
        self
    }

    fn terrain_mut(&mut self) -> &mut TerrainRegion {
        self
    }
}
