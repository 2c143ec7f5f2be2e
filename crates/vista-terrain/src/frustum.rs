use glam::{DVec3, Mat4, Vec3, Vec4};
use vista_geom::epoch::domain::{CameraOrigin, FrustumPosition, FrustumView};
use vista_geom::{Epoch, REGION_SIZE, RegionOrigin};

/// Which view epochs an update advanced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrustumChange {
    pub origin: bool,
    pub view: bool,
    pub position: bool,
}

impl FrustumChange {
    #[inline]
    pub fn any(self) -> bool {
        self.origin || self.view || self.position
    }
}

/// Camera frustum for region culling, in camera-relative space.
pub struct TerrainFrustum {
    planes: [Vec4; 6],
    camera_pos: DVec3,
    view_proj: Mat4,
    camera_origin: RegionOrigin,
    origin_epoch: Epoch<CameraOrigin>,
    view_epoch: Epoch<FrustumView>,
    position_epoch: Epoch<FrustumPosition>,
    padding: f32,
    initialized: bool,
}

impl Default for TerrainFrustum {
    fn default() -> Self {
        Self::new()
    }
}

impl TerrainFrustum {
    pub fn new() -> Self {
        Self {
            planes: [Vec4::ZERO; 6],
            camera_pos: DVec3::ZERO,
            view_proj: Mat4::IDENTITY,
            camera_origin: RegionOrigin::default(),
            origin_epoch: Epoch::INITIAL,
            view_epoch: Epoch::INITIAL,
            position_epoch: Epoch::INITIAL,
            padding: 0.0,
            initialized: false,
        }
    }

    /// Extra margin in blocks added around each region before the plane test.
    pub fn set_padding(&mut self, padding: f32) {
        if padding != self.padding {
            self.padding = padding;
            self.view_epoch.bump();
        }
    }

    pub fn update(&mut self, camera_pos: DVec3, view_proj: Mat4) -> FrustumChange {
        let origin = RegionOrigin::containing_block(
            camera_pos.x.floor() as i32,
            camera_pos.y.floor() as i32,
            camera_pos.z.floor() as i32,
        );
        let first = !self.initialized;
        let change = FrustumChange {
            origin: first || origin != self.camera_origin,
            view: first || view_proj != self.view_proj,
            position: first || camera_pos != self.camera_pos,
        };
        if change.origin {
            self.camera_origin = origin;
            self.origin_epoch.bump();
        }
        if change.view {
            self.view_proj = view_proj;
            self.planes = extract_planes(&view_proj);
            self.view_epoch.bump();
        }
        if change.position {
            self.camera_pos = camera_pos;
            self.position_epoch.bump();
        }
        self.initialized = true;
        change
    }

    #[inline]
    pub fn camera_pos(&self) -> DVec3 {
        self.camera_pos
    }

    #[inline]
    pub fn camera_origin(&self) -> RegionOrigin {
        self.camera_origin
    }

    #[inline]
    pub fn view_proj(&self) -> Mat4 {
        self.view_proj
    }

    #[inline]
    pub fn origin_epoch(&self) -> Epoch<CameraOrigin> {
        self.origin_epoch
    }

    #[inline]
    pub fn view_epoch(&self) -> Epoch<FrustumView> {
        self.view_epoch
    }

    #[inline]
    pub fn position_epoch(&self) -> Epoch<FrustumPosition> {
        self.position_epoch
    }

    /// Region origin relative to the camera.
    pub fn relative(&self, origin: RegionOrigin) -> Vec3 {
        (DVec3::new(
            f64::from(origin.x()),
            f64::from(origin.y()),
            f64::from(origin.z()),
        ) - self.camera_pos)
            .as_vec3()
    }

    /// True when the region's box (plus padding) is at least partly inside every plane.
    pub fn is_region_visible(&self, origin: RegionOrigin) -> bool {
        let min = self.relative(origin) - Vec3::splat(self.padding);
        let max = min + Vec3::splat(REGION_SIZE as f32 + 2.0 * self.padding);
        self.planes.iter().all(|plane| {
            let p = Vec3::new(
                if plane.x > 0.0 { max.x } else { min.x },
                if plane.y > 0.0 { max.y } else { min.y },
                if plane.z > 0.0 { max.z } else { min.z },
            );
            plane.truncate().dot(p) + plane.w >= 0.0
        })
    }
}

/// Gribb-Hartmann plane extraction.
fn extract_planes(vp: &Mat4) -> [Vec4; 6] {
    let row0 = vp.row(0);
    let row1 = vp.row(1);
    let row2 = vp.row(2);
    let row3 = vp.row(3);
    [
        normalize_plane(row3 + row0),
        normalize_plane(row3 - row0),
        normalize_plane(row3 + row1),
        normalize_plane(row3 - row1),
        normalize_plane(row3 + row2),
        normalize_plane(row3 - row2),
    ]
}

#[inline]
fn normalize_plane(plane: Vec4) -> Vec4 {
    let len = plane.truncate().length();
    if len > 0.0001 { plane / len } else { plane }
}
