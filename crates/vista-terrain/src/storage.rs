use hashbrown::HashMap;
use vista_geom::RegionOrigin;

use crate::region::StoredRegion;

/// Regions created and closed by one [`RegionStorage::update_camera`] call.
pub struct StorageUpdate<R> {
    pub created: Vec<RegionOrigin>,
    pub closed: Vec<R>,
}

impl<R> Default for StorageUpdate<R> {
    fn default() -> Self {
        Self {
            created: Vec::new(),
            closed: Vec::new(),
        }
    }
}

/// All live regions keyed by origin. Regions exist exactly for the columns within render
/// distance of the camera and the world's vertical bounds.
pub struct RegionStorage<R> {
    regions: HashMap<RegionOrigin, R>,
    render_distance: i32,
    min_chunk_y: i32,
    max_chunk_y: i32,
    center: Option<RegionOrigin>,
}

impl<R: StoredRegion> RegionStorage<R> {
    /// `min_chunk_y..=max_chunk_y` is the vertical range of regions in the world.
    pub fn new(render_distance: i32, min_chunk_y: i32, max_chunk_y: i32) -> Self {
        Self {
            regions: HashMap::new(),
            render_distance: render_distance.max(1),
            min_chunk_y,
            max_chunk_y: max_chunk_y.max(min_chunk_y),
            center: None,
        }
    }

    #[inline]
    pub fn render_distance(&self) -> i32 {
        self.render_distance
    }

    #[inline]
    pub fn chunk_y_range(&self) -> (i32, i32) {
        (self.min_chunk_y, self.max_chunk_y)
    }

    pub fn set_render_distance(&mut self, render_distance: i32) {
        let render_distance = render_distance.max(1);
        if render_distance != self.render_distance {
            self.render_distance = render_distance;
            self.center = None;
        }
    }

    /// Creates regions newly within render distance of `camera` and closes those beyond it.
    pub fn update_camera(&mut self, camera: RegionOrigin) -> StorageUpdate<R> {
        let column = RegionOrigin::from_chunk(camera.chunk_x(), 0, camera.chunk_z());
        let mut update = StorageUpdate::default();
        if self.center == Some(column) {
            return update;
        }
        self.center = Some(column);

        let rd = self.render_distance;
        let limit = rd * rd;
        let stale: Vec<RegionOrigin> = self
            .regions
            .keys()
            .copied()
            .filter(|o| o.horizontal_chunk_distance_sq(column) > limit)
            .collect();
        for origin in stale {
            if let Some(mut region) = self.regions.remove(&origin) {
                region.close();
                update.closed.push(region);
            }
        }

        for dz in -rd..=rd {
            for dx in -rd..=rd {
                if dx * dx + dz * dz > limit {
                    continue;
                }
                for cy in self.min_chunk_y..=self.max_chunk_y {
                    let origin =
                        RegionOrigin::from_chunk(column.chunk_x() + dx, cy, column.chunk_z() + dz);
                    if !self.regions.contains_key(&origin) {
                        self.regions.insert(origin, R::create(origin));
                        update.created.push(origin);
                    }
                }
            }
        }
        if !update.created.is_empty() || !update.closed.is_empty() {
            log::debug!(
                target: "terrain",
                "region storage around {:?}: +{} -{} ({} live)",
                column,
                update.created.len(),
                update.closed.len(),
                self.regions.len()
            );
        }
        update
    }

    /// Closes everything, e.g. on world unload.
    pub fn close_all(&mut self) -> Vec<R> {
        self.center = None;
        self.regions
            .drain()
            .map(|(_, mut region)| {
                region.close();
                region
            })
            .collect()
    }

    #[inline]
    pub fn get(&self, origin: RegionOrigin) -> Option<&R> {
        self.regions.get(&origin)
    }

    #[inline]
    pub fn get_mut(&mut self, origin: RegionOrigin) -> Option<&mut R> {
        self.regions.get_mut(&origin)
    }

    #[inline]
    pub fn contains(&self, origin: RegionOrigin) -> bool {
        self.regions.contains_key(&origin)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RegionOrigin, &R)> {
        self.regions.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&RegionOrigin, &mut R)> {
        self.regions.iter_mut()
    }
}
