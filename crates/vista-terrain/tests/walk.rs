use glam::{DVec3, Mat4, Vec3};
use vista_geom::{PackedBox, RegionOrigin};
use vista_terrain::{IterationConfig, RegionStorage, TerrainIterator, TerrainRegion};

const CAMERA: DVec3 = DVec3::new(8.0, 8.0, 8.0);

fn forward() -> Mat4 {
    Mat4::perspective_rh_gl(90f32.to_radians(), 2.0, 0.1, 1000.0)
        * Mat4::look_to_rh(Vec3::ZERO, Vec3::Z, Vec3::Y)
}

fn config() -> IterationConfig {
    IterationConfig {
        render_distance: 3,
        ..IterationConfig::default()
    }
}

/// Flat layer around the origin with a solid region two chunks ahead of the camera and
/// another solid region straight behind it.
fn walled_storage() -> RegionStorage<TerrainRegion> {
    let mut storage = RegionStorage::<TerrainRegion>::new(3, 0, 0);
    storage.update_camera(RegionOrigin::from_chunk(0, 0, 0));
    for z in [2, 3] {
        let region = storage
            .get_mut(RegionOrigin::from_chunk(0, 0, z))
            .expect("region in range");
        region.set_occlusion_data(
            Some(PackedBox::FULL_BOX),
            vec![PackedBox::FULL_BOX],
            false,
        );
    }
    storage
}

fn frame(it: &mut TerrainIterator, storage: &mut RegionStorage<TerrainRegion>, pos: DVec3) {
    it.prepare(pos, forward(), None, config());
    it.run(storage);
}

#[test]
fn region_behind_solid_region_is_culled() {
    let mut storage = walled_storage();
    let mut it = TerrainIterator::new();
    frame(&mut it, &mut storage, CAMERA);

    let visible = it.visible().as_slice();
    assert!(visible.contains(&RegionOrigin::from_chunk(0, 0, 2)));
    assert!(!visible.contains(&RegionOrigin::from_chunk(0, 0, 3)));
}

#[test]
fn disabling_culling_shows_everything_in_range() {
    let mut storage = walled_storage();
    let mut it = TerrainIterator::new();
    it.prepare(
        CAMERA,
        forward(),
        None,
        IterationConfig {
            should_cull: false,
            ..config()
        },
    );
    it.run(&mut storage);
    assert!(it
        .visible()
        .as_slice()
        .contains(&RegionOrigin::from_chunk(0, 0, 3)));
    assert_eq!(it.camera().occluder().raster().coverage(), 0);
}

#[test]
fn visible_list_is_near_to_far() {
    let mut storage = walled_storage();
    let mut it = TerrainIterator::new();
    frame(&mut it, &mut storage, CAMERA);
    let camera = RegionOrigin::from_chunk(0, 0, 0);
    let dists: Vec<i32> = it
        .visible()
        .iter()
        .map(|o| o.squared_chunk_distance(camera))
        .collect();
    assert!(dists.windows(2).all(|w| w[0] <= w[1]), "{dists:?}");
}

#[test]
fn unchanged_frame_recomputes_nothing() {
    let mut storage = walled_storage();
    let mut it = TerrainIterator::new();
    frame(&mut it, &mut storage, CAMERA);
    let version = it.camera().version();
    let visible = it.visible().as_slice().to_vec();
    let counts: Vec<u64> = storage
        .iter()
        .map(|(_, r)| r.position.recompute_count())
        .collect();
    let clears = it.camera().occluder().stats().scene_clears;

    it.reset();
    frame(&mut it, &mut storage, CAMERA);
    assert!(!it.camera_redrawn());
    assert_eq!(it.camera().version(), version);
    assert_eq!(it.visible().as_slice(), visible.as_slice());
    assert_eq!(it.camera().occluder().stats().scene_clears, clears);
    let after: Vec<u64> = storage
        .iter()
        .map(|(_, r)| r.position.recompute_count())
        .collect();
    assert_eq!(counts, after);
}

#[test]
fn invalidation_advances_version_by_one() {
    let mut storage = walled_storage();
    let mut it = TerrainIterator::new();
    frame(&mut it, &mut storage, CAMERA);
    let version = it.camera().version();

    it.invalidate();
    frame(&mut it, &mut storage, CAMERA);
    assert!(it.camera_redrawn());
    assert_eq!(it.camera().version(), version.next());

    // moving within the region redraws once, too
    frame(&mut it, &mut storage, CAMERA + DVec3::new(1.0, 0.0, 0.0));
    assert_eq!(it.camera().version(), version.next().next());
}

#[test]
fn camera_above_world_seeds_top_layer() {
    let mut storage: RegionStorage<TerrainRegion> = RegionStorage::new(3, 0, 1);
    storage.update_camera(RegionOrigin::from_chunk(0, 5, 0));
    let mut it = TerrainIterator::new();
    let look_down = Mat4::perspective_rh_gl(90f32.to_radians(), 2.0, 0.1, 1000.0)
        * Mat4::look_to_rh(Vec3::ZERO, Vec3::NEG_Y, Vec3::Z);
    it.prepare(DVec3::new(8.0, 90.0, 8.0), look_down, None, config());
    it.run(&mut storage);
    assert!(it
        .visible()
        .as_slice()
        .contains(&RegionOrigin::from_chunk(0, 1, 0)));
}

#[test]
fn shadow_walk_collects_casters_by_cascade() {
    let mut storage = walled_storage();
    let mut it = TerrainIterator::new();
    it.prepare(
        CAMERA,
        forward(),
        Some(Vec3::new(0.2, -1.0, 0.3)),
        IterationConfig {
            shadows_enabled: true,
            ..config()
        },
    );
    it.run(&mut storage);
    let shadow = it.shadow_visible();
    assert!(!shadow.is_empty());
    assert!(shadow
        .iter()
        .all(|(o, _)| storage.get(o).is_some_and(|r| r.has_geometry())));
    assert!(shadow.regions_for_cascade(3).count() >= shadow.regions_for_cascade(0).count());
}
