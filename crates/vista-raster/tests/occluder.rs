use glam::{DVec3, Mat4, Vec3};
use vista_geom::{PackedBox, RegionOrigin};
use vista_raster::Occluder;

/// 90° vertical fov at the raster's 2:1 aspect, looking down +z.
fn view_proj_looking_z() -> Mat4 {
    let proj = Mat4::perspective_rh_gl(90f32.to_radians(), 2.0, 0.1, 1000.0);
    let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::Z, Vec3::Y);
    proj * view
}

fn occluder_at(camera: DVec3) -> Occluder {
    let mut occ = Occluder::new();
    occ.set_view(camera, view_proj_looking_z());
    assert!(occ.prepare_scene());
    occ
}

fn region(cx: i32, cy: i32, cz: i32) -> RegionOrigin {
    RegionOrigin::from_chunk(cx, cy, cz)
}

#[test]
fn region_behind_drawn_cube_is_hidden() {
    let mut occ = occluder_at(DVec3::new(8.0, 8.0, -40.0));

    occ.prepare_region(region(0, 0, 1), PackedBox::RANGE_NEAR);
    assert!(occ.is_box_visible(PackedBox::FULL_BOX, 0), "empty raster hides nothing");

    occ.prepare_region(region(0, 0, 0), PackedBox::RANGE_NEAR);
    assert!(occ.is_box_visible(PackedBox::FULL_BOX, 0));
    occ.occlude(&[PackedBox::FULL_BOX]);
    assert!(occ.raster().coverage() > 0);

    occ.prepare_region(region(0, 0, 1), PackedBox::RANGE_NEAR);
    assert!(!occ.is_box_visible(PackedBox::FULL_BOX, 0));
    assert!(!occ.is_empty_region_visible(region(0, 0, 1), 0));

    // Nearer than the occluder: projects larger than the covered area.
    occ.prepare_region(region(0, 0, -1), PackedBox::RANGE_NEAR);
    assert!(occ.is_box_visible(PackedBox::FULL_BOX, 0));
}

#[test]
fn fuzz_widens_the_tested_rectangle() {
    let mut occ = occluder_at(DVec3::new(8.0, 8.0, -40.0));
    occ.prepare_region(region(0, 0, 0), PackedBox::RANGE_NEAR);
    occ.occlude(&[PackedBox::FULL_BOX]);

    occ.prepare_region(region(0, 0, 1), PackedBox::RANGE_NEAR);
    assert!(!occ.is_box_visible(PackedBox::FULL_BOX, 0));
    assert!(occ.is_box_visible(PackedBox::FULL_BOX, 10));
}

#[test]
fn boxes_below_region_range_are_skipped() {
    let mut occ = occluder_at(DVec3::new(8.0, 8.0, -40.0));
    occ.prepare_region(region(0, 0, 0), PackedBox::RANGE_FAR);
    occ.occlude(&[PackedBox::FULL_BOX.with_range(PackedBox::RANGE_MID)]);
    assert!(occ.raster().is_empty());
    assert_eq!(occ.stats().boxes_skipped_by_range, 1);

    occ.occlude(&[PackedBox::FULL_BOX.with_range(PackedBox::RANGE_FAR)]);
    assert!(!occ.raster().is_empty());
}

#[test]
fn off_screen_box_is_not_visible_and_draws_nothing() {
    let mut occ = occluder_at(DVec3::new(8.0, 8.0, -40.0));
    occ.prepare_region(region(10, 0, 0), PackedBox::RANGE_NEAR);
    assert!(!occ.is_box_visible(PackedBox::FULL_BOX, 0));
    occ.occlude(&[PackedBox::FULL_BOX]);
    assert!(occ.raster().is_empty());
}

#[test]
fn box_behind_camera_draws_nothing() {
    let mut occ = occluder_at(DVec3::new(8.0, 8.0, -40.0));
    let before = occ.raster_snapshot();
    occ.prepare_region(region(0, 0, -5), PackedBox::RANGE_NEAR);
    occ.occlude(&[PackedBox::FULL_BOX]);
    assert_eq!(occ.raster_snapshot(), before);
}

#[test]
fn camera_inside_box_is_visible() {
    let mut occ = occluder_at(DVec3::new(8.0, 8.0, 8.0));
    occ.prepare_region(region(0, 0, 0), PackedBox::RANGE_NEAR);
    assert!(occ.is_box_visible(PackedBox::FULL_BOX, 0));
}

#[test]
fn guard_band_overflow_is_clipped() {
    // A thin wall two blocks ahead spills past the vertical guard band.
    let mut occ = occluder_at(DVec3::new(8.0, 8.0, 10.0));
    occ.prepare_region(region(0, 0, 0), PackedBox::RANGE_NEAR);
    occ.occlude(&[PackedBox::new(0, 0, 12, 16, 16, 13, PackedBox::RANGE_EXTREME)]);
    assert!(occ.stats().triangles_clipped > 0);

    occ.prepare_region(region(0, 0, 1), PackedBox::RANGE_NEAR);
    assert!(!occ.is_box_visible(PackedBox::FULL_BOX, 0));
}

#[test]
fn near_plane_straddling_face_is_clipped() {
    let mut occ = occluder_at(DVec3::new(8.0, 8.0, 8.0));
    occ.prepare_region(region(0, 0, 0), PackedBox::RANGE_NEAR);
    occ.occlude(&[PackedBox::new(10, 0, 4, 16, 16, 14, PackedBox::RANGE_EXTREME)]);
    assert!(occ.stats().triangles_clipped > 0);
    assert!(occ.raster().coverage() > 0);
}

#[test]
fn view_change_schedules_redraw() {
    let mut occ = occluder_at(DVec3::new(8.0, 8.0, -40.0));
    assert!(!occ.prepare_scene());
    assert!(!occ.set_view(DVec3::new(8.0, 8.0, -40.0), view_proj_looking_z()));
    assert!(!occ.prepare_scene());
    assert!(occ.set_view(DVec3::new(8.0, 8.5, -40.0), view_proj_looking_z()));
    assert!(occ.prepare_scene());
    occ.invalidate();
    assert!(occ.prepare_scene());
}
