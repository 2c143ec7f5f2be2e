use std::hint::black_box;
use std::time::Duration;

use criterion::{Criterion, criterion_group, criterion_main};
use glam::{DVec3, Mat4, Vec3};
use vista_geom::{PackedBox, RegionOrigin};
use vista_raster::{Occluder, ProjectedVertex, RasterContext, TileRaster};

fn bench_large_triangle(c: &mut Criterion) {
    let mut group = c.benchmark_group("rasterize_triangle");
    let mut ctx = RasterContext::new();
    let mut raster = TileRaster::new();
    ctx.push_vertex(ProjectedVertex::new(100, 200));
    ctx.push_vertex(ProjectedVertex::new(8000, 900));
    ctx.push_vertex(ProjectedVertex::new(3000, 4000));
    group.bench_function("half_screen", |b| {
        b.iter(|| {
            raster.clear();
            let _ = ctx.prepare_bounds(0, 1, 2);
            ctx.prepare_scan();
            raster.fill_triangle(&ctx);
            black_box(raster.coverage());
        })
    });
    group.finish();
}

fn bench_region_grid(c: &mut Criterion) {
    let mut group = c.benchmark_group("occlude_region_grid");
    group.measurement_time(Duration::from_secs(5));
    let proj = Mat4::perspective_rh_gl(70f32.to_radians(), 2.0, 0.1, 1000.0);
    let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::new(0.3, -0.2, 1.0), Vec3::Y);
    let mut occ = Occluder::new();
    group.bench_function("16x16_full_boxes", |b| {
        b.iter(|| {
            occ.set_view(DVec3::new(8.0, 40.0, -20.0), proj * view);
            occ.invalidate();
            occ.prepare_scene();
            for cz in 0..16 {
                for cx in -8..8 {
                    let origin = RegionOrigin::from_chunk(cx, 0, cz);
                    occ.prepare_region(origin, PackedBox::RANGE_NEAR);
                    if occ.is_box_visible(PackedBox::FULL_BOX, 0) {
                        occ.occlude(&[PackedBox::FULL_BOX]);
                    }
                }
            }
            black_box(occ.stats());
        })
    });
    group.finish();
}

criterion_group!(benches, bench_large_triangle, bench_region_grid);
criterion_main!(benches);
