use proptest::prelude::*;
use vista_geom::{Face, REGION_SIZE, RegionOrigin};

fn block() -> impl Strategy<Value = i32> {
    -30_000_000i32..30_000_000
}

fn small_chunk() -> impl Strategy<Value = i32> {
    -4096i32..4096
}

proptest! {
    // The containing region always contains the block and is 16-aligned
    #[test]
    fn containing_block_contains(x in block(), y in -2048i32..2048, z in block()) {
        let o = RegionOrigin::containing_block(x, y, z);
        prop_assert!(o.contains_block(x, y, z));
        prop_assert_eq!(o.x().rem_euclid(REGION_SIZE), 0);
        prop_assert_eq!(o.y().rem_euclid(REGION_SIZE), 0);
        prop_assert_eq!(o.z().rem_euclid(REGION_SIZE), 0);
        prop_assert!(x - o.x() >= 0 && x - o.x() < REGION_SIZE);
    }

    // Chunk distance is symmetric and zero only on identity
    #[test]
    fn chunk_distance_symmetric(
        ax in small_chunk(), ay in small_chunk(), az in small_chunk(),
        bx in small_chunk(), by in small_chunk(), bz in small_chunk(),
    ) {
        let a = RegionOrigin::from_chunk(ax, ay, az);
        let b = RegionOrigin::from_chunk(bx, by, bz);
        prop_assert_eq!(a.squared_chunk_distance(b), b.squared_chunk_distance(a));
        prop_assert_eq!(a.squared_chunk_distance(b) == 0, a == b);
    }

    // Stepping through a face and back returns to the start, one chunk away
    #[test]
    fn neighbor_round_trip(cx in small_chunk(), cy in small_chunk(), cz in small_chunk(), f in 0usize..6) {
        let face = Face::ALL[f];
        let o = RegionOrigin::from_chunk(cx, cy, cz);
        let n = o.neighbor(face);
        prop_assert_eq!(o.squared_chunk_distance(n), 1);
        prop_assert_eq!(n.neighbor(face.opposite()), o);
    }
}
