use proptest::prelude::*;
use vista_cluster::{
    BYTES_PER_SLAB_VERTEX, BufferSynchronizer, RecordingGfx, SlabAllocator, VertexCluster,
    VertexClusterRealm,
};
use vista_geom::RegionOrigin;

fn region_sizes() -> impl Strategy<Value = Vec<u32>> {
    prop::collection::vec((0u32..2500).prop_map(|q| q * 4), 1..12)
}

proptest! {
    // Releasing everything returns accounting to zero and shuts every slab down
    #[test]
    fn release_all_returns_to_zero(sizes in region_sizes(), order in any::<u64>()) {
        let mut gfx = RecordingGfx::new();
        let mut slabs = SlabAllocator::new();
        let mut sync = BufferSynchronizer::new();
        let mut cluster = VertexCluster::new(VertexClusterRealm::Solid);

        let mut handles = Vec::new();
        let mut total = 0usize;
        for (i, &n) in sizes.iter().enumerate() {
            let data = vec![0u8; n as usize * BYTES_PER_SLAB_VERTEX];
            let h = cluster
                .upload(&mut gfx, &mut slabs, RegionOrigin::from_chunk(i as i32, 0, 0), &data)
                .unwrap();
            prop_assert_eq!(cluster.get(h).unwrap().quad_vertex_count(), n);
            handles.push(h);
            total += n as usize;
        }
        prop_assert_eq!(slabs.used_bytes(), total * BYTES_PER_SLAB_VERTEX);
        prop_assert!(slabs.used_bytes() <= slabs.capacity_bytes());

        // deterministic shuffle driven by the generated seed
        let len = handles.len();
        for i in 0..len {
            let j = (order.rotate_left(i as u32) as usize) % len;
            handles.swap(i, j);
        }
        for h in handles {
            prop_assert!(cluster.release(h, &mut slabs, &mut sync));
            for slab in cluster.slabs() {
                prop_assert!(slab.used_vertex_count() > 0);
            }
        }
        prop_assert_eq!(slabs.used_bytes(), 0);
        prop_assert_eq!(slabs.slab_count(), 0);
        prop_assert_eq!(slabs.capacity_bytes(), 0);

        sync.shutdown(&mut gfx);
        prop_assert_eq!(gfx.live_buffers(), 0);
    }
}
