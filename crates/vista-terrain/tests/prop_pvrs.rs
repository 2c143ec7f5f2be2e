use proptest::prelude::*;
use vista_geom::RegionOrigin;
use vista_terrain::PotentiallyVisibleRegionSet;

fn arb_entries() -> impl Strategy<Value = Vec<((i32, i32), usize)>> {
    prop::collection::vec(((-4i32..4, -4i32..4), 0usize..40), 0..64)
}

proptest! {
    // Draining yields each region once, nearest bucket first, insertion order within a bucket
    #[test]
    fn drains_in_rank_order(entries in arb_entries()) {
        let mut set = PotentiallyVisibleRegionSet::new();
        let mut expected: Vec<(usize, usize, RegionOrigin)> = Vec::new();
        for (seq, ((x, z), rank)) in entries.into_iter().enumerate() {
            let origin = RegionOrigin::from_chunk(x, 0, z);
            if set.add(origin, rank) {
                expected.push((rank, seq, origin));
            }
        }
        expected.sort();
        let mut drained = Vec::new();
        while let Some(o) = set.next() {
            drained.push(o);
        }
        prop_assert_eq!(drained.len(), set.len());
        let expected: Vec<RegionOrigin> = expected.into_iter().map(|(_, _, o)| o).collect();
        prop_assert_eq!(drained, expected);
    }

    // Adds behind the cursor are still handed out
    #[test]
    fn late_low_ranks_are_not_skipped(first in 5usize..20, late in 0usize..5) {
        let mut set = PotentiallyVisibleRegionSet::new();
        set.add(RegionOrigin::from_chunk(0, 0, 0), first);
        prop_assert_eq!(set.next(), Some(RegionOrigin::from_chunk(0, 0, 0)));
        set.add(RegionOrigin::from_chunk(1, 0, 0), late);
        prop_assert_eq!(set.next(), Some(RegionOrigin::from_chunk(1, 0, 0)));
        prop_assert_eq!(set.next(), None);
    }

    // Rewinding replays the same order without a new version
    #[test]
    fn return_to_start_replays(entries in arb_entries()) {
        let mut set = PotentiallyVisibleRegionSet::new();
        for ((x, z), rank) in entries {
            set.add(RegionOrigin::from_chunk(x, 0, z), rank);
        }
        let version = set.version();
        let mut first = Vec::new();
        while let Some(o) = set.next() {
            first.push(o);
        }
        set.return_to_start();
        let mut second = Vec::new();
        while let Some(o) = set.next() {
            second.push(o);
        }
        prop_assert_eq!(first, second);
        prop_assert_eq!(set.version(), version);
    }
}
