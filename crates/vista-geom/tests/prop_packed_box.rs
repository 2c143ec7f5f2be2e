use proptest::prelude::*;
use vista_geom::PackedBox;

fn coord_pair() -> impl Strategy<Value = (u8, u8)> {
    (0u8..=16, 0u8..=16).prop_map(|(a, b)| (a.min(b), a.max(b)))
}

fn arb_box() -> impl Strategy<Value = PackedBox> {
    (coord_pair(), coord_pair(), coord_pair(), 0u8..=3).prop_map(|((x0, x1), (y0, y1), (z0, z1), r)| {
        PackedBox::new(x0, y0, z0, x1, y1, z1, r)
    })
}

proptest! {
    // Every field survives packing untouched
    #[test]
    fn fields_are_independent(
        (x0, x1) in coord_pair(),
        (y0, y1) in coord_pair(),
        (z0, z1) in coord_pair(),
        r in 0u8..=3,
    ) {
        let b = PackedBox::new(x0, y0, z0, x1, y1, z1, r);
        prop_assert_eq!((b.x0(), b.y0(), b.z0()), (x0, y0, z0));
        prop_assert_eq!((b.x1(), b.y1(), b.z1()), (x1, y1, z1));
        prop_assert_eq!(b.range(), r);
    }

    // Union contains both operands
    #[test]
    fn union_contains_operands(a in arb_box(), b in arb_box()) {
        let u = a.union(b);
        for x in [a, b] {
            prop_assert!(u.x0() <= x.x0() && u.y0() <= x.y0() && u.z0() <= x.z0());
            prop_assert!(u.x1() >= x.x1() && u.y1() >= x.y1() && u.z1() >= x.z1());
            prop_assert!(u.range() >= x.range());
        }
    }

    // Range classification never decreases with distance
    #[test]
    fn range_monotonic_in_distance(d in 0i32..2048, step in 0i32..512) {
        prop_assert!(
            PackedBox::range_from_square_chunk_dist(d)
                <= PackedBox::range_from_square_chunk_dist(d + step)
        );
    }

    // Empty boxes have zero volume; others the product of extents
    #[test]
    fn volume_matches_extents(b in arb_box()) {
        let expected = if b.is_empty() {
            0
        } else {
            u32::from(b.x1() - b.x0()) * u32::from(b.y1() - b.y0()) * u32::from(b.z1() - b.z0())
        };
        prop_assert_eq!(b.volume(), expected);
    }
}
