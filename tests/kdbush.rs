use vt_tiler::cluster::KdBush;

/// Deterministic scatter over the unit square.
fn scatter(count: usize) -> Vec<(f64, f64)> {
    let mut state = 0x2545_f491_u64;
    let mut next = || {
        state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
        (state >> 11) as f64 / (1u64 << 53) as f64
    };
    (0..count).map(|_| (next(), next())).collect()
}

fn sorted(mut ids: Vec<usize>) -> Vec<usize> {
    ids.sort_unstable();
    ids
}

#[test]
fn range_matches_brute_force() {
    let points = scatter(2000);
    let index = KdBush::new(&points, |p| p.0, |p| p.1, 16);
    assert_eq!(index.len(), points.len());

    for &(min_x, min_y, max_x, max_y) in &[
        (0.2, 0.3, 0.4, 0.5),
        (0.0, 0.0, 1.0, 1.0),
        (0.9, 0.9, 0.95, 0.91),
        (0.5, 0.5, 0.5, 0.5),
    ] {
        let expected: Vec<usize> = points
            .iter()
            .enumerate()
            .filter(|(_, p)| p.0 >= min_x && p.0 <= max_x && p.1 >= min_y && p.1 <= max_y)
            .map(|(id, _)| id)
            .collect();
        assert_eq!(sorted(index.range(min_x, min_y, max_x, max_y)), expected);
    }
}

#[test]
fn within_matches_brute_force() {
    let points = scatter(2000);
    let index = KdBush::new(&points, |p| p.0, |p| p.1, 64);

    for &(qx, qy, r) in &[(0.5, 0.5, 0.1), (0.0, 0.0, 0.3), (0.7, 0.2, 0.01)] {
        let expected: Vec<usize> = points
            .iter()
            .enumerate()
            .filter(|(_, p)| (p.0 - qx).powi(2) + (p.1 - qy).powi(2) <= r * r)
            .map(|(id, _)| id)
            .collect();
        assert_eq!(sorted(index.within(qx, qy, r)), expected);
    }
}

#[test]
fn empty_index_answers_nothing() {
    let index = KdBush::from_coords(Vec::new(), 64);
    assert!(index.is_empty());
    assert!(index.range(0.0, 0.0, 1.0, 1.0).is_empty());
    assert!(index.within(0.5, 0.5, 1.0).is_empty());
}

#[test]
fn duplicate_points_are_all_returned() {
    let coords = vec![0.5; 2 * 100];
    let index = KdBush::from_coords(coords, 4);
    assert_eq!(sorted(index.range(0.4, 0.4, 0.6, 0.6)), (0..100).collect::<Vec<_>>());
    assert_eq!(index.within(0.5, 0.5, 0.0).len(), 100);
}
