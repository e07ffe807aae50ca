use vt_tiler::tiler::{STRIDE, simplify};

fn zigzag(count: usize) -> Vec<f64> {
    let mut coords = Vec::with_capacity(count * STRIDE);
    for i in 0..count {
        let x = i as f64 / count as f64;
        let wobble = ((i * 7919) % 13) as f64 / 13.0 - 0.5;
        coords.extend_from_slice(&[x, 0.5 + wobble * 0.01 * (1.0 + (i % 3) as f64), 0.0]);
    }
    let last = coords.len() - STRIDE;
    coords[2] = 1.0;
    coords[last + 2] = 1.0;
    coords
}

fn kept(coords: &[f64], sq_tolerance: f64) -> Vec<usize> {
    coords
        .chunks_exact(STRIDE)
        .enumerate()
        .filter(|(_, vertex)| vertex[2] > sq_tolerance)
        .map(|(index, _)| index)
        .collect()
}

#[test]
fn coarser_tolerance_keeps_a_subset() {
    let mut coords = zigzag(200);
    let last = coords.len() - STRIDE;
    simplify(&mut coords, 0, last, 0.0);

    let fine = kept(&coords, 1e-7);
    let coarse = kept(&coords, 1e-5);
    assert!(coarse.len() <= fine.len());
    assert!(coarse.iter().all(|index| fine.contains(index)));
    assert!(coarse.contains(&0) && coarse.contains(&199));
}

#[test]
fn endpoints_always_survive() {
    let mut coords = zigzag(50);
    let last = coords.len() - STRIDE;
    simplify(&mut coords, 0, last, 0.0);

    let coarse = kept(&coords, 0.5);
    assert_eq!(coarse, vec![0, 49]);
}

#[test]
fn collinear_points_get_no_weight() {
    let mut coords = vec![0.0, 0.0, 1.0, 0.5, 0.0, 0.0, 1.0, 0.0, 1.0];
    simplify(&mut coords, 0, 6, 0.0);
    assert_eq!(coords[5], 0.0);
}

#[test]
fn farthest_vertex_records_its_distance() {
    let mut coords = vec![0.0, 0.0, 1.0, 0.5, 0.5, 0.0, 1.0, 0.0, 1.0];
    simplify(&mut coords, 0, 6, 0.0);
    assert!((coords[5] - 0.25).abs() < 1e-12);
}
