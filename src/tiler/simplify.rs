use crate::tiler::types::STRIDE;

/// Weighted Douglas-Peucker over a `[x, y, weight]*` buffer.
///
/// `first` and `last` are offsets of the two fixed endpoints. Every kept
/// vertex between them gets its squared distance from the chord written to
/// its weight slot, so a single run serves every zoom: a vertex survives at
/// squared tolerance `t` when its weight exceeds `t`.
pub fn simplify(coords: &mut [f64], first: usize, last: usize, sq_tolerance: f64) {
    let mut stack = vec![(first, last)];
    while let Some((first, last)) = stack.pop() {
        let mut max_sq_dist = sq_tolerance;
        let mid = first + (last - first) / 2;
        let mut min_pos_to_mid = last - first;
        let mut index = None;

        let (ax, ay) = (coords[first], coords[first + 1]);
        let (bx, by) = (coords[last], coords[last + 1]);

        let mut i = first + STRIDE;
        while i < last {
            let d = sq_seg_dist(coords[i], coords[i + 1], ax, ay, bx, by);
            if d > max_sq_dist {
                index = Some(i);
                max_sq_dist = d;
            } else if d == max_sq_dist {
                // Ties go to the vertex nearest the middle to keep splits balanced.
                let pos_to_mid = i.abs_diff(mid);
                if pos_to_mid < min_pos_to_mid {
                    index = Some(i);
                    min_pos_to_mid = pos_to_mid;
                }
            }
            i += STRIDE;
        }

        if let Some(index) = index.filter(|_| max_sq_dist > sq_tolerance) {
            coords[index + 2] = max_sq_dist;
            if index - first > STRIDE {
                stack.push((first, index));
            }
            if last - index > STRIDE {
                stack.push((index, last));
            }
        }
    }
}

/// Squared distance from a point to a segment.
fn sq_seg_dist(px: f64, py: f64, ax: f64, ay: f64, bx: f64, by: f64) -> f64 {
    let (mut x, mut y) = (ax, ay);
    let mut dx = bx - ax;
    let mut dy = by - ay;

    if dx != 0.0 || dy != 0.0 {
        let t = ((px - x) * dx + (py - y) * dy) / (dx * dx + dy * dy);
        if t > 1.0 {
            x = bx;
            y = by;
        } else if t > 0.0 {
            x += dx * t;
            y += dy * t;
        }
    }

    dx = px - x;
    dy = py - y;
    dx * dx + dy * dy
}
