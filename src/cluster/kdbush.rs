/// Static 2D point index answering window and radius queries.
///
/// Points are partitioned in place around alternating x/y medians down to
/// leaf blocks of `node_size`; the index cannot change after construction.
#[derive(Debug, Clone)]
pub struct KdBush {
    ids: Vec<usize>,
    coords: Vec<f64>,
    node_size: usize,
}

impl KdBush {
    /// Indexes `points`, addressing each by its position in the slice.
    pub fn new<T>(
        points: &[T],
        get_x: impl Fn(&T) -> f64,
        get_y: impl Fn(&T) -> f64,
        node_size: usize,
    ) -> Self {
        let mut coords = Vec::with_capacity(points.len() * 2);
        for point in points {
            coords.push(get_x(point));
            coords.push(get_y(point));
        }
        Self::from_coords(coords, node_size)
    }

    /// Indexes interleaved `[x, y]*` coordinates.
    pub fn from_coords(coords: Vec<f64>, node_size: usize) -> Self {
        let count = coords.len() / 2;
        let mut index = Self {
            ids: (0..count).collect(),
            coords,
            node_size: node_size.max(1),
        };
        if count > 0 {
            index.sort(0, count as isize - 1, 0);
        }
        index
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Ids of all points inside the closed box.
    pub fn range(&self, min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Vec<usize> {
        let inside = |x: f64, y: f64| x >= min_x && x <= max_x && y >= min_y && y <= max_y;
        let mut result = Vec::new();
        let mut stack: Vec<(isize, isize, usize)> = vec![(0, self.ids.len() as isize - 1, 0)];

        while let Some((left, right, axis)) = stack.pop() {
            if right - left <= self.node_size as isize {
                for i in left..=right {
                    let (x, y) = self.point(i);
                    if inside(x, y) {
                        result.push(self.ids[i as usize]);
                    }
                }
                continue;
            }

            let m = (left + right) >> 1;
            let (x, y) = self.point(m);
            if inside(x, y) {
                result.push(self.ids[m as usize]);
            }

            let (lo, hi, v) = if axis == 0 { (min_x, max_x, x) } else { (min_y, max_y, y) };
            if lo <= v {
                stack.push((left, m - 1, 1 - axis));
            }
            if hi >= v {
                stack.push((m + 1, right, 1 - axis));
            }
        }
        result
    }

    /// Ids of all points within distance `r` of `(qx, qy)`.
    pub fn within(&self, qx: f64, qy: f64, r: f64) -> Vec<usize> {
        let r2 = r * r;
        let near = |x: f64, y: f64| (x - qx).powi(2) + (y - qy).powi(2) <= r2;
        let mut result = Vec::new();
        let mut stack: Vec<(isize, isize, usize)> = vec![(0, self.ids.len() as isize - 1, 0)];

        while let Some((left, right, axis)) = stack.pop() {
            if right - left <= self.node_size as isize {
                for i in left..=right {
                    let (x, y) = self.point(i);
                    if near(x, y) {
                        result.push(self.ids[i as usize]);
                    }
                }
                continue;
            }

            let m = (left + right) >> 1;
            let (x, y) = self.point(m);
            if near(x, y) {
                result.push(self.ids[m as usize]);
            }

            let (q, v) = if axis == 0 { (qx, x) } else { (qy, y) };
            if q - r <= v {
                stack.push((left, m - 1, 1 - axis));
            }
            if q + r >= v {
                stack.push((m + 1, right, 1 - axis));
            }
        }
        result
    }

    fn point(&self, i: isize) -> (f64, f64) {
        let i = i as usize;
        (self.coords[2 * i], self.coords[2 * i + 1])
    }

    fn value(&self, i: isize, axis: usize) -> f64 {
        self.coords[2 * i as usize + axis]
    }

    fn sort(&mut self, left: isize, right: isize, axis: usize) {
        if right - left <= self.node_size as isize {
            return;
        }
        let m = (left + right) >> 1;
        self.select(m, left, right, axis);
        self.sort(left, m - 1, 1 - axis);
        self.sort(m + 1, right, 1 - axis);
    }

    /// Floyd-Rivest selection: rearranges `[left, right]` so that item `k`
    /// holds the k-th smallest value along `axis`.
    fn select(&mut self, k: isize, mut left: isize, mut right: isize, axis: usize) {
        while right > left {
            if right - left > 600 {
                let n = (right - left + 1) as f64;
                let m = (k - left + 1) as f64;
                let z = n.ln();
                let s = 0.5 * (2.0 * z / 3.0).exp();
                let sign = if m - n / 2.0 < 0.0 { -1.0 } else { 1.0 };
                let sd = 0.5 * (z * s * (n - s) / n).sqrt() * sign;
                let new_left = left.max((k as f64 - m * s / n + sd).floor() as isize);
                let new_right = right.min((k as f64 + (n - m) * s / n + sd).floor() as isize);
                self.select(k, new_left, new_right, axis);
            }

            let t = self.value(k, axis);
            let mut i = left;
            let mut j = right;

            self.swap_item(left, k);
            if self.value(right, axis) > t {
                self.swap_item(left, right);
            }

            while i < j {
                self.swap_item(i, j);
                i += 1;
                j -= 1;
                while self.value(i, axis) < t {
                    i += 1;
                }
                while self.value(j, axis) > t {
                    j -= 1;
                }
            }

            if self.value(left, axis) == t {
                self.swap_item(left, j);
            } else {
                j += 1;
                self.swap_item(j, right);
            }

            if j <= k {
                left = j + 1;
            }
            if k <= j {
                right = j - 1;
            }
        }
    }

    fn swap_item(&mut self, i: isize, j: isize) {
        let (i, j) = (i as usize, j as usize);
        self.ids.swap(i, j);
        self.coords.swap(2 * i, 2 * j);
        self.coords.swap(2 * i + 1, 2 * j + 1);
    }
}
