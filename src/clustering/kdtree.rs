//! Static 2D kd-tree over projected points
//!
//! Built once, then answers rectangle and radius queries. Coordinates are
//! stored interleaved (`x0, y0, x1, y1, ...`) and partially sorted in place,
//! splitting alternately on x and y until a leaf holds at most `node_size`
//! entries.

#[derive(Debug, Clone)]
pub struct KdTree {
    node_size: usize,
    ids: Vec<usize>,
    coords: Vec<f64>,
}

impl KdTree {
    /// Index `points`; the returned ids are positions in the input
    pub fn new<I>(points: I, node_size: usize) -> Self
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let mut ids = Vec::new();
        let mut coords = Vec::new();
        for (i, (x, y)) in points.into_iter().enumerate() {
            ids.push(i);
            coords.push(x);
            coords.push(y);
        }

        let mut tree = Self {
            node_size: node_size.max(1),
            ids,
            coords,
        };
        if !tree.ids.is_empty() {
            let right = tree.last();
            tree.sort(0, right, 0);
        }
        tree
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    fn last(&self) -> isize {
        self.ids.len() as isize - 1
    }

    fn coord(&self, index: isize, axis: usize) -> f64 {
        self.coords[2 * index as usize + axis]
    }

    fn point(&self, index: isize) -> (f64, f64) {
        (self.coord(index, 0), self.coord(index, 1))
    }

    fn sort(&mut self, left: isize, right: isize, axis: usize) {
        if right - left <= self.node_size as isize {
            return;
        }
        let middle = (left + right) >> 1;
        self.select(middle, left, right, axis);
        self.sort(left, middle - 1, 1 - axis);
        self.sort(middle + 1, right, 1 - axis);
    }

    /// Floyd-Rivest selection: afterwards `k` holds the element that would be
    /// there if `left..=right` were sorted on `axis`
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

            let pivot = self.coord(k, axis);
            let mut i = left;
            let mut j = right;

            self.swap_item(left, k);
            if self.coord(right, axis) > pivot {
                self.swap_item(left, right);
            }

            while i < j {
                self.swap_item(i, j);
                i += 1;
                j -= 1;
                while self.coord(i, axis) < pivot {
                    i += 1;
                }
                while self.coord(j, axis) > pivot {
                    j -= 1;
                }
            }

            if self.coord(left, axis) == pivot {
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

    /// Ids of all points inside the closed rectangle
    #[must_use]
    pub fn range(&self, min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Vec<usize> {
        let inside = |(x, y): (f64, f64)| x >= min_x && x <= max_x && y >= min_y && y <= max_y;
        self.search(inside, |axis, (x, y)| {
            if axis == 0 {
                (min_x <= x, max_x >= x)
            } else {
                (min_y <= y, max_y >= y)
            }
        })
    }

    /// Ids of all points within Euclidean distance `radius` of `(qx, qy)`
    #[must_use]
    pub fn within(&self, qx: f64, qy: f64, radius: f64) -> Vec<usize> {
        let r2 = radius * radius;
        let inside = |(x, y): (f64, f64)| {
            let dx = x - qx;
            let dy = y - qy;
            dx * dx + dy * dy <= r2
        };
        self.search(inside, |axis, (x, y)| {
            if axis == 0 {
                (qx - radius <= x, qx + radius >= x)
            } else {
                (qy - radius <= y, qy + radius >= y)
            }
        })
    }

    /// Depth-first walk; `descend` says whether the left and right halves of
    /// a split can contain matches
    fn search<F, D>(&self, inside: F, descend: D) -> Vec<usize>
    where
        F: Fn((f64, f64)) -> bool,
        D: Fn(usize, (f64, f64)) -> (bool, bool),
    {
        let mut result = Vec::new();
        if self.ids.is_empty() {
            return result;
        }

        let mut stack: Vec<(isize, isize, usize)> = vec![(0, self.last(), 0)];
        while let Some((left, right, axis)) = stack.pop() {
            if right - left <= self.node_size as isize {
                for i in left..=right {
                    if inside(self.point(i)) {
                        result.push(self.ids[i as usize]);
                    }
                }
                continue;
            }

            let middle = (left + right) >> 1;
            let split = self.point(middle);
            if inside(split) {
                result.push(self.ids[middle as usize]);
            }

            let (go_left, go_right) = descend(axis, split);
            if go_left {
                stack.push((left, middle - 1, 1 - axis));
            }
            if go_right {
                stack.push((middle + 1, right, 1 - axis));
            }
        }
        result
    }
}
