//! Tolerance-based point coincidence via a uniform spatial hash.
//!
//! Points are bucketed by quantized position; a lookup only inspects the 27
//! cells around the query, so building the map over `n` points stays close to
//! linear instead of the quadratic all-pairs comparison.

use std::collections::HashMap;

use nalgebra::Point3;

type CellKey = (i64, i64, i64);

#[derive(Debug)]
pub struct PointIndex {
    tol: f64,
    cell_size: f64,
    cells: HashMap<CellKey, Vec<usize>>,
    points: Vec<Point3<f64>>,
}

impl PointIndex {
    pub fn new(tol: f64) -> PointIndex {
        PointIndex {
            tol,
            cell_size: tol.max(f64::MIN_POSITIVE),
            cells: HashMap::new(),
            points: Vec::new(),
        }
    }

    fn key(&self, p: &Point3<f64>) -> CellKey {
        (
            (p.x / self.cell_size).floor() as i64,
            (p.y / self.cell_size).floor() as i64,
            (p.z / self.cell_size).floor() as i64,
        )
    }

    /// Index of a previously inserted point within tolerance of `p`. The
    /// earliest inserted candidate wins so results do not depend on hash order.
    pub fn find(&self, p: &Point3<f64>) -> Option<usize> {
        let (kx, ky, kz) = self.key(p);
        let mut best: Option<usize> = None;
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let Some(bucket) = self.cells.get(&(kx + dx, ky + dy, kz + dz)) else {
                        continue;
                    };
                    for &idx in bucket {
                        if (self.points[idx] - p).norm() <= self.tol
                            && best.map_or(true, |b| idx < b)
                        {
                            best = Some(idx);
                        }
                    }
                }
            }
        }
        best
    }

    /// Returns the index of the coincident point, inserting `p` if none exists.
    pub fn find_or_insert(&mut self, p: Point3<f64>) -> usize {
        if let Some(idx) = self.find(&p) {
            return idx;
        }
        let idx = self.points.len();
        let key = self.key(&p);
        self.points.push(p);
        self.cells.entry(key).or_default().push(idx);
        idx
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Point3<f64>] {
        &self.points
    }
}

/// Maps every point of a pool onto the first coincident point in pool order,
/// and numbers the survivors contiguously.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoincidenceMap {
    /// Pool index -> canonical pool index
    pub ind_map: Vec<usize>,
    /// Pool index -> 0-based export index; `None` for merged-away points
    pub shift: Vec<Option<usize>>,
    pub num_unique: usize,
}

impl CoincidenceMap {
    pub fn build(points: &[Point3<f64>], tol: f64) -> CoincidenceMap {
        let mut index = PointIndex::new(tol);
        let mut unique_to_pool: Vec<usize> = Vec::new();
        let mut ind_map = Vec::with_capacity(points.len());
        let mut shift = Vec::with_capacity(points.len());

        for (i, p) in points.iter().enumerate() {
            let unique = index.find_or_insert(*p);
            if unique == unique_to_pool.len() {
                unique_to_pool.push(i);
                shift.push(Some(unique));
            } else {
                shift.push(None);
            }
            ind_map.push(unique_to_pool[unique]);
        }

        CoincidenceMap {
            ind_map,
            shift,
            num_unique: unique_to_pool.len(),
        }
    }

    pub fn canonical(&self, pool_index: usize) -> usize {
        self.ind_map[pool_index]
    }

    /// 1-based node id of any pool point, resolved through its canonical point.
    pub fn node_id(&self, pool_index: usize) -> usize {
        self.shift[self.canonical(pool_index)].map_or(0, |s| s + 1)
    }

    pub fn is_unique(&self, pool_index: usize) -> bool {
        self.shift[pool_index].is_some()
    }
}
