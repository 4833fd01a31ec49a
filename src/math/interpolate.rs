use ndarray::Array2;
use num_traits::Float;

/// Generic linear interpolation between two values.
pub fn lin_interp<T: Float>(v0: T, v1: T, fac: T) -> T {
    v0 + (v1 - v0) * fac
}

/// Bilinear interpolation between four corner values using two factors.
pub fn bilin_interp<T: Float>(f00: T, f01: T, f10: T, f11: T, fac_x: T, fac_y: T) -> T {
    let f_y0 = lin_interp(f00, f10, fac_x);
    let f_y1 = lin_interp(f01, f11, fac_x);
    lin_interp(f_y0, f_y1, fac_y)
}

/// Tolerance for treating a requested coordinate as lying exactly on a
/// grid line.
pub const GRID_EPS: f64 = 1e-6;

/// One axis of a bilinear lookup: the two bracketing grid indices and the
/// weight attached to the `lower` index. A point on a grid node
/// degenerates to `lower == upper` with weight 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisBracket {
    pub lower: usize,
    pub upper: usize,
    pub weight: f64,
}

impl AxisBracket {
    fn node(index: usize) -> Self {
        Self {
            lower: index,
            upper: index,
            weight: 1.0,
        }
    }
}

/// Locate the two grid values surrounding `x` on a monotonic axis.
/// The axis may run in either direction (latitudes are stored N-to-S by
/// some providers and S-to-N by others). A coordinate outside the axis
/// extent clamps to the boundary node.
pub fn bracket_axis(axis: &[f64], x: f64) -> Option<AxisBracket> {
    if axis.is_empty() {
        return None;
    }
    if let Some(i) = exact_index(axis, x) {
        return Some(AxisBracket::node(i));
    }

    let ascending = axis.len() < 2 || axis[0] <= axis[axis.len() - 1];
    let (first, last) = (axis[0], axis[axis.len() - 1]);
    let (min, max) = if ascending { (first, last) } else { (last, first) };
    if x <= min {
        let i = if ascending { 0 } else { axis.len() - 1 };
        return Some(AxisBracket::node(i));
    }
    if x >= max {
        let i = if ascending { axis.len() - 1 } else { 0 };
        return Some(AxisBracket::node(i));
    }

    for w in 0..axis.len() - 1 {
        let (a, b) = (axis[w], axis[w + 1]);
        let inside = if ascending { a < x && x < b } else { b < x && x < a };
        if inside {
            // weight on the lower index: (upper - x) / (upper - lower)
            let weight = (b - x) / (b - a);
            return Some(AxisBracket {
                lower: w,
                upper: w + 1,
                weight,
            });
        }
    }
    None
}

/// Index of the grid value equal to `x` (within tolerance), if any.
pub fn exact_index(axis: &[f64], x: f64) -> Option<usize> {
    axis.iter().position(|&a| (a - x).abs() < GRID_EPS)
}

/// The four surrounding cells of a requested point on one hour's grid,
/// with bilinear weights that sum to 1.
#[derive(Debug, Clone, Copy)]
pub struct CellWeights {
    pub lat: AxisBracket,
    pub lon: AxisBracket,
}

impl CellWeights {
    /// Resolve a geographic point against grid axis vectors.
    pub fn resolve(lats: &[f64], lons: &[f64], lat0: f64, lon0: f64) -> Option<Self> {
        Some(Self {
            lat: bracket_axis(lats, lat0)?,
            lon: bracket_axis(lons, lon0)?,
        })
    }

    /// Weighted value over the four surrounding cells of a
    /// `[latitude-row, longitude-col]` frame.
    pub fn apply(&self, frame: &Array2<f64>) -> f64 {
        let (la, lo) = (&self.lat, &self.lon);
        la.weight * lo.weight * frame[[la.lower, lo.lower]]
            + (1.0 - la.weight) * lo.weight * frame[[la.upper, lo.lower]]
            + la.weight * (1.0 - lo.weight) * frame[[la.lower, lo.upper]]
            + (1.0 - la.weight) * (1.0 - lo.weight) * frame[[la.upper, lo.upper]]
    }
}
