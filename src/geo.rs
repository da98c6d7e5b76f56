//! Geographic routing: which department owns a point.
//!
//! Jurisdiction data is frequently incomplete, so resolution is a three-tier
//! decision procedure that always produces an answer:
//!
//! 1. **Containment**: first department whose jurisdiction polygon contains
//!    the point (ray casting, boundary inclusive, winding-agnostic).
//! 2. **Nearest centroid**: haversine distance to each department centroid;
//!    minimum wins, ties go to the lowest department id.
//! 3. **Default**: the directory's designated default department.
//!
//! A broken polygon is an explicit [`PolygonError`], not a resolution failure:
//! the affected department simply drops out of the containment tier.

use thiserror::Error;
use tracing::warn;

use crate::model::Department;

/// Earth radius used for centroid distances, in miles.
pub const EARTH_RADIUS_MILES: f64 = 3959.0;

/// Distances closer than this (in miles) are considered equal; the tie goes
/// to the lower department id.
const DISTANCE_TIE_EPSILON: f64 = 1e-9;

/// A jurisdiction polygon that cannot be used for containment testing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolygonError {
    #[error("polygon has {0} vertices; at least 3 are required")]
    TooFewVertices(usize),

    #[error("polygon contains a non-finite vertex")]
    NonFiniteVertex,
}

/// Whether `(lat, lng)` is a usable coordinate pair.
pub fn valid_coordinates(lat: f64, lng: f64) -> bool {
    lat.is_finite() && lng.is_finite() && (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng)
}

/// Great-circle distance between two coordinates in miles.
pub fn haversine_miles(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lng2 - lng1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_MILES * c
}

/// Ray-casting point-in-polygon test, treating the boundary as inside.
///
/// The vertex sequence is interpreted as a closed ring (last vertex joined
/// back to the first). The crossing count is parity-based, so the result does
/// not depend on winding direction.
pub fn point_in_polygon(polygon: &[(f64, f64)], lat: f64, lng: f64) -> Result<bool, PolygonError> {
    if polygon.len() < 3 {
        return Err(PolygonError::TooFewVertices(polygon.len()));
    }
    if polygon.iter().any(|(a, b)| !a.is_finite() || !b.is_finite()) {
        return Err(PolygonError::NonFiniteVertex);
    }

    // Treat lng as x and lat as y.
    let (py, px) = (lat, lng);

    let mut inside = false;
    let n = polygon.len();
    for i in 0..n {
        let (y1, x1) = polygon[i];
        let (y2, x2) = polygon[(i + 1) % n];

        if on_segment(px, py, x1, y1, x2, y2) {
            return Ok(true);
        }

        // Edge crosses the horizontal ray to the east of the point.
        if (y1 > py) != (y2 > py) {
            let x_cross = x1 + (py - y1) / (y2 - y1) * (x2 - x1);
            if px < x_cross {
                inside = !inside;
            }
        }
    }

    Ok(inside)
}

/// Whether `(px, py)` lies on the segment `(x1, y1)..(x2, y2)`.
fn on_segment(px: f64, py: f64, x1: f64, y1: f64, x2: f64, y2: f64) -> bool {
    const EPS: f64 = 1e-12;

    let cross = (x2 - x1) * (py - y1) - (y2 - y1) * (px - x1);
    if cross.abs() > EPS {
        return false;
    }

    px >= x1.min(x2) - EPS && px <= x1.max(x2) + EPS && py >= y1.min(y2) - EPS && py <= y1.max(y2) + EPS
}

/// Resolve the owning department for a point.
///
/// `departments` is expected in ascending id order (the directory guarantees
/// this), which is what makes "first containment match" and the tie-break
/// deterministic. Callers validate the coordinates first; given a
/// `default_id`, this function cannot fail.
pub fn resolve_department(departments: &[Department], default_id: i64, lat: f64, lng: f64) -> i64 {
    // Tier 1: polygon containment.
    for dept in departments {
        let Some(polygon) = &dept.jurisdiction_polygon else {
            continue;
        };
        match point_in_polygon(polygon, lat, lng) {
            Ok(true) => return dept.department_id,
            Ok(false) => {}
            Err(err) => {
                // Degrade to the centroid tier rather than failing routing.
                warn!(
                    department_id = dept.department_id,
                    error = %err,
                    "unusable jurisdiction polygon; skipping containment test"
                );
            }
        }
    }

    // Tier 2: nearest centroid.
    let mut best: Option<(i64, f64)> = None;
    for dept in departments {
        let (Some(clat), Some(clng)) = (dept.centroid_lat, dept.centroid_lng) else {
            continue;
        };
        let distance = haversine_miles(lat, lng, clat, clng);
        best = match best {
            None => Some((dept.department_id, distance)),
            Some((best_id, best_distance)) => {
                if distance + DISTANCE_TIE_EPSILON < best_distance {
                    Some((dept.department_id, distance))
                } else {
                    Some((best_id, best_distance))
                }
            }
        };
    }
    if let Some((department_id, _)) = best {
        return department_id;
    }

    // Tier 3: nothing usable in the directory.
    default_id
}
