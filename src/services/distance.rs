// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Great-circle distance over the rolling history.

use crate::models::LocationFix;

/// Sphere radius used for run distances (km).
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance between two fixes in kilometres.
pub fn haversine_km(a: &LocationFix, b: &LocationFix) -> f64 {
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();
    let h = (dlat / 2.0).sin().powi(2)
        + a.latitude.to_radians().cos() * b.latitude.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// Sum of haversine distances between consecutive fixes, rounded to 2 decimals.
///
/// Zero for fewer than two fixes.
pub fn cumulative_distance_km<'a, I>(fixes: I) -> f64
where
    I: IntoIterator<Item = &'a LocationFix>,
{
    let mut total = 0.0;
    let mut prev: Option<&LocationFix> = None;
    for fix in fixes {
        if let Some(p) = prev {
            total += haversine_km(p, fix);
        }
        prev = Some(fix);
    }
    round2(total)
}

/// Round to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
