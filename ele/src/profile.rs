//! Elevation profiles along a route.
//!
//! Each leg between consecutive route points is divided into a fixed number of
//! equal steps in latitude/longitude, and every step is sampled.

use crate::catalog::Locator;
use crate::error::{EleError, Result};
use crate::sampler::SampleMode;
use crate::service::ElevationService;

/// Mean earth radius used for profile distances, in metres.
pub const EARTH_RADIUS_M: f64 = 6_372_795.0;

/// Default number of samples per route leg.
pub const DEFAULT_SAMPLES_PER_SEGMENT: usize = 10;

/// One point of an elevation profile.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileSample {
    /// Fractional position along the route: `leg + step / samples_per_segment`.
    pub position: f64,
    pub lat: f64,
    pub lon: f64,
    /// Great-circle distance from the start of the route, in metres.
    pub distance_m: f64,
    /// `None` when no tile covers the point.
    pub elevation: Option<f64>,
    /// Whether the sample is one of the route's own points.
    pub is_waypoint: bool,
}

/// Sample elevations along a route given as `(lat, lon)` points.
///
/// Every leg contributes `samples_per_segment` samples at fractions `n / k`
/// for `n` in `0..k`, so each leg starts at its own route point; the final
/// route point closes the profile. A single-point route yields one sample and
/// an empty route yields none.
///
/// # Errors
///
/// Returns [`EleError::InvalidArgument`] if `samples_per_segment` is zero, and
/// propagates any sampling error other than "no tile covers the point".
pub fn elevation_profile<L: Locator>(
    service: &ElevationService<L>,
    route: &[(f64, f64)],
    samples_per_segment: usize,
    mode: SampleMode,
) -> Result<Vec<ProfileSample>> {
    if samples_per_segment == 0 {
        return Err(EleError::InvalidArgument(
            "samples per segment must be at least 1".to_string(),
        ));
    }

    let k = samples_per_segment;
    let mut points = Vec::with_capacity(route.len().saturating_sub(1) * k + 1);

    for (leg, pair) in route.windows(2).enumerate() {
        let (lat0, lon0) = pair[0];
        let (lat1, lon1) = pair[1];
        for n in 0..k {
            let t = n as f64 / k as f64;
            points.push((
                leg as f64 + t,
                lat0 + (lat1 - lat0) * t,
                lon0 + (lon1 - lon0) * t,
                n == 0,
            ));
        }
    }
    if let Some(&(lat, lon)) = route.last() {
        points.push((route.len().saturating_sub(1) as f64, lat, lon, true));
    }

    let coords: Vec<(f64, f64)> = points.iter().map(|&(_, lat, lon, _)| (lat, lon)).collect();
    let elevations = service.sample_batch(&coords, mode)?;

    let mut distance_m = 0.0;
    let mut previous: Option<(f64, f64)> = None;
    let profile = points
        .into_iter()
        .zip(elevations)
        .map(|((position, lat, lon, is_waypoint), elevation)| {
            if let Some((plat, plon)) = previous {
                distance_m += great_circle_distance(plat, plon, lat, lon);
            }
            previous = Some((lat, lon));
            ProfileSample {
                position,
                lat,
                lon,
                distance_m,
                elevation,
                is_waypoint,
            }
        })
        .collect();

    Ok(profile)
}

/// Great-circle distance between two points, in metres.
///
/// Uses the atan2 form of the Vincenty special case, which stays accurate at
/// both short and antipodal distances.
pub fn great_circle_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lat2) = (lat1.to_radians(), lat2.to_radians());
    let dlon = (lon2 - lon1).to_radians();

    let y = ((lat2.cos() * dlon.sin()).powi(2)
        + (lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos()).powi(2))
    .sqrt();
    let x = lat1.sin() * lat2.sin() + lat1.cos() * lat2.cos() * dlon.cos();

    y.atan2(x) * EARTH_RADIUS_M
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::tests::CountingOpener;
    use crate::catalog::Catalog;
    use crate::service::ElevationServiceBuilder;
    use crate::tile::{BoundingBox, TileDescriptor};

    /// One tile over [0, 1]×[0, 1] returning 7 everywhere.
    fn service() -> ElevationService {
        let tile = TileDescriptor::new(
            "unit.hgt",
            BoundingBox::new(1.0, 0.0, 1.0, 0.0),
            -0.1,
            0.1,
            10,
            10,
        )
        .unwrap();
        ElevationServiceBuilder::from_catalog(Catalog::new(vec![tile]))
            .opener(Box::new(CountingOpener::default()))
            .build()
            .unwrap()
    }

    #[test]
    fn test_profile_sample_positions() {
        let service = service();
        let route = [(0.0, 0.0), (0.5, 0.5), (0.5, 0.9)];

        let profile = elevation_profile(&service, &route, 4, SampleMode::Nearest).unwrap();
        assert_eq!(profile.len(), 2 * 4 + 1);

        let positions: Vec<f64> = profile.iter().map(|s| s.position).collect();
        assert_eq!(
            positions,
            vec![0.0, 0.25, 0.5, 0.75, 1.0, 1.25, 1.5, 1.75, 2.0]
        );

        assert_eq!((profile[2].lat, profile[2].lon), (0.25, 0.25));
        assert_eq!((profile[8].lat, profile[8].lon), (0.5, 0.9));

        let waypoints: Vec<usize> = profile
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_waypoint)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(waypoints, vec![0, 4, 8]);
    }

    #[test]
    fn test_profile_elevations_and_coverage() {
        let service = service();
        // Second leg leaves the tile
        let route = [(0.5, 0.5), (0.5, 0.9), (0.5, 1.9)];

        let profile = elevation_profile(&service, &route, 2, SampleMode::Bilinear).unwrap();
        assert_eq!(profile[0].elevation, Some(7.0));
        assert_eq!(profile[1].elevation, Some(7.0));
        assert_eq!(profile[2].elevation, Some(7.0));
        assert_eq!(profile[3].elevation, None); // (0.5, 1.4)
        assert_eq!(profile[4].elevation, None);
    }

    #[test]
    fn test_profile_distance_accumulates() {
        let service = service();
        let route = [(0.0, 0.0), (0.0, 1.0)];

        let profile = elevation_profile(&service, &route, 10, SampleMode::Nearest).unwrap();
        assert_eq!(profile[0].distance_m, 0.0);
        for pair in profile.windows(2) {
            assert!(pair[1].distance_m > pair[0].distance_m);
        }

        // One degree of longitude on the equator
        let expected = EARTH_RADIUS_M * 1.0_f64.to_radians();
        assert!((profile[10].distance_m - expected).abs() < 1.0);
    }

    #[test]
    fn test_profile_degenerate_routes() {
        let service = service();

        assert!(elevation_profile(&service, &[], 10, SampleMode::Nearest)
            .unwrap()
            .is_empty());

        let single = elevation_profile(&service, &[(0.5, 0.5)], 10, SampleMode::Nearest).unwrap();
        assert_eq!(single.len(), 1);
        assert!(single[0].is_waypoint);
        assert_eq!(single[0].position, 0.0);
    }

    #[test]
    fn test_profile_rejects_zero_samples() {
        let service = service();
        let result = elevation_profile(&service, &[(0.0, 0.0), (1.0, 1.0)], 0, SampleMode::Nearest);
        assert!(matches!(result, Err(EleError::InvalidArgument(_))));
    }

    #[test]
    fn test_great_circle_distance() {
        assert_eq!(great_circle_distance(10.0, 20.0, 10.0, 20.0), 0.0);

        // Quarter meridian
        let d = great_circle_distance(0.0, 0.0, 90.0, 0.0);
        assert!((d - EARTH_RADIUS_M * std::f64::consts::FRAC_PI_2).abs() < 1e-3);

        // Antipodal points
        let d = great_circle_distance(0.0, 0.0, 0.0, 180.0);
        assert!((d - EARTH_RADIUS_M * std::f64::consts::PI).abs() < 1e-3);
    }
}
