//! Motion model — per-platform propagator selection and batch updates.
//!
//! Each registered platform gets a propagator chosen from its motion source:
//! static platforms keep their scenario coordinates, orbital platforms are
//! advanced from their orbital elements. [`Propagator`] is the seam for a
//! full SGP4 implementation; the in-tree orbital propagator is a closed-form
//! Keplerian two-body solution, which is all the simulator itself needs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::Vec3;
use crate::kb::physical::{MotionSource, PhysicalKb, Platform};

/// Earth gravitational parameter, km³/s².
const MU_EARTH_KM3_S2: f64 = 398_600.4418;

#[derive(Debug, Error)]
pub enum MotionError {
    #[error("orbital platform {0} has no orbital elements")]
    MissingElements(String),
}

/// Classical orbital elements, angles in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrbitalElements {
    pub semi_major_axis_km: f64,
    pub eccentricity: f64,
    pub inclination_deg: f64,
    pub raan_deg: f64,
    pub arg_perigee_deg: f64,
    pub mean_anomaly_deg: f64,
    pub epoch: DateTime<Utc>,
}

/// Computes a platform's ECEF position in metres at a simulated instant.
pub trait Propagator: Send + Sync {
    fn position_m_at(&self, t: DateTime<Utc>) -> Vec3;
}

/// Fixed-coordinate platform (ground stations, parked assets).
pub struct StaticPropagator {
    position_m: Vec3,
}

impl StaticPropagator {
    pub fn new(position_m: Vec3) -> Self {
        StaticPropagator { position_m }
    }
}

impl Propagator for StaticPropagator {
    fn position_m_at(&self, _t: DateTime<Utc>) -> Vec3 {
        self.position_m
    }
}

/// Two-body Keplerian propagator over classical elements.
pub struct KeplerianPropagator {
    elements: OrbitalElements,
}

impl KeplerianPropagator {
    pub fn new(elements: OrbitalElements) -> Self {
        KeplerianPropagator { elements }
    }

    /// Solve Kepler's equation `E − e·sin E = M` by Newton iteration.
    fn eccentric_anomaly(mean_anomaly_rad: f64, eccentricity: f64) -> f64 {
        let mut e_anom = if eccentricity < 0.8 {
            mean_anomaly_rad
        } else {
            std::f64::consts::PI
        };
        for _ in 0..30 {
            let delta = (e_anom - eccentricity * e_anom.sin() - mean_anomaly_rad)
                / (1.0 - eccentricity * e_anom.cos());
            e_anom -= delta;
            if delta.abs() < 1e-12 {
                break;
            }
        }
        e_anom
    }
}

impl Propagator for KeplerianPropagator {
    fn position_m_at(&self, t: DateTime<Utc>) -> Vec3 {
        let el = &self.elements;
        let a = el.semi_major_axis_km;
        let e = el.eccentricity;

        let dt_s = (t - el.epoch).num_milliseconds() as f64 / 1000.0;
        let mean_motion = (MU_EARTH_KM3_S2 / (a * a * a)).sqrt();
        let mean_anomaly = el.mean_anomaly_deg.to_radians() + mean_motion * dt_s;

        let e_anom = Self::eccentric_anomaly(mean_anomaly, e);
        let true_anomaly = 2.0
            * f64::atan2(
                (1.0 + e).sqrt() * (e_anom / 2.0).sin(),
                (1.0 - e).sqrt() * (e_anom / 2.0).cos(),
            );
        let radius = a * (1.0 - e * e_anom.cos());

        // Perifocal coordinates
        let x_pf = radius * true_anomaly.cos();
        let y_pf = radius * true_anomaly.sin();

        // Rotate perifocal → equatorial: Rz(Ω) · Rx(i) · Rz(ω)
        let (sin_raan, cos_raan) = el.raan_deg.to_radians().sin_cos();
        let (sin_inc, cos_inc) = el.inclination_deg.to_radians().sin_cos();
        let (sin_argp, cos_argp) = el.arg_perigee_deg.to_radians().sin_cos();

        let x = (cos_raan * cos_argp - sin_raan * sin_argp * cos_inc) * x_pf
            + (-cos_raan * sin_argp - sin_raan * cos_argp * cos_inc) * y_pf;
        let y = (sin_raan * cos_argp + cos_raan * sin_argp * cos_inc) * x_pf
            + (-sin_raan * sin_argp + cos_raan * cos_argp * cos_inc) * y_pf;
        let z = (sin_argp * sin_inc) * x_pf + (cos_argp * sin_inc) * y_pf;

        Vec3::new(x, y, z).scale(1000.0)
    }
}

/// Holds one propagator per platform and writes batch position updates into
/// the physical knowledge base.
#[derive(Default)]
pub struct MotionModel {
    propagators: Mutex<HashMap<String, Arc<dyn Propagator>>>,
}

impl MotionModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select and install a propagator for the platform.
    pub fn register(&self, platform: &Platform) -> Result<(), MotionError> {
        let propagator: Arc<dyn Propagator> = match platform.motion {
            MotionSource::Static => Arc::new(StaticPropagator::new(platform.position_m)),
            MotionSource::Orbital => {
                let elements = platform
                    .orbit
                    .ok_or_else(|| MotionError::MissingElements(platform.id.clone()))?;
                Arc::new(KeplerianPropagator::new(elements))
            }
        };
        self.propagators
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(platform.id.clone(), propagator);
        Ok(())
    }

    pub fn unregister(&self, platform_id: &str) {
        self.propagators
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(platform_id);
    }

    /// Compute every registered platform's position at `now` and apply them
    /// to the PKB as one batch.
    pub fn update_positions(&self, pkb: &PhysicalKb, now: DateTime<Utc>) {
        let propagators: Vec<(String, Arc<dyn Propagator>)> = self
            .propagators
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(id, p)| (id.clone(), p.clone()))
            .collect();
        let updates: Vec<(String, Vec3)> = propagators
            .into_iter()
            .map(|(id, p)| {
                let pos = p.position_m_at(now);
                (id, pos)
            })
            .collect();
        pkb.update_positions(updates);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    fn circular_elements() -> OrbitalElements {
        OrbitalElements {
            semi_major_axis_km: 6871.0,
            eccentricity: 0.0,
            inclination_deg: 0.0,
            raan_deg: 0.0,
            arg_perigee_deg: 0.0,
            mean_anomaly_deg: 0.0,
            epoch: epoch(),
        }
    }

    #[test]
    fn static_propagator_never_moves() {
        let p = StaticPropagator::new(Vec3::new(6_371_000.0, 0.0, 0.0));
        assert_eq!(
            p.position_m_at(epoch() + chrono::TimeDelta::hours(5)),
            Vec3::new(6_371_000.0, 0.0, 0.0)
        );
    }

    #[test]
    fn circular_orbit_starts_at_perigee_direction() {
        let p = KeplerianPropagator::new(circular_elements());
        let pos = p.position_m_at(epoch());
        assert!((pos.x - 6_871_000.0).abs() < 1.0, "x = {}", pos.x);
        assert!(pos.y.abs() < 1.0);
        assert!(pos.z.abs() < 1.0);
    }

    #[test]
    fn circular_orbit_radius_is_constant() {
        let p = KeplerianPropagator::new(circular_elements());
        for minutes in [0, 10, 30, 47, 90] {
            let pos = p.position_m_at(epoch() + chrono::TimeDelta::minutes(minutes));
            let radius_km = pos.norm() / 1000.0;
            assert!(
                (radius_km - 6871.0).abs() < 0.5,
                "radius at t+{minutes}m = {radius_km}"
            );
        }
    }

    #[test]
    fn quarter_period_reaches_plus_y() {
        let elements = circular_elements();
        let a = elements.semi_major_axis_km;
        let period_s = 2.0 * std::f64::consts::PI * (a * a * a / MU_EARTH_KM3_S2).sqrt();
        let p = KeplerianPropagator::new(elements);
        let pos = p.position_m_at(epoch() + chrono::TimeDelta::milliseconds((period_s * 250.0) as i64));
        // Prograde equatorial orbit: quarter period after perigee sits on +Y
        assert!(pos.y > 6_000_000.0, "y = {}", pos.y);
        assert!(pos.x.abs() < 300_000.0, "x = {}", pos.x);
    }

    #[test]
    fn inclined_orbit_leaves_equatorial_plane() {
        let elements = OrbitalElements {
            inclination_deg: 53.0,
            ..circular_elements()
        };
        let a = elements.semi_major_axis_km;
        let period_s = 2.0 * std::f64::consts::PI * (a * a * a / MU_EARTH_KM3_S2).sqrt();
        let p = KeplerianPropagator::new(elements);
        let pos = p.position_m_at(epoch() + chrono::TimeDelta::milliseconds((period_s * 250.0) as i64));
        assert!(pos.z.abs() > 1_000_000.0, "z = {}", pos.z);
    }

    #[test]
    fn register_requires_elements_for_orbital() {
        let model = MotionModel::new();
        let platform = Platform {
            id: "sat-1".into(),
            name: "sat-1".into(),
            kind: "satellite".into(),
            motion: MotionSource::Orbital,
            orbit: None,
            position_m: Vec3::ZERO,
        };
        assert!(matches!(
            model.register(&platform),
            Err(MotionError::MissingElements(_))
        ));
    }

    #[test]
    fn batch_update_writes_into_pkb() {
        let pkb = PhysicalKb::new();
        let platform = Platform {
            id: "gs-1".into(),
            name: "gs-1".into(),
            kind: "ground".into(),
            motion: MotionSource::Static,
            orbit: None,
            position_m: Vec3::new(6_371_000.0, 0.0, 0.0),
        };
        pkb.add_platform(platform.clone()).unwrap();

        let model = MotionModel::new();
        model.register(&platform).unwrap();
        model.update_positions(&pkb, epoch() + chrono::TimeDelta::seconds(10));

        assert_eq!(
            pkb.platform("gs-1").unwrap().position_m,
            Vec3::new(6_371_000.0, 0.0, 0.0)
        );
    }
}
