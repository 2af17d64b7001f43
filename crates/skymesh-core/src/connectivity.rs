//! Connectivity engine — per-tick rebuild and evaluation of wireless links.
//!
//! [`ConnectivityEngine::update_connectivity`] runs three phases inside one
//! write guard on the network knowledge base:
//!
//! 1. rebuild the dynamic wireless link set (deterministic `dyn-` ids so
//!    explicit-deactivation state survives the rebuild),
//! 2. evaluate every link (impairment override, operability, line-of-sight,
//!    elevation, band compatibility, range, link budget),
//! 3. publish population counts.
//!
//! Transient geometry failures are never errors: they demote the link to
//! `Potential` and the next pass may auto-activate it again.

use std::collections::HashSet;
use std::sync::Arc;

use skymesh_common::models::LinkCounts;

use crate::geometry::{self, EARTH_RADIUS_KM};
use crate::kb::network::{
    dynamic_link_id, LinkMedium, LinkQuality, LinkStatus, NetworkKb, NetworkLink, NkbInner,
    TransceiverModel,
};

/// Speed of light, km per millisecond.
const LIGHT_SPEED_KM_PER_MS: f64 = 299.792458;

/// Radius difference beyond which one endpoint is treated as "ground" for
/// the elevation check.
const GROUND_RADIUS_DELTA_KM: f64 = 50.0;

/// Ground endpoints above this shell skip the elevation check entirely
/// (inter-satellite and high-altitude platforms are exempt).
const GROUND_SHELL_KM: f64 = EARTH_RADIUS_KM + 100.0;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Minimum elevation a ground station requires toward a satellite.
    pub min_elevation_deg: f64,
    /// Applied to wired links that carry no latency of their own.
    pub default_wired_latency_ms: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            min_elevation_deg: 10.0,
            default_wired_latency_ms: 10.0,
        }
    }
}

pub struct ConnectivityEngine {
    kb: Arc<NetworkKb>,
    config: EngineConfig,
}

impl ConnectivityEngine {
    pub fn new(kb: Arc<NetworkKb>, config: EngineConfig) -> Self {
        ConnectivityEngine { kb, config }
    }

    /// Rebuild dynamic wireless links and re-evaluate every link. One
    /// logical critical section against the NKB.
    pub fn update_connectivity(&self) -> LinkCounts {
        let mut inner = self.kb.write();

        self.rebuild_dynamic_links(&mut inner);

        let link_ids: Vec<String> = inner.links.keys().cloned().collect();
        for id in link_ids {
            let Some(mut link) = inner.links.get(&id).cloned() else {
                continue;
            };
            self.evaluate(&inner, &mut link);
            inner.links.insert(id, link);
        }

        let mut counts = LinkCounts::default();
        for link in inner.links.values() {
            counts.total += 1;
            if link.link_status == LinkStatus::Active {
                counts.active += 1;
            }
            if link.is_up {
                counts.up += 1;
            }
            if link.is_impaired {
                counts.impaired += 1;
            }
            if link.is_dynamic() && link.medium == LinkMedium::Wireless {
                counts.dynamic += 1;
            }
        }
        tracing::debug!(
            total = counts.total,
            active = counts.active,
            up = counts.up,
            impaired = counts.impaired,
            dynamic = counts.dynamic,
            "connectivity pass complete"
        );
        counts
    }

    /// Phase 1 — drop every dynamic wireless link and re-synthesise one per
    /// band-compatible wireless interface pair. Explicit deactivations are
    /// carried across the rebuild by the deterministic symmetric id.
    fn rebuild_dynamic_links(&self, inner: &mut NkbInner) {
        let deactivated: HashSet<String> = inner
            .links
            .values()
            .filter(|l| {
                l.is_dynamic() && l.medium == LinkMedium::Wireless && l.was_explicitly_deactivated
            })
            .map(|l| l.id.clone())
            .collect();

        let stale: Vec<String> = inner
            .links
            .values()
            .filter(|l| l.is_dynamic() && l.medium == LinkMedium::Wireless)
            .map(|l| l.id.clone())
            .collect();
        for id in stale {
            let _ = inner.remove_link(&id);
        }

        let mut wireless: Vec<(String, String)> = inner
            .interfaces
            .values()
            .filter(|i| i.medium == LinkMedium::Wireless)
            .map(|i| (i.id.clone(), i.transceiver_id.clone()))
            .collect();
        wireless.sort();

        for i in 0..wireless.len() {
            for j in (i + 1)..wireless.len() {
                let (a_id, a_trx) = &wireless[i];
                let (b_id, b_trx) = &wireless[j];
                let (Some(trx_a), Some(trx_b)) =
                    (inner.transceivers.get(a_trx), inner.transceivers.get(b_trx))
                else {
                    continue;
                };
                if !TransceiverModel::is_compatible(trx_a, trx_b) {
                    continue;
                }

                let id = dynamic_link_id(a_id, b_id);
                let mut link = NetworkLink::new(id.clone(), a_id.clone(), b_id.clone(), LinkMedium::Wireless);
                link.is_static = false;
                if deactivated.contains(&id) {
                    link.was_explicitly_deactivated = true;
                    link.link_status = LinkStatus::Potential;
                    link.is_up = false;
                }
                // Upsert: a leftover link squatting the id is replaced.
                let _ = inner.remove_link(&id);
                if let Err(err) = inner.add_link(link) {
                    tracing::warn!(link_id = %id, error = %err, "failed to synthesise dynamic link");
                }
            }
        }
    }

    /// Phase 2 decision procedure for a single link.
    fn evaluate(&self, inner: &NkbInner, link: &mut NetworkLink) {
        // 1. Administrative impairment wins over everything.
        if link.is_impaired {
            if link.link_status != LinkStatus::Impaired && link.status_before_impairment.is_none() {
                link.status_before_impairment = Some(link.link_status);
            }
            link.link_status = LinkStatus::Impaired;
            link.is_up = false;
            link.quality = LinkQuality::Down;
            link.snr_db = 0.0;
            link.max_data_rate_mbps = 0.0;
            return;
        }

        // 2. Coming out of impairment: restore the captured status, then
        //    fall through to re-evaluation.
        if link.link_status == LinkStatus::Impaired {
            link.link_status = match link.status_before_impairment.take() {
                Some(previous) => previous,
                None if link.was_explicitly_deactivated => LinkStatus::Potential,
                None => LinkStatus::Unknown,
            };
            tracing::info!(link_id = %link.id, status = %link.link_status, "impairment cleared");
        }

        // 3. Wired links are viable whenever they exist.
        if link.medium == LinkMedium::Wired {
            if link.latency_ms == 0.0 {
                link.latency_ms = self.config.default_wired_latency_ms;
            }
            if link.max_data_rate_mbps == 0.0 {
                link.max_data_rate_mbps = 1000.0;
            }
            link.quality = LinkQuality::Excellent;
            auto_activate(link);
            link.is_up = link.link_status == LinkStatus::Active;
            return;
        }

        // 4. Both interfaces must resolve and be operational.
        let iface_a = inner.interfaces.get(&link.interface_a);
        let iface_b = inner.interfaces.get(&link.interface_b);
        let (Some(iface_a), Some(iface_b)) = (iface_a, iface_b) else {
            demote(link);
            return;
        };
        if !iface_a.is_operational || !iface_b.is_operational {
            demote(link);
            return;
        }

        // 5. Both node positions must be known.
        let pos_a = inner.node_positions.get(&iface_a.parent_node_id).copied();
        let pos_b = inner.node_positions.get(&iface_b.parent_node_id).copied();
        let (Some(pos_a), Some(pos_b)) = (pos_a, pos_b) else {
            demote(link);
            return;
        };

        // 6. Earth occlusion.
        if !geometry::has_line_of_sight(pos_a, pos_b) {
            demote(link);
            return;
        }

        // 7. Ground-station elevation mask. Only applies when one endpoint is
        //    clearly lower and sits near the surface.
        let (radius_a, radius_b) = (pos_a.norm(), pos_b.norm());
        if (radius_a - radius_b).abs() > GROUND_RADIUS_DELTA_KM {
            let (ground, sat, ground_radius) = if radius_a < radius_b {
                (pos_a, pos_b, radius_a)
            } else {
                (pos_b, pos_a, radius_b)
            };
            if ground_radius <= GROUND_SHELL_KM
                && geometry::elevation_degrees(ground, sat) < self.config.min_elevation_deg
            {
                demote(link);
                return;
            }
        }

        // 8. RF band compatibility.
        let trx_a = inner.transceivers.get(&iface_a.transceiver_id);
        let trx_b = inner.transceivers.get(&iface_b.transceiver_id);
        let (Some(trx_a), Some(trx_b)) = (trx_a, trx_b) else {
            demote(link);
            return;
        };
        if !TransceiverModel::is_compatible(trx_a, trx_b) {
            demote(link);
            return;
        }

        // 9. Range limit; 0 means unlimited.
        let distance_km = pos_a.distance(pos_b);
        let max_range_km = trx_a.max_range_km.max(trx_b.max_range_km);
        if max_range_km > 0.0 && distance_km > max_range_km {
            demote(link);
            return;
        }

        // 10. Link budget.
        let snr_db = estimate_snr_db(trx_a, trx_b, distance_km);
        let quality = quality_for_snr(snr_db);
        if quality == LinkQuality::Down {
            demote(link);
            link.snr_db = snr_db;
            return;
        }

        // 11. Success.
        link.snr_db = snr_db;
        link.quality = quality;
        if link.max_data_rate_mbps == 0.0 {
            link.max_data_rate_mbps = default_capacity_mbps(quality);
        }
        link.latency_ms = distance_km / LIGHT_SPEED_KM_PER_MS;
        auto_activate(link);
        link.is_up = link.link_status == LinkStatus::Active;
    }
}

/// Transient failure: the link is physically non-viable this tick. Unknown
/// and Active links fall back to Potential; the explicit-deactivation latch
/// is untouched.
fn demote(link: &mut NetworkLink) {
    link.quality = LinkQuality::Down;
    link.is_up = false;
    link.snr_db = 0.0;
    link.max_data_rate_mbps = 0.0;
    if matches!(link.link_status, LinkStatus::Unknown | LinkStatus::Active) {
        link.link_status = LinkStatus::Potential;
    }
}

/// Success-path activation: Unknown/Potential links become Active unless a
/// controller explicitly deactivated them. That latch is cleared here and
/// only here, when activation actually fires.
fn auto_activate(link: &mut NetworkLink) {
    if matches!(link.link_status, LinkStatus::Unknown | LinkStatus::Potential)
        && !link.was_explicitly_deactivated
    {
        link.link_status = LinkStatus::Active;
        link.was_explicitly_deactivated = false;
    }
}

/// Mean noise figure over the transceivers that actually carry one. An
/// explicit 0 dB counts; with neither set the contribution is zero.
fn average_noise_figure_db(a: &TransceiverModel, b: &TransceiverModel) -> f64 {
    let set: Vec<f64> = [a.system_noise_figure_db, b.system_noise_figure_db]
        .into_iter()
        .flatten()
        .collect();
    if set.is_empty() {
        0.0
    } else {
        set.iter().sum::<f64>() / set.len() as f64
    }
}

/// Free-space link budget, monotone in distance.
fn estimate_snr_db(trx_a: &TransceiverModel, trx_b: &TransceiverModel, distance_km: f64) -> f64 {
    let band_lo = trx_a.band_min_ghz.max(trx_b.band_min_ghz);
    let band_hi = trx_a.band_max_ghz.min(trx_b.band_max_ghz);
    let mid = (band_lo + band_hi) / 2.0;
    let f_ghz = if mid > 0.0 { mid } else { 10.0 };

    let distance_km = distance_km.max(1.0);
    let fspl_db = 92.45 + 20.0 * distance_km.log10() + 20.0 * f_ghz.log10();

    let received_dbw = trx_a.tx_power_dbw.unwrap_or(40.0)
        + trx_a.gain_tx_dbi.unwrap_or(30.0)
        + trx_b.gain_rx_dbi.unwrap_or(30.0)
        - fspl_db;

    let noise_floor_dbw = -120.0 + average_noise_figure_db(trx_a, trx_b);
    received_dbw - noise_floor_dbw
}

fn quality_for_snr(snr_db: f64) -> LinkQuality {
    if snr_db < 0.0 {
        LinkQuality::Down
    } else if snr_db < 5.0 {
        LinkQuality::Poor
    } else if snr_db < 10.0 {
        LinkQuality::Fair
    } else if snr_db < 20.0 {
        LinkQuality::Good
    } else {
        LinkQuality::Excellent
    }
}

fn default_capacity_mbps(quality: LinkQuality) -> f64 {
    match quality {
        LinkQuality::Down => 0.0,
        LinkQuality::Poor => 10.0,
        LinkQuality::Fair => 50.0,
        LinkQuality::Good => 200.0,
        LinkQuality::Excellent => 1000.0,
    }
}
