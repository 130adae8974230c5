//! PMV/PPD thermal comfort model.
//!
//! PMV follows the Fanger heat balance (ISO 7730). Above still air the ASHRAE 55
//! elevated-air-speed correction is applied: the cooling effect is the temperature
//! offset at 0.1 m/s that yields the same SET as the actual air speed, with SET
//! from the Gagge two-node model.

use chrono::{DateTime, FixedOffset};
use tracing::debug;

use crate::{
    sensor::SensorSet,
    surface::{SurfaceModelConfig, SurfaceTemperatureModel},
    types::{ComfortFactors, PmvResult},
};

pub const DEFAULT_AIR_SPEED: f64 = 0.08;
pub const ASSISTED_AIR_SPEED: f64 = 0.3;

const STILL_AIR: f64 = 0.1;
const PMV_LIMIT: f64 = 3.0;

fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}

/// Air speed relative to a moving body.
pub fn v_relative(v: f64, met: f64) -> f64 {
    if met > 1.0 {
        round_to(v + 0.3 * (met - 1.0), 3)
    } else {
        v
    }
}

/// Clothing insulation reduced by body movement.
pub fn clo_dynamic(clo: f64, met: f64) -> f64 {
    if met > 1.2 {
        round_to(clo * (0.6 + 0.4 / met), 3)
    } else {
        clo
    }
}

/// Fanger PMV, unrounded and unclamped. `rh` in percent.
pub fn fanger_pmv(tdb: f64, tr: f64, vr: f64, rh: f64, met: f64, clo: f64) -> f64 {
    let pa = rh * 10.0 * (16.6536 - 4030.183 / (tdb + 235.0)).exp();
    let icl = 0.155 * clo;
    let m = met * 58.15;
    let mw = m;
    let f_cl = if icl <= 0.078 {
        1.0 + 1.29 * icl
    } else {
        1.05 + 0.645 * icl
    };

    let hcf = 12.1 * vr.sqrt();
    let mut hc = hcf;
    let taa = tdb + 273.0;
    let tra = tr + 273.0;
    let t_cla = taa + (35.5 - tdb) / (3.5 * icl + 0.1);

    let p1 = icl * f_cl;
    let p2 = p1 * 3.96;
    let p3 = p1 * 100.0;
    let p4 = p1 * taa;
    let p5 = (308.7 - 0.028 * mw) + p2 * (tra / 100.0).powi(4);

    let mut xn = t_cla / 100.0;
    let mut xf = t_cla / 50.0;
    let mut iterations = 0;
    while (xn - xf).abs() > 0.00015 && iterations < 150 {
        xf = (xf + xn) / 2.0;
        let hcn = 2.38 * (100.0 * xf - taa).abs().powf(0.25);
        hc = hcf.max(hcn);
        xn = (p5 + p4 * hc - p2 * xf.powi(4)) / (100.0 + p3 * hc);
        iterations += 1;
    }
    let tcl = 100.0 * xn - 273.0;

    let hl1 = 3.05 * 0.001 * (5733.0 - 6.99 * mw - pa);
    let hl2 = if mw > 58.15 { 0.42 * (mw - 58.15) } else { 0.0 };
    let hl3 = 1.7 * 0.00001 * m * (5867.0 - pa);
    let hl4 = 0.0014 * m * (34.0 - tdb);
    let hl5 = 3.96 * f_cl * (xn.powi(4) - (tra / 100.0).powi(4));
    let hl6 = f_cl * hc * (tcl - tdb);

    let ts = 0.303 * (-0.036 * m).exp() + 0.028;
    ts * (mw - hl1 - hl2 - hl3 - hl4 - hl5 - hl6)
}

pub fn ppd_from_pmv(pmv: f64) -> f64 {
    100.0 - 95.0 * (-0.03353 * pmv.powi(4) - 0.2179 * pmv.powi(2)).exp()
}

fn saturation_pressure_torr(temperature: f64) -> f64 {
    (18.6686 - 4030.183 / (temperature + 235.0)).exp()
}

/// Standard effective temperature from the Gagge two-node model, standing posture,
/// sea-level pressure and 1.8258 m² body surface area.
pub fn standard_effective_temperature(
    tdb: f64,
    tr: f64,
    v: f64,
    rh: f64,
    met: f64,
    clo: f64,
) -> f64 {
    const BODY_WEIGHT: f64 = 70.0;
    const BODY_SURFACE_AREA: f64 = 1.8258;
    const MET_FACTOR: f64 = 58.2;
    const SBC: f64 = 0.000000056697;
    const C_SW: f64 = 170.0;
    const C_DIL: f64 = 120.0;
    const C_STR: f64 = 0.5;
    const TEMP_SKIN_NEUTRAL: f64 = 33.7;
    const TEMP_CORE_NEUTRAL: f64 = 36.8;
    const SKIN_BLOOD_FLOW_NEUTRAL: f64 = 6.3;
    const MAX_SKIN_BLOOD_FLOW: f64 = 90.0;
    const MAX_SWEATING: f64 = 500.0;
    const K_CLO: f64 = 0.25;

    let vapor_pressure = rh * saturation_pressure_torr(tdb) / 100.0;
    let air_speed = v.max(STILL_AIR);

    let mut alfa = 0.1;
    let temp_body_neutral = alfa * TEMP_SKIN_NEUTRAL + (1.0 - alfa) * TEMP_CORE_NEUTRAL;
    let mut t_skin = TEMP_SKIN_NEUTRAL;
    let mut t_core = TEMP_CORE_NEUTRAL;
    let mut m_bl = SKIN_BLOOD_FLOW_NEUTRAL;

    let mut e_skin = 0.1 * met;
    let mut q_sensible = 0.0;
    let mut w = 0.0;

    let r_clo = 0.155 * clo;
    let f_a_cl = 1.0 + 0.15 * clo;
    let lr = 2.2;
    let rm = met * MET_FACTOR;
    let mut m = met * MET_FACTOR;

    let i_cl = if clo > 0.0 { 0.45 } else { 1.0 };
    let w_max = if clo > 0.0 {
        0.59 * air_speed.powf(-0.08)
    } else {
        0.38 * air_speed.powf(-0.29)
    };

    // Metabolic convection is ignored when computing the cooling effect.
    let h_cc = 3.0f64.max(8.600001 * air_speed.powf(0.53));

    let mut h_r = 4.7;
    let mut h_t = h_r + h_cc;
    let mut r_a = 1.0 / (f_a_cl * h_t);
    let mut t_op = (h_r * tr + h_cc * tdb) / h_t;

    let q_res = 0.0023 * m * (44.0 - vapor_pressure);
    let c_res = 0.0014 * m * (34.0 - tdb);

    for _ in 0..60 {
        let mut t_cl = (r_a * t_skin + r_clo * t_op) / (r_a + r_clo);
        for _ in 0..150 {
            h_r = 4.0 * 0.95 * SBC * ((t_cl + tr) / 2.0 + 273.15).powi(3) * 0.73;
            h_t = h_r + h_cc;
            r_a = 1.0 / (f_a_cl * h_t);
            t_op = (h_r * tr + h_cc * tdb) / h_t;
            let t_cl_new = (r_a * t_skin + r_clo * t_op) / (r_a + r_clo);
            let converged = (t_cl_new - t_cl).abs() <= 0.01;
            t_cl = t_cl_new;
            if converged {
                break;
            }
        }

        q_sensible = (t_skin - t_op) / (r_a + r_clo);
        let hf_cs = (t_core - t_skin) * (5.28 + 1.163 * m_bl);
        let s_core = m - hf_cs - q_res - c_res;
        let s_skin = hf_cs - q_sensible - e_skin;
        let tc_sk = 0.97 * alfa * BODY_WEIGHT;
        let tc_cr = 0.97 * (1.0 - alfa) * BODY_WEIGHT;
        t_skin += s_skin * BODY_SURFACE_AREA / (tc_sk * 60.0);
        t_core += s_core * BODY_SURFACE_AREA / (tc_cr * 60.0);
        let t_body = alfa * t_skin + (1.0 - alfa) * t_core;

        let sk_sig = t_skin - TEMP_SKIN_NEUTRAL;
        let warm_sk = sk_sig.max(0.0);
        let cold_sk = (-sk_sig).max(0.0);
        let c_reg_sig = t_core - TEMP_CORE_NEUTRAL;
        let c_warm = c_reg_sig.max(0.0);
        let c_cold = (-c_reg_sig).max(0.0);
        let warm_b = (t_body - temp_body_neutral).max(0.0);

        m_bl = ((SKIN_BLOOD_FLOW_NEUTRAL + C_DIL * c_warm) / (1.0 + C_STR * cold_sk))
            .clamp(0.5, MAX_SKIN_BLOOD_FLOW);
        let m_rsw = (C_SW * warm_b * (warm_sk / 10.7).exp()).min(MAX_SWEATING);
        let mut e_rsw = 0.68 * m_rsw;

        let r_ea = 1.0 / (lr * f_a_cl * h_cc);
        let r_ecl = r_clo / (lr * i_cl);
        let e_max = (saturation_pressure_torr(t_skin) - vapor_pressure) / (r_ea + r_ecl);
        let mut p_rsw = e_rsw / e_max;
        w = 0.06 + 0.94 * p_rsw;
        let mut e_diff = w * e_max - e_rsw;
        if w > w_max {
            w = w_max;
            p_rsw = w_max / 0.94;
            e_rsw = p_rsw * e_max;
            e_diff = 0.06 * (1.0 - p_rsw) * e_max;
        }
        if e_max < 0.0 {
            e_diff = 0.0;
            e_rsw = 0.0;
            w = w_max;
        }
        e_skin = e_rsw + e_diff;

        let shivering = 19.4 * cold_sk * c_cold;
        m = rm + shivering;
        alfa = 0.0417737 + 0.7451833 / (m_bl + 0.585417);
    }

    let q_skin = q_sensible + e_skin;
    let p_s_sk = saturation_pressure_torr(t_skin);

    // Standard environment.
    let h_c_s = 3.0;
    let h_t_s = h_c_s + h_r;
    let r_clo_s = 1.52 / (met + 0.6944) - 0.1835;
    let r_cl_s = 0.155 * r_clo_s;
    let f_a_cl_s = 1.0 + K_CLO * r_clo_s;
    let f_cl_s = 1.0 / (1.0 + 0.155 * f_a_cl_s * h_t_s * r_clo_s);
    let i_m_s = 0.45;
    let i_cl_s = i_m_s * h_c_s / h_t_s * (1.0 - f_cl_s) / (h_c_s / h_t_s - f_cl_s * i_m_s);
    let r_a_s = 1.0 / (f_a_cl_s * h_t_s);
    let r_ea_s = 1.0 / (lr * f_a_cl_s * h_c_s);
    let r_ecl_s = r_cl_s / (lr * i_cl_s);
    let h_d_s = 1.0 / (r_a_s + r_cl_s);
    let h_e_s = 1.0 / (r_ea_s + r_ecl_s);

    let balance = |set: f64| {
        q_skin
            - h_d_s * (t_skin - set)
            - w * h_e_s * (p_s_sk - 0.5 * saturation_pressure_torr(set))
    };

    let delta = 0.0001;
    let mut set_old = round_to(t_skin - q_skin / h_d_s, 2);
    let mut set = set_old;
    for _ in 0..100 {
        let err_1 = balance(set_old);
        let err_2 = balance(set_old + delta);
        let slope = err_2 - err_1;
        if slope == 0.0 {
            break;
        }
        set = set_old - delta * err_1 / slope;
        let dx = set - set_old;
        set_old = set;
        if dx.abs() <= 0.01 {
            break;
        }
    }
    set
}

/// Temperature drop equivalent to the extra air movement above still air, in °C.
pub fn cooling_effect(tdb: f64, tr: f64, vr: f64, rh: f64, met: f64, clo: f64) -> f64 {
    if vr <= STILL_AIR {
        return 0.0;
    }

    let target = standard_effective_temperature(tdb, tr, vr, rh, met, clo);
    let gap = |offset: f64| {
        standard_effective_temperature(tdb - offset, tr - offset, STILL_AIR, rh, met, clo) - target
    };

    let (mut low, mut high) = (0.0, 40.0);
    let (mut gap_low, gap_high) = (gap(low), gap(high));
    if !gap_low.is_finite() || !gap_high.is_finite() || gap_low * gap_high > 0.0 {
        return 0.0;
    }

    for _ in 0..60 {
        let mid = (low + high) / 2.0;
        let gap_mid = gap(mid);
        if gap_mid == 0.0 || (high - low) / 2.0 < 1e-4 {
            return round_to(mid, 2);
        }
        if gap_mid * gap_low > 0.0 {
            low = mid;
            gap_low = gap_mid;
        } else {
            high = mid;
        }
    }
    round_to((low + high) / 2.0, 2)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PmvPpd {
    pub pmv: f64,
    pub ppd: f64,
}

/// ASHRAE 55 PMV/PPD; `vr` is relative air speed and `clo` the dynamic insulation.
pub fn pmv_ppd(tdb: f64, tr: f64, vr: f64, rh: f64, met: f64, clo: f64) -> PmvPpd {
    let ce = if vr > STILL_AIR {
        cooling_effect(tdb, tr, vr, rh, met, clo)
    } else {
        0.0
    };
    let (tdb, tr, vr) = if ce > 0.0 {
        (tdb - ce, tr - ce, STILL_AIR)
    } else {
        (tdb, tr, vr)
    };

    let raw = fanger_pmv(tdb, tr, vr, rh, met, clo);
    let pmv = if raw.is_finite() {
        round_to(raw, 2).clamp(-PMV_LIMIT, PMV_LIMIT)
    } else if raw.is_sign_negative() {
        -PMV_LIMIT
    } else {
        PMV_LIMIT
    };
    let ppd = round_to(ppd_from_pmv(pmv), 1).clamp(0.0, 100.0);
    PmvPpd { pmv, ppd }
}

pub struct ThermalComfortCalculator<'a> {
    surfaces: SurfaceTemperatureModel<'a>,
}

impl<'a> ThermalComfortCalculator<'a> {
    pub fn new(config: &'a SurfaceModelConfig) -> Self {
        Self {
            surfaces: SurfaceTemperatureModel::new(config),
        }
    }

    pub fn calculate(
        &self,
        sensors: &SensorSet,
        outdoor_temperature: f64,
        factors: &ComfortFactors,
        air_speed: f64,
        now: DateTime<FixedOffset>,
    ) -> PmvResult {
        let main = sensors.main.temperature;
        let upstairs = sensors.sub.map(|sub| sub.temperature).unwrap_or(main);
        let surfaces = self
            .surfaces
            .surfaces(outdoor_temperature, main, upstairs, now);

        let met = f64::from(factors.met);
        let clo = clo_dynamic(f64::from(factors.clo), met);
        let vr = v_relative(air_speed, met);
        let tdb = sensors.average_indoor_temperature();
        let tr = surfaces.mean_radiant();
        let rh = sensors.average_indoor_humidity();

        let PmvPpd { pmv, ppd } = pmv_ppd(tdb, tr, vr, rh, met, clo);
        debug!(
            "pmv inputs: tdb={tdb:.2} tr={tr:.2} vr={vr:.3} rh={rh:.1} met={met:.2} clo={clo:.3}"
        );

        PmvResult {
            pmv,
            ppd,
            clo_dynamic: clo,
            relative_air_speed: vr,
            wall_temp: surfaces.wall,
            ceiling_temp: surfaces.ceiling,
            floor_temp: surfaces.floor,
            mean_radiant_temp: tr,
            dry_bulb_temp: tdb,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::Reading;
    use chrono::TimeZone;

    fn noon() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(9 * 3600)
            .unwrap()
            .with_ymd_and_hms(2026, 7, 20, 12, 0, 0)
            .unwrap()
    }

    #[test]
    fn adjustments_only_apply_above_their_metabolic_thresholds() {
        assert_eq!(v_relative(0.1, 1.0), 0.1);
        assert!((v_relative(0.1, 1.2) - 0.16).abs() < 1e-9);
        assert_eq!(clo_dynamic(0.5, 1.2), 0.5);
        assert!((clo_dynamic(1.0, 2.0) - 0.8).abs() < 1e-9);
    }

    #[test]
    fn iso_reference_case_is_near_neutral() {
        // ISO 7730 Annex D: 22 °C, 0.1 m/s, 60 %, 1.2 met, 0.5 clo -> PMV -0.75.
        let pmv = fanger_pmv(22.0, 22.0, 0.1, 60.0, 1.2, 0.5);
        assert!((pmv - (-0.75)).abs() < 0.05, "pmv = {pmv}");
    }

    #[test]
    fn ppd_is_five_percent_at_neutral() {
        assert!((ppd_from_pmv(0.0) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn extreme_inputs_stay_in_bounds() {
        for (tdb, rh) in [(45.0, 90.0), (5.0, 20.0), (30.0, 60.0), (18.0, 40.0)] {
            for vr in [0.05, 0.1, 0.3, 1.0] {
                let result = pmv_ppd(tdb, tdb, vr, rh, 1.2, 0.5);
                assert!((-3.0..=3.0).contains(&result.pmv), "{tdb} {rh} {vr}");
                assert!((0.0..=100.0).contains(&result.ppd));
            }
        }
    }

    #[test]
    fn moving_air_cools_a_warm_room() {
        let still = pmv_ppd(28.0, 28.0, 0.1, 55.0, 1.1, 0.5);
        let breeze = pmv_ppd(28.0, 28.0, 0.6, 55.0, 1.1, 0.5);

        assert!(breeze.pmv < still.pmv, "{} !< {}", breeze.pmv, still.pmv);
        assert!(cooling_effect(28.0, 28.0, 0.6, 55.0, 1.1, 0.5) > 0.0);
        assert_eq!(cooling_effect(28.0, 28.0, 0.08, 55.0, 1.1, 0.5), 0.0);
    }

    #[test]
    fn calculator_uses_surface_mean_as_radiant_temperature() {
        let config = SurfaceModelConfig::default();
        let calculator = ThermalComfortCalculator::new(&config);
        let mut sensors = SensorSet::new(Reading::new(28.0, 55.0));
        sensors.sub = Some(Reading::new(29.0, 50.0));

        let result = calculator.calculate(
            &sensors,
            32.0,
            &ComfortFactors::new(1.0, 0.5),
            DEFAULT_AIR_SPEED,
            noon(),
        );

        let mean = (result.wall_temp + result.ceiling_temp + result.floor_temp) / 3.0;
        assert!((result.mean_radiant_temp - mean).abs() < 1e-9);
        assert!((result.dry_bulb_temp - 28.5).abs() < 1e-9);
        assert_eq!(result.relative_air_speed, DEFAULT_AIR_SPEED);
        assert!(result.pmv > 0.0);
        assert!((-3.0..=3.0).contains(&result.pmv));
    }
}
