//! Propagator Builder.
//!
//! Turns fixed experiment geometry plus one set of exchange parameters into the
//! immutable bundle of pulse-element propagators the observable calculator
//! composes. Nothing here validates physical plausibility (a negative `pb`
//! still yields a propagator); bounding parameters is the minimizer's job.

use std::f64::consts::PI;

use nalgebra::DMatrix;

use crate::domain::CpmgVariant;
use crate::error::AppError;
use crate::math::ensure_dim;
use crate::models::liouvillian::{ExchangeParams, Liouvillian};

/// Fixed pulse-sequence geometry of one experiment.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    pub variant: CpmgVariant,
    /// 90° pulse width (s).
    pub pw: f64,
    /// Total CPMG delay (s).
    pub time_t2: f64,
    /// Delay after the CPMG block (s).
    pub time_equil: f64,
    /// Carrier position (ppm).
    pub carrier: f64,
    /// Conversion of ppm to rad/s for the detected nucleus.
    pub ppm_to_rads: f64,
    /// Cycle count the padded variants fill up to.
    pub ncyc_max: u32,
}

impl Geometry {
    /// RF field strength (rad/s) such that `pw` is a 90° pulse.
    pub fn w1(&self) -> f64 {
        if self.pw > 0.0 {
            2.0 * PI / (4.0 * self.pw)
        } else {
            0.0
        }
    }

    /// Free-precession delay around each refocusing pulse.
    ///
    /// Reference points (`ncyc == 0`) have no CPMG delay.
    pub fn tau_cp(&self, ncyc: u32) -> f64 {
        if ncyc == 0 {
            return 0.0;
        }
        let base = self.time_t2 / (4.0 * f64::from(ncyc));
        match self.variant {
            CpmgVariant::NIp | CpmgVariant::NCwY => base - self.pw,
            CpmgVariant::NCw => base - 0.75 * self.pw,
        }
    }
}

/// Index into the four-phase propagator arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    PlusX = 0,
    PlusY = 1,
    MinusX = 2,
    MinusY = 3,
}

impl Phase {
    /// Phase-cycle lists encode phases as `0..4`.
    pub fn from_index(i: u8) -> Phase {
        match i % 4 {
            0 => Phase::PlusX,
            1 => Phase::PlusY,
            2 => Phase::MinusX,
            _ => Phase::MinusY,
        }
    }
}

/// Immutable propagators for one set of exchange parameters.
///
/// Shared through `Arc` by the evaluation cache; never mutated after `build`.
#[derive(Debug, Clone)]
pub struct PropagatorSet {
    dim: usize,
    /// Free-precession generator, kept to build delay propagators of arbitrary length.
    pub l_free: DMatrix<f64>,
    pub p_equil: DMatrix<f64>,
    /// Compensates free precession during the pulse (`exp(±L·2pw/π)`).
    pub p_pos: DMatrix<f64>,
    pub p_neg: DMatrix<f64>,
    /// Free precession over one pulse width.
    pub p_free_pw: DMatrix<f64>,
    pub p_90: [DMatrix<f64>; 4],
    pub p_180: [DMatrix<f64>; 4],
    /// Average of the +y and -y 180° pulses (imperfect calibration).
    pub p_180pmy: DMatrix<f64>,
}

impl PropagatorSet {
    pub fn build(geometry: &Geometry, ex: &ExchangeParams) -> Result<Self, AppError> {
        let pw = geometry.pw;
        let l = Liouvillian::two_state(ex, geometry.w1());
        let dim = Liouvillian::dim();

        let p_equil = (&l.free * geometry.time_equil).exp();
        let p_pos = (&l.free * (2.0 * pw / PI)).exp();
        let p_neg = (&l.free * (-2.0 * pw / PI)).exp();
        let p_free_pw = (&l.free * pw).exp();

        let p_90 = [
            ((&l.free + &l.w1x) * pw).exp(),
            ((&l.free + &l.w1y) * pw).exp(),
            ((&l.free - &l.w1x) * pw).exp(),
            ((&l.free - &l.w1y) * pw).exp(),
        ];
        let p_180 = [
            &p_90[0] * &p_90[0],
            &p_90[1] * &p_90[1],
            &p_90[2] * &p_90[2],
            &p_90[3] * &p_90[3],
        ];
        let p_180pmy = (&p_180[Phase::PlusY as usize] + &p_180[Phase::MinusY as usize]) * 0.5;

        let set = Self {
            dim,
            l_free: l.free,
            p_equil,
            p_pos,
            p_neg,
            p_free_pw,
            p_90,
            p_180,
            p_180pmy,
        };
        set.validate()?;
        Ok(set)
    }

    fn validate(&self) -> Result<(), AppError> {
        ensure_dim(&self.l_free, self.dim, "l_free")?;
        ensure_dim(&self.p_equil, self.dim, "p_equil")?;
        ensure_dim(&self.p_pos, self.dim, "p_pos")?;
        ensure_dim(&self.p_neg, self.dim, "p_neg")?;
        ensure_dim(&self.p_free_pw, self.dim, "p_free_pw")?;
        for (p90, p180) in self.p_90.iter().zip(self.p_180.iter()) {
            ensure_dim(p90, self.dim, "p_90")?;
            ensure_dim(p180, self.dim, "p_180")?;
        }
        ensure_dim(&self.p_180pmy, self.dim, "p_180pmy")?;
        if self.p_180pmy.iter().any(|v| !v.is_finite()) {
            return Err(AppError::numerical("Non-finite propagator elements."));
        }
        Ok(())
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn p_90(&self, phase: Phase) -> &DMatrix<f64> {
        &self.p_90[phase as usize]
    }

    pub fn p_180(&self, phase: Phase) -> &DMatrix<f64> {
        &self.p_180[phase as usize]
    }

    /// Free precession over `t` seconds.
    pub fn delay(&self, t: f64) -> DMatrix<f64> {
        (&self.l_free * t).exp()
    }
}
