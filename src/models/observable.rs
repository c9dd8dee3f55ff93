//! Observable Calculator.
//!
//! Composes the propagators of a `PropagatorSet` according to the pulse
//! sequence of a CPMG variant, applies the result to the equilibrium
//! magnetization and returns the unscaled intensity (`i0 = 1`).

use nalgebra::{DMatrix, DVector};

use crate::domain::{ArgSlot, CpmgVariant};
use crate::error::AppError;
use crate::math::{apply_chain, matrix_power};
use crate::models::liouvillian::{ExchangeParams, OBSERVABLE_INDEX, equilibrium_magnetization};
use crate::models::propagator::{Geometry, Phase, PropagatorSet};

/// Phases of the refocusing pulses in the two independent 16-step cycles.
const PHASE_CYCLE_1: [u8; 16] = [0, 0, 1, 3, 0, 0, 3, 1, 0, 0, 3, 1, 0, 0, 1, 3];
const PHASE_CYCLE_2: [u8; 16] = [1, 3, 2, 2, 3, 1, 2, 2, 3, 1, 2, 2, 1, 3, 2, 2];

/// Arguments of one observable evaluation, in input units.
///
/// `dw` and `cs` are in ppm; everything else in s⁻¹ (or fraction for `pb`).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ObservableArgs {
    pub pb: f64,
    pub kex: f64,
    pub dw: f64,
    pub cs: f64,
    pub r_nxy: f64,
    pub dr_nxy: f64,
    pub r_nz: f64,
}

impl ObservableArgs {
    pub fn set(&mut self, slot: ArgSlot, value: f64) {
        match slot {
            ArgSlot::Pb => self.pb = value,
            ArgSlot::Kex => self.kex = value,
            ArgSlot::Dw => self.dw = value,
            ArgSlot::Cs => self.cs = value,
            ArgSlot::RNxy => self.r_nxy = value,
            ArgSlot::DrNxy => self.dr_nxy = value,
            ArgSlot::RNz => self.r_nz = value,
        }
    }

    pub fn key_values(&self) -> [f64; 7] {
        [
            self.pb, self.kex, self.dw, self.cs, self.r_nxy, self.dr_nxy, self.r_nz,
        ]
    }
}

/// Observable calculator bound to one experiment's geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservableCalculator {
    geometry: Geometry,
}

impl ObservableCalculator {
    pub fn new(geometry: Geometry) -> Self {
        Self { geometry }
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Convert ppm-valued arguments into generator parameters.
    pub fn exchange_params(&self, args: &ObservableArgs) -> ExchangeParams {
        let g = &self.geometry;
        ExchangeParams {
            pb: args.pb,
            kex: args.kex,
            dw: args.dw * g.ppm_to_rads,
            r_nxy: args.r_nxy,
            dr_nxy: args.dr_nxy,
            r_nz: args.r_nz,
            cs_offset: (args.cs - g.carrier) * g.ppm_to_rads,
        }
    }

    /// Unscaled intensity after `ncyc` refocusing cycles.
    pub fn observable(&self, set: &PropagatorSet, pb: f64, ncyc: u32) -> Result<f64, AppError> {
        let mag_eq = equilibrium_magnetization(pb);
        if mag_eq.len() != set.dim() {
            return Err(AppError::numerical(format!(
                "Equilibrium vector has length {} but propagators are {}x{}.",
                mag_eq.len(),
                set.dim(),
                set.dim()
            )));
        }

        let mag = match (self.geometry.variant, ncyc) {
            (CpmgVariant::NIp, 0) => self.n_ip_reference(set, &mag_eq)?,
            (CpmgVariant::NIp, n) => self.n_ip_train(set, &mag_eq, n)?,
            (CpmgVariant::NCw, 0) => self.n_cw_reference(set, &mag_eq)?,
            (CpmgVariant::NCw, n) => self.n_cw_train(set, &mag_eq, n)?,
            (CpmgVariant::NCwY, 0) => self.n_cw_y_reference(set, &mag_eq)?,
            (CpmgVariant::NCwY, n) => self.n_cw_y_train(set, &mag_eq, n)?,
        };

        Ok(mag[OBSERVABLE_INDEX])
    }

    fn n_ip_reference(&self, set: &PropagatorSet, mag_eq: &DVector<f64>) -> Result<DVector<f64>, AppError> {
        apply_chain(
            &[&set.p_equil, set.p_90(Phase::MinusY), set.p_90(Phase::PlusY)],
            mag_eq,
        )
    }

    fn n_ip_train(&self, set: &PropagatorSet, mag_eq: &DVector<f64>, ncyc: u32) -> Result<DVector<f64>, AppError> {
        // One cycle is t-180-2t-180-t.
        let p_free = set.delay(self.geometry.tau_cp(ncyc));
        let echo = &p_free * set.p_180(Phase::PlusX) * &p_free;
        let p_cp = matrix_power(&(&echo * &echo), ncyc);
        apply_chain(
            &[
                &set.p_equil,
                set.p_90(Phase::MinusY),
                &set.p_neg,
                &p_cp,
                &set.p_neg,
                set.p_90(Phase::PlusY),
            ],
            mag_eq,
        )
    }

    fn n_cw_reference(&self, set: &PropagatorSet, mag_eq: &DVector<f64>) -> Result<DVector<f64>, AppError> {
        let pad = matrix_power(&set.p_free_pw, self.geometry.ncyc_max.saturating_sub(1));
        let mag1 = apply_chain(
            &[
                &set.p_equil,
                &pad,
                set.p_90(Phase::MinusY),
                set.p_180(Phase::PlusX),
                &set.p_pos,
                &set.p_pos,
                set.p_180(Phase::PlusX),
                set.p_90(Phase::PlusY),
            ],
            mag_eq,
        )?;
        let mag2 = apply_chain(
            &[
                &set.p_equil,
                &pad,
                set.p_90(Phase::MinusY),
                set.p_180(Phase::MinusY),
                &set.p_pos,
                &set.p_pos,
                set.p_180(Phase::PlusY),
                set.p_90(Phase::PlusY),
            ],
            mag_eq,
        )?;
        Ok((mag1 + mag2) * 0.5)
    }

    fn n_cw_train(&self, set: &PropagatorSet, mag_eq: &DVector<f64>, ncyc: u32) -> Result<DVector<f64>, AppError> {
        let p_free = set.delay(self.geometry.tau_cp(ncyc));
        let pad = matrix_power(&set.p_free_pw, self.geometry.ncyc_max.saturating_sub(ncyc));

        let p_cp1 = phase_cycled_train(set, &p_free, &PHASE_CYCLE_1, ncyc);
        let p_cp2 = phase_cycled_train(set, &p_free, &PHASE_CYCLE_2, ncyc);

        let mut mags = Vec::with_capacity(2);
        for p_cp in [&p_cp1, &p_cp2] {
            mags.push(apply_chain(
                &[
                    &set.p_equil,
                    &pad,
                    set.p_90(Phase::MinusY),
                    &set.p_neg,
                    p_cp,
                    &set.p_neg,
                    set.p_90(Phase::PlusY),
                ],
                mag_eq,
            )?);
        }
        Ok((&mags[0] + &mags[1]) * 0.5)
    }

    fn n_cw_y_reference(&self, set: &PropagatorSet, mag_eq: &DVector<f64>) -> Result<DVector<f64>, AppError> {
        apply_chain(
            &[
                &set.p_equil,
                set.p_90(Phase::PlusY),
                &set.p_180pmy,
                set.p_90(Phase::PlusY),
            ],
            mag_eq,
        )
    }

    fn n_cw_y_train(&self, set: &PropagatorSet, mag_eq: &DVector<f64>, ncyc: u32) -> Result<DVector<f64>, AppError> {
        let p_free = set.delay(self.geometry.tau_cp(ncyc));
        let echo = &p_free * set.p_180(Phase::PlusX) * &p_free;
        let p_cp = matrix_power(&echo, ncyc);
        apply_chain(
            &[
                &set.p_equil,
                set.p_90(Phase::PlusY),
                &set.p_neg,
                &p_cp,
                &set.p_180pmy,
                &p_cp,
                &set.p_neg,
                set.p_90(Phase::PlusY),
            ],
            mag_eq,
        )
    }
}

/// Product of `2·ncyc` echo elements whose refocusing phases follow `cycle`.
fn phase_cycled_train(set: &PropagatorSet, p_free: &DMatrix<f64>, cycle: &[u8], ncyc: u32) -> DMatrix<f64> {
    let dim = set.dim();
    let mut p_cp = DMatrix::<f64>::identity(dim, dim);
    for m in 0..(2 * ncyc as usize) {
        let phase = Phase::from_index(cycle[m % cycle.len()]);
        p_cp = p_free * set.p_180(phase) * p_free * p_cp;
    }
    p_cp
}
