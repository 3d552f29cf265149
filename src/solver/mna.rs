//! MNA stamp templates.
//!
//! Each stamp requests its matrix and RHS handles once, during equation
//! allocation, and then writes through those handles on every load. All
//! stamps are generic over the scalar so the same template serves the real
//! (DC/transient) and complex (AC) systems.

use crate::circuit::Unknown;
use crate::error::Result;

use super::sparse::{MatrixElement, RhsElement, Scalar, SparseSystem};

/// Stamp for a conductance G between nodes n1 and n2:
///   A[n1,n1] += G
///   A[n2,n2] += G
///   A[n1,n2] -= G
///   A[n2,n1] -= G
#[derive(Debug, Clone, Copy)]
pub struct ConductanceStamp {
    pp: MatrixElement,
    nn: MatrixElement,
    pn: MatrixElement,
    np: MatrixElement,
}

impl ConductanceStamp {
    /// Request the four handles.
    pub fn allocate<T: Scalar>(
        system: &mut SparseSystem<T>,
        pos: Unknown,
        neg: Unknown,
    ) -> Result<Self> {
        Ok(Self {
            pp: system.matrix_element(pos.index(), pos.index())?,
            nn: system.matrix_element(neg.index(), neg.index())?,
            pn: system.matrix_element(pos.index(), neg.index())?,
            np: system.matrix_element(neg.index(), pos.index())?,
        })
    }

    /// Add conductance `g`.
    pub fn load<T: Scalar>(&self, system: &mut SparseSystem<T>, g: T) {
        system.add(self.pp, g);
        system.add(self.nn, g);
        system.sub(self.pn, g);
        system.sub(self.np, g);
    }
}

/// Stamp for a current flowing from n+ to n- through the device:
///   z[n+] -= I
///   z[n-] += I
#[derive(Debug, Clone, Copy)]
pub struct CurrentStamp {
    pos: RhsElement,
    neg: RhsElement,
}

impl CurrentStamp {
    /// Request the two RHS handles.
    pub fn allocate<T: Scalar>(
        system: &mut SparseSystem<T>,
        pos: Unknown,
        neg: Unknown,
    ) -> Result<Self> {
        Ok(Self {
            pos: system.rhs_element(pos.index())?,
            neg: system.rhs_element(neg.index())?,
        })
    }

    /// Add current `i`.
    pub fn load<T: Scalar>(&self, system: &mut SparseSystem<T>, i: T) {
        system.sub_rhs(self.pos, i);
        system.add_rhs(self.neg, i);
    }
}

/// Stamp coupling a branch current to its two terminals.
///
/// KCL at the terminals and the branch equation V[n+] - V[n-] = ...:
///   A[n+,br] += 1, A[n-,br] -= 1
///   A[br,n+] += 1, A[br,n-] -= 1
#[derive(Debug, Clone, Copy)]
pub struct BranchStamp {
    pos_br: MatrixElement,
    neg_br: MatrixElement,
    br_pos: MatrixElement,
    br_neg: MatrixElement,
    /// Branch equation row on the RHS.
    pub rhs: RhsElement,
    /// Branch diagonal, for devices with a series impedance term.
    pub diagonal: MatrixElement,
}

impl BranchStamp {
    /// Request the incidence handles plus the branch diagonal and RHS.
    pub fn allocate<T: Scalar>(
        system: &mut SparseSystem<T>,
        pos: Unknown,
        neg: Unknown,
        branch: Unknown,
    ) -> Result<Self> {
        Ok(Self {
            pos_br: system.matrix_element(pos.index(), branch.index())?,
            neg_br: system.matrix_element(neg.index(), branch.index())?,
            br_pos: system.matrix_element(branch.index(), pos.index())?,
            br_neg: system.matrix_element(branch.index(), neg.index())?,
            rhs: system.rhs_element(branch.index())?,
            diagonal: system.matrix_element(branch.index(), branch.index())?,
        })
    }

    /// Write the unit incidence entries.
    pub fn load_incidence<T: Scalar>(&self, system: &mut SparseSystem<T>, one: T) {
        system.add(self.pos_br, one);
        system.sub(self.neg_br, one);
        system.add(self.br_pos, one);
        system.sub(self.br_neg, one);
    }
}

/// Stamp for a current I = gm * (V[c+] - V[c-]) flowing from out+ to out-
/// through the device.
#[derive(Debug, Clone, Copy)]
pub struct TransconductanceStamp {
    pos_cpos: MatrixElement,
    pos_cneg: MatrixElement,
    neg_cpos: MatrixElement,
    neg_cneg: MatrixElement,
}

impl TransconductanceStamp {
    /// Request the four handles.
    pub fn allocate<T: Scalar>(
        system: &mut SparseSystem<T>,
        out_pos: Unknown,
        out_neg: Unknown,
        ctrl_pos: Unknown,
        ctrl_neg: Unknown,
    ) -> Result<Self> {
        Ok(Self {
            pos_cpos: system.matrix_element(out_pos.index(), ctrl_pos.index())?,
            pos_cneg: system.matrix_element(out_pos.index(), ctrl_neg.index())?,
            neg_cpos: system.matrix_element(out_neg.index(), ctrl_pos.index())?,
            neg_cneg: system.matrix_element(out_neg.index(), ctrl_neg.index())?,
        })
    }

    /// Add transconductance `gm`.
    pub fn load<T: Scalar>(&self, system: &mut SparseSystem<T>, gm: T) {
        system.add(self.pos_cpos, gm);
        system.sub(self.pos_cneg, gm);
        system.sub(self.neg_cpos, gm);
        system.add(self.neg_cneg, gm);
    }
}
