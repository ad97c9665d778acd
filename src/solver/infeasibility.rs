// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! Irreducible infeasible subsystems by deletion filtering.

use std::collections::BTreeSet;

use super::{Model, SolverBackend};
use crate::Error;

/// Drops the constraints of an infeasible model one at a time, putting a
/// constraint back only if the model becomes feasible without it.  The
/// constraints left at the end form an irreducible infeasible subsystem.
pub(super) fn deletion_filter<B: SolverBackend + ?Sized>(
    backend: &B,
    model: &Model,
) -> Result<BTreeSet<String>, Error> {
    let is_feasible = |keep: &[bool]| -> Result<bool, Error> {
        let candidate = model.feasibility_subset(|i| keep[i]);
        backend.is_feasible(&candidate)
    };

    let mut keep = vec![true; model.constraints().len()];
    if is_feasible(&keep)? {
        tracing::warn!("Asked to explain the infeasibility of a feasible model.");
        return Ok(BTreeSet::new());
    }

    for i in 0..keep.len() {
        keep[i] = false;
        if is_feasible(&keep)? {
            keep[i] = true;
        }
    }

    let conflict = model
        .constraints()
        .iter()
        .zip(&keep)
        .filter(|(_, kept)| **kept)
        .map(|(c, _)| c.name().to_string())
        .collect::<BTreeSet<_>>();
    tracing::debug!("Infeasible subsystem: {:?}", conflict);
    Ok(conflict)
}
