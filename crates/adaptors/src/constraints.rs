//! Valid-combination constraints.
//!
//! A constraint set lists the combinations of field values the backend can
//! serve, e.g.
//!
//! ```yaml
//! - {model: [ensemble, chimere], type: [forecast, analysis]}
//! - {model: [silam], type: [forecast]}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use adaptor_common::Request;

use crate::error::{AdaptorError, Result};

/// Combinations of field values the backend can serve.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConstraintSet {
    combinations: Vec<BTreeMap<String, Vec<String>>>,
}

impl ConstraintSet {
    pub fn new(combinations: Vec<BTreeMap<String, Vec<String>>>) -> Self {
        Self { combinations }
    }

    pub fn is_empty(&self) -> bool {
        self.combinations.is_empty()
    }

    /// Fields mentioned by at least one combination.
    pub fn constrained_fields(&self) -> BTreeSet<&str> {
        self.combinations
            .iter()
            .flat_map(|c| c.keys().map(String::as_str))
            .collect()
    }

    /// Narrow the constrained fields of `request` to the values that take
    /// part in some valid combination.
    ///
    /// The selection is read as the cross product of its constrained values.
    /// Values that appear in no allowed tuple are dropped; if the narrowed
    /// product still mixes values no single combination allows, the request
    /// is rejected. Unconstrained fields are untouched and a request that
    /// already satisfies the constraints is returned unchanged.
    pub fn apply(&self, request: &Request) -> Result<Request> {
        if self.is_empty() {
            return Ok(request.clone());
        }

        let mut selected: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for field in self.constrained_fields() {
            if let Some(values) = request.values(field)? {
                if !values.is_empty() {
                    selected.insert(field, values);
                }
            }
        }
        let fields: Vec<&str> = selected.keys().copied().collect();
        let choices: Vec<&Vec<String>> = selected.values().collect();

        let total = choices
            .iter()
            .try_fold(1u64, |acc, values| acc.checked_mul(values.len() as u64))
            .filter(|total| *total <= MAX_CHECKED_TUPLES)
            .ok_or_else(|| {
                AdaptorError::Constraint(format!(
                    "selection of {} is too large to check",
                    fields.join(", ")
                ))
            })?;

        let mut kept: Vec<BTreeSet<&str>> = vec![BTreeSet::new(); fields.len()];
        let mut uncovered: Vec<Vec<&str>> = Vec::new();
        let mut index = vec![0usize; fields.len()];
        for _ in 0..total {
            let tuple: Vec<&str> = index
                .iter()
                .zip(&choices)
                .map(|(i, values)| values[*i].as_str())
                .collect();
            if self.covers(&fields, &tuple) {
                for (slot, value) in kept.iter_mut().zip(&tuple) {
                    slot.insert(*value);
                }
            } else {
                uncovered.push(tuple);
            }
            advance(&mut index, &choices);
        }

        if kept.iter().any(BTreeSet::is_empty) {
            return Err(AdaptorError::Constraint(format!(
                "no valid combination of {}",
                describe(&selected)
            )));
        }
        if let Some(tuple) = uncovered
            .iter()
            .find(|tuple| tuple.iter().zip(&kept).all(|(v, slot)| slot.contains(v)))
        {
            let pairs: Vec<String> = fields
                .iter()
                .zip(tuple)
                .map(|(field, value)| format!("{}={}", field, value))
                .collect();
            return Err(AdaptorError::Constraint(format!(
                "{} is not a valid combination; split the request",
                pairs.join(", ")
            )));
        }

        let mut narrowed = request.clone();
        for ((field, values), slot) in selected.iter().zip(&kept) {
            let remaining: Vec<&String> =
                values.iter().filter(|v| slot.contains(v.as_str())).collect();
            if remaining.len() != values.len() {
                debug!(
                    field = %field,
                    requested = values.len(),
                    kept = remaining.len(),
                    "Narrowed request field"
                );
                narrowed.set(
                    *field,
                    Value::Array(remaining.into_iter().map(|v| Value::String(v.clone())).collect()),
                );
            }
        }

        Ok(narrowed)
    }

    /// Whether some combination allows every value of `tuple`. A combination
    /// that does not mention a field allows every value of it.
    fn covers(&self, fields: &[&str], tuple: &[&str]) -> bool {
        self.combinations.iter().any(|combination| {
            fields.iter().zip(tuple).all(|(field, value)| {
                combination
                    .get(*field)
                    .map_or(true, |allowed| allowed.iter().any(|a| a == value))
            })
        })
    }
}

/// Largest cross product of constrained values checked per request.
pub const MAX_CHECKED_TUPLES: u64 = 100_000;

/// Step `index` to the next tuple of the cross product, last field fastest.
fn advance(index: &mut [usize], choices: &[&Vec<String>]) {
    for (i, values) in index.iter_mut().zip(choices).rev() {
        *i += 1;
        if *i < values.len() {
            return;
        }
        *i = 0;
    }
}

fn describe(selected: &BTreeMap<&str, Vec<String>>) -> String {
    selected
        .iter()
        .map(|(field, values)| format!("{}={}", field, values.join("/")))
        .collect::<Vec<_>>()
        .join(", ")
}
