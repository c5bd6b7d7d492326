// src/jobs/binding.rs

//! Parameter bindings: one named input slot of a job, possibly array-valued.

use thiserror::Error;

use crate::types::ValueId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BindingError {
    #[error("parameter '{parameter}' must expect at least one value")]
    NoValuesExpected { parameter: String },

    #[error("parameter '{parameter}': index {index} is out of range for {expected} values")]
    IndexOutOfRange {
        parameter: String,
        index: usize,
        expected: usize,
    },

    #[error("parameter '{parameter}' was declared with {declared} values, now {requested}")]
    ExpectedCountMismatch {
        parameter: String,
        declared: usize,
        requested: usize,
    },

    #[error("parameter '{parameter}' slot {index} is already bound to '{existing}'")]
    SlotConflict {
        parameter: String,
        index: usize,
        existing: ValueId,
    },
}

/// One value slot of a parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueSlot {
    pub value_id: ValueId,
    pub resolved: bool,
}

/// What happened when a slot was bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    /// The slot was empty and is now bound.
    Bound,
    /// The slot already held the same value; nothing changed.
    AlreadyBound,
}

/// Parameter `parameter` of a job expects `values_expected` values; slot `i`
/// holds the value supplied for index `i`.
///
/// The parameter resolves only once every index has a resolved value.
#[derive(Debug, Clone)]
pub struct ParameterBinding {
    parameter: String,
    slots: Vec<Option<ValueSlot>>,
}

impl ParameterBinding {
    pub fn new(parameter: &str, values_expected: usize) -> Result<Self, BindingError> {
        if values_expected == 0 {
            return Err(BindingError::NoValuesExpected {
                parameter: parameter.to_string(),
            });
        }
        Ok(Self {
            parameter: parameter.to_string(),
            slots: vec![None; values_expected],
        })
    }

    pub fn parameter(&self) -> &str {
        &self.parameter
    }

    pub fn values_expected(&self) -> usize {
        self.slots.len()
    }

    /// Check that a request for `values_expected` values at `index` fits this
    /// binding, without modifying it.
    pub fn check(&self, values_expected: usize, index: usize) -> Result<(), BindingError> {
        if values_expected != self.slots.len() {
            return Err(BindingError::ExpectedCountMismatch {
                parameter: self.parameter.clone(),
                declared: self.slots.len(),
                requested: values_expected,
            });
        }
        if index >= self.slots.len() {
            return Err(BindingError::IndexOutOfRange {
                parameter: self.parameter.clone(),
                index,
                expected: self.slots.len(),
            });
        }
        Ok(())
    }

    pub fn bind(
        &mut self,
        index: usize,
        value_id: &str,
        resolved: bool,
    ) -> Result<BindOutcome, BindingError> {
        let expected = self.slots.len();
        let slot = self
            .slots
            .get_mut(index)
            .ok_or_else(|| BindingError::IndexOutOfRange {
                parameter: self.parameter.clone(),
                index,
                expected,
            })?;

        match slot {
            Some(existing) if existing.value_id == value_id => {
                existing.resolved |= resolved;
                Ok(BindOutcome::AlreadyBound)
            }
            Some(existing) => Err(BindingError::SlotConflict {
                parameter: self.parameter.clone(),
                index,
                existing: existing.value_id.clone(),
            }),
            None => {
                *slot = Some(ValueSlot {
                    value_id: value_id.to_string(),
                    resolved,
                });
                Ok(BindOutcome::Bound)
            }
        }
    }

    /// Mark every pending slot holding `value_id` as resolved.
    ///
    /// Returns how many slots changed.
    pub fn resolve(&mut self, value_id: &str) -> usize {
        let mut changed = 0;
        for slot in self.slots.iter_mut().flatten() {
            if !slot.resolved && slot.value_id == value_id {
                slot.resolved = true;
                changed += 1;
            }
        }
        changed
    }

    pub fn is_resolved(&self) -> bool {
        self.slots
            .iter()
            .all(|slot| matches!(slot, Some(ValueSlot { resolved: true, .. })))
    }

    /// Number of indices that have been bound so far (resolved or not).
    pub fn arrived(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Value identifiers that are bound but not yet available.
    pub fn pending_values(&self) -> impl Iterator<Item = &str> {
        self.slots
            .iter()
            .flatten()
            .filter(|slot| !slot.resolved)
            .map(|slot| slot.value_id.as_str())
    }

    /// Bound value identifiers in index order. Unbound slots are skipped.
    pub fn value_ids(&self) -> Vec<ValueId> {
        self.slots
            .iter()
            .flatten()
            .map(|slot| slot.value_id.clone())
            .collect()
    }
}
