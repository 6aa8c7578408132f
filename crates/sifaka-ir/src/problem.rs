//! Problem definitions: the (reference, target, representation) triple.

use thiserror::Error;

use crate::pmrs::{Pmrs, PmrsError};
use crate::terms::Term;
use crate::types::{unify, RType, TypeRegistry, UnifyError};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProblemError {
    #[error("domains of target and representation do not compose: {0}")]
    Composition(UnifyError),
    #[error("reference and target output types differ: {0}")]
    OutputMismatch(UnifyError),
    #[error(transparent)]
    Pmrs(#[from] PmrsError),
}

/// A synthesis problem: fill the holes of `target` so that
/// `target = reference ∘ repr` extensionally.
#[derive(Debug, Clone)]
pub struct ProblemDefn {
    pub reference: Pmrs,
    pub target: Pmrs,
    pub repr: Pmrs,
    /// Optional precondition scheme over the concrete domain θ.
    pub tinv: Option<Pmrs>,
    /// Cached: the representation is the identity function.
    pub repr_is_identity: bool,
}

impl ProblemDefn {
    /// Build a problem, unifying the three schemes' domains and committing
    /// the resulting substitution (`unify_two_with_update`).
    pub fn new(
        registry: &TypeRegistry,
        mut reference: Pmrs,
        mut target: Pmrs,
        mut repr: Pmrs,
        tinv: Option<Pmrs>,
    ) -> Result<Self, ProblemError> {
        // θ: target input = repr input; τ: repr output = reference input.
        let domains = unify(&[
            (repr.input_type.clone(), target.input_type.clone()),
            (repr.output_type.clone(), reference.input_type.clone()),
        ])
        .map_err(ProblemError::Composition)?;
        // α: equal output types modulo unification.
        let outputs = unify(&[(
            domains.apply(&reference.output_type),
            domains.apply(&target.output_type),
        )])
        .map_err(ProblemError::OutputMismatch)?;
        for p in [&mut reference, &mut target, &mut repr] {
            p.apply_type_subst(&domains);
            p.apply_type_subst(&outputs);
        }
        let mut tinv = tinv;
        if let Some(inv) = &mut tinv {
            inv.apply_type_subst(&domains);
            inv.apply_type_subst(&outputs);
        }
        reference.validate(registry)?;
        target.validate(registry)?;
        repr.validate(registry)?;
        let repr_is_identity = repr.is_identity();
        Ok(Self {
            reference,
            target,
            repr,
            tinv,
            repr_is_identity,
        })
    }

    /// Input type θ of the target.
    pub fn theta(&self) -> &RType {
        &self.target.input_type
    }

    /// Input type τ of the reference.
    pub fn tau(&self) -> &RType {
        &self.reference.input_type
    }

    /// Common output type α.
    pub fn alpha(&self) -> &RType {
        &self.reference.output_type
    }

    /// `reference (repr t)`: the specification side on a concrete input.
    pub fn spec_of(&self, t: Term) -> Term {
        if self.repr_is_identity {
            self.reference.apply_main(t)
        } else {
            self.reference.apply_main(self.repr.apply_main(t))
        }
    }

    /// `target t`: the skeleton side on a concrete input.
    pub fn skeleton_of(&self, t: Term) -> Term {
        self.target.apply_main(t)
    }
}
