//! Type language and Robinson unification.
//!
//! The type language covers the four scalar base types, named algebraic
//! data types with tuple-payload variants, tuples, function arrows, and
//! fresh type variables. A [`TypeRegistry`] maps type names to their
//! definitions and variant names back to their owning type.

use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;
use thiserror::Error;

/// A type term.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RType {
    Int,
    Bool,
    Str,
    Char,
    /// Named ADT applied to type arguments (empty for monomorphic types).
    Named(String, Vec<RType>),
    Tuple(Vec<RType>),
    Fun(Box<RType>, Box<RType>),
    /// Fresh type variable.
    Var(u32),
}

impl RType {
    pub fn named(name: impl Into<String>) -> Self {
        RType::Named(name.into(), Vec::new())
    }

    pub fn fun(dom: RType, cod: RType) -> Self {
        RType::Fun(Box::new(dom), Box::new(cod))
    }

    /// Uncurried view of an arrow type: argument list and final codomain.
    pub fn uncurry(&self) -> (Vec<&RType>, &RType) {
        let mut args = Vec::new();
        let mut cur = self;
        while let RType::Fun(d, c) = cur {
            args.push(d.as_ref());
            cur = c.as_ref();
        }
        (args, cur)
    }

    /// True for the scalar base types.
    pub fn is_base(&self) -> bool {
        matches!(self, RType::Int | RType::Bool | RType::Str | RType::Char)
    }

    pub fn is_adt(&self) -> bool {
        matches!(self, RType::Named(_, _))
    }

    /// Collect the type variables occurring in `self`.
    pub fn vars(&self) -> Vec<u32> {
        let mut out = Vec::new();
        self.collect_vars(&mut out);
        out
    }

    fn collect_vars(&self, out: &mut Vec<u32>) {
        match self {
            RType::Var(v) => {
                if !out.contains(v) {
                    out.push(*v);
                }
            }
            RType::Named(_, args) | RType::Tuple(args) => {
                for a in args {
                    a.collect_vars(out);
                }
            }
            RType::Fun(d, c) => {
                d.collect_vars(out);
                c.collect_vars(out);
            }
            _ => {}
        }
    }

    fn occurs(&self, v: u32) -> bool {
        match self {
            RType::Var(w) => *w == v,
            RType::Named(_, args) | RType::Tuple(args) => args.iter().any(|a| a.occurs(v)),
            RType::Fun(d, c) => d.occurs(v) || c.occurs(v),
            _ => false,
        }
    }
}

impl fmt::Display for RType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RType::Int => write!(f, "int"),
            RType::Bool => write!(f, "bool"),
            RType::Str => write!(f, "string"),
            RType::Char => write!(f, "char"),
            RType::Named(name, args) => {
                if args.is_empty() {
                    write!(f, "{name}")
                } else {
                    let inner: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                    write!(f, "({}) {name}", inner.join(", "))
                }
            }
            RType::Tuple(elems) => {
                let inner: Vec<String> = elems.iter().map(|e| e.to_string()).collect();
                write!(f, "({})", inner.join(" * "))
            }
            RType::Fun(d, c) => write!(f, "{d} -> {c}"),
            RType::Var(v) => write!(f, "'t{v}"),
        }
    }
}

/// Substitution from type variables to types.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeSubst {
    map: HashMap<u32, RType>,
}

impl TypeSubst {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn singleton(v: u32, ty: RType) -> Self {
        let mut map = HashMap::new();
        map.insert(v, ty);
        Self { map }
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn get(&self, v: u32) -> Option<&RType> {
        self.map.get(&v)
    }

    /// Apply the substitution, replacing bound variables everywhere.
    pub fn apply(&self, ty: &RType) -> RType {
        match ty {
            RType::Var(v) => match self.map.get(v) {
                // Chase chains so composed substitutions resolve fully.
                Some(t) => self.apply(t),
                None => ty.clone(),
            },
            RType::Named(name, args) => {
                RType::Named(name.clone(), args.iter().map(|a| self.apply(a)).collect())
            }
            RType::Tuple(elems) => RType::Tuple(elems.iter().map(|e| self.apply(e)).collect()),
            RType::Fun(d, c) => RType::fun(self.apply(d), self.apply(c)),
            other => other.clone(),
        }
    }

    /// Extend with a binding; later bindings see earlier ones through `apply`.
    pub fn extend(&mut self, v: u32, ty: RType) {
        self.map.insert(v, ty);
    }
}

/// Replace every occurrence of `from` in `ty` by `to`.
pub fn substitute(ty: &RType, from: &RType, to: &RType) -> RType {
    if ty == from {
        return to.clone();
    }
    match ty {
        RType::Named(name, args) => RType::Named(
            name.clone(),
            args.iter().map(|a| substitute(a, from, to)).collect(),
        ),
        RType::Tuple(elems) => {
            RType::Tuple(elems.iter().map(|e| substitute(e, from, to)).collect())
        }
        RType::Fun(d, c) => RType::fun(substitute(d, from, to), substitute(c, from, to)),
        other => other.clone(),
    }
}

/// Why unification failed. A diagnostic value, not a fatal condition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnifyError {
    #[error("occurs check failed: 't{var} occurs in {ty}")]
    Occurs { var: u32, ty: String },
    #[error("cannot unify {left} with {right}")]
    Mismatch { left: String, right: String },
}

/// Unify a single pair of types.
pub fn unify_one(a: &RType, b: &RType) -> Result<TypeSubst, UnifyError> {
    unify(&[(a.clone(), b.clone())])
}

/// Robinson unification over a list of equations, with occurs check.
pub fn unify(equations: &[(RType, RType)]) -> Result<TypeSubst, UnifyError> {
    let mut subst = TypeSubst::new();
    let mut work: Vec<(RType, RType)> = equations.to_vec();
    while let Some((a, b)) = work.pop() {
        let a = subst.apply(&a);
        let b = subst.apply(&b);
        match (&a, &b) {
            _ if a == b => {}
            (RType::Var(v), other) | (other, RType::Var(v)) => {
                if other.occurs(*v) {
                    return Err(UnifyError::Occurs {
                        var: *v,
                        ty: other.to_string(),
                    });
                }
                subst.extend(*v, other.clone());
            }
            (RType::Named(n1, a1), RType::Named(n2, a2)) if n1 == n2 && a1.len() == a2.len() => {
                work.extend(a1.iter().cloned().zip(a2.iter().cloned()));
            }
            (RType::Tuple(e1), RType::Tuple(e2)) if e1.len() == e2.len() => {
                work.extend(e1.iter().cloned().zip(e2.iter().cloned()));
            }
            (RType::Fun(d1, c1), RType::Fun(d2, c2)) => {
                work.push((d1.as_ref().clone(), d2.as_ref().clone()));
                work.push((c1.as_ref().clone(), c2.as_ref().clone()));
            }
            _ => {
                return Err(UnifyError::Mismatch {
                    left: a.to_string(),
                    right: b.to_string(),
                })
            }
        }
    }
    Ok(subst)
}

/// One variant of a sum type: a globally unique constructor name and its
/// tuple payload.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantDef {
    pub name: String,
    pub args: Vec<RType>,
}

/// A named sum type: type parameters and variant list.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDef {
    pub params: Vec<u32>,
    pub variants: Vec<VariantDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("duplicate type definition: {0}")]
    DuplicateType(String),
    #[error("duplicate variant {variant} (already declared by type {owner})")]
    DuplicateVariant { variant: String, owner: String },
    #[error("unknown variant: {0}")]
    UnknownVariant(String),
    #[error("unknown type: {0}")]
    UnknownType(String),
}

/// Registry of declared sum types. Variant names are globally unique;
/// lookups go both ways (variant -> type, type -> definition).
///
/// Insertion order is preserved so expansion enumerates constructors in
/// declaration order, which keeps runs reproducible.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: IndexMap<String, TypeDef>,
    variant_owner: HashMap<String, String>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, name: &str, def: TypeDef) -> Result<(), RegistryError> {
        if self.types.contains_key(name) {
            return Err(RegistryError::DuplicateType(name.to_string()));
        }
        for v in &def.variants {
            if let Some(owner) = self.variant_owner.get(&v.name) {
                return Err(RegistryError::DuplicateVariant {
                    variant: v.name.clone(),
                    owner: owner.clone(),
                });
            }
        }
        for v in &def.variants {
            self.variant_owner.insert(v.name.clone(), name.to_string());
        }
        self.types.insert(name.to_string(), def);
        Ok(())
    }

    pub fn type_def(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(name)
    }

    pub fn owner_of_variant(&self, variant: &str) -> Option<&str> {
        self.variant_owner.get(variant).map(String::as_str)
    }

    /// Variant definition together with its owning type name.
    pub fn variant(&self, name: &str) -> Option<(&str, &VariantDef)> {
        let owner = self.variant_owner.get(name)?;
        let def = self.types.get(owner)?;
        def.variants
            .iter()
            .find(|v| v.name == name)
            .map(|v| (owner.as_str(), v))
    }

    /// Payload types of `variant` instantiated at the applied type `ty`.
    ///
    /// For a monomorphic ADT this is just the declared payload; for a
    /// parametric one the type parameters are unified against the
    /// arguments of `ty` first.
    pub fn variant_payload(&self, variant: &str, ty: &RType) -> Result<Vec<RType>, RegistryError> {
        let (owner, vdef) = self
            .variant(variant)
            .ok_or_else(|| RegistryError::UnknownVariant(variant.to_string()))?;
        let tdef = self
            .type_def(owner)
            .ok_or_else(|| RegistryError::UnknownType(owner.to_string()))?;
        match ty {
            RType::Named(name, args) if name == owner && args.len() == tdef.params.len() => {
                let mut subst = TypeSubst::new();
                for (p, a) in tdef.params.iter().zip(args.iter()) {
                    subst.extend(*p, a.clone());
                }
                Ok(vdef.args.iter().map(|t| subst.apply(t)).collect())
            }
            _ => Err(RegistryError::UnknownType(ty.to_string())),
        }
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_ty() -> RType {
        RType::named("list")
    }

    fn registry_with_list() -> TypeRegistry {
        let mut reg = TypeRegistry::new();
        reg.declare(
            "list",
            TypeDef {
                params: vec![],
                variants: vec![
                    VariantDef {
                        name: "Nil".into(),
                        args: vec![],
                    },
                    VariantDef {
                        name: "Cons".into(),
                        args: vec![RType::Int, list_ty()],
                    },
                ],
            },
        )
        .unwrap();
        reg
    }

    #[test]
    fn unify_var_binds_to_concrete_type() {
        let s = unify_one(&RType::Var(0), &RType::Int).unwrap();
        assert_eq!(s.apply(&RType::Var(0)), RType::Int);
    }

    #[test]
    fn unify_mismatch_is_a_value_not_a_panic() {
        let err = unify_one(&RType::Int, &RType::Bool).unwrap_err();
        assert!(matches!(err, UnifyError::Mismatch { .. }));
    }

    #[test]
    fn unify_occurs_check_rejects_cyclic_binding() {
        let cyc = RType::fun(RType::Var(3), RType::Int);
        let err = unify_one(&RType::Var(3), &cyc).unwrap_err();
        assert!(matches!(err, UnifyError::Occurs { var: 3, .. }));
    }

    #[test]
    fn unify_descends_into_arrows_and_tuples() {
        let a = RType::fun(RType::Tuple(vec![RType::Var(1), RType::Bool]), RType::Var(2));
        let b = RType::fun(RType::Tuple(vec![RType::Int, RType::Bool]), RType::Int);
        let s = unify_one(&a, &b).unwrap();
        assert_eq!(s.apply(&RType::Var(1)), RType::Int);
        assert_eq!(s.apply(&RType::Var(2)), RType::Int);
    }

    #[test]
    fn unify_soundness_applying_subst_equalizes_both_sides() {
        let eqs = vec![
            (RType::Var(1), RType::named("list")),
            (
                RType::fun(RType::Var(1), RType::Var(2)),
                RType::fun(RType::named("list"), RType::Int),
            ),
        ];
        let s = unify(&eqs).unwrap();
        for (a, b) in &eqs {
            assert_eq!(s.apply(a), s.apply(b));
        }
    }

    #[test]
    fn substitute_replaces_nested_occurrences() {
        let ty = RType::fun(RType::Var(7), RType::Tuple(vec![RType::Var(7), RType::Bool]));
        let out = substitute(&ty, &RType::Var(7), &RType::Int);
        assert_eq!(
            out,
            RType::fun(RType::Int, RType::Tuple(vec![RType::Int, RType::Bool]))
        );
    }

    #[test]
    fn registry_maps_variants_both_ways() {
        let reg = registry_with_list();
        assert_eq!(reg.owner_of_variant("Cons"), Some("list"));
        let (owner, v) = reg.variant("Nil").unwrap();
        assert_eq!(owner, "list");
        assert!(v.args.is_empty());
    }

    #[test]
    fn registry_rejects_duplicate_variant_across_types() {
        let mut reg = registry_with_list();
        let err = reg
            .declare(
                "other",
                TypeDef {
                    params: vec![],
                    variants: vec![VariantDef {
                        name: "Nil".into(),
                        args: vec![],
                    }],
                },
            )
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateVariant { .. }));
    }

    #[test]
    fn variant_payload_instantiates_type_parameters() {
        let mut reg = TypeRegistry::new();
        reg.declare(
            "option",
            TypeDef {
                params: vec![0],
                variants: vec![
                    VariantDef {
                        name: "None_".into(),
                        args: vec![],
                    },
                    VariantDef {
                        name: "Some_".into(),
                        args: vec![RType::Var(0)],
                    },
                ],
            },
        )
        .unwrap();
        let applied = RType::Named("option".into(), vec![RType::Int]);
        let payload = reg.variant_payload("Some_", &applied).unwrap();
        assert_eq!(payload, vec![RType::Int]);
    }

    #[test]
    fn uncurry_flattens_arrow_chains() {
        let ty = RType::fun(RType::Int, RType::fun(RType::Bool, RType::Int));
        let (args, ret) = ty.uncurry();
        assert_eq!(args.len(), 2);
        assert_eq!(ret, &RType::Int);
    }
}
