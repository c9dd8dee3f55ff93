//! Parameters and ordered parameter sets.

use std::collections::{BTreeSet, HashMap};

use indexmap::IndexMap;

use crate::domain::ParamSpec;
use crate::error::AppError;
use crate::params::expr::Expr;
use crate::params::name::ParameterName;

/// One named scalar parameter with bounds and fit status.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: ParameterName,
    pub value: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub vary: bool,
    pub expr: Option<String>,
    /// Standard error from the last `leastsq` fit that varied this parameter.
    pub stderr: Option<f64>,
}

impl Parameter {
    pub fn new(name: ParameterName, value: f64) -> Self {
        Self {
            name,
            value,
            min: None,
            max: None,
            vary: false,
            expr: None,
            stderr: None,
        }
    }

    pub fn from_spec(spec: &ParamSpec, name: ParameterName) -> Self {
        Self {
            name,
            value: spec.default,
            min: spec.min,
            max: spec.max,
            vary: spec.fitted,
            expr: None,
            stderr: None,
        }
    }

    pub fn full_name(&self) -> String {
        self.name.full_name()
    }

    /// Varying and not tied to other parameters.
    pub fn is_free(&self) -> bool {
        self.vary && self.expr.is_none()
    }

    /// Clamp `value` into `[min, max]`.
    pub fn clamp(&self, value: f64) -> f64 {
        let mut v = value;
        if let Some(lo) = self.min {
            v = v.max(lo);
        }
        if let Some(hi) = self.max {
            v = v.min(hi);
        }
        v
    }
}

/// Parameters keyed by full name, in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSet {
    params: IndexMap<String, Parameter>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn contains(&self, full_name: &str) -> bool {
        self.params.contains_key(full_name)
    }

    pub fn get(&self, full_name: &str) -> Option<&Parameter> {
        self.params.get(full_name)
    }

    pub fn get_mut(&mut self, full_name: &str) -> Option<&mut Parameter> {
        self.params.get_mut(full_name)
    }

    pub fn value(&self, full_name: &str) -> Option<f64> {
        self.params.get(full_name).map(|p| p.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Parameter)> {
        self.params.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut Parameter)> {
        self.params.iter_mut()
    }

    /// Insert or replace a parameter.
    pub fn insert(&mut self, param: Parameter) {
        self.params.insert(param.full_name(), param);
    }

    /// Set a value, clamped to the parameter's bounds.
    pub fn set_value(&mut self, full_name: &str, value: f64) -> Result<(), AppError> {
        let p = self
            .params
            .get_mut(full_name)
            .ok_or_else(|| AppError::config(format!("Unknown parameter '{full_name}'.")))?;
        p.value = p.clamp(value);
        Ok(())
    }

    /// Full names of varying, expression-free parameters, in set order.
    pub fn free_names(&self) -> Vec<String> {
        self.params
            .iter()
            .filter(|(_, p)| p.is_free())
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Copy values and errors of the parameters `other` varied, then
    /// re-evaluate expressions.
    ///
    /// Status flags of `self` are left alone: a subset may carry fixed copies
    /// of parameters that are free here.
    pub fn merge_fitted(&mut self, other: &ParameterSet) -> Result<(), AppError> {
        for (k, p) in other.iter().filter(|(_, p)| p.is_free()) {
            if let Some(target) = self.params.get_mut(k) {
                target.value = p.value;
                target.stderr = p.stderr;
            }
        }
        self.update_constraints()
    }

    /// Drop every parameter that neither `names` nor their expressions use.
    pub fn retain_used(&mut self, names: &[String]) -> Result<(), AppError> {
        let mut keep: BTreeSet<String> = BTreeSet::new();
        let mut pending: Vec<String> = names.to_vec();
        while let Some(name) = pending.pop() {
            if keep.insert(name.clone()) {
                pending.extend(self.dependencies_of(&name)?);
            }
        }
        self.params.retain(|k, _| keep.contains(k));
        Ok(())
    }

    fn parsed_expr(&self, full_name: &str) -> Result<Option<Expr>, AppError> {
        match self.params.get(full_name).and_then(|p| p.expr.as_deref()) {
            Some(src) => Expr::parse(src).map(Some),
            None => Ok(None),
        }
    }

    /// Parameters referenced directly by the expression of `full_name`.
    pub fn dependencies_of(&self, full_name: &str) -> Result<Vec<String>, AppError> {
        Ok(self
            .parsed_expr(full_name)?
            .map(|e| e.identifiers())
            .unwrap_or_default())
    }

    /// Free parameters `full_name` ultimately depends on.
    ///
    /// A free parameter depends on itself; an expression parameter on the free
    /// parameters of its identifiers (transitively); a fixed one on nothing.
    pub fn free_dependencies(&self, full_name: &str) -> Result<BTreeSet<String>, AppError> {
        let mut out = BTreeSet::new();
        let mut visiting = Vec::new();
        self.collect_free_dependencies(full_name, &mut out, &mut visiting)?;
        Ok(out)
    }

    fn collect_free_dependencies(
        &self,
        full_name: &str,
        out: &mut BTreeSet<String>,
        visiting: &mut Vec<String>,
    ) -> Result<(), AppError> {
        let Some(p) = self.params.get(full_name) else {
            return Err(AppError::config(format!("Unknown parameter '{full_name}' in expression.")));
        };
        if p.is_free() {
            out.insert(full_name.to_string());
            return Ok(());
        }
        let Some(expr) = self.parsed_expr(full_name)? else {
            return Ok(());
        };
        if visiting.iter().any(|v| v == full_name) {
            return Err(cycle_error(full_name));
        }
        visiting.push(full_name.to_string());
        for ident in expr.identifiers() {
            self.collect_free_dependencies(&ident, out, visiting)?;
        }
        visiting.pop();
        Ok(())
    }

    /// Recompute every expression-linked parameter from its dependencies.
    pub fn update_constraints(&mut self) -> Result<(), AppError> {
        let exprs: Vec<(String, Expr)> = self
            .params
            .iter()
            .filter_map(|(k, p)| p.expr.as_deref().map(|src| (k.clone(), src)))
            .map(|(k, src)| Expr::parse(src).map(|e| (k, e)))
            .collect::<Result<_, _>>()?;
        if exprs.is_empty() {
            return Ok(());
        }

        let table: HashMap<&str, &Expr> = exprs.iter().map(|(k, e)| (k.as_str(), e)).collect();
        let mut resolved: HashMap<String, f64> = HashMap::new();
        for (name, _) in &exprs {
            let mut visiting = Vec::new();
            self.resolve(name, &table, &mut resolved, &mut visiting)?;
        }
        for (name, value) in resolved {
            if let Some(p) = self.params.get_mut(&name) {
                p.value = value;
            }
        }
        Ok(())
    }

    fn resolve(
        &self,
        name: &str,
        table: &HashMap<&str, &Expr>,
        resolved: &mut HashMap<String, f64>,
        visiting: &mut Vec<String>,
    ) -> Result<f64, AppError> {
        if let Some(v) = resolved.get(name) {
            return Ok(*v);
        }
        let Some(expr) = table.get(name) else {
            return self
                .value(name)
                .ok_or_else(|| AppError::config(format!("Unknown parameter '{name}' in expression.")));
        };
        if visiting.iter().any(|v| v == name) {
            return Err(cycle_error(name));
        }
        visiting.push(name.to_string());

        let mut values = HashMap::new();
        for ident in expr.identifiers() {
            let v = self.resolve(&ident, table, resolved, visiting)?;
            values.insert(ident, v);
        }
        let value = expr.eval(&|id| values.get(id).copied())?;

        visiting.pop();
        resolved.insert(name.to_string(), value);
        Ok(value)
    }

    /// First phase of building a parameter subset (e.g. for one cluster).
    ///
    /// `names` are copied as they are; parameters that their expressions refer
    /// to are pulled in as well, varying only if listed in `free`. Expressions
    /// are not evaluated until `StagedParameters::finalize`.
    pub fn stage(&self, names: &[String], free: &BTreeSet<String>) -> Result<StagedParameters, AppError> {
        let mut staged: IndexMap<String, Parameter> = IndexMap::new();
        for name in names {
            let p = self
                .params
                .get(name)
                .ok_or_else(|| AppError::config(format!("Unknown parameter '{name}'.")))?;
            staged.insert(name.clone(), p.clone());
        }

        let mut pending: Vec<String> = staged.keys().cloned().collect();
        while let Some(name) = pending.pop() {
            let Some(expr) = self.parsed_expr(&name)? else {
                continue;
            };
            for ident in expr.identifiers() {
                if staged.contains_key(&ident) {
                    continue;
                }
                let mut dep = self
                    .params
                    .get(&ident)
                    .cloned()
                    .ok_or_else(|| AppError::config(format!("Unknown parameter '{ident}' in expression of '{name}'.")))?;
                if dep.expr.is_none() {
                    dep.vary = dep.vary && free.contains(&ident);
                }
                staged.insert(ident.clone(), dep);
                pending.push(ident);
            }
        }

        Ok(StagedParameters { params: staged })
    }
}

fn cycle_error(name: &str) -> AppError {
    AppError::config(format!("Circular expression dependency involving '{name}'."))
}

/// Parameters copied out of a set whose expressions are not yet evaluated.
#[derive(Debug, Clone)]
pub struct StagedParameters {
    params: IndexMap<String, Parameter>,
}

impl StagedParameters {
    /// Second phase: evaluate expressions once and hand out the subset.
    pub fn finalize(self) -> Result<ParameterSet, AppError> {
        let mut set = ParameterSet { params: self.params };
        set.update_constraints()?;
        Ok(set)
    }
}
