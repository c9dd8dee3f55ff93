//! Parameter-status directives.
//!
//! A fit section carries an ordered list of `(pattern, status)` pairs. The
//! pattern is a glob over full parameter names; a bare short name such as
//! `kex` also matches every long name built from it (`kex__*`).

use std::fmt;

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::error::AppError;
use crate::params::set::ParameterSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Fix,
    Vary,
    /// Tie the parameter to others.
    Expr(String),
}

impl Status {
    pub fn parse(text: &str) -> Status {
        match text.trim().to_ascii_lowercase().as_str() {
            "fix" | "fixed" => Status::Fix,
            "vary" | "fit" => Status::Vary,
            _ => Status::Expr(text.trim().to_string()),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Fix => write!(f, "fix"),
            Status::Vary => write!(f, "vary"),
            Status::Expr(e) => write!(f, "{e}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub pattern: String,
    pub status: Status,
}

impl Directive {
    pub fn new(pattern: &str, status: Status) -> Self {
        Self {
            pattern: pattern.trim().to_ascii_lowercase(),
            status,
        }
    }

    fn matcher(&self) -> Result<GlobSet, AppError> {
        let mut builder = GlobSetBuilder::new();
        let mut add = |pattern: &str| -> Result<(), AppError> {
            let glob = Glob::new(pattern)
                .map_err(|e| AppError::config(format!("Invalid parameter pattern '{}': {e}", self.pattern)))?;
            builder.add(glob);
            Ok(())
        };
        add(&self.pattern)?;
        if !self.pattern.contains("__") {
            add(&format!("{}__*", self.pattern))?;
        }
        builder
            .build()
            .map_err(|e| AppError::config(format!("Invalid parameter pattern '{}': {e}", self.pattern)))
    }
}

/// Apply `directives` in order, then re-evaluate expressions.
///
/// A directive whose pattern matches no parameter is a configuration error.
pub fn apply_directives(params: &mut ParameterSet, directives: &[Directive]) -> Result<(), AppError> {
    for directive in directives {
        let matcher = directive.matcher()?;
        let mut matched = 0usize;
        for (name, param) in params.iter_mut() {
            if !matcher.is_match(name.as_str()) {
                continue;
            }
            matched += 1;
            match &directive.status {
                Status::Fix => {
                    param.vary = false;
                    param.expr = None;
                }
                Status::Vary => {
                    param.vary = true;
                    param.expr = None;
                }
                Status::Expr(e) => {
                    param.vary = false;
                    param.expr = Some(e.to_ascii_lowercase());
                }
            }
        }
        if matched == 0 {
            return Err(AppError::config(format!(
                "The parameter pattern '{}' ({}) does not match any parameter.",
                directive.pattern, directive.status
            )));
        }
        log::debug!("'{}' -> {} matched {matched} parameter(s)", directive.pattern, directive.status);
    }
    params.update_constraints()
}
