//! Long parameter names.
//!
//! A long name is a short name qualified by the experimental conditions it
//! depends on (see `NameScope`). Its string form doubles as the identifier used
//! in expressions and directive patterns:
//!
//! ```text
//! kex__t25.0
//! dw__g23n
//! r_nxy__g23n__b600.0__t25.0
//! ```

use std::fmt;

use crate::domain::NameScope;
use crate::error::AppError;

const SEPARATOR: &str = "__";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ParameterName {
    pub name: String,
    /// Lowercase nucleus assignment, e.g. `g23n`.
    pub nuclei: Option<String>,
    /// 1H Larmor frequency, formatted with one decimal.
    pub h_larmor_frq: Option<String>,
    /// Temperature, formatted with one decimal.
    pub temperature: Option<String>,
}

impl ParameterName {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_ascii_lowercase(),
            ..Default::default()
        }
    }

    /// Qualify `short` according to `scope`.
    pub fn scoped(short: &str, scope: NameScope, nucleus: &str, h_larmor_frq: f64, temperature: f64) -> Self {
        let mut out = Self::new(short);
        let nucleus = Some(nucleus.to_ascii_lowercase());
        let field = Some(format!("{h_larmor_frq:.1}"));
        let temp = Some(format!("{temperature:.1}"));
        match scope {
            NameScope::Temperature => out.temperature = temp,
            NameScope::Nucleus => out.nuclei = nucleus,
            NameScope::NucleusTemperature => {
                out.nuclei = nucleus;
                out.temperature = temp;
            }
            NameScope::NucleusFieldTemperature => {
                out.nuclei = nucleus;
                out.h_larmor_frq = field;
                out.temperature = temp;
            }
        }
        out
    }

    pub fn full_name(&self) -> String {
        let mut out = self.name.clone();
        if let Some(n) = &self.nuclei {
            out.push_str(SEPARATOR);
            out.push_str(n);
        }
        if let Some(b) = &self.h_larmor_frq {
            out.push_str(SEPARATOR);
            out.push('b');
            out.push_str(b);
        }
        if let Some(t) = &self.temperature {
            out.push_str(SEPARATOR);
            out.push('t');
            out.push_str(t);
        }
        out
    }

    pub fn from_full_name(full: &str) -> Result<Self, AppError> {
        let mut parts = full.split(SEPARATOR);
        let name = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::config(format!("Invalid parameter name '{full}'.")))?;
        let mut out = Self::new(name);

        for part in parts {
            let mut chars = part.chars();
            let head = chars.next();
            let rest: String = chars.collect();
            let is_number = !rest.is_empty() && rest.parse::<f64>().is_ok();
            match head {
                Some('b') if is_number && out.h_larmor_frq.is_none() && out.temperature.is_none() => {
                    out.h_larmor_frq = Some(rest)
                }
                Some('t') if is_number && out.temperature.is_none() => out.temperature = Some(rest),
                Some(_) if out.nuclei.is_none() && out.h_larmor_frq.is_none() && out.temperature.is_none() => {
                    out.nuclei = Some(part.to_ascii_lowercase())
                }
                _ => {
                    return Err(AppError::config(format!(
                        "Invalid parameter name '{full}': unexpected component '{part}'."
                    )));
                }
            }
        }
        Ok(out)
    }

    /// Components shared by both names; differing components are dropped.
    pub fn intersection(&self, other: &ParameterName) -> ParameterName {
        fn keep(a: &Option<String>, b: &Option<String>) -> Option<String> {
            if a == b { a.clone() } else { None }
        }
        ParameterName {
            name: if self.name == other.name {
                self.name.clone()
            } else {
                String::new()
            },
            nuclei: keep(&self.nuclei, &other.nuclei),
            h_larmor_frq: keep(&self.h_larmor_frq, &other.h_larmor_frq),
            temperature: keep(&self.temperature, &other.temperature),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.nuclei.is_none() && self.h_larmor_frq.is_none() && self.temperature.is_none()
    }
}

impl fmt::Display for ParameterName {
    /// Human-readable label, e.g. `NUC->G23N, T->25.0C`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if !self.name.is_empty() {
            parts.push(self.name.to_uppercase());
        }
        if let Some(n) = &self.nuclei {
            parts.push(format!("NUC->{}", n.to_uppercase()));
        }
        if let Some(b) = &self.h_larmor_frq {
            parts.push(format!("B0->{b}MHZ"));
        }
        if let Some(t) = &self.temperature {
            parts.push(format!("T->{t}C"));
        }
        write!(f, "{}", parts.join(", "))
    }
}
