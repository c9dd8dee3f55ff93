//! Peak (resonance) assignments such as `G23N-H` or `L99N`.

use std::fmt;

use crate::error::AppError;

/// One assigned spin, e.g. `G23N`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Spin {
    /// Residue type, e.g. `G`.
    pub residue_type: String,
    pub residue_number: u32,
    /// Atom name, e.g. `N` or `HN`.
    pub atom: String,
}

impl Spin {
    pub fn name(&self) -> String {
        format!("{}{}{}", self.residue_type, self.residue_number, self.atom)
    }

    /// Element of the atom, from the first letter of its name.
    pub fn element(&self) -> char {
        self.atom.chars().next().unwrap_or('N')
    }
}

/// A resonance assignment: the observed spin plus optional coupled partners.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Resonance {
    pub spins: Vec<Spin>,
}

impl Resonance {
    /// Parse an assignment like `G23N-H`, `G23N-G23H` or `23N`.
    ///
    /// Later components without a residue inherit the previous one.
    pub fn parse(text: &str) -> Result<Self, AppError> {
        let text = text.trim().to_ascii_uppercase();
        let invalid = || AppError::config(format!("Invalid resonance assignment '{text}'."));
        if text.is_empty() {
            return Err(invalid());
        }

        let mut spins: Vec<Spin> = Vec::new();
        for part in text.split('-') {
            let digits_start = part.find(|c: char| c.is_ascii_digit());
            let spin = match digits_start {
                Some(start) => {
                    let digits_end = part[start..]
                        .find(|c: char| !c.is_ascii_digit())
                        .map_or(part.len(), |i| start + i);
                    let residue_number = part[start..digits_end].parse::<u32>().map_err(|_| invalid())?;
                    let atom = &part[digits_end..];
                    if atom.is_empty() || !atom.chars().all(|c| c.is_ascii_alphanumeric()) {
                        return Err(invalid());
                    }
                    Spin {
                        residue_type: part[..start].to_string(),
                        residue_number,
                        atom: atom.to_string(),
                    }
                }
                None => {
                    let prev = spins.last().ok_or_else(invalid)?;
                    if part.is_empty() || !part.chars().all(|c| c.is_ascii_alphanumeric()) {
                        return Err(invalid());
                    }
                    Spin {
                        residue_type: prev.residue_type.clone(),
                        residue_number: prev.residue_number,
                        atom: part.to_string(),
                    }
                }
            };
            spins.push(spin);
        }

        Ok(Self { spins })
    }

    /// The detected spin.
    pub fn observed(&self) -> &Spin {
        &self.spins[0]
    }

    /// Lowercase nucleus label used in parameter names, e.g. `g23n`.
    pub fn nucleus_label(&self) -> String {
        self.observed().name().to_ascii_lowercase()
    }

    /// Matches a residue selector: a residue number (`23`) or an assignment
    /// prefix (`G23`, `g23n`).
    pub fn matches_residue(&self, selector: &str) -> bool {
        let selector = selector.trim().to_ascii_uppercase();
        let spin = self.observed();
        if let Ok(number) = selector.parse::<u32>() {
            return spin.residue_number == number;
        }
        let residue = format!("{}{}", spin.residue_type, spin.residue_number);
        selector == residue || selector == spin.name() || selector == self.to_string()
    }
}

impl fmt::Display for Resonance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut prev: Option<&Spin> = None;
        for spin in &self.spins {
            match prev {
                None => write!(f, "{}", spin.name())?,
                Some(p) if p.residue_number == spin.residue_number && p.residue_type == spin.residue_type => {
                    write!(f, "-{}", spin.atom)?
                }
                Some(_) => write!(f, "-{}", spin.name())?,
            }
            prev = Some(spin);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_coupled_assignment() {
        let r = Resonance::parse("g23n-h").unwrap();
        assert_eq!(r.spins.len(), 2);
        assert_eq!(r.observed().residue_number, 23);
        assert_eq!(r.observed().element(), 'N');
        assert_eq!(r.spins[1].name(), "G23H");
        assert_eq!(r.nucleus_label(), "g23n");
        assert_eq!(r.to_string(), "G23N-H");
    }

    #[test]
    fn rejects_malformed_assignments() {
        assert!(Resonance::parse("").is_err());
        assert!(Resonance::parse("N-H").is_err());
        assert!(Resonance::parse("G23").is_err());
    }

    #[test]
    fn residue_selectors() {
        let r = Resonance::parse("L99N").unwrap();
        assert!(r.matches_residue("99"));
        assert!(r.matches_residue("l99"));
        assert!(!r.matches_residue("9"));
    }
}
