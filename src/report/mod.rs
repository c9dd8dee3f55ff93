//! Text reports: fit statistics, parameter listings, replicate summaries and
//! the `info` pages.
//!
//! Formatting lives here so the fitting code only produces numbers; the same
//! strings are printed to the terminal and written to the output files.

pub mod format;

pub use format::*;

use crate::domain::{CpmgVariant, NameScope};
use crate::fit::{MinimizerResult, ReplicateSet};
use crate::params::ParameterSet;

/// Contents of `statistics.fit`.
pub fn format_statistics(result: &MinimizerResult) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Number of data points: {}\n", result.ndata));
    out.push_str(&format!("# Number of variables: {}\n", result.nvarys));
    out.push_str(&format!("# Fitting method: {}\n", result.method.name()));
    out.push_str(&format!("# Number of function evaluations: {}\n\n", result.nfev));

    out.push_str(&format!("chi-square         = {}\n", sci_signed(result.chisqr, 5)));
    out.push_str(&format!("reduced chi-square = {}\n", sci_signed(result.redchi, 5)));
    out.push_str(&format!(
        "chisq_p-value      = {} # Chi-squared test\n",
        sci_signed(result.chi2_p_value(), 5)
    ));
    out.push_str(&format!(
        "ks_p-value         = {} # Kolmogorov-Smirnov test\n\n",
        sci_signed(result.ks_p_value(), 5)
    ));
    out.push_str(&format!("Akaike Information Criterion = {}\n", sci_signed(result.aic, 5)));
    out.push_str(&format!("Bayesian Information Criterion = {}\n", sci_signed(result.bic, 5)));
    out
}

/// Contents of `parameters.fit`: one line per parameter.
///
/// ```text
/// kex__t25.0                    =  5.01234e+02 ±  1.20000e+01
/// r_nz__g23n__b600.0__t25.0     =  1.50000e+00  (fixed)
/// dw__a24n                      =  2.00000e+00  := dw__g23n
/// ```
pub fn format_parameters(params: &ParameterSet) -> String {
    let width = params.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    let mut out = String::new();
    for (name, p) in params.iter() {
        let value = sci_signed(p.value, 5);
        let tail = match (&p.expr, p.vary, p.stderr) {
            (Some(expr), _, _) => format!("  := {expr}"),
            (None, false, _) => "  (fixed)".to_string(),
            (None, true, Some(err)) => format!(" ± {}", sci_signed(err, 5)),
            (None, true, None) => String::new(),
        };
        out.push_str(&format!("{name:<width$} = {value}{tail}\n"));
    }
    out
}

/// Contents of a replicate `summary.fit`.
pub fn format_replicate_summary(set: &ReplicateSet) -> String {
    let width = set.names.iter().map(|n| n.len()).max().unwrap_or(0);
    let mut out = String::new();
    out.push_str(&format!("# Replicates: {} ({})\n", set.rows.len(), set.kind.dir_name()));
    out.push_str(&format!("# {:<w$} {:>13} {:>13}\n", "parameter", "mean", "std", w = width.saturating_sub(2).max(9)));
    for (name, mean, std) in set.summary() {
        out.push_str(&format!(
            "{name:<w$} {} {}\n",
            sci_width(mean, 13, 5),
            sci_width(std, 13, 5),
            w = width.max(11)
        ));
    }
    out
}

fn scope_label(scope: NameScope) -> &'static str {
    match scope {
        NameScope::Temperature => "per temperature",
        NameScope::Nucleus => "per nucleus",
        NameScope::NucleusTemperature => "per nucleus and temperature",
        NameScope::NucleusFieldTemperature => "per nucleus, field and temperature",
    }
}

/// `cpmg info` without a variant: one line per experiment variant.
pub fn format_variant_list() -> String {
    let mut out = header1("Experiments");
    for variant in CpmgVariant::ALL {
        out.push_str(&format!("  {:<8} {}\n", variant.name(), variant.title()));
    }
    out
}

/// `cpmg info <variant>`: settings and parameters of one variant.
pub fn format_variant_info(variant: CpmgVariant) -> String {
    let mut out = header1(variant.title());
    out.push_str(variant.description());
    out.push('\n');

    out.push_str(&header2("Experimental parameters"));
    for key in variant.required_settings() {
        out.push_str(&format!("  {key}\n"));
    }
    for (key, default) in variant.optional_settings() {
        out.push_str(&format!("  {key} (optional, default: {default})\n"));
    }

    let table = variant.param_table();
    out.push_str(&header2("Fitted parameters (by default)"));
    for spec in table.iter().filter(|s| s.fitted) {
        out.push_str(&format!("  {:<8} {}\n", spec.short, scope_label(spec.scope)));
    }
    out.push_str(&header2("Fixed parameters (by default)"));
    for spec in table.iter().filter(|s| !s.fitted) {
        out.push_str(&format!("  {:<8} {}\n", spec.short, scope_label(spec.scope)));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FitMethod;
    use crate::fit::{ReplicateKind, Stop};
    use crate::params::{Parameter, ParameterName};

    #[test]
    fn parameter_lines_show_status() {
        let mut params = ParameterSet::new();
        let mut kex = Parameter::new(ParameterName::from_full_name("kex__t25.0").unwrap(), 500.0);
        kex.vary = true;
        kex.stderr = Some(12.0);
        params.insert(kex);
        params.insert(Parameter::new(ParameterName::from_full_name("dw__g23n").unwrap(), 2.0));
        let mut tied = Parameter::new(ParameterName::from_full_name("dw__a24n").unwrap(), 2.0);
        tied.expr = Some("dw__g23n".to_string());
        params.insert(tied);

        let text = format_parameters(&params);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "kex__t25.0 =  5.00000e+02 ±  1.20000e+01");
        assert_eq!(lines[1], "dw__g23n   =  2.00000e+00  (fixed)");
        assert_eq!(lines[2], "dw__a24n   =  2.00000e+00  := dw__g23n");
    }

    #[test]
    fn statistics_name_the_fit_method() {
        let result = MinimizerResult {
            params: ParameterSet::new(),
            residual: vec![1.0, -1.0, 0.5, -0.5],
            chisqr: 2.5,
            redchi: 1.25,
            aic: 1.0,
            bic: 2.0,
            nfev: 17,
            ndata: 4,
            nvarys: 2,
            nfree: 2,
            method: FitMethod::Nelder,
            var_names: vec!["a".into(), "b".into()],
            covariance: None,
            stop: Stop::Converged,
            success: true,
            message: String::new(),
        };
        let text = format_statistics(&result);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[2], "# Fitting method: nelder");
        assert_eq!(lines[3], "# Number of function evaluations: 17");
        assert!(text.contains("reduced chi-square =  1.25000e+00\n"));
    }

    #[test]
    fn replicate_summary_lists_every_parameter() {
        let set = ReplicateSet {
            kind: ReplicateKind::MonteCarlo,
            names: vec!["kex__t25.0".into(), "pb__t25.0".into()],
            rows: vec![vec![400.0, 0.04], vec![600.0, 0.06]],
        };
        let text = format_replicate_summary(&set);
        assert!(text.starts_with("# Replicates: 2 (MonteCarlo)\n"));
        assert!(text.contains("kex__t25.0"));
        assert!(text.contains("5.00000e+02"));
        assert_eq!(text.lines().count(), 4);
    }

    #[test]
    fn info_pages_list_parameters() {
        let list = format_variant_list();
        assert!(list.contains("n_cw_y"));
        let page = format_variant_info(CpmgVariant::NCw);
        assert!(page.contains("ncyc_max (optional"));
        assert!(page.contains("kex"));
        assert!(page.contains("r_nz"));
    }
}
