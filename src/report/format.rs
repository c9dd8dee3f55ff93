//! Fixed-width text formatting shared by terminal output and result files.
//!
//! Scientific notation follows the `1.23456e+02` convention (signed,
//! two-digit exponent) so columns line up across files.

/// `value` in scientific notation with `precision` mantissa digits.
pub fn sci(value: f64, precision: usize) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let s = format!("{value:.precision$e}");
    match s.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(d) => ('-', d),
                None => ('+', exp),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => s,
    }
}

/// Like `sci`, with a leading space in place of the sign of non-negative values.
pub fn sci_signed(value: f64, precision: usize) -> String {
    let s = sci(value, precision);
    if s.starts_with('-') { s } else { format!(" {s}") }
}

/// `sci` right-aligned to `width` characters.
pub fn sci_width(value: f64, width: usize, precision: usize) -> String {
    format!("{:>width$}", sci(value, precision))
}

/// Top-level section header.
pub fn header1(title: &str) -> String {
    let rule = "=".repeat(title.chars().count());
    format!("\n{}\n{rule}\n", title.to_uppercase())
}

/// Second-level section header.
pub fn header2(title: &str) -> String {
    let rule = "-".repeat(title.chars().count());
    format!("\n{title}\n{rule}\n")
}

/// Two-line chi-square summary printed after each fit section.
pub fn format_chi2(chisqr: f64, redchi: f64) -> String {
    format!(
        "Final Chi2        : {}\nFinal Reduced Chi2: {}\n",
        sci(chisqr, 3),
        sci(redchi, 3)
    )
}
