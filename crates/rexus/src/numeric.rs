//! NUMERIC settings and decimal-style number handling.
//!
//! REXX arithmetic is decimal with a configurable precision: results carry at
//! most DIGITS significant digits, and numeric comparison ignores the FUZZ
//! least-significant digits. Values are held as `f64` and rounded to the
//! active precision at every arithmetic step, so the observable behavior is
//! the significant-digit contract rather than binary float artifacts.

use std::cmp::Ordering;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// Default significant digits carried by arithmetic, per REXX tradition.
pub const DEFAULT_DIGITS: u32 = 9;

/// Exponent grouping for formatted numbers outside plain-decimal range.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, IntoStaticStr, Serialize, Deserialize,
)]
#[strum(ascii_case_insensitive)]
pub enum NumericForm {
    /// Mantissa in `[1, 10)`.
    #[default]
    #[strum(serialize = "SCIENTIFIC")]
    Scientific,
    /// Exponent a multiple of three, mantissa in `[1, 1000)`.
    #[strum(serialize = "ENGINEERING")]
    Engineering,
}

/// The interpreter-wide numeric settings mutated by the NUMERIC instruction.
///
/// Scope is deliberately not lexical: a NUMERIC executed inside a subroutine
/// or a DO body stays in effect for the remainder of the program.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericSettings {
    digits: u32,
    fuzz: u32,
    form: NumericForm,
}

impl Default for NumericSettings {
    fn default() -> Self {
        Self {
            digits: DEFAULT_DIGITS,
            fuzz: 0,
            form: NumericForm::default(),
        }
    }
}

impl NumericSettings {
    #[must_use]
    pub fn digits(&self) -> u32 {
        self.digits
    }

    #[must_use]
    pub fn fuzz(&self) -> u32 {
        self.fuzz
    }

    #[must_use]
    pub fn form(&self) -> NumericForm {
        self.form
    }

    /// Sets DIGITS. Must be positive and strictly greater than FUZZ.
    pub fn set_digits(&mut self, digits: i64) -> Result<(), String> {
        let digits = u32::try_from(digits).map_err(|_| format!("NUMERIC DIGITS must be positive, got {digits}"))?;
        if digits == 0 {
            return Err("NUMERIC DIGITS must be positive, got 0".to_owned());
        }
        if digits <= self.fuzz {
            return Err(format!(
                "NUMERIC DIGITS {digits} must be greater than FUZZ {}",
                self.fuzz
            ));
        }
        self.digits = digits;
        Ok(())
    }

    /// Sets FUZZ. Must be non-negative and strictly less than DIGITS.
    pub fn set_fuzz(&mut self, fuzz: i64) -> Result<(), String> {
        let fuzz = u32::try_from(fuzz).map_err(|_| format!("NUMERIC FUZZ must be non-negative, got {fuzz}"))?;
        if fuzz >= self.digits {
            return Err(format!("NUMERIC FUZZ {fuzz} must be less than DIGITS {}", self.digits));
        }
        self.fuzz = fuzz;
        Ok(())
    }

    pub fn set_form(&mut self, form: &str) -> Result<(), String> {
        self.form = NumericForm::from_str(form).map_err(|_| format!("invalid NUMERIC FORM {form}"))?;
        Ok(())
    }

    /// Significant digits used for comparison: DIGITS with the FUZZ
    /// least-significant digits ignored.
    #[must_use]
    pub fn comparison_digits(&self) -> u32 {
        (self.digits - self.fuzz).max(1)
    }

    /// Rounds an arithmetic result to the active precision.
    #[must_use]
    pub fn apply(&self, n: f64) -> f64 {
        round_to_digits(n, self.digits)
    }
}

/// Parses a string as a REXX number.
///
/// Accepts optional sign, decimal point, and exponent. Returns `None` for
/// anything else, including the `inf`/`nan` spellings `f64::from_str` would
/// otherwise accept.
#[must_use]
pub fn parse_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    // f64::from_str accepts "inf", "infinity" and "nan"; REXX does not.
    if trimmed.bytes().any(|b| b.is_ascii_alphabetic() && !matches!(b, b'e' | b'E')) {
        return None;
    }
    f64::from_str(trimmed).ok().filter(|n| n.is_finite())
}

/// Rounds to the given number of significant digits.
#[must_use]
pub fn round_to_digits(n: f64, digits: u32) -> f64 {
    if n == 0.0 || !n.is_finite() {
        return n;
    }
    // Decimal string round-trip avoids the drift of power-of-ten scaling.
    let prec = digits.saturating_sub(1) as usize;
    format!("{n:.prec$e}").parse().unwrap_or(n)
}

/// Decimal exponent of a float via its shortest decimal form,
/// e.g. `0.0333` -> -2 and `12300.0` -> 4.
fn decimal_exponent(n: f64) -> i32 {
    let mut buffer = ryu::Buffer::new();
    let repr = buffer.format(n);
    if let Some((_, exp)) = repr.split_once('e') {
        return exp.parse().unwrap_or(0);
    }
    // ryu only emits exponent form for extreme magnitudes; derive the
    // exponent from the digit positions otherwise.
    let unsigned = repr.trim_start_matches('-');
    match unsigned.split_once('.') {
        Some((int_part, frac_part)) => {
            let int_digits = int_part.trim_start_matches('0').len();
            if int_digits > 0 {
                int_digits as i32 - 1
            } else {
                // 0.00333 -> two zeros after the point before the first digit
                let frac_zeros = frac_part.len() - frac_part.trim_start_matches('0').len();
                -(frac_zeros as i32) - 1
            }
        }
        None => unsigned.len() as i32 - 1,
    }
}

/// Formats a number under the active NUMERIC settings.
///
/// The value is first rounded to DIGITS significant digits. Results whose
/// decimal exponent fits within the precision are written plainly (integers
/// without a decimal point, fractions with trailing zeros trimmed); larger or
/// much smaller magnitudes use exponential notation grouped per FORM.
#[must_use]
pub fn format_number(n: f64, settings: &NumericSettings) -> String {
    let digits = settings.digits();
    let rounded = round_to_digits(n, digits);
    if rounded == 0.0 {
        return "0".to_owned();
    }

    let exp = decimal_exponent(rounded.abs());
    if exp >= digits as i32 || exp < -6 {
        return format_exponential(rounded, digits, settings.form());
    }

    // Plain decimal: enough fraction places for the significant digits that
    // fall after the point, then trim.
    let prec = (digits as i32 - 1 - exp).max(0) as usize;
    let text = format!("{rounded:.prec$}");
    trim_fraction(text)
}

fn format_exponential(n: f64, digits: u32, form: NumericForm) -> String {
    let exp = decimal_exponent(n.abs());
    let group_exp = match form {
        NumericForm::Scientific => exp,
        NumericForm::Engineering => (exp as f64 / 3.0).floor() as i32 * 3,
    };
    let mantissa = n / 10f64.powi(group_exp);
    let prec = digits.saturating_sub(1) as usize;
    let mantissa_text = trim_fraction(format!("{mantissa:.prec$}"));
    let sign = if group_exp < 0 { '-' } else { '+' };
    format!("{mantissa_text}E{sign}{}", group_exp.abs())
}

fn trim_fraction(text: String) -> String {
    if !text.contains('.') {
        return text;
    }
    let trimmed = text.trim_end_matches('0').trim_end_matches('.');
    trimmed.to_owned()
}

/// Compares two numbers under the active DIGITS/FUZZ settings: both operands
/// are rounded to `DIGITS - FUZZ` significant digits before comparison.
#[must_use]
pub fn fuzzy_compare(a: f64, b: f64, settings: &NumericSettings) -> Ordering {
    let digits = settings.comparison_digits();
    let ra = round_to_digits(a, digits);
    let rb = round_to_digits(b, digits);
    ra.partial_cmp(&rb).unwrap_or(Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parse_accepts_rexx_numbers() {
        assert_eq!(parse_number("42"), Some(42.0));
        assert_eq!(parse_number(" -3.5 "), Some(-3.5));
        assert_eq!(parse_number("1e3"), Some(1000.0));
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number("inf"), None);
        assert_eq!(parse_number("nan"), None);
    }

    #[test]
    fn format_integers_without_point() {
        let settings = NumericSettings::default();
        assert_eq!(format_number(5.0, &settings), "5");
        assert_eq!(format_number(-120.0, &settings), "-120");
        assert_eq!(format_number(0.0, &settings), "0");
    }

    #[test]
    fn format_rounds_to_digits() {
        let mut settings = NumericSettings::default();
        settings.set_digits(3).unwrap();
        assert_eq!(format_number(1.0 / 3.0, &settings), "0.333");
        assert_eq!(format_number(2.0 / 3.0, &settings), "0.667");
    }

    #[test]
    fn format_switches_to_exponential() {
        let mut settings = NumericSettings::default();
        settings.set_digits(3).unwrap();
        assert_eq!(format_number(1234.0, &settings), "1.23E+3");
    }

    #[test]
    fn engineering_form_groups_by_three() {
        let mut settings = NumericSettings::default();
        settings.set_digits(3).unwrap();
        settings.set_form("engineering").unwrap();
        assert_eq!(format_number(12345.0, &settings), "12.3E+3");
    }

    #[test]
    fn fuzz_widens_equality() {
        let mut settings = NumericSettings::default();
        settings.set_digits(5).unwrap();
        settings.set_fuzz(3).unwrap();
        // Compared at 2 significant digits: 100.4 and 100.3 both round to 100.
        assert_eq!(fuzzy_compare(100.4, 100.3, &settings), Ordering::Equal);
        assert_eq!(fuzzy_compare(120.0, 100.0, &settings), Ordering::Greater);
    }

    #[test]
    fn fuzz_must_stay_below_digits() {
        let mut settings = NumericSettings::default();
        assert!(settings.set_fuzz(9).is_err());
        assert!(settings.set_digits(0).is_err());
        settings.set_fuzz(2).unwrap();
        assert!(settings.set_digits(2).is_err());
    }
}
