//! Printf-style format specifiers.
//!
//! Command patterns embed C printf specifiers (`%d`, `%.3f`, `%s`, ...) that
//! are used in both directions: scanning a numeric prefix out of an inbound
//! token, and rendering a parameter value into an outbound reply. This module
//! is the single implementation of that vocabulary, covering the subset the
//! pattern grammar admits: flags `-+ 0#`, optional width and precision, and
//! the conversions `d i u x X o b e E f g G s`.

use crate::parameter::Value;

/// Conversion class of a specifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conv {
    Dec,
    Uns,
    HexLower,
    HexUpper,
    Oct,
    Bin,
    ExpLower,
    ExpUpper,
    Fixed,
    GenLower,
    GenUpper,
    Str,
}

/// A parsed printf specifier. Retains the raw text so patterns can be
/// reproduced verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct FormatSpec {
    raw: String,
    minus: bool,
    plus: bool,
    space: bool,
    zero: bool,
    alt: bool,
    width: Option<usize>,
    precision: Option<usize>,
    conv: Conv,
}

impl FormatSpec {
    /// Parse a specifier at the start of `input`. Returns the spec and the
    /// number of bytes consumed, or `None` when `input` does not begin with
    /// a well-formed specifier.
    pub fn parse(input: &str) -> Option<(FormatSpec, usize)> {
        let bytes = input.as_bytes();
        if bytes.first() != Some(&b'%') {
            return None;
        }
        let mut i = 1;
        let (mut minus, mut plus, mut space, mut zero, mut alt) =
            (false, false, false, false, false);
        while i < bytes.len() {
            match bytes[i] {
                b'-' => minus = true,
                b'+' => plus = true,
                b' ' => space = true,
                b'0' => zero = true,
                b'#' => alt = true,
                _ => break,
            }
            i += 1;
        }
        let width_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        let width = if i > width_start {
            Some(input[width_start..i].parse().ok()?)
        } else {
            None
        };
        let precision = if bytes.get(i) == Some(&b'.') {
            i += 1;
            let prec_start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i > prec_start {
                Some(input[prec_start..i].parse().ok()?)
            } else {
                Some(0)
            }
        } else {
            None
        };
        let conv = match *bytes.get(i)? {
            b'd' | b'i' => Conv::Dec,
            b'u' => Conv::Uns,
            b'x' => Conv::HexLower,
            b'X' => Conv::HexUpper,
            b'o' => Conv::Oct,
            b'b' => Conv::Bin,
            b'e' => Conv::ExpLower,
            b'E' => Conv::ExpUpper,
            b'f' => Conv::Fixed,
            b'g' => Conv::GenLower,
            b'G' => Conv::GenUpper,
            b's' => Conv::Str,
            _ => return None,
        };
        i += 1;
        let spec = FormatSpec {
            raw: input[..i].to_string(),
            minus,
            plus,
            space,
            zero,
            alt,
            width,
            precision,
            conv,
        };
        Some((spec, i))
    }

    /// The verbatim specifier text, e.g. `%.3f`.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn conv(&self) -> Conv {
        self.conv
    }

    pub fn is_string(&self) -> bool {
        self.conv == Conv::Str
    }

    pub fn is_numeric(&self) -> bool {
        self.conv != Conv::Str
    }

    /// True for the float conversion classes (`e E f g G`).
    pub fn is_float_class(&self) -> bool {
        matches!(
            self.conv,
            Conv::ExpLower | Conv::ExpUpper | Conv::Fixed | Conv::GenLower | Conv::GenUpper
        )
    }

    /// Integer radix implied by the conversion.
    pub fn radix(&self) -> u32 {
        match self.conv {
            Conv::HexLower | Conv::HexUpper => 16,
            Conv::Oct => 8,
            Conv::Bin => 2,
            _ => 10,
        }
    }

    // -------------------------------------------------------------------------
    // Scanning
    // -------------------------------------------------------------------------

    /// Length of the longest prefix of `s` that this specifier's class
    /// accepts. Integer classes consume `[+-]?digits` (bare digit runs for
    /// base 16/8/2); float classes consume
    /// `[+-]?digits(.digits)?([eE][+-]?digits)?`. `None` when no digits are
    /// present at all, or for `%s` which has no digit class.
    pub fn scan(&self, s: &str) -> Option<usize> {
        let b = s.as_bytes();
        match self.conv {
            Conv::Dec | Conv::Uns => scan_signed(b, |c: u8| c.is_ascii_digit()),
            Conv::HexLower | Conv::HexUpper => scan_run(b, 0, |c: u8| c.is_ascii_hexdigit()),
            Conv::Oct => scan_run(b, 0, |c: u8| (b'0'..=b'7').contains(&c)),
            Conv::Bin => scan_run(b, 0, |c: u8| c == b'0' || c == b'1'),
            Conv::ExpLower | Conv::ExpUpper | Conv::Fixed | Conv::GenLower | Conv::GenUpper => {
                scan_float(b)
            }
            Conv::Str => None,
        }
    }

    // -------------------------------------------------------------------------
    // Rendering
    // -------------------------------------------------------------------------

    /// Render `value` under this specifier with printf semantics.
    pub fn render(&self, value: &Value) -> String {
        match self.conv {
            Conv::Str => self.render_str(&value.to_string()),
            Conv::Dec | Conv::Uns | Conv::HexLower | Conv::HexUpper | Conv::Oct | Conv::Bin => {
                self.render_int(value)
            }
            _ => self.render_float(value),
        }
    }

    fn render_str(&self, s: &str) -> String {
        let mut body = s.to_string();
        if let Some(p) = self.precision {
            body.truncate(p);
        }
        match self.width {
            Some(w) if w > body.len() => {
                let fill = " ".repeat(w - body.len());
                if self.minus {
                    format!("{body}{fill}")
                } else {
                    format!("{fill}{body}")
                }
            }
            _ => body,
        }
    }

    fn render_int(&self, value: &Value) -> String {
        let Some(iv) = value.as_i64() else {
            return value.to_string();
        };
        let (negative, magnitude) = match self.conv {
            // %u and the radix conversions take the two's-complement view.
            Conv::Uns | Conv::HexLower | Conv::HexUpper | Conv::Oct | Conv::Bin => {
                (false, iv as u64)
            }
            _ => (iv < 0, iv.unsigned_abs()),
        };
        let mut digits = match self.conv {
            Conv::HexLower => format!("{magnitude:x}"),
            Conv::HexUpper => format!("{magnitude:X}"),
            Conv::Oct => format!("{magnitude:o}"),
            Conv::Bin => format!("{magnitude:b}"),
            _ => magnitude.to_string(),
        };
        if let Some(p) = self.precision {
            if digits.len() < p {
                digits = format!("{}{digits}", "0".repeat(p - digits.len()));
            }
        }
        let prefix = if self.alt && magnitude != 0 {
            match self.conv {
                Conv::HexLower => "0x",
                Conv::HexUpper => "0X",
                Conv::Oct => "0",
                Conv::Bin => "0b",
                _ => "",
            }
        } else {
            ""
        };
        let sign = self.sign_str(negative);
        self.pad(sign, prefix, digits, self.precision.is_none())
    }

    fn render_float(&self, value: &Value) -> String {
        let Some(fv) = value.as_f64() else {
            return value.to_string();
        };
        let sign = self.sign_str(fv.is_sign_negative());
        let mag = fv.abs();
        let body = match self.conv {
            Conv::Fixed => {
                let prec = self.precision.unwrap_or(6);
                let mut s = format!("{mag:.prec$}");
                if self.alt && prec == 0 {
                    s.push('.');
                }
                s
            }
            Conv::ExpLower => render_exp(mag, self.precision.unwrap_or(6), false),
            Conv::ExpUpper => render_exp(mag, self.precision.unwrap_or(6), true),
            Conv::GenLower => render_gen(mag, self.precision.unwrap_or(6).max(1), false),
            Conv::GenUpper => render_gen(mag, self.precision.unwrap_or(6).max(1), true),
            _ => unreachable!("integer conversions handled in render_int"),
        };
        self.pad(sign, "", body, true)
    }

    fn sign_str(&self, negative: bool) -> &'static str {
        if negative {
            "-"
        } else if self.plus {
            "+"
        } else if self.space {
            " "
        } else {
            ""
        }
    }

    /// Width, alignment and zero-fill for an already-formatted numeric body.
    fn pad(&self, sign: &str, prefix: &str, body: String, allow_zero: bool) -> String {
        let len = sign.len() + prefix.len() + body.len();
        match self.width {
            Some(w) if w > len => {
                let fill = w - len;
                if self.minus {
                    format!("{sign}{prefix}{body}{}", " ".repeat(fill))
                } else if self.zero && allow_zero {
                    format!("{sign}{prefix}{}{body}", "0".repeat(fill))
                } else {
                    format!("{}{sign}{prefix}{body}", " ".repeat(fill))
                }
            }
            _ => format!("{sign}{prefix}{body}"),
        }
    }
}

impl std::fmt::Display for FormatSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

fn scan_run(b: &[u8], start: usize, good: impl Fn(u8) -> bool) -> Option<usize> {
    let mut i = start;
    while i < b.len() && good(b[i]) {
        i += 1;
    }
    if i > start {
        Some(i)
    } else {
        None
    }
}

fn scan_signed(b: &[u8], good: impl Fn(u8) -> bool) -> Option<usize> {
    let start = match b.first().copied() {
        Some(b'+') | Some(b'-') => 1,
        _ => 0,
    };
    scan_run(b, start, good)
}

fn scan_float(b: &[u8]) -> Option<usize> {
    let mut i = match b.first().copied() {
        Some(b'+') | Some(b'-') => 1,
        _ => 0,
    };
    i = scan_run(b, i, |c: u8| c.is_ascii_digit())?;
    if b.get(i) == Some(&b'.') {
        if let Some(j) = scan_run(b, i + 1, |c: u8| c.is_ascii_digit()) {
            i = j;
        }
    }
    if matches!(b.get(i).copied(), Some(b'e') | Some(b'E')) {
        let mut j = i + 1;
        if matches!(b.get(j).copied(), Some(b'+') | Some(b'-')) {
            j += 1;
        }
        if let Some(k) = scan_run(b, j, |c: u8| c.is_ascii_digit()) {
            i = k;
        }
    }
    Some(i)
}

/// Mantissa and exponent of `mag` with the mantissa rounded to `prec`
/// fractional digits. Rounding can carry the mantissa to 10.0, which bumps
/// the exponent.
fn exp_parts(mag: f64, prec: usize) -> (String, i32) {
    if mag == 0.0 {
        return (format!("{:.prec$}", 0.0), 0);
    }
    let mut exp = mag.log10().floor() as i32;
    let mut body = format!("{:.prec$}", mag / 10f64.powi(exp));
    if body.starts_with("10") {
        exp += 1;
        body = format!("{:.prec$}", mag / 10f64.powi(exp));
    }
    (body, exp)
}

fn render_exp(mag: f64, prec: usize, upper: bool) -> String {
    let (mantissa, exp) = exp_parts(mag, prec);
    let e = if upper { 'E' } else { 'e' };
    let exp_sign = if exp < 0 { '-' } else { '+' };
    format!("{mantissa}{e}{exp_sign}{:02}", exp.unsigned_abs())
}

fn render_gen(mag: f64, sig: usize, upper: bool) -> String {
    if mag == 0.0 {
        return "0".to_string();
    }
    let (_, exp) = exp_parts(mag, sig - 1);
    if exp < -4 || exp >= sig as i32 {
        let (mantissa, exp) = exp_parts(mag, sig - 1);
        let stripped = strip_fraction_zeros(mantissa);
        let e = if upper { 'E' } else { 'e' };
        let exp_sign = if exp < 0 { '-' } else { '+' };
        format!("{stripped}{e}{exp_sign}{:02}", exp.unsigned_abs())
    } else {
        let decimals = (sig as i32 - 1 - exp).max(0) as usize;
        strip_fraction_zeros(format!("{mag:.decimals$}"))
    }
}

fn strip_fraction_zeros(s: String) -> String {
    if !s.contains('.') {
        return s;
    }
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(s: &str) -> FormatSpec {
        let (spec, n) = FormatSpec::parse(s).expect("specifier should parse");
        assert_eq!(n, s.len());
        spec
    }

    #[test]
    fn parses_specifier_components() {
        let s = spec("%-+08.3f");
        assert_eq!(s.conv(), Conv::Fixed);
        assert_eq!(s.raw(), "%-+08.3f");
        assert!(s.is_float_class());
    }

    #[test]
    fn rejects_malformed_specifiers() {
        assert!(FormatSpec::parse("%q").is_none());
        assert!(FormatSpec::parse("%").is_none());
        assert!(FormatSpec::parse("no-percent").is_none());
    }

    #[test]
    fn parse_reports_consumed_length() {
        let (s, n) = FormatSpec::parse("%.3f units").unwrap();
        assert_eq!(n, 4);
        assert_eq!(s.raw(), "%.3f");
    }

    #[test]
    fn renders_fixed_floats() {
        assert_eq!(spec("%.3f").render(&Value::Float32(1.0)), "1.000");
        assert_eq!(spec("%.2f").render(&Value::Float64(-2.5)), "-2.50");
        assert_eq!(spec("%f").render(&Value::Float64(0.5)), "0.500000");
        assert_eq!(spec("%08.2f").render(&Value::Float64(3.5)), "00003.50");
    }

    #[test]
    fn renders_integers() {
        assert_eq!(spec("%d").render(&Value::Int(42)), "42");
        assert_eq!(spec("%d").render(&Value::Int(-7)), "-7");
        assert_eq!(spec("%+d").render(&Value::Int(7)), "+7");
        assert_eq!(spec("%5d").render(&Value::Int(42)), "   42");
        assert_eq!(spec("%-5d").render(&Value::Int(42)), "42   ");
        assert_eq!(spec("%05d").render(&Value::Int(42)), "00042");
        assert_eq!(spec("%.4d").render(&Value::Int(42)), "0042");
    }

    #[test]
    fn renders_radix_conversions() {
        assert_eq!(spec("%x").render(&Value::Int(255)), "ff");
        assert_eq!(spec("%X").render(&Value::Int(255)), "FF");
        assert_eq!(spec("%#x").render(&Value::Int(255)), "0xff");
        assert_eq!(spec("%o").render(&Value::Int(8)), "10");
        assert_eq!(spec("%b").render(&Value::Int(5)), "101");
    }

    #[test]
    fn renders_exponent_form() {
        assert_eq!(spec("%e").render(&Value::Float64(1234.5)), "1.234500e+03");
        assert_eq!(spec("%.2e").render(&Value::Float64(0.00345)), "3.45e-03");
        assert_eq!(spec("%.1E").render(&Value::Float64(9.96)), "1.0E+01");
    }

    #[test]
    fn renders_general_form() {
        assert_eq!(spec("%g").render(&Value::Float64(0.0001)), "0.0001");
        assert_eq!(spec("%g").render(&Value::Float64(0.00001)), "1e-05");
        assert_eq!(spec("%g").render(&Value::Float64(1234567.0)), "1.23457e+06");
        assert_eq!(spec("%g").render(&Value::Float64(2.5)), "2.5");
        assert_eq!(spec("%.3g").render(&Value::Float64(1234.0)), "1.23e+03");
    }

    #[test]
    fn renders_strings() {
        assert_eq!(spec("%s").render(&Value::String("on".into())), "on");
        assert_eq!(spec("%5s").render(&Value::String("on".into())), "   on");
        assert_eq!(spec("%-5s").render(&Value::String("on".into())), "on   ");
        assert_eq!(spec("%.2s").render(&Value::String("long".into())), "lo");
    }

    #[test]
    fn integer_conversions_accept_integer_values_only_by_truncation() {
        assert_eq!(spec("%d").render(&Value::Float64(2.9)), "2");
        assert_eq!(spec("%d").render(&Value::Int32(-3)), "-3");
    }

    #[test]
    fn scans_decimal_prefixes() {
        let s = spec("%d");
        assert_eq!(s.scan("123abc"), Some(3));
        assert_eq!(s.scan("-42 rest"), Some(3));
        assert_eq!(s.scan("+7"), Some(2));
        assert_eq!(s.scan("abc"), None);
        assert_eq!(s.scan("-"), None);
    }

    #[test]
    fn scans_float_prefixes() {
        let s = spec("%.3f");
        assert_eq!(s.scan("2.500"), Some(5));
        assert_eq!(s.scan("-1.5e3 tail"), Some(6));
        assert_eq!(s.scan("2.e5"), Some(1));
        assert_eq!(s.scan("3e"), Some(1));
        assert_eq!(s.scan("12"), Some(2));
        assert_eq!(s.scan(".5"), None);
    }

    #[test]
    fn scans_radix_prefixes() {
        assert_eq!(spec("%x").scan("ff zz"), Some(2));
        assert_eq!(spec("%o").scan("778"), Some(2));
        assert_eq!(spec("%b").scan("1012"), Some(3));
        assert_eq!(spec("%x").scan("-ff"), None);
    }
}
