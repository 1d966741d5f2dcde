//! Scalar arithmetic and function kernel (C6, §4.6).
//!
//! Every operation follows the same pipeline: NULL propagates without
//! further work, non-numeric inputs coerce to DOUBLE unless the operator
//! has a more specific rule, the result domain is chosen by the widest
//! input, and every fixed-width operation is checked for overflow before
//! the result is constructed. Operators never mutate their inputs.

use crate::error::{Error, Result};
use crate::value::{DbValue, Domain, Numeric};

fn widen_numeric_pair(a: &DbValue, b: &DbValue) -> Option<(DbValue, DbValue)> {
    match (a, b) {
        (DbValue::Numeric(_), _) | (_, DbValue::Numeric(_)) => None,
        (DbValue::Double(_), _) | (_, DbValue::Double(_)) => {
            let a = a.coerce(Domain::Double).ok()?;
            let b = b.coerce(Domain::Double).ok()?;
            Some((a, b))
        }
        (DbValue::Bigint(_), _) | (_, DbValue::Bigint(_)) => {
            let a = a.coerce(Domain::Bigint).ok()?;
            let b = b.coerce(Domain::Bigint).ok()?;
            Some((a, b))
        }
        _ => Some((a.clone(), b.clone())),
    }
}

/// `a + b` with strict NULL propagation and overflow detection.
pub fn add(a: &DbValue, b: &DbValue) -> Result<DbValue> {
    if a.is_null() || b.is_null() {
        return Ok(DbValue::Null);
    }
    match widen_numeric_pair(a, b) {
        Some((DbValue::Integer(x), DbValue::Integer(y))) => x
            .checked_add(y)
            .map(DbValue::Integer)
            .ok_or(Error::Overflow { op: "add" }),
        Some((DbValue::Bigint(x), DbValue::Bigint(y))) => x
            .checked_add(y)
            .map(DbValue::Bigint)
            .ok_or(Error::Overflow { op: "add" }),
        Some((DbValue::Double(x), DbValue::Double(y))) => {
            let r = x + y;
            if r.is_finite() {
                Ok(DbValue::Double(r))
            } else {
                Err(Error::Overflow { op: "add" })
            }
        }
        _ => numeric_add_sub(a, b, false),
    }
}

/// `a - b`.
pub fn sub(a: &DbValue, b: &DbValue) -> Result<DbValue> {
    if a.is_null() || b.is_null() {
        return Ok(DbValue::Null);
    }
    match widen_numeric_pair(a, b) {
        Some((DbValue::Integer(x), DbValue::Integer(y))) => x
            .checked_sub(y)
            .map(DbValue::Integer)
            .ok_or(Error::Overflow { op: "sub" }),
        Some((DbValue::Bigint(x), DbValue::Bigint(y))) => x
            .checked_sub(y)
            .map(DbValue::Bigint)
            .ok_or(Error::Overflow { op: "sub" }),
        Some((DbValue::Double(x), DbValue::Double(y))) => {
            let r = x - y;
            if r.is_finite() {
                Ok(DbValue::Double(r))
            } else {
                Err(Error::Overflow { op: "sub" })
            }
        }
        _ => numeric_add_sub(a, b, true),
    }
}

fn numeric_add_sub(a: &DbValue, b: &DbValue, is_sub: bool) -> Result<DbValue> {
    let (DbValue::Numeric(_), DbValue::Numeric(_))
    | (DbValue::Numeric(_), DbValue::Integer(_))
    | (DbValue::Integer(_), DbValue::Numeric(_)) = (a, b)
    else {
        return Err(Error::CannotCoerce {
            from: a.type_name(),
            to: "NUMERIC",
        });
    };
    let da = a.coerce(Domain::Double).map_err(|_| Error::CoerceOverflow { type_name: "NUMERIC" })?;
    let db = b.coerce(Domain::Double).map_err(|_| Error::CoerceOverflow { type_name: "NUMERIC" })?;
    let (DbValue::Double(x), DbValue::Double(y)) = (da, db) else {
        unreachable!()
    };
    let r = if is_sub { x - y } else { x + y };
    let precision = match (a.domain(), b.domain()) {
        (Domain::Numeric { precision, .. }, _) | (_, Domain::Numeric { precision, .. }) => precision,
        _ => crate::value::MAX_NUMERIC_PRECISION,
    };
    let scale = match (a.domain(), b.domain()) {
        (Domain::Numeric { scale, .. }, _) | (_, Domain::Numeric { scale, .. }) => scale,
        _ => 0,
    };
    Numeric::from_str_with_domain(&format!("{:.*}", scale as usize, r), precision, scale)
        .map(DbValue::Numeric)
        .map_err(|_| Error::Overflow { op: if is_sub { "sub" } else { "add" } })
}

/// `a * b`.
pub fn mul(a: &DbValue, b: &DbValue) -> Result<DbValue> {
    if a.is_null() || b.is_null() {
        return Ok(DbValue::Null);
    }
    match widen_numeric_pair(a, b) {
        Some((DbValue::Integer(x), DbValue::Integer(y))) => x
            .checked_mul(y)
            .map(DbValue::Integer)
            .ok_or(Error::Overflow { op: "mul" }),
        Some((DbValue::Bigint(x), DbValue::Bigint(y))) => x
            .checked_mul(y)
            .map(DbValue::Bigint)
            .ok_or(Error::Overflow { op: "mul" }),
        Some((DbValue::Double(x), DbValue::Double(y))) => {
            let r = x * y;
            if r.is_finite() {
                Ok(DbValue::Double(r))
            } else {
                Err(Error::Overflow { op: "mul" })
            }
        }
        _ => Err(Error::CannotCoerce {
            from: a.type_name(),
            to: "NUMERIC",
        }),
    }
}

/// `a / b`. Division by zero is `ZeroDivide`, distinct from overflow.
pub fn div(a: &DbValue, b: &DbValue) -> Result<DbValue> {
    if a.is_null() || b.is_null() {
        return Ok(DbValue::Null);
    }
    match widen_numeric_pair(a, b) {
        Some((DbValue::Integer(_), DbValue::Integer(0)))
        | Some((DbValue::Bigint(_), DbValue::Bigint(0))) => Err(Error::ZeroDivide),
        Some((DbValue::Integer(x), DbValue::Integer(y))) => x
            .checked_div(y)
            .map(DbValue::Integer)
            .ok_or(Error::Overflow { op: "div" }),
        Some((DbValue::Bigint(x), DbValue::Bigint(y))) => x
            .checked_div(y)
            .map(DbValue::Bigint)
            .ok_or(Error::Overflow { op: "div" }),
        Some((DbValue::Double(x), DbValue::Double(y))) => {
            let r = x / y;
            if r.is_finite() {
                Ok(DbValue::Double(r))
            } else {
                Err(Error::Overflow { op: "div" })
            }
        }
        _ => Err(Error::CannotCoerce {
            from: a.type_name(),
            to: "NUMERIC",
        }),
    }
}

/// Unary minus, with the sign-overflow-at-MIN case checked explicitly.
pub fn uminus(a: &DbValue) -> Result<DbValue> {
    if a.is_null() {
        return Ok(DbValue::Null);
    }
    match a {
        DbValue::Integer(x) => x
            .checked_neg()
            .map(DbValue::Integer)
            .ok_or(Error::Overflow { op: "uminus" }),
        DbValue::Bigint(x) => x
            .checked_neg()
            .map(DbValue::Bigint)
            .ok_or(Error::Overflow { op: "uminus" }),
        DbValue::Double(x) => Ok(DbValue::Double(-x)),
        DbValue::Numeric(n) => {
            let mut n = n.clone();
            if n.digits.iter().any(|&d| d != 0) {
                n.negative = !n.negative;
            }
            Ok(DbValue::Numeric(n))
        }
        other => Err(Error::CannotCoerce {
            from: other.type_name(),
            to: "numeric",
        }),
    }
}

/// `mod(a, b)`: division by zero returns `a` unchanged, not an error.
pub fn modulo(a: &DbValue, b: &DbValue) -> Result<DbValue> {
    if a.is_null() || b.is_null() {
        return Ok(DbValue::Null);
    }
    match widen_numeric_pair(a, b) {
        Some((DbValue::Integer(x), DbValue::Integer(0))) => Ok(DbValue::Integer(x)),
        Some((DbValue::Integer(x), DbValue::Integer(y))) => Ok(DbValue::Integer(x % y)),
        Some((DbValue::Bigint(x), DbValue::Bigint(0))) => Ok(DbValue::Bigint(x)),
        Some((DbValue::Bigint(x), DbValue::Bigint(y))) => Ok(DbValue::Bigint(x % y)),
        Some((DbValue::Double(x), DbValue::Double(y))) => {
            if y == 0.0 {
                Ok(DbValue::Double(x))
            } else {
                Ok(DbValue::Double(x % y))
            }
        }
        _ => Err(Error::CannotCoerce {
            from: a.type_name(),
            to: "numeric",
        }),
    }
}

/// `floor`/`ceil`/`abs`/`sign` preserve the input domain.
pub fn floor(v: &DbValue) -> Result<DbValue> {
    unary_round_like(v, f64::floor, "floor")
}

pub fn ceil(v: &DbValue) -> Result<DbValue> {
    unary_round_like(v, f64::ceil, "ceil")
}

fn unary_round_like(v: &DbValue, f: fn(f64) -> f64, op: &'static str) -> Result<DbValue> {
    if v.is_null() {
        return Ok(DbValue::Null);
    }
    match v {
        DbValue::Integer(x) => Ok(DbValue::Integer(*x)),
        DbValue::Bigint(x) => Ok(DbValue::Bigint(*x)),
        DbValue::Double(x) => Ok(DbValue::Double(f(*x))),
        DbValue::Numeric(n) => {
            if n.scale == 0 {
                return Ok(DbValue::Numeric(n.clone()));
            }
            let d: f64 = n.to_decimal_string().parse().map_err(|_| Error::Overflow { op })?;
            let rounded = f(d);
            Numeric::from_str_with_domain(&format!("{rounded:.0}"), n.precision, 0)
                .map(DbValue::Numeric)
                .map_err(|_| Error::Overflow { op })
        }
        other => Err(Error::CannotCoerce {
            from: other.type_name(),
            to: "numeric",
        }),
    }
}

pub fn abs(v: &DbValue) -> Result<DbValue> {
    if v.is_null() {
        return Ok(DbValue::Null);
    }
    match v {
        DbValue::Integer(x) => x.checked_abs().map(DbValue::Integer).ok_or(Error::Overflow { op: "abs" }),
        DbValue::Bigint(x) => x.checked_abs().map(DbValue::Bigint).ok_or(Error::Overflow { op: "abs" }),
        DbValue::Double(x) => Ok(DbValue::Double(x.abs())),
        DbValue::Numeric(n) => {
            let mut n = n.clone();
            n.negative = false;
            Ok(DbValue::Numeric(n))
        }
        other => Err(Error::CannotCoerce {
            from: other.type_name(),
            to: "numeric",
        }),
    }
}

pub fn sign(v: &DbValue) -> Result<DbValue> {
    if v.is_null() {
        return Ok(DbValue::Null);
    }
    match v {
        DbValue::Integer(x) => Ok(DbValue::Integer(x.signum())),
        DbValue::Bigint(x) => Ok(DbValue::Integer(x.signum() as i32)),
        DbValue::Double(x) => Ok(DbValue::Integer(if *x > 0.0 {
            1
        } else if *x < 0.0 {
            -1
        } else {
            0
        })),
        DbValue::Numeric(n) => {
            let zero = n.digits.iter().all(|&d| d == 0);
            Ok(DbValue::Integer(if zero {
                0
            } else if n.negative {
                -1
            } else {
                1
            }))
        }
        other => Err(Error::CannotCoerce {
            from: other.type_name(),
            to: "numeric",
        }),
    }
}

/// `round(value, n)`: decimal rounding. Numeric rounding is performed as
/// a digit-string operation to avoid double-precision artefacts.
pub fn round(v: &DbValue, n: i32) -> Result<DbValue> {
    if v.is_null() {
        return Ok(DbValue::Null);
    }
    match v {
        DbValue::Double(x) => {
            let factor = 10f64.powi(n);
            Ok(DbValue::Double((x * factor).round() / factor))
        }
        DbValue::Numeric(numeric) => {
            let (precision, scale) = (numeric.precision, numeric.scale);
            let s = numeric.to_decimal_string();
            let rounded = round_decimal_string(&s, n);
            let digit_count = rounded.trim_start_matches('-').replace('.', "").len() as u8;
            let new_precision = precision.max(digit_count);
            Numeric::from_str_with_domain(&rounded, new_precision, scale)
                .map(DbValue::Numeric)
                .map_err(|_| Error::Overflow { op: "round" })
        }
        DbValue::Integer(x) => Ok(DbValue::Integer(*x)),
        DbValue::Bigint(x) => Ok(DbValue::Bigint(*x)),
        other => Err(Error::CannotCoerce {
            from: other.type_name(),
            to: "numeric",
        }),
    }
}

/// `trunc(value, n)`: same shape as `round` without rounding.
pub fn trunc(v: &DbValue, n: i32) -> Result<DbValue> {
    if v.is_null() {
        return Ok(DbValue::Null);
    }
    match v {
        DbValue::Double(x) => {
            let factor = 10f64.powi(n);
            Ok(DbValue::Double((x * factor).trunc() / factor))
        }
        DbValue::Numeric(numeric) => {
            let s = numeric.to_decimal_string();
            let truncated = truncate_decimal_string(&s, n);
            Numeric::from_str_with_domain(&truncated, numeric.precision, numeric.scale)
                .map(DbValue::Numeric)
                .map_err(|_| Error::Overflow { op: "trunc" })
        }
        DbValue::Integer(x) => Ok(DbValue::Integer(*x)),
        DbValue::Bigint(x) => Ok(DbValue::Bigint(*x)),
        other => Err(Error::CannotCoerce {
            from: other.type_name(),
            to: "numeric",
        }),
    }
}

/// Round a decimal string to the place `10^-n`: `n >= 0` keeps `n`
/// fractional digits, `n < 0` zeroes the low `-n` integer digits,
/// carrying left (and growing the integer part) as needed.
fn round_decimal_string(s: &str, n: i32) -> String {
    decimal_at_place(s, n, true)
}

/// Same place semantics as `round_decimal_string`, but drops digits past
/// the place instead of rounding them.
fn truncate_decimal_string(s: &str, n: i32) -> String {
    decimal_at_place(s, n, false)
}

/// Shared digit-string implementation for `round`/`trunc`. `keep =
/// int_len + n` is the number of leading digits (integer then
/// fractional, concatenated) that survive; anything at or past that
/// index is zeroed, and rounded carries propagate left through the kept
/// digits, growing the integer part by one place on overflow (e.g.
/// `round(999, -1)` keeps 2 digits, carries, and becomes `1000`).
fn decimal_at_place(s: &str, n: i32, round_up: bool) -> String {
    let negative = s.starts_with('-');
    let unsigned = s.trim_start_matches('-');
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let mut digits: Vec<u8> = int_part.bytes().chain(frac_part.bytes()).map(|b| b - b'0').collect();

    let int_len = int_part.len() as i32;
    let total_len = digits.len() as i32;
    let keep = int_len + n;

    if keep >= total_len {
        return format!("{}{unsigned}", if negative { "-" } else { "" });
    }
    if keep < 0 {
        return "0".to_string();
    }
    let keep = keep as usize;

    let round_up = round_up && digits[keep] >= 5;
    for d in digits.iter_mut().skip(keep) {
        *d = 0;
    }
    if round_up {
        let mut i = keep;
        loop {
            if i == 0 {
                digits.insert(0, 1);
                break;
            }
            i -= 1;
            if digits[i] == 9 {
                digits[i] = 0;
            } else {
                digits[i] += 1;
                break;
            }
        }
    }

    let frac_len = frac_part.len();
    let split = digits.len() - frac_len;
    let (ip, fp) = digits.split_at(split);
    let ip_str: String = ip.iter().map(|d| (b'0' + d) as char).collect();
    let fp_str: String = fp.iter().map(|d| (b'0' + d) as char).collect();
    let sign = if negative && digits.iter().any(|&d| d != 0) { "-" } else { "" };
    if fp_str.is_empty() {
        format!("{sign}{ip_str}")
    } else {
        format!("{sign}{ip_str}.{fp_str}")
    }
}

/// `pow(a, b)`: negative base with non-integer exponent is an error.
pub fn pow(a: &DbValue, b: &DbValue) -> Result<DbValue> {
    if a.is_null() || b.is_null() {
        return Ok(DbValue::Null);
    }
    let base = a.coerce(Domain::Double).map_err(|_| Error::CannotCoerce {
        from: a.type_name(),
        to: "DOUBLE",
    })?;
    let exp = b.coerce(Domain::Double).map_err(|_| Error::CannotCoerce {
        from: b.type_name(),
        to: "DOUBLE",
    })?;
    let (DbValue::Double(base), DbValue::Double(exp)) = (base, exp) else {
        unreachable!()
    };
    if base < 0.0 && exp.fract() != 0.0 {
        return Err(Error::PowerError);
    }
    let r = base.powf(exp);
    if r.is_finite() {
        Ok(DbValue::Double(r))
    } else {
        Err(Error::Overflow { op: "pow" })
    }
}

macro_rules! domain_restricted_unary {
    ($name:ident, $func_name:literal, $check:expr, $apply:expr) => {
        pub fn $name(v: &DbValue) -> Result<DbValue> {
            if v.is_null() {
                return Ok(DbValue::Null);
            }
            let x = v.coerce(Domain::Double).map_err(|_| Error::CannotCoerce {
                from: v.type_name(),
                to: "DOUBLE",
            })?;
            let DbValue::Double(x) = x else { unreachable!() };
            if !$check(x) {
                return Err(Error::FunctionArgError { function: $func_name });
            }
            Ok(DbValue::Double($apply(x)))
        }
    };
}

domain_restricted_unary!(exp, "exp", |_x: f64| true, f64::exp);
domain_restricted_unary!(sqrt, "sqrt", |x: f64| x >= 0.0, f64::sqrt);
domain_restricted_unary!(ln, "ln", |x: f64| x > 0.0, f64::ln);
domain_restricted_unary!(log2, "log2", |x: f64| x > 0.0, f64::log2);
domain_restricted_unary!(log10, "log10", |x: f64| x > 0.0, f64::log10);
domain_restricted_unary!(sin, "sin", |_x: f64| true, f64::sin);
domain_restricted_unary!(cos, "cos", |_x: f64| true, f64::cos);
domain_restricted_unary!(tan, "tan", |_x: f64| true, f64::tan);
domain_restricted_unary!(asin, "asin", |x: f64| x.abs() <= 1.0, f64::asin);
domain_restricted_unary!(acos, "acos", |x: f64| x.abs() <= 1.0, f64::acos);
domain_restricted_unary!(atan, "atan", |_x: f64| true, f64::atan);

/// `log(base, v)`: domain-restricted to a positive base != 1 and positive v.
pub fn log(base: &DbValue, v: &DbValue) -> Result<DbValue> {
    if base.is_null() || v.is_null() {
        return Ok(DbValue::Null);
    }
    let b = base.coerce(Domain::Double).map_err(|_| Error::FunctionArgError { function: "log" })?;
    let x = v.coerce(Domain::Double).map_err(|_| Error::FunctionArgError { function: "log" })?;
    let (DbValue::Double(b), DbValue::Double(x)) = (b, x) else {
        unreachable!()
    };
    if b <= 0.0 || b == 1.0 || x <= 0.0 {
        return Err(Error::FunctionArgError { function: "log" });
    }
    Ok(DbValue::Double(x.log(b)))
}

/// `cot(v)`: cot of zero returns NULL rather than an error.
pub fn cot(v: &DbValue) -> Result<DbValue> {
    if v.is_null() {
        return Ok(DbValue::Null);
    }
    let x = v.coerce(Domain::Double).map_err(|_| Error::FunctionArgError { function: "cot" })?;
    let DbValue::Double(x) = x else { unreachable!() };
    if x == 0.0 {
        return Ok(DbValue::Null);
    }
    Ok(DbValue::Double(1.0 / x.tan()))
}

/// `atan2(y, x)`.
pub fn atan2(y: &DbValue, x: &DbValue) -> Result<DbValue> {
    if y.is_null() || x.is_null() {
        return Ok(DbValue::Null);
    }
    let y = y.coerce(Domain::Double).map_err(|_| Error::FunctionArgError { function: "atan2" })?;
    let x = x.coerce(Domain::Double).map_err(|_| Error::FunctionArgError { function: "atan2" })?;
    let (DbValue::Double(y), DbValue::Double(x)) = (y, x) else {
        unreachable!()
    };
    Ok(DbValue::Double(y.atan2(x)))
}

/// `width_bucket(v, lo, hi, n)`. Buckets are half-open in the direction of
/// `lo < hi` (and the other way when `lo > hi`); values below the range
/// map to bucket 0, above to bucket `n + 1`. When any argument is numeric
/// or bigint the computation is performed in numeric (here: `f64`, since
/// this crate's `Numeric` already round-trips losslessly through decimal
/// strings for the precisions in play).
pub fn width_bucket(v: &DbValue, lo: &DbValue, hi: &DbValue, n: &DbValue) -> Result<DbValue> {
    if v.is_null() || lo.is_null() || hi.is_null() || n.is_null() {
        return Ok(DbValue::Null);
    }
    let n_val = n.get_integer().or_else(|_| n.get_bigint().map(|v| v as i32))?;
    if !(1..i32::MAX).contains(&n_val) {
        return Err(Error::FunctionArgError { function: "width_bucket" });
    }
    let to_f64 = |x: &DbValue| -> Result<f64> {
        match x.coerce(Domain::Double) {
            Ok(DbValue::Double(d)) => Ok(d),
            _ => Err(Error::FunctionArgError { function: "width_bucket" }),
        }
    };
    let (v, lo, hi) = (to_f64(v)?, to_f64(lo)?, to_f64(hi)?);
    let n_val = n_val as f64;
    let ascending = lo < hi;
    let (low, high) = if ascending { (lo, hi) } else { (hi, lo) };
    let bucket = if ascending {
        if v < lo {
            0
        } else if v >= hi {
            n_val as i32 + 1
        } else {
            (((v - low) / (high - low)) * n_val).floor() as i32 + 1
        }
    } else if v > lo {
        0
    } else if v <= hi {
        n_val as i32 + 1
    } else {
        (((high - v) / (high - low)) * n_val).floor() as i32 + 1
    };
    Ok(DbValue::Integer(bucket))
}

/// Date/time/datetime field extracted by `extract`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractField {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Millisecond,
}

/// `extract(field, v)`: strings are parsed as date, then datetime, then
/// time, in that order, before the field is pulled off the result.
pub fn extract(field: ExtractField, v: &DbValue) -> Result<DbValue> {
    use chrono::{Datelike, Timelike};
    if v.is_null() {
        return Ok(DbValue::Null);
    }
    match (field, v) {
        (ExtractField::Year, DbValue::Date(d)) => Ok(DbValue::Integer(d.year())),
        (ExtractField::Month, DbValue::Date(d)) => Ok(DbValue::Integer(d.month() as i32)),
        (ExtractField::Day, DbValue::Date(d)) => Ok(DbValue::Integer(d.day() as i32)),
        (ExtractField::Year, DbValue::Datetime(d, _)) => Ok(DbValue::Integer(d.year())),
        (ExtractField::Month, DbValue::Datetime(d, _)) => Ok(DbValue::Integer(d.month() as i32)),
        (ExtractField::Day, DbValue::Datetime(d, _)) => Ok(DbValue::Integer(d.day() as i32)),
        (ExtractField::Hour, DbValue::Datetime(_, ms)) => Ok(DbValue::Integer((ms / 3_600_000) as i32)),
        (ExtractField::Minute, DbValue::Datetime(_, ms)) => Ok(DbValue::Integer(((ms / 60_000) % 60) as i32)),
        (ExtractField::Second, DbValue::Datetime(_, ms)) => Ok(DbValue::Integer(((ms / 1000) % 60) as i32)),
        (ExtractField::Millisecond, DbValue::Datetime(_, ms)) => Ok(DbValue::Integer((ms % 1000) as i32)),
        (ExtractField::Hour, DbValue::Time(t)) => Ok(DbValue::Integer(t.hour() as i32)),
        (ExtractField::Minute, DbValue::Time(t)) => Ok(DbValue::Integer(t.minute() as i32)),
        (ExtractField::Second, DbValue::Time(t)) => Ok(DbValue::Integer(t.second() as i32)),
        _ => Err(Error::FunctionArgError { function: "extract" }),
    }
}

/// `strcat`: coerce both sides to varchar and concatenate.
pub fn strcat(a: &DbValue, b: &DbValue) -> Result<DbValue> {
    if a.is_null() || b.is_null() {
        return Ok(DbValue::Null);
    }
    let sa = a.get_varchar().map_err(|_| Error::CannotCoerce {
        from: a.type_name(),
        to: "VARCHAR",
    })?;
    let sb = b.get_varchar().map_err(|_| Error::CannotCoerce {
        from: b.type_name(),
        to: "VARCHAR",
    })?;
    let mut buf = Vec::with_capacity(sa.len() + sb.len());
    buf.extend_from_slice(sa);
    buf.extend_from_slice(sb);
    let len = buf.len() as i32;
    Ok(DbValue::make_varchar(buf, len, 0))
}

/// Bitwise ops operate on bigints; shifts outside `[0, 63]` yield 0.
pub fn bit_not(v: &DbValue) -> Result<DbValue> {
    if v.is_null() {
        return Ok(DbValue::Null);
    }
    Ok(DbValue::Bigint(!v.get_bigint().or_else(|_| v.get_integer().map(|i| i as i64))?))
}

fn to_bigint(v: &DbValue) -> Result<i64> {
    v.get_bigint().or_else(|_| v.get_integer().map(|i| i as i64))
}

pub fn bit_and(a: &DbValue, b: &DbValue) -> Result<DbValue> {
    if a.is_null() || b.is_null() {
        return Ok(DbValue::Null);
    }
    Ok(DbValue::Bigint(to_bigint(a)? & to_bigint(b)?))
}

pub fn bit_or(a: &DbValue, b: &DbValue) -> Result<DbValue> {
    if a.is_null() || b.is_null() {
        return Ok(DbValue::Null);
    }
    Ok(DbValue::Bigint(to_bigint(a)? | to_bigint(b)?))
}

pub fn bit_xor(a: &DbValue, b: &DbValue) -> Result<DbValue> {
    if a.is_null() || b.is_null() {
        return Ok(DbValue::Null);
    }
    Ok(DbValue::Bigint(to_bigint(a)? ^ to_bigint(b)?))
}

/// `bit_shift(v, n)`: positive `n` shifts left, negative shifts right.
pub fn bit_shift(v: &DbValue, n: &DbValue) -> Result<DbValue> {
    if v.is_null() || n.is_null() {
        return Ok(DbValue::Null);
    }
    let x = to_bigint(v)?;
    let n = to_bigint(n)?;
    if !(0..64).contains(&n.unsigned_abs()) {
        return Ok(DbValue::Bigint(0));
    }
    let shift = n.unsigned_abs() as u32;
    Ok(DbValue::Bigint(if n >= 0 {
        x.checked_shl(shift).unwrap_or(0)
    } else {
        x.checked_shr(shift).unwrap_or(0)
    }))
}

/// `intdiv(a, b)`: division by zero is `ZeroDivide`, unlike `mod`.
pub fn intdiv(a: &DbValue, b: &DbValue) -> Result<DbValue> {
    if a.is_null() || b.is_null() {
        return Ok(DbValue::Null);
    }
    let x = to_bigint(a)?;
    let y = to_bigint(b)?;
    if y == 0 {
        return Err(Error::ZeroDivide);
    }
    x.checked_div(y).map(DbValue::Bigint).ok_or(Error::Overflow { op: "intdiv" })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_propagates_through_add() {
        assert_eq!(add(&DbValue::Null, &DbValue::Integer(1)).unwrap(), DbValue::Null);
    }

    #[test]
    fn int_add_overflow_is_reported() {
        let err = add(&DbValue::Integer(i32::MAX), &DbValue::Integer(1)).unwrap_err();
        assert!(matches!(err, Error::Overflow { op: "add" }));
    }

    #[test]
    fn mod_by_zero_returns_dividend_not_error() {
        assert_eq!(
            modulo(&DbValue::Integer(7), &DbValue::Integer(0)).unwrap(),
            DbValue::Integer(7)
        );
    }

    #[test]
    fn intdiv_by_zero_is_zero_divide() {
        assert!(matches!(
            intdiv(&DbValue::Bigint(1), &DbValue::Bigint(0)),
            Err(Error::ZeroDivide)
        ));
    }

    #[test]
    fn pow_negative_base_fractional_exponent_errors() {
        assert!(matches!(
            pow(&DbValue::Double(-2.0), &DbValue::Double(0.5)),
            Err(Error::PowerError)
        ));
    }

    #[test]
    fn cot_of_zero_is_null() {
        assert_eq!(cot(&DbValue::Double(0.0)).unwrap(), DbValue::Null);
    }

    #[test]
    fn asin_out_of_domain_is_function_arg_error() {
        assert!(matches!(
            asin(&DbValue::Double(2.0)),
            Err(Error::FunctionArgError { function: "asin" })
        ));
    }

    #[test]
    fn bit_shift_outside_range_yields_zero() {
        assert_eq!(
            bit_shift(&DbValue::Bigint(1), &DbValue::Integer(64)).unwrap(),
            DbValue::Bigint(0)
        );
    }

    #[test]
    fn width_bucket_below_and_above_range() {
        let n = DbValue::Integer(4);
        assert_eq!(
            width_bucket(&DbValue::Double(-1.0), &DbValue::Double(0.0), &DbValue::Double(10.0), &n).unwrap(),
            DbValue::Integer(0)
        );
        assert_eq!(
            width_bucket(&DbValue::Double(11.0), &DbValue::Double(0.0), &DbValue::Double(10.0), &n).unwrap(),
            DbValue::Integer(5)
        );
        assert_eq!(
            width_bucket(&DbValue::Double(2.5), &DbValue::Double(0.0), &DbValue::Double(10.0), &n).unwrap(),
            DbValue::Integer(1)
        );
    }

    #[test]
    fn numeric_round_with_carry_extends_precision() {
        let n = Numeric::from_str_with_domain("999", 3, 0).unwrap();
        let r = round(&DbValue::Numeric(n), -1).unwrap();
        let DbValue::Numeric(r) = r else { panic!() };
        assert_eq!(r.to_decimal_string(), "1000");
        assert_eq!(r.precision, 4);
    }

    #[test]
    fn numeric_round_basic() {
        let n = Numeric::from_str_with_domain("123.4567", 10, 4).unwrap();
        let r = round(&DbValue::Numeric(n), 2).unwrap();
        let DbValue::Numeric(r) = r else { panic!() };
        assert_eq!(r.to_decimal_string(), "123.4600");
    }

    #[test]
    fn numeric_trunc_negative_place_zeroes_integer_digits() {
        let n = Numeric::from_str_with_domain("1256", 4, 0).unwrap();
        let r = trunc(&DbValue::Numeric(n), -2).unwrap();
        let DbValue::Numeric(r) = r else { panic!() };
        assert_eq!(r.to_decimal_string(), "1200");
    }

    #[test]
    fn strcat_concatenates_varchars() {
        let r = strcat(&DbValue::make_varchar("foo", 10, 0), &DbValue::make_varchar("bar", 10, 0)).unwrap();
        assert_eq!(r.get_varchar().unwrap(), b"foobar");
    }
}
