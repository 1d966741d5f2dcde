//! The typed tagged value (`DbValue`).
//!
//! Every wire-visible column value and bind parameter round-trips through
//! this type. The enum discriminant doubles as the domain tag (I1): a
//! `Null` value carries no payload, and every non-`Null` variant carries
//! exactly the payload and domain attributes named in the data model.

use crate::error::{Error, Result};
use chrono::{NaiveDate, NaiveTime};

/// Maximum representable precision for the `Numeric` domain.
pub const MAX_NUMERIC_PRECISION: u8 = 38;

/// An object identifier: volume, page, slot, and replication group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Oid {
    pub volid: i16,
    pub pageid: i32,
    pub slotid: i16,
    pub groupid: i32,
}

impl Oid {
    pub const NULL: Oid = Oid {
        volid: -1,
        pageid: -1,
        slotid: -1,
        groupid: -1,
    };

    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }
}

/// A fixed-precision decimal stored as a sign-magnitude digit string in a
/// 16-byte buffer, matching the on-wire `numeric` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Numeric {
    pub precision: u8,
    pub scale: u8,
    /// Decimal digits, most significant first, one digit per byte (0-9).
    /// Always padded/truncated to `precision` digits by construction.
    pub digits: Vec<u8>,
    pub negative: bool,
}

impl Numeric {
    /// Construct a numeric from a decimal string like `"-123.45"`.
    ///
    /// Returns `Error::Domain` if precision/scale are out of range; the
    /// spec treats this as warning-severity, not a fault, so callers are
    /// expected to substitute defaults on error rather than abort.
    pub fn from_str_with_domain(s: &str, precision: u8, scale: u8) -> Result<Self> {
        validate_domain(precision, scale)?;
        let negative = s.starts_with('-');
        let s = s.trim_start_matches('-');
        let (int_part, frac_part) = match s.split_once('.') {
            Some((i, f)) => (i, f),
            None => (s, ""),
        };
        let mut digits: Vec<u8> = int_part
            .bytes()
            .chain(frac_part.bytes())
            .map(|b| b - b'0')
            .collect();
        // normalize scale by padding/truncating the fractional digits
        let cur_scale = frac_part.len();
        if cur_scale < scale as usize {
            digits.extend(std::iter::repeat(0).take(scale as usize - cur_scale));
        } else if cur_scale > scale as usize {
            digits.truncate(digits.len() - (cur_scale - scale as usize));
        }
        if digits.len() > precision as usize {
            digits = digits[digits.len() - precision as usize..].to_vec();
        } else {
            let mut padded = vec![0u8; precision as usize - digits.len()];
            padded.extend(digits);
            digits = padded;
        }
        Ok(Numeric {
            precision,
            scale,
            digits,
            negative: negative && digits.iter().any(|&d| d != 0),
        })
    }

    pub fn to_decimal_string(&self) -> String {
        let int_len = self.precision as usize - self.scale as usize;
        let (int_digits, frac_digits) = self.digits.split_at(int_len);
        let mut s = String::new();
        if self.negative {
            s.push('-');
        }
        if int_digits.is_empty() {
            s.push('0');
        } else {
            s.extend(int_digits.iter().map(|d| (b'0' + d) as char));
        }
        if self.scale > 0 {
            s.push('.');
            s.extend(frac_digits.iter().map(|d| (b'0' + d) as char));
        }
        s
    }

    /// The "min" sentinel for a given precision/scale: `-99...9`.
    pub fn domain_min(precision: u8, scale: u8) -> Self {
        Numeric {
            precision,
            scale,
            digits: vec![9; precision as usize],
            negative: true,
        }
    }

    /// The "max" sentinel for a given precision/scale: `99...9`.
    pub fn domain_max(precision: u8, scale: u8) -> Self {
        Numeric {
            precision,
            scale,
            digits: vec![9; precision as usize],
            negative: false,
        }
    }

    pub fn zero(precision: u8, scale: u8) -> Self {
        Numeric {
            precision,
            scale,
            digits: vec![0; precision as usize],
            negative: false,
        }
    }
}

fn validate_domain(precision: u8, scale: u8) -> Result<()> {
    if precision == 0 || precision > MAX_NUMERIC_PRECISION || scale > precision {
        return Err(Error::Domain { precision, scale });
    }
    Ok(())
}

/// Domain-qualified character buffer (VARCHAR / VARBIT payload shape).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharBuf {
    pub bytes: Vec<u8>,
    /// Declared length in the domain (characters for varchar, bits for varbit).
    pub declared_length: i32,
    pub collation_id: i32,
}

/// A server-side query result handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResultSetHandle(pub u64);

/// The typed tagged value: every wire-visible column value and bind
/// parameter round-trips through this enum.
#[derive(Debug, Clone, PartialEq)]
pub enum DbValue {
    Null,
    Integer(i32),
    Bigint(i64),
    Double(f64),
    Numeric(Numeric),
    Varchar(CharBuf),
    Varbit(CharBuf),
    Date(NaiveDate),
    Time(NaiveTime),
    /// Date plus milliseconds-of-day time, per the wire encoding.
    Datetime(NaiveDate, u32),
    Oid(Oid),
    Sequence(Vec<DbValue>),
    Resultset(ResultSetHandle),
}

/// The domain of a value, independent of any particular payload. Used by
/// `coerce` and by column/bind-parameter metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    Null,
    Integer,
    Bigint,
    Double,
    Numeric { precision: u8, scale: u8 },
    Varchar { length: i32, collation_id: i32 },
    Varbit { length: i32 },
    Date,
    Time,
    Datetime,
    Oid,
    Sequence,
    Resultset,
}

/// Outcome of attempting to coerce a value into a target domain (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoerceOutcome {
    Compatible,
    Overflow,
    Incompatible,
}

/// Tri-state comparison result (§4.1): NULL propagates to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compare {
    Lt,
    Eq,
    Gt,
    Unknown,
}

impl DbValue {
    pub fn is_null(&self) -> bool {
        matches!(self, DbValue::Null)
    }

    pub fn domain(&self) -> Domain {
        match self {
            DbValue::Null => Domain::Null,
            DbValue::Integer(_) => Domain::Integer,
            DbValue::Bigint(_) => Domain::Bigint,
            DbValue::Double(_) => Domain::Double,
            DbValue::Numeric(n) => Domain::Numeric {
                precision: n.precision,
                scale: n.scale,
            },
            DbValue::Varchar(c) => Domain::Varchar {
                length: c.declared_length,
                collation_id: c.collation_id,
            },
            DbValue::Varbit(c) => Domain::Varbit {
                length: c.declared_length,
            },
            DbValue::Date(_) => Domain::Date,
            DbValue::Time(_) => Domain::Time,
            DbValue::Datetime(..) => Domain::Datetime,
            DbValue::Oid(_) => Domain::Oid,
            DbValue::Sequence(_) => Domain::Sequence,
            DbValue::Resultset(_) => Domain::Resultset,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            DbValue::Null => "NULL",
            DbValue::Integer(_) => "INTEGER",
            DbValue::Bigint(_) => "BIGINT",
            DbValue::Double(_) => "DOUBLE",
            DbValue::Numeric(_) => "NUMERIC",
            DbValue::Varchar(_) => "VARCHAR",
            DbValue::Varbit(_) => "VARBIT",
            DbValue::Date(_) => "DATE",
            DbValue::Time(_) => "TIME",
            DbValue::Datetime(..) => "DATETIME",
            DbValue::Oid(_) => "OID",
            DbValue::Sequence(_) => "SEQUENCE",
            DbValue::Resultset(_) => "RESULTSET",
        }
    }

    /// Release any owned buffers and reset this value to `Null` (I4).
    pub fn clear(&mut self) {
        *self = DbValue::Null;
    }

    pub fn make_integer(v: i32) -> Self {
        DbValue::Integer(v)
    }

    pub fn make_bigint(v: i64) -> Self {
        DbValue::Bigint(v)
    }

    pub fn make_double(v: f64) -> Self {
        DbValue::Double(v)
    }

    pub fn make_varchar(s: impl Into<Vec<u8>>, declared_length: i32, collation_id: i32) -> Self {
        DbValue::Varchar(CharBuf {
            bytes: s.into(),
            declared_length,
            collation_id,
        })
    }

    pub fn get_integer(&self) -> Result<i32> {
        if self.is_null() {
            return Err(Error::CannotCoerce {
                from: "NULL",
                to: "INTEGER",
            });
        }
        match self {
            DbValue::Integer(v) => Ok(*v),
            other => Err(Error::CannotCoerce {
                from: other.type_name(),
                to: "INTEGER",
            }),
        }
    }

    pub fn get_bigint(&self) -> Result<i64> {
        if self.is_null() {
            return Err(Error::CannotCoerce {
                from: "NULL",
                to: "BIGINT",
            });
        }
        match self {
            DbValue::Bigint(v) => Ok(*v),
            other => Err(Error::CannotCoerce {
                from: other.type_name(),
                to: "BIGINT",
            }),
        }
    }

    pub fn get_double(&self) -> Result<f64> {
        if self.is_null() {
            return Err(Error::CannotCoerce {
                from: "NULL",
                to: "DOUBLE",
            });
        }
        match self {
            DbValue::Double(v) => Ok(*v),
            other => Err(Error::CannotCoerce {
                from: other.type_name(),
                to: "DOUBLE",
            }),
        }
    }

    pub fn get_varchar(&self) -> Result<&[u8]> {
        match self {
            DbValue::Varchar(c) => Ok(&c.bytes),
            other => Err(Error::CannotCoerce {
                from: other.type_name(),
                to: "VARCHAR",
            }),
        }
    }

    /// Domain min/max/default/zero sentinels (§4.1).
    pub fn domain_min(domain: Domain) -> Self {
        match domain {
            Domain::Integer => DbValue::Integer(i32::MIN),
            Domain::Bigint => DbValue::Bigint(i64::MIN),
            Domain::Double => DbValue::Double(f64::MIN),
            Domain::Numeric { precision, scale } => {
                DbValue::Numeric(Numeric::domain_min(precision, scale))
            }
            Domain::Varchar {
                length,
                collation_id,
            } => DbValue::make_varchar(" ", length, collation_id),
            Domain::Date => DbValue::Date(NaiveDate::from_ymd_opt(1, 1, 1).unwrap()),
            _ => DbValue::Null,
        }
    }

    pub fn domain_max(domain: Domain) -> Self {
        match domain {
            Domain::Integer => DbValue::Integer(i32::MAX),
            Domain::Bigint => DbValue::Bigint(i64::MAX),
            Domain::Double => DbValue::Double(f64::MAX),
            Domain::Numeric { precision, scale } => {
                DbValue::Numeric(Numeric::domain_max(precision, scale))
            }
            Domain::Varchar {
                length,
                collation_id,
            } => DbValue::make_varchar("\u{10FFFF}", length, collation_id),
            Domain::Date => DbValue::Date(NaiveDate::from_ymd_opt(9999, 12, 31).unwrap()),
            _ => DbValue::Null,
        }
    }

    pub fn domain_zero(domain: Domain) -> Self {
        match domain {
            Domain::Integer => DbValue::Integer(0),
            Domain::Bigint => DbValue::Bigint(0),
            Domain::Double => DbValue::Double(0.0),
            Domain::Numeric { precision, scale } => {
                DbValue::Numeric(Numeric::zero(precision, scale))
            }
            _ => DbValue::Null,
        }
    }

    /// Coerce this value to the given target domain, per §4.1. Strings
    /// parse through the most specific numeric type that fits; numeric to
    /// double is lossy and expected; everything else follows the widest
    /// common-domain ladder `int < bigint < double`.
    pub fn coerce(&self, target: Domain) -> std::result::Result<DbValue, CoerceOutcome> {
        if self.is_null() {
            return Ok(DbValue::Null);
        }
        match (self, target) {
            (DbValue::Integer(v), Domain::Integer) => Ok(DbValue::Integer(*v)),
            (DbValue::Integer(v), Domain::Bigint) => Ok(DbValue::Bigint(*v as i64)),
            (DbValue::Integer(v), Domain::Double) => Ok(DbValue::Double(*v as f64)),
            (DbValue::Bigint(v), Domain::Bigint) => Ok(DbValue::Bigint(*v)),
            (DbValue::Bigint(v), Domain::Double) => Ok(DbValue::Double(*v as f64)),
            (DbValue::Bigint(v), Domain::Integer) => {
                i32::try_from(*v).map(DbValue::Integer).map_err(|_| CoerceOutcome::Overflow)
            }
            (DbValue::Double(v), Domain::Double) => Ok(DbValue::Double(*v)),
            (DbValue::Numeric(n), Domain::Double) => {
                n.to_decimal_string().parse::<f64>().map(DbValue::Double).map_err(|_| CoerceOutcome::Overflow)
            }
            (DbValue::Numeric(n), Domain::Numeric { precision, scale }) => {
                Numeric::from_str_with_domain(&n.to_decimal_string(), precision, scale)
                    .map(DbValue::Numeric)
                    .map_err(|_| CoerceOutcome::Overflow)
            }
            (DbValue::Varchar(c), Domain::Integer) => {
                let s = String::from_utf8_lossy(&c.bytes);
                parse_numeric_string(&s)
            }
            (DbValue::Varchar(c), Domain::Double) => {
                let s = String::from_utf8_lossy(&c.bytes);
                s.trim().parse::<f64>().map(DbValue::Double).map_err(|_| CoerceOutcome::Incompatible)
            }
            (DbValue::Varchar(_), _) => Err(CoerceOutcome::Incompatible),
            (_, Domain::Varchar { .. }) => Err(CoerceOutcome::Incompatible),
            _ if self.domain() == target => Ok(self.clone()),
            _ => Err(CoerceOutcome::Incompatible),
        }
    }

    /// Tri-state compare with implicit coercion to a common domain (§4.1).
    pub fn compare(&self, other: &DbValue) -> Compare {
        if self.is_null() || other.is_null() {
            return Compare::Unknown;
        }
        let ord = match (self, other) {
            (DbValue::Integer(a), DbValue::Integer(b)) => a.cmp(b),
            (DbValue::Bigint(a), DbValue::Bigint(b)) => a.cmp(b),
            (DbValue::Double(a), DbValue::Double(b)) => {
                match a.partial_cmp(b) {
                    Some(o) => o,
                    None => return Compare::Unknown,
                }
            }
            (DbValue::Varchar(a), DbValue::Varchar(b)) => a.bytes.cmp(&b.bytes),
            (DbValue::Date(a), DbValue::Date(b)) => a.cmp(b),
            (DbValue::Time(a), DbValue::Time(b)) => a.cmp(b),
            (DbValue::Datetime(ad, at), DbValue::Datetime(bd, bt)) => (ad, at).cmp(&(bd, bt)),
            (DbValue::Numeric(a), DbValue::Numeric(b)) if a.precision == b.precision && a.scale == b.scale => {
                match (a.negative, b.negative) {
                    (false, true) => std::cmp::Ordering::Greater,
                    (true, false) => std::cmp::Ordering::Less,
                    (neg, _) => {
                        let c = a.digits.cmp(&b.digits);
                        if neg {
                            c.reverse()
                        } else {
                            c
                        }
                    }
                }
            }
            _ => {
                // cross-domain: coerce both to double as the common domain.
                let a = self.coerce(Domain::Double);
                let b = other.coerce(Domain::Double);
                match (a, b) {
                    (Ok(DbValue::Double(a)), Ok(DbValue::Double(b))) => match a.partial_cmp(&b) {
                        Some(o) => o,
                        None => return Compare::Unknown,
                    },
                    _ => return Compare::Unknown,
                }
            }
        };
        match ord {
            std::cmp::Ordering::Less => Compare::Lt,
            std::cmp::Ordering::Equal => Compare::Eq,
            std::cmp::Ordering::Greater => Compare::Gt,
        }
    }
}

/// Parse a string to the most specific numeric type that fits (§4.1).
fn parse_numeric_string(s: &str) -> std::result::Result<DbValue, CoerceOutcome> {
    let s = s.trim();
    if let Ok(v) = s.parse::<i32>() {
        return Ok(DbValue::Integer(v));
    }
    if let Ok(v) = s.parse::<i64>() {
        return Ok(DbValue::Bigint(v));
    }
    if let Ok(v) = s.parse::<f64>() {
        return Ok(DbValue::Double(v));
    }
    Err(CoerceOutcome::Incompatible)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_values_have_no_payload_domain_mismatch() {
        let v = DbValue::Null;
        assert!(v.is_null());
        assert!(v.get_integer().is_err());
    }

    #[test]
    fn clone_independence() {
        let mut a = DbValue::make_varchar("hello", 10, 0);
        let b = a.clone();
        if let DbValue::Varchar(c) = &mut a {
            c.bytes.push(b'!');
        }
        assert_eq!(b.get_varchar().unwrap(), b"hello");
    }

    #[test]
    fn clear_resets_to_null() {
        let mut v = DbValue::Integer(5);
        v.clear();
        assert!(v.is_null());
    }

    #[test]
    fn numeric_round_trips_through_decimal_string() {
        let n = Numeric::from_str_with_domain("123.4567", 10, 4).unwrap();
        assert_eq!(n.to_decimal_string(), "123.4567");
    }

    #[test]
    fn numeric_domain_validation_rejects_scale_above_precision() {
        assert!(Numeric::from_str_with_domain("1.0", 2, 5).is_err());
    }

    #[test]
    fn compare_unknown_on_null() {
        assert_eq!(
            DbValue::Null.compare(&DbValue::Integer(1)),
            Compare::Unknown
        );
    }

    #[test]
    fn compare_cross_domain_coerces() {
        assert_eq!(
            DbValue::Integer(2).compare(&DbValue::Double(2.0)),
            Compare::Eq
        );
    }

    #[test]
    fn coerce_string_picks_most_specific_numeric() {
        assert_eq!(
            DbValue::make_varchar("42", 10, 0).coerce(Domain::Integer),
            Ok(DbValue::Integer(42))
        );
    }

    #[test]
    fn coerce_overflow_on_bigint_to_integer() {
        assert_eq!(
            DbValue::Bigint(i64::MAX).coerce(Domain::Integer),
            Err(CoerceOutcome::Overflow)
        );
    }
}
