//! Self-describing pack/unpack for the composite wire types (C2, §4.2):
//! OID/HFID/BTID/LSA/XASL-id, `DbValue`, `IdxKey`, and lockset/lockhint
//! bundles. Every encoding exposes a `packed_length` companion so callers
//! size the request buffer exactly once before writing into it.

use crate::error::{Error, Result};
use crate::idxkey::IdxKey;
use crate::lock::LockMode;
use crate::protocol::buffer::{
    string_null_padded_packed_length, PackedReader, PackedWriter,
};
use crate::protocol::constants::{
    OR_ALIGNMENT, OR_BIGINT_ALIGNED_SIZE, OR_BTID_ALIGNED_SIZE, OR_HFID_SIZE, OR_INT_SIZE,
    OR_LSA_ALIGNED_SIZE, OR_OID_SIZE, OR_XASL_ID_SIZE,
};
use crate::value::{CharBuf, DbValue, Domain, Numeric, Oid, ResultSetHandle};
use chrono::{Duration as ChronoDuration, NaiveDate, NaiveTime};

/// A heap file identifier: volume id + file id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Hfid {
    pub volid: i16,
    pub fileid: i32,
}

/// A B-tree identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Btid {
    pub volid: i16,
    pub root_pageid: i32,
}

impl Btid {
    /// The sentinel returned when index creation fails (§4.4).
    pub const NULL: Btid = Btid {
        volid: -1,
        root_pageid: crate::protocol::constants::NULL_PAGEID,
    };
}

/// A log sequence address: page id + byte offset within the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Lsa {
    pub pageid: i64,
    pub offset: i32,
}

impl Lsa {
    pub const NULL: Lsa = Lsa { pageid: -1, offset: -1 };
}

/// A plan-cache handle for a compiled execution tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct XaslId {
    pub bytes: [u8; 16],
}

impl XaslId {
    pub const NULL: XaslId = XaslId { bytes: [0; 16] };

    pub fn is_null(&self) -> bool {
        self.bytes == [0; 16]
    }
}

pub fn pack_oid(w: &mut PackedWriter, oid: &Oid) {
    w.align8();
    w.write_i32(oid.volid as i32);
    w.write_i32(oid.pageid);
    w.write_i32(oid.slotid as i32);
    w.write_i32(oid.groupid);
}

pub fn unpack_oid(r: &mut PackedReader) -> Result<Oid> {
    r.align8()?;
    Ok(Oid {
        volid: r.read_i32()? as i16,
        pageid: r.read_i32()?,
        slotid: r.read_i32()? as i16,
        groupid: r.read_i32()?,
    })
}

pub const fn oid_packed_length() -> usize {
    OR_OID_SIZE
}

pub fn pack_hfid(w: &mut PackedWriter, hfid: &Hfid) {
    w.write_i32(hfid.volid as i32);
    w.write_i32(hfid.fileid);
    w.write_i32(0); // reserved, keeps HFID at the fixed 12-byte wire size
}

pub fn unpack_hfid(r: &mut PackedReader) -> Result<Hfid> {
    let volid = r.read_i32()? as i16;
    let fileid = r.read_i32()?;
    r.skip(OR_INT_SIZE)?;
    Ok(Hfid { volid, fileid })
}

pub const fn hfid_packed_length() -> usize {
    OR_HFID_SIZE
}

pub fn pack_btid(w: &mut PackedWriter, btid: &Btid) {
    w.align8();
    w.write_i32(btid.volid as i32);
    w.write_i32(btid.root_pageid);
}

pub fn unpack_btid(r: &mut PackedReader) -> Result<Btid> {
    r.align8()?;
    Ok(Btid {
        volid: r.read_i32()? as i16,
        root_pageid: r.read_i32()?,
    })
}

pub const fn btid_packed_length() -> usize {
    OR_BTID_ALIGNED_SIZE
}

pub fn pack_lsa(w: &mut PackedWriter, lsa: &Lsa) {
    w.align8();
    w.write_i64(lsa.pageid);
    w.write_i32(lsa.offset);
}

pub fn unpack_lsa(r: &mut PackedReader) -> Result<Lsa> {
    r.align8()?;
    Ok(Lsa {
        pageid: r.read_i64()?,
        offset: r.read_i32()?,
    })
}

pub const fn lsa_packed_length() -> usize {
    OR_LSA_ALIGNED_SIZE
}

pub fn pack_xasl_id(w: &mut PackedWriter, id: &XaslId) {
    w.write_bytes(&id.bytes);
}

pub fn unpack_xasl_id(r: &mut PackedReader) -> Result<XaslId> {
    let bytes = r.read_bytes(OR_XASL_ID_SIZE)?;
    let mut out = [0u8; 16];
    out.copy_from_slice(&bytes);
    Ok(XaslId { bytes: out })
}

pub const fn xasl_id_packed_length() -> usize {
    OR_XASL_ID_SIZE
}

/// The domain tag written ahead of every self-describing value, one per
/// `DbValue` variant in the closed enumeration (I5 excludes the legacy
/// codes entirely — there is no wire representation for them).
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DomainTag {
    Null = 0,
    Integer = 1,
    Bigint = 2,
    Double = 3,
    Numeric = 4,
    Varchar = 5,
    Varbit = 6,
    Date = 7,
    Time = 8,
    Datetime = 9,
    Oid = 10,
    Sequence = 11,
    Resultset = 12,
}

impl DomainTag {
    fn from_i32(v: i32) -> Result<Self> {
        Ok(match v {
            0 => DomainTag::Null,
            1 => DomainTag::Integer,
            2 => DomainTag::Bigint,
            3 => DomainTag::Double,
            4 => DomainTag::Numeric,
            5 => DomainTag::Varchar,
            6 => DomainTag::Varbit,
            7 => DomainTag::Date,
            8 => DomainTag::Time,
            9 => DomainTag::Datetime,
            10 => DomainTag::Oid,
            11 => DomainTag::Sequence,
            12 => DomainTag::Resultset,
            other => {
                return Err(Error::protocol(format!("unknown domain tag {other}")));
            }
        })
    }
}

fn tag_of(v: &DbValue) -> DomainTag {
    match v {
        DbValue::Null => DomainTag::Null,
        DbValue::Integer(_) => DomainTag::Integer,
        DbValue::Bigint(_) => DomainTag::Bigint,
        DbValue::Double(_) => DomainTag::Double,
        DbValue::Numeric(_) => DomainTag::Numeric,
        DbValue::Varchar(_) => DomainTag::Varchar,
        DbValue::Varbit(_) => DomainTag::Varbit,
        DbValue::Date(_) => DomainTag::Date,
        DbValue::Time(_) => DomainTag::Time,
        DbValue::Datetime(..) => DomainTag::Datetime,
        DbValue::Oid(_) => DomainTag::Oid,
        DbValue::Sequence(_) => DomainTag::Sequence,
        DbValue::Resultset(_) => DomainTag::Resultset,
    }
}

const EPOCH: fn() -> NaiveDate = || NaiveDate::from_ymd_opt(1, 1, 1).unwrap();

/// Pack a self-describing value: `tag; domain attrs (if any); payload`.
pub fn pack_value(w: &mut PackedWriter, v: &DbValue) {
    w.write_i32(tag_of(v) as i32);
    match v {
        DbValue::Null => {}
        DbValue::Integer(n) => w.write_i32(*n),
        DbValue::Bigint(n) => {
            w.align8();
            w.write_i64(*n);
        }
        DbValue::Double(n) => {
            w.align8();
            w.write_f64(*n);
        }
        DbValue::Numeric(n) => {
            w.write_i32(n.precision as i32);
            w.write_i32(n.scale as i32);
            w.write_string_null_padded(&n.to_decimal_string());
        }
        DbValue::Varchar(c) => pack_char_buf(w, c),
        DbValue::Varbit(c) => pack_char_buf(w, c),
        DbValue::Date(d) => {
            let days = (*d - EPOCH()).num_days() as i32;
            w.write_i32(days);
        }
        DbValue::Time(t) => {
            let secs = (*t - NaiveTime::from_hms_opt(0, 0, 0).unwrap()).num_seconds() as i32;
            w.write_i32(secs);
        }
        DbValue::Datetime(d, ms) => {
            let days = (*d - EPOCH()).num_days() as i32;
            w.write_i32(days);
            w.write_i32(*ms as i32);
        }
        DbValue::Oid(oid) => pack_oid(w, oid),
        DbValue::Sequence(elems) => {
            w.write_i32(elems.len() as i32);
            for e in elems {
                pack_value(w, e);
            }
        }
        DbValue::Resultset(handle) => {
            w.align8();
            w.write_u64(handle.0);
        }
    }
}

fn pack_char_buf(w: &mut PackedWriter, c: &CharBuf) {
    w.write_i32(c.declared_length);
    w.write_i32(c.collation_id);
    w.write_i32(c.bytes.len() as i32);
    w.write_bytes(&c.bytes);
    let pad = (4 - (c.bytes.len() % 4)) % 4;
    w.write_zeros(pad);
}

fn unpack_char_buf(r: &mut PackedReader) -> Result<CharBuf> {
    let declared_length = r.read_i32()?;
    let collation_id = r.read_i32()?;
    let len = r.read_i32()? as usize;
    let bytes = r.read_bytes(len)?.to_vec();
    let pad = (4 - (len % 4)) % 4;
    r.skip(pad)?;
    Ok(CharBuf {
        bytes,
        declared_length,
        collation_id,
    })
}

fn char_buf_packed_length(c: &CharBuf) -> usize {
    12 + c.bytes.len() + ((4 - (c.bytes.len() % 4)) % 4)
}

/// Unpack a self-describing value written by [`pack_value`].
pub fn unpack_value(r: &mut PackedReader) -> Result<DbValue> {
    let tag = DomainTag::from_i32(r.read_i32()?)?;
    Ok(match tag {
        DomainTag::Null => DbValue::Null,
        DomainTag::Integer => DbValue::Integer(r.read_i32()?),
        DomainTag::Bigint => {
            r.align8()?;
            DbValue::Bigint(r.read_i64()?)
        }
        DomainTag::Double => {
            r.align8()?;
            DbValue::Double(r.read_f64()?)
        }
        DomainTag::Numeric => {
            let precision = r.read_i32()? as u8;
            let scale = r.read_i32()? as u8;
            let s = r.read_string_null_padded(max_decimal_string_len(precision, scale))?;
            Numeric::from_str_with_domain(s.trim_end_matches('\u{0}'), precision, scale)
                .map(DbValue::Numeric)
                .map_err(|_| Error::protocol("invalid numeric on wire"))?
        }
        DomainTag::Varchar => DbValue::Varchar(unpack_char_buf(r)?),
        DomainTag::Varbit => DbValue::Varbit(unpack_char_buf(r)?),
        DomainTag::Date => {
            let days = r.read_i32()?;
            DbValue::Date(EPOCH() + ChronoDuration::days(days as i64))
        }
        DomainTag::Time => {
            let secs = r.read_i32()?;
            DbValue::Time(NaiveTime::from_hms_opt(0, 0, 0).unwrap() + ChronoDuration::seconds(secs as i64))
        }
        DomainTag::Datetime => {
            let days = r.read_i32()?;
            let ms = r.read_i32()? as u32;
            DbValue::Datetime(EPOCH() + ChronoDuration::days(days as i64), ms)
        }
        DomainTag::Oid => DbValue::Oid(unpack_oid(r)?),
        DomainTag::Sequence => {
            let n = r.read_i32()? as usize;
            let mut elems = Vec::with_capacity(n);
            for _ in 0..n {
                elems.push(unpack_value(r)?);
            }
            DbValue::Sequence(elems)
        }
        DomainTag::Resultset => {
            r.align8()?;
            DbValue::Resultset(ResultSetHandle(r.read_u64()?))
        }
    })
}

/// The exact wire length written by [`pack_value`] for `v`, computed
/// without writing it, so callers allocate the request buffer once.
pub fn value_packed_length(v: &DbValue) -> usize {
    value_packed_length_at(0, v)
}

/// Padding `align8()` would insert if the writer's length were currently
/// `offset`.
fn align8_pad(offset: usize) -> usize {
    (OR_ALIGNMENT - (offset % OR_ALIGNMENT)) % OR_ALIGNMENT
}

/// Same as [`value_packed_length`], but aware of `offset`, the writer
/// position at which this value's tag would land, so the `align8()` calls
/// `pack_value` makes for `Bigint`/`Double`/`Resultset` are predicted
/// exactly instead of assumed pre-aligned.
fn value_packed_length_at(offset: usize, v: &DbValue) -> usize {
    let after_tag = offset + OR_INT_SIZE;
    OR_INT_SIZE
        + match v {
            DbValue::Null => 0,
            DbValue::Integer(_) => OR_INT_SIZE,
            DbValue::Bigint(_) => align8_pad(after_tag) + OR_BIGINT_ALIGNED_SIZE,
            DbValue::Double(_) => align8_pad(after_tag) + OR_BIGINT_ALIGNED_SIZE,
            DbValue::Numeric(n) => {
                2 * OR_INT_SIZE + string_null_padded_packed_length(&n.to_decimal_string())
            }
            DbValue::Varchar(c) | DbValue::Varbit(c) => char_buf_packed_length(c),
            DbValue::Date(_) => OR_INT_SIZE,
            DbValue::Time(_) => OR_INT_SIZE,
            DbValue::Datetime(..) => 2 * OR_INT_SIZE,
            DbValue::Oid(_) => OR_OID_SIZE,
            DbValue::Sequence(elems) => {
                let mut pos = after_tag + OR_INT_SIZE;
                let mut total = OR_INT_SIZE;
                for e in elems {
                    let len = value_packed_length_at(pos, e);
                    total += len;
                    pos += len;
                }
                total
            }
            DbValue::Resultset(_) => align8_pad(after_tag) + OR_BIGINT_ALIGNED_SIZE,
        }
}

fn max_decimal_string_len(precision: u8, scale: u8) -> usize {
    // sign + integer digits + '.' + fractional digits, generous but exact
    // for the canonical `to_decimal_string` rendering used when packing.
    let int_len = precision.saturating_sub(scale) as usize;
    1 + int_len.max(1) + if scale > 0 { 1 + scale as usize } else { 0 }
}

/// Pack an ordered index key: cardinality then per-element self-describing
/// values (§4.2: "Values and index keys have their own self-describing
/// packing").
pub fn pack_idxkey(w: &mut PackedWriter, key: &IdxKey) {
    w.write_i32(key.len() as i32);
    for v in key.values() {
        pack_value(w, v);
    }
}

pub fn unpack_idxkey(r: &mut PackedReader) -> Result<IdxKey> {
    let n = r.read_i32()? as usize;
    let mut values = Vec::with_capacity(n);
    for _ in 0..n {
        values.push(unpack_value(r)?);
    }
    Ok(IdxKey::new(values))
}

pub fn idxkey_packed_length(key: &IdxKey) -> usize {
    let mut pos = OR_INT_SIZE;
    let mut total = OR_INT_SIZE;
    for v in key.values() {
        let len = value_packed_length_at(pos, v);
        total += len;
        pos += len;
    }
    total
}

/// A guessed lock mode for one class in a lockset request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassLockEntry {
    pub class_oid: Oid,
    pub guessed_mode: LockMode,
}

/// A lockset bundle: the class table with guessed modes, the instance OID
/// table, and the quit-on-error flag (§4.2, §4.4). `first_fetch_call`
/// tracks whether the full bundle still needs to be shipped, or whether a
/// retry can send just the request header.
#[derive(Debug, Clone, Default)]
pub struct LockSet {
    pub classes: Vec<ClassLockEntry>,
    pub instances: Vec<Oid>,
    pub quit_on_error: bool,
    pub first_fetch_call: bool,
}

impl LockSet {
    pub fn new(classes: Vec<ClassLockEntry>, instances: Vec<Oid>, quit_on_error: bool) -> Self {
        Self {
            classes,
            instances,
            quit_on_error,
            first_fetch_call: true,
        }
    }
}

pub fn pack_lockset(w: &mut PackedWriter, set: &LockSet) {
    w.write_i32(set.classes.len() as i32);
    for entry in &set.classes {
        pack_oid(w, &entry.class_oid);
        w.write_i32(entry.guessed_mode as i32);
    }
    w.write_i32(set.instances.len() as i32);
    for oid in &set.instances {
        pack_oid(w, oid);
    }
    w.write_u8(set.quit_on_error as u8);
    w.align8();
}

pub fn unpack_lockset(r: &mut PackedReader) -> Result<LockSet> {
    let n_classes = r.read_i32()? as usize;
    let mut classes = Vec::with_capacity(n_classes);
    for _ in 0..n_classes {
        let class_oid = unpack_oid(r)?;
        let mode = lock_mode_from_i32(r.read_i32()?)?;
        classes.push(ClassLockEntry {
            class_oid,
            guessed_mode: mode,
        });
    }
    let n_instances = r.read_i32()? as usize;
    let mut instances = Vec::with_capacity(n_instances);
    for _ in 0..n_instances {
        instances.push(unpack_oid(r)?);
    }
    let quit_on_error = r.read_u8()? != 0;
    r.align8()?;
    Ok(LockSet {
        classes,
        instances,
        quit_on_error,
        first_fetch_call: false,
    })
}

pub fn lockset_packed_length(set: &LockSet) -> usize {
    let mut len = OR_INT_SIZE + set.classes.len() * (oid_packed_length() + OR_INT_SIZE);
    len += OR_INT_SIZE + set.instances.len() * oid_packed_length();
    len += 1;
    len + ((8 - (len % 8)) % 8)
}

fn lock_mode_from_i32(v: i32) -> Result<LockMode> {
    Ok(match v {
        0 => LockMode::Na,
        1 => LockMode::Null,
        2 => LockMode::S,
        3 => LockMode::U,
        4 => LockMode::X,
        other => return Err(Error::protocol(format!("unknown lock mode {other}"))),
    })
}

/// A lock-hint bundle: the same shape as a lockset, scoped to classes only
/// (used by `locator_fetch_lockhint_classes`).
#[derive(Debug, Clone, Default)]
pub struct LockHint {
    pub classes: Vec<ClassLockEntry>,
    pub quit_on_error: bool,
    pub first_fetch_call: bool,
}

impl LockHint {
    pub fn new(classes: Vec<ClassLockEntry>, quit_on_error: bool) -> Self {
        Self {
            classes,
            quit_on_error,
            first_fetch_call: true,
        }
    }
}

pub fn pack_lockhint(w: &mut PackedWriter, hint: &LockHint) {
    w.write_i32(hint.classes.len() as i32);
    for entry in &hint.classes {
        pack_oid(w, &entry.class_oid);
        w.write_i32(entry.guessed_mode as i32);
    }
    w.write_u8(hint.quit_on_error as u8);
    w.align8();
}

pub fn unpack_lockhint(r: &mut PackedReader) -> Result<LockHint> {
    let n = r.read_i32()? as usize;
    let mut classes = Vec::with_capacity(n);
    for _ in 0..n {
        let class_oid = unpack_oid(r)?;
        let mode = lock_mode_from_i32(r.read_i32()?)?;
        classes.push(ClassLockEntry {
            class_oid,
            guessed_mode: mode,
        });
    }
    let quit_on_error = r.read_u8()? != 0;
    r.align8()?;
    Ok(LockHint {
        classes,
        quit_on_error,
        first_fetch_call: false,
    })
}

pub fn lockhint_packed_length(hint: &LockHint) -> usize {
    let mut len = OR_INT_SIZE + hint.classes.len() * (oid_packed_length() + OR_INT_SIZE);
    len += 1;
    len + ((8 - (len % 8)) % 8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oid_round_trips() {
        let oid = Oid {
            volid: 1,
            pageid: 2,
            slotid: 3,
            groupid: 4,
        };
        let mut w = PackedWriter::new();
        pack_oid(&mut w, &oid);
        let mut r = PackedReader::new(w.freeze());
        assert_eq!(unpack_oid(&mut r).unwrap(), oid);
    }

    #[test]
    fn integer_value_round_trips() {
        let v = DbValue::Integer(42);
        let mut w = PackedWriter::new();
        pack_value(&mut w, &v);
        let bytes = w.freeze();
        assert_eq!(bytes.len(), value_packed_length(&v));
        let mut r = PackedReader::new(bytes);
        assert_eq!(unpack_value(&mut r).unwrap(), v);
    }

    #[test]
    fn null_value_round_trips() {
        let v = DbValue::Null;
        let mut w = PackedWriter::new();
        pack_value(&mut w, &v);
        let mut r = PackedReader::new(w.freeze());
        assert_eq!(unpack_value(&mut r).unwrap(), DbValue::Null);
    }

    #[test]
    fn numeric_value_round_trips() {
        let v = DbValue::Numeric(Numeric::from_str_with_domain("123.45", 10, 2).unwrap());
        let mut w = PackedWriter::new();
        pack_value(&mut w, &v);
        let bytes = w.freeze();
        assert_eq!(bytes.len(), value_packed_length(&v));
        let mut r = PackedReader::new(bytes);
        assert_eq!(unpack_value(&mut r).unwrap(), v);
    }

    #[test]
    fn varchar_value_round_trips() {
        let v = DbValue::make_varchar("hello", 10, 0);
        let mut w = PackedWriter::new();
        pack_value(&mut w, &v);
        let bytes = w.freeze();
        assert_eq!(bytes.len(), value_packed_length(&v));
        let mut r = PackedReader::new(bytes);
        assert_eq!(unpack_value(&mut r).unwrap(), v);
    }

    #[test]
    fn bigint_value_length_accounts_for_align8() {
        let v = DbValue::Bigint(9);
        let mut w = PackedWriter::new();
        pack_value(&mut w, &v);
        let bytes = w.freeze();
        assert_eq!(bytes.len(), 16);
        assert_eq!(bytes.len(), value_packed_length(&v));
        let mut r = PackedReader::new(bytes);
        assert_eq!(unpack_value(&mut r).unwrap(), v);
    }

    #[test]
    fn double_value_length_accounts_for_align8() {
        let v = DbValue::Double(1.5);
        let mut w = PackedWriter::new();
        pack_value(&mut w, &v);
        let bytes = w.freeze();
        assert_eq!(bytes.len(), 16);
        assert_eq!(bytes.len(), value_packed_length(&v));
        let mut r = PackedReader::new(bytes);
        assert_eq!(unpack_value(&mut r).unwrap(), v);
    }

    #[test]
    fn sequence_value_round_trips() {
        let v = DbValue::Sequence(vec![DbValue::Integer(1), DbValue::Null, DbValue::Bigint(9)]);
        let mut w = PackedWriter::new();
        pack_value(&mut w, &v);
        let bytes = w.freeze();
        assert_eq!(bytes.len(), value_packed_length(&v));
        let mut r = PackedReader::new(bytes);
        assert_eq!(unpack_value(&mut r).unwrap(), v);
    }

    #[test]
    fn idxkey_round_trips() {
        let key = IdxKey::new(vec![DbValue::Integer(1), DbValue::make_varchar("k", 4, 0)]);
        let mut w = PackedWriter::new();
        pack_idxkey(&mut w, &key);
        let bytes = w.freeze();
        assert_eq!(bytes.len(), idxkey_packed_length(&key));
        let mut r = PackedReader::new(bytes);
        assert_eq!(unpack_idxkey(&mut r).unwrap(), key);
    }

    #[test]
    fn lockset_round_trips() {
        let set = LockSet::new(
            vec![ClassLockEntry {
                class_oid: Oid {
                    volid: 0,
                    pageid: 1,
                    slotid: 2,
                    groupid: 0,
                },
                guessed_mode: LockMode::S,
            }],
            vec![Oid {
                volid: 0,
                pageid: 5,
                slotid: 1,
                groupid: 0,
            }],
            true,
        );
        let mut w = PackedWriter::new();
        pack_lockset(&mut w, &set);
        let bytes = w.freeze();
        assert_eq!(bytes.len(), lockset_packed_length(&set));
        let mut r = PackedReader::new(bytes);
        let back = unpack_lockset(&mut r).unwrap();
        assert_eq!(back.classes, set.classes);
        assert_eq!(back.instances, set.instances);
        assert_eq!(back.quit_on_error, set.quit_on_error);
    }
}
