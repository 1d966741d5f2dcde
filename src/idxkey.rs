//! An ordered index key: a sequence of 0..MAX values (C1, §3).

use crate::value::DbValue;

/// An ordered sequence of values used as a B-tree key or compound bind.
/// Is-null iff `len() == 0`; has-null iff any element is null.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdxKey {
    values: Vec<DbValue>,
}

impl IdxKey {
    pub fn new(values: Vec<DbValue>) -> Self {
        Self { values }
    }

    pub fn empty() -> Self {
        Self { values: Vec::new() }
    }

    pub fn is_null(&self) -> bool {
        self.values.is_empty()
    }

    pub fn has_null(&self) -> bool {
        self.values.iter().any(DbValue::is_null)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[DbValue] {
        &self.values
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

impl std::fmt::Display for IdxKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, v) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{:?}", v)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_key_is_null() {
        assert!(IdxKey::empty().is_null());
    }

    #[test]
    fn has_null_detects_any_null_element() {
        let key = IdxKey::new(vec![DbValue::Integer(1), DbValue::Null]);
        assert!(!key.is_null());
        assert!(key.has_null());
    }

    #[test]
    fn clone_is_independent() {
        let a = IdxKey::new(vec![DbValue::Integer(1)]);
        let mut b = a.clone();
        b.clear();
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 0);
    }
}
