//! Cursor navigation over a materialised tuple sequence. Real list files
//! page in lazily from the server; this crate's `Cursor` holds the
//! tuples already fetched for the result and exposes the same navigation
//! contract (`next_tuple`, `seek_tuple`, checkpoint/restore) regardless
//! of how many pages back it.

use crate::error::{Error, Result};
use crate::value::DbValue;

/// `CUR` is relative to the current position, `SET` to the start, `END`
/// to the end (§4.5 `seek_tuple`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekMode {
    Set,
    Cur,
    End,
}

/// Sentinel position outcome returned by navigation ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavOutcome {
    Ok,
    End,
}

/// A checkpoint suitable for `set_tplpos` to restore later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TuplePos(i64);

/// `-1` means BEFORE the first tuple, `tuples.len()` means AFTER the
/// last, any value in between is ON that index.
#[derive(Debug, Clone)]
pub struct Cursor {
    tuples: Vec<Vec<DbValue>>,
    position: i64,
}

impl Cursor {
    pub fn new(tuples: Vec<Vec<DbValue>>) -> Self {
        Self { tuples, position: -1 }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn tuple_count(&self) -> usize {
        self.tuples.len()
    }

    pub fn column_count(&self) -> usize {
        self.tuples.first().map_or(0, |t| t.len())
    }

    fn is_on(&self) -> bool {
        self.position >= 0 && (self.position as usize) < self.tuples.len()
    }

    pub fn next_tuple(&mut self) -> NavOutcome {
        let len = self.tuples.len() as i64;
        if self.position < len {
            self.position += 1;
        }
        if self.position >= len {
            self.position = len;
            NavOutcome::End
        } else {
            NavOutcome::Ok
        }
    }

    pub fn prev_tuple(&mut self) -> NavOutcome {
        if self.position > -1 {
            self.position -= 1;
        }
        if self.position <= -1 {
            self.position = -1;
            NavOutcome::End
        } else {
            NavOutcome::Ok
        }
    }

    pub fn first_tuple(&mut self) -> NavOutcome {
        if self.tuples.is_empty() {
            self.position = self.tuples.len() as i64;
            return NavOutcome::End;
        }
        self.position = 0;
        NavOutcome::Ok
    }

    pub fn last_tuple(&mut self) -> NavOutcome {
        if self.tuples.is_empty() {
            self.position = -1;
            return NavOutcome::End;
        }
        self.position = self.tuples.len() as i64 - 1;
        NavOutcome::Ok
    }

    pub fn get_tuple_value(&self, index: usize) -> Result<&DbValue> {
        if !self.is_on() {
            return Err(Error::OprOnClosedQres);
        }
        let tuple = &self.tuples[self.position as usize];
        tuple.get(index).ok_or(Error::InvalidTplvalIndex {
            index,
            count: tuple.len(),
        })
    }

    pub fn get_tuple_value_list(&self) -> Result<&[DbValue]> {
        if !self.is_on() {
            return Err(Error::OprOnClosedQres);
        }
        Ok(&self.tuples[self.position as usize])
    }

    pub fn get_tplpos(&self) -> TuplePos {
        TuplePos(self.position)
    }

    pub fn set_tplpos(&mut self, pos: TuplePos) -> Result<()> {
        let len = self.tuples.len() as i64;
        if pos.0 < -1 || pos.0 > len {
            return Err(Error::UnknownCrspos);
        }
        self.position = pos.0;
        Ok(())
    }

    /// Resolve `(offset, mode)` to an absolute target index (in `[-1,
    /// len]`), without moving the cursor.
    fn resolve_target(&self, offset: i64, mode: SeekMode) -> i64 {
        let len = self.tuples.len() as i64;
        let raw = match mode {
            SeekMode::Set => offset,
            SeekMode::Cur => self.position + offset,
            SeekMode::End => len + offset,
        };
        raw.clamp(-1, len)
    }

    /// Seek to `offset` relative to `mode`, choosing the cheapest of
    /// (from start, from current, from end) by absolute step count and
    /// walking there with single steps; restores the pre-seek position on
    /// any error (§4.5).
    pub fn seek_tuple(&mut self, offset: i64, mode: SeekMode) -> Result<NavOutcome> {
        let saved = self.position;
        let target = self.resolve_target(offset, mode);
        let len = self.tuples.len() as i64;

        let from_start = target - (-1);
        let from_current = (target - self.position).abs();
        let from_end = (len - target).abs();

        let result = (|| {
            if from_current <= from_start && from_current <= from_end {
                self.step_to(target)
            } else if from_start <= from_end {
                self.position = -1;
                self.step_to(target)
            } else {
                self.position = len;
                self.step_to(target)
            }
        })();

        match result {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.position = saved;
                Err(e)
            }
        }
    }

    fn step_to(&mut self, target: i64) -> Result<NavOutcome> {
        while self.position < target {
            self.next_tuple();
        }
        while self.position > target {
            self.prev_tuple();
        }
        Ok(if self.is_on() { NavOutcome::Ok } else { NavOutcome::End })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(n: usize) -> Cursor {
        Cursor::new((0..n).map(|i| vec![DbValue::Integer(i as i32)]).collect())
    }

    #[test]
    fn first_then_last_then_next_is_end() {
        let mut c = sample(3);
        assert_eq!(c.first_tuple(), NavOutcome::Ok);
        assert_eq!(c.last_tuple(), NavOutcome::Ok);
        assert_eq!(c.next_tuple(), NavOutcome::End);
    }

    #[test]
    fn seek_end_minus_one_lands_on_last_of_hundred() {
        let mut c = sample(100);
        assert_eq!(c.seek_tuple(-1, SeekMode::End).unwrap(), NavOutcome::Ok);
        assert_eq!(c.get_tuple_value(0).unwrap(), &DbValue::Integer(99));
    }

    #[test]
    fn seek_set_past_end_is_after() {
        let mut c = sample(100);
        assert_eq!(c.seek_tuple(100, SeekMode::Set).unwrap(), NavOutcome::End);
        assert!(c.get_tuple_value(0).is_err());
    }

    #[test]
    fn seek_set_matches_first_then_k_nexts() {
        for k in 0..10 {
            let mut seek_cursor = sample(10);
            seek_cursor.seek_tuple(k, SeekMode::Set).unwrap();

            let mut step_cursor = sample(10);
            step_cursor.first_tuple();
            for _ in 0..k {
                step_cursor.next_tuple();
            }
            assert_eq!(seek_cursor.get_tplpos().0, step_cursor.get_tplpos().0);
        }
    }

    #[test]
    fn tplpos_checkpoint_restore_is_identity() {
        let mut c = sample(5);
        c.next_tuple();
        c.next_tuple();
        let pos = c.get_tplpos();
        c.last_tuple();
        c.set_tplpos(pos).unwrap();
        assert_eq!(c.get_tplpos().0, pos.0);
    }

    #[test]
    fn invalid_tplpos_is_unknown_crspos() {
        let mut c = sample(5);
        assert!(matches!(c.set_tplpos(TuplePos(99)), Err(Error::UnknownCrspos)));
    }
}
