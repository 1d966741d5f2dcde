//! Lock compatibility / conversion algebra (C7, §4.7).
//!
//! Grounded on `lock_Comp`/`lock_Conv` in the original server's
//! `lock_table.c`: a 5x5 matrix over `{N/A, NULL, S, U, X}`, ordered
//! `N/A < NULL < S < U < X`.

/// A lock mode. `NA` is a sentinel used only as a matrix index; it is
/// never itself requested or held by a real transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(usize)]
pub enum LockMode {
    Na = 0,
    Null = 1,
    S = 2,
    U = 3,
    X = 4,
}

const N: Option<LockMode> = None;

/// `COMPAT[req][held]`: whether `req` may be granted while `held` is
/// already held by another transaction. The N/A row and column are
/// sentinel-only and never consulted for a real request.
const COMPAT: [[Option<bool>; 5]; 5] = [
    [N, N, N, N, N],
    [N, Some(true), Some(true), Some(true), Some(true)],
    [N, Some(true), Some(true), Some(true), Some(false)],
    [N, Some(true), Some(true), Some(false), Some(false)],
    [N, Some(true), Some(false), Some(false), Some(false)],
];

/// `CONV[req][held]`: the lock mode actually granted when `req` is
/// requested while `held` is already held — the least upper bound in the
/// lattice `NULL <= S <= U <= X`.
const CONV: [[Option<LockMode>; 5]; 5] = [
    [N, N, N, N, N],
    [
        N,
        Some(LockMode::Null),
        Some(LockMode::S),
        Some(LockMode::U),
        Some(LockMode::X),
    ],
    [
        N,
        Some(LockMode::S),
        Some(LockMode::S),
        Some(LockMode::U),
        Some(LockMode::X),
    ],
    [
        N,
        Some(LockMode::U),
        Some(LockMode::U),
        Some(LockMode::U),
        Some(LockMode::X),
    ],
    [
        N,
        Some(LockMode::X),
        Some(LockMode::X),
        Some(LockMode::X),
        Some(LockMode::X),
    ],
];

/// Whether `req` is compatible with a lock already held in mode `held`.
/// Panics if either side is `LockMode::Na` — that sentinel is never a
/// real request or held mode.
pub fn compat(req: LockMode, held: LockMode) -> bool {
    COMPAT[req as usize][held as usize].expect("N/A is not a real lock mode")
}

/// The lock mode granted when `req` is requested against an existing
/// `held` lock (possibly by the same transaction upgrading).
pub fn conv(req: LockMode, held: LockMode) -> LockMode {
    CONV[req as usize][held as usize].expect("N/A is not a real lock mode")
}

#[cfg(test)]
mod tests {
    use super::*;

    const REAL_MODES: [LockMode; 4] = [LockMode::Null, LockMode::S, LockMode::U, LockMode::X];

    #[test]
    fn compat_with_null_is_always_true() {
        for &m in &REAL_MODES {
            assert!(compat(m, LockMode::Null));
            assert!(compat(LockMode::Null, m));
        }
    }

    #[test]
    fn conv_is_monotone_over_both_args() {
        for &req in &REAL_MODES {
            for &held in &REAL_MODES {
                let granted = conv(req, held);
                assert!(granted >= req);
                assert!(granted >= held);
            }
        }
    }

    #[test]
    fn s_and_s_are_compatible_but_s_and_x_are_not() {
        assert!(compat(LockMode::S, LockMode::S));
        assert!(!compat(LockMode::X, LockMode::S));
    }

    #[test]
    fn lock_upgrade_from_s_to_u_then_x() {
        assert!(compat(LockMode::U, LockMode::S));
        assert_eq!(conv(LockMode::U, LockMode::S), LockMode::U);
        assert!(!compat(LockMode::X, LockMode::S));
    }

    #[test]
    fn conv_table_matches_lattice_definition() {
        assert_eq!(conv(LockMode::S, LockMode::U), LockMode::U);
        assert_eq!(conv(LockMode::X, LockMode::U), LockMode::X);
        assert_eq!(conv(LockMode::Null, LockMode::X), LockMode::X);
    }
}
