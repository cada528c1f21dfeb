//! Lock type hierarchy and multi-granularity mode compatibility.

/// A lockable resource class. Parent relationships mirror the hierarchy a
/// transaction must climb with intention locks before touching a leaf:
/// `ROOT`, `VHP`, and `VAR` hang directly off `DB`; `FSTMBST`/`MSLSN` hang
/// off `ROOT`; `VHPOS` off `VHP`; `VAR_NEXT` off `VAR`. `RPTREE` and
/// `TMBST` are themselves direct children of `DB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockType {
    Db,
    Root,
    Fstmbst,
    Mslsn,
    Rptree,
    Tmbst,
    Vhp,
    Vhpos,
    Var,
    VarNext,
}

impl LockType {
    pub fn parent(self) -> Option<LockType> {
        match self {
            LockType::Db => None,
            LockType::Root | LockType::Rptree | LockType::Tmbst | LockType::Vhp | LockType::Var => {
                Some(LockType::Db)
            }
            LockType::Fstmbst | LockType::Mslsn => Some(LockType::Root),
            LockType::Vhpos => Some(LockType::Vhp),
            LockType::VarNext => Some(LockType::Var),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    Is,
    Ix,
    S,
    Six,
    X,
}

impl LockMode {
    /// The mode to request on the parent node when acquiring `self` on a
    /// child: IS/S climb as IS, everything that can write climbs as IX.
    pub fn parent_mode(self) -> LockMode {
        match self {
            LockMode::Is | LockMode::S => LockMode::Is,
            LockMode::Ix | LockMode::Six | LockMode::X => LockMode::Ix,
        }
    }

    /// Standard multi-granularity compatibility matrix. A holder of SIX
    /// already has S at this granularity plus IX below it, so a concurrent
    /// plain S request is not compatible with it.
    pub fn compatible(self, held: LockMode) -> bool {
        use LockMode::*;
        matches!(
            (self, held),
            (Is, Is) | (Is, Ix) | (Is, S) | (Is, Six)
                | (Ix, Is) | (Ix, Ix)
                | (S, Is) | (S, S)
                | (Six, Is)
        )
    }

    /// Whether `self` is already as strong or stronger than `other`, so
    /// acquiring `self` on top of an existing `other` hold is a no-op.
    pub fn subsumes(self, other: LockMode) -> bool {
        use LockMode::*;
        if self == other {
            return true;
        }
        matches!(
            (self, other),
            (X, _) | (Six, Is) | (Six, Ix) | (Six, S) | (Ix, Is) | (S, Is)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_modes() {
        assert_eq!(LockMode::S.parent_mode(), LockMode::Is);
        assert_eq!(LockMode::X.parent_mode(), LockMode::Ix);
        assert_eq!(LockMode::Six.parent_mode(), LockMode::Ix);
    }

    #[test]
    fn compatibility_matrix() {
        assert!(LockMode::Is.compatible(LockMode::Ix));
        assert!(!LockMode::X.compatible(LockMode::Is));
        assert!(!LockMode::Ix.compatible(LockMode::S));
    }

    #[test]
    fn hierarchy_parents() {
        assert_eq!(LockType::Fstmbst.parent(), Some(LockType::Root));
        assert_eq!(LockType::Root.parent(), Some(LockType::Db));
        assert_eq!(LockType::Db.parent(), None);
    }
}
