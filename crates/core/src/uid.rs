// SPDX-License-Identifier: MIT

//! UIDs — opaque equality tokens used for auto-edge dependency matching.
//! A UID is never used to mutate anything; it only answers "does this
//! candidate refer to the same target as that resource's own identity".

use std::path::PathBuf;

/// An opaque dependency-matching token.
///
/// `Uid` is a closed set rather than an open trait-object: every
/// concrete resource in this workspace expresses its dependency surface
/// in terms of a filesystem path, a supervisor unit name, or a bare
/// `(kind, name)` pair, so matching reduces to `PartialEq`. A resource
/// that needs a genuinely new matching shape adds a variant here rather
/// than reaching for a trait object — there is exactly one matching
/// rule (structural equality) and no resource needs to customize it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Uid {
    /// A filesystem path, e.g. a file or directory resource's own identity.
    Path(PathBuf),
    /// A supervisor unit name, e.g. `"nginx.service"` or `"nightly.timer"`.
    Unit(String),
    /// A bare `(kind, name)` pair, for resources with no natural path/unit shape.
    Name { kind: String, name: String },
}

impl Uid {
    pub fn path(p: impl Into<PathBuf>) -> Self {
        Uid::Path(p.into())
    }

    pub fn unit(name: impl Into<String>) -> Self {
        Uid::Unit(name.into())
    }

    pub fn name(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Uid::Name { kind: kind.into(), name: name.into() }
    }

    /// Whether `self` (a candidate yielded by `auto_edges`) refers to the
    /// same target as `other` (another resource's own `uids()` entry).
    pub fn iff(&self, other: &Uid) -> bool {
        self == other
    }
}

/// A single candidate yielded by [`crate::capability::Edgeable::auto_edges`].
#[derive(Debug, Clone)]
pub struct AutoEdgeCandidate {
    pub uid: Uid,
    /// If true, the edge runs resource→candidate instead of the default
    /// candidate→resource.
    pub reversed: bool,
}

impl AutoEdgeCandidate {
    pub fn new(uid: Uid) -> Self {
        Self { uid, reversed: false }
    }

    pub fn reversed(uid: Uid) -> Self {
        Self { uid, reversed: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iff_is_structural_equality() {
        let a = Uid::path("/a/b/c");
        let b = Uid::path("/a/b/c");
        let c = Uid::path("/a/b");
        assert!(a.iff(&b));
        assert!(!a.iff(&c));
    }

    #[test]
    fn different_variants_never_match() {
        let a = Uid::unit("nginx.service");
        let b = Uid::name("svc", "nginx.service");
        assert!(!a.iff(&b));
    }
}
