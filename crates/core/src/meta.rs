// SPDX-License-Identifier: MIT

//! Resource identity (`Kind`, `Name`).

use std::fmt;

/// Identity of a resource instance: a stable `Kind` plus a user-chosen
/// `Name`, unique within that kind.
///
/// Every concrete resource stores one of these and exposes it via
/// `Resource::meta`, so logging, auto-edge/auto-group, and `Cmp` all
/// have stable access to identity without re-deriving it from the
/// resource's typed config.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceMeta {
    pub kind: &'static str,
    pub name: String,
}

impl ResourceMeta {
    pub fn new(kind: &'static str, name: impl Into<String>) -> Self {
        Self { kind, name: name.into() }
    }
}

impl fmt::Display for ResourceMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.kind, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_kind_bracket_name() {
        let m = ResourceMeta::new("file", "/etc/app/conf.d/x.conf");
        assert_eq!(m.to_string(), "file[/etc/app/conf.d/x.conf]");
    }

    #[test]
    fn equality_is_by_kind_and_name() {
        let a = ResourceMeta::new("svc", "nginx");
        let b = ResourceMeta::new("svc", "nginx");
        let c = ResourceMeta::new("svc", "sshd");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
