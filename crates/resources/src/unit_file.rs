// SPDX-License-Identifier: MIT

//! Rendering for the generated supervisor config files composite
//! resources own: a deterministic header comment naming the generating
//! program and resource, followed by `[Section]` blocks of `key=value`
//! pairs in the order the caller supplies them.

/// Where generated unit files land by default. Composite resources take
/// this as a constructor argument rather than hardcoding it, so tests
/// can point it at a scratch directory instead of the real system path.
pub const DEFAULT_UNIT_DIR: &str = "/etc/systemd/system";

/// One `[Section]` block: its name plus an ordered list of `key=value` pairs.
pub struct UnitSection {
    pub name: &'static str,
    pub entries: Vec<(String, String)>,
}

impl UnitSection {
    pub fn new(name: &'static str, entries: Vec<(String, String)>) -> Self {
        Self { name, entries }
    }
}

/// Render a unit file: a `# Generated by <program> for <resource>. Do
/// not edit.` header followed by each section in order.
pub fn render_unit(program: &str, resource: &str, sections: &[UnitSection]) -> String {
    let mut out = format!("# Generated by {program} for {resource}. Do not edit.\n");
    for section in sections {
        out.push_str(&format!("[{}]\n", section.name));
        for (key, value) in &section.entries {
            out.push_str(&format!("{key}={value}\n"));
        }
    }
    out
}

/// The conventional systemd unit-name escaping for a mount point: the
/// leading `/` is dropped, internal `/` become `-`, and the result is
/// suffixed with `.mount`. Good enough for the paths this workspace
/// manages; it does not implement systemd's full escaping of arbitrary
/// bytes.
pub fn mount_unit_name(target: &std::path::Path) -> String {
    let trimmed = target.to_string_lossy();
    let trimmed = trimmed.trim_start_matches('/');
    if trimmed.is_empty() {
        return "-.mount".to_string();
    }
    format!("{}.mount", trimmed.replace('/', "-"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_unit_includes_header_and_sections() {
        let rendered = render_unit(
            "mgmtd",
            "cron[nightly]",
            &[UnitSection::new("Timer", vec![("OnCalendar".to_string(), "*-*-* 03:00:00".to_string())])],
        );
        assert!(rendered.starts_with("# Generated by mgmtd for cron[nightly]. Do not edit.\n"));
        assert!(rendered.contains("[Timer]\nOnCalendar=*-*-* 03:00:00\n"));
    }

    #[test]
    fn mount_unit_name_escapes_slashes() {
        assert_eq!(mount_unit_name(std::path::Path::new("/mnt/data")), "mnt-data.mount");
        assert_eq!(mount_unit_name(std::path::Path::new("/")), "-.mount");
    }
}
