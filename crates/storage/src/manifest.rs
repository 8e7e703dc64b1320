// SPDX-License-Identifier: MIT

//! The archive resource's input manifest: a deterministic, line-per-file
//! description of a set of paths, hashed as a single unit so directory
//! inputs converge exactly like a single file input.

use crate::hash::hash_bytes;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

/// Fed as the first line of every archive input hash, so a future
/// manifest format change invalidates every stored digest instead of
/// silently treating old and new manifests as equivalent.
pub const ARCHIVE_FORMAT_PREFIX: &str = "mgmt-archive-v1\n";

/// A single file entry in an archive input manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub mode: u32,
    pub size: u64,
    pub path: PathBuf,
}

impl ManifestEntry {
    fn render(&self) -> String {
        format!("{:o} {} {}\n", self.mode & 0o7777, self.size, self.path.display())
    }
}

/// Walk `inputs` (files or directories, each an absolute path) and
/// produce a manifest listing every regular file found, sorted by path
/// so the combined digest does not depend on filesystem iteration
/// order or on how many separate inputs were given.
pub fn build_manifest(inputs: &[PathBuf]) -> io::Result<Vec<ManifestEntry>> {
    let mut entries = Vec::new();
    for input in inputs {
        let metadata = std::fs::metadata(input)?;
        if metadata.is_dir() {
            walk_dir(input, &mut entries)?;
        } else {
            entries.push(ManifestEntry {
                mode: metadata.permissions().mode(),
                size: metadata.len(),
                path: input.clone(),
            });
        }
    }
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}

fn walk_dir(dir: &PathBuf, entries: &mut Vec<ManifestEntry>) -> io::Result<()> {
    let mut children: Vec<_> = std::fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    children.sort_by_key(|e| e.path());
    for child in children {
        let path = child.path();
        let metadata = child.metadata()?;
        if metadata.is_dir() {
            walk_dir(&path, entries)?;
        } else if metadata.is_file() {
            entries.push(ManifestEntry { mode: metadata.permissions().mode(), size: metadata.len(), path });
        }
    }
    Ok(())
}

/// Render a manifest as the exact bytes fed into the SHA-256 digest:
/// the format prefix, then one `"{mode:o} {size} {path}\n"` line per
/// entry in the order given (callers pass an already-sorted manifest).
pub fn render_manifest(entries: &[ManifestEntry]) -> String {
    let mut out = String::from(ARCHIVE_FORMAT_PREFIX);
    for entry in entries {
        out.push_str(&entry.render());
    }
    out
}

/// Hash a directory manifest the way the archive resource hashes its inputs.
pub fn hash_manifest(entries: &[ManifestEntry]) -> String {
    hash_bytes(render_manifest(entries).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn manifest_is_sorted_regardless_of_creation_order() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.txt"), b"b").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/a.txt"), b"a").unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();

        let manifest = build_manifest(&[dir.path().to_path_buf()]).unwrap();
        let names: Vec<_> =
            manifest.iter().map(|e| e.path.strip_prefix(dir.path()).unwrap().to_path_buf()).collect();
        assert_eq!(
            names,
            vec![PathBuf::from("a.txt"), PathBuf::from("b.txt"), PathBuf::from("sub/a.txt")]
        );
    }

    #[test]
    fn hash_is_independent_of_absolute_prefix() {
        let dir_a = tempdir().unwrap();
        fs::write(dir_a.path().join("x.txt"), b"hi").unwrap();
        let manifest_a = build_manifest(&[dir_a.path().join("x.txt")]).unwrap();

        let dir_b = tempdir().unwrap();
        fs::write(dir_b.path().join("x.txt"), b"hi").unwrap();
        let manifest_b = build_manifest(&[dir_b.path().join("x.txt")]).unwrap();

        // Different absolute paths by construction (distinct tempdirs), so
        // the digests differ — the manifest format embeds the path itself,
        // not just content, matching the archive resource's "config change
        // counts as input change" rule.
        assert_ne!(hash_manifest(&manifest_a), hash_manifest(&manifest_b));
    }

    #[test]
    fn content_change_changes_the_hash() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("x.txt"), b"hi").unwrap();
        let before = hash_manifest(&build_manifest(&[dir.path().to_path_buf()]).unwrap());
        fs::write(dir.path().join("x.txt"), b"bye").unwrap();
        let after = hash_manifest(&build_manifest(&[dir.path().to_path_buf()]).unwrap());
        assert_ne!(before, after);
    }

    #[test]
    fn multiple_inputs_merge_into_one_sorted_manifest() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("sub");
        fs::create_dir(&b).unwrap();
        fs::write(&a, b"a").unwrap();
        fs::write(b.join("c.txt"), b"c").unwrap();

        let manifest = build_manifest(&[a.clone(), b.clone()]).unwrap();
        assert_eq!(manifest.len(), 2);
        assert!(manifest.windows(2).all(|w| w[0].path < w[1].path));
    }
}
