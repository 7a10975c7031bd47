//! Disk usage of generation directories.

use std::collections::HashSet;
use std::path::Path;
use walkdir::WalkDir;

/// Total size of the regular files under `root`.
///
/// Symlinks are not followed. A file with several hard links inside `root`
/// is counted once, so the result is what the tree occupies on its own; data
/// shared with other generations is still included.
///
/// # Example
/// ```no_run
/// use snapsync::fs::walker::disk_usage;
/// use std::path::Path;
///
/// let bytes = disk_usage(Path::new("/mnt/backups/home.0")).unwrap();
/// println!("{} bytes", bytes);
/// ```
pub fn disk_usage(root: &Path) -> std::io::Result<u64> {
    let mut total = 0u64;
    let mut seen = HashSet::new();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let metadata = entry.metadata()?;
        if !first_link(&metadata, &mut seen) {
            continue;
        }
        total += metadata.len();
    }

    Ok(total)
}

#[cfg(unix)]
fn first_link(metadata: &std::fs::Metadata, seen: &mut HashSet<(u64, u64)>) -> bool {
    use std::os::unix::fs::MetadataExt;

    metadata.nlink() < 2 || seen.insert((metadata.dev(), metadata.ino()))
}

#[cfg(not(unix))]
fn first_link(_metadata: &std::fs::Metadata, _seen: &mut HashSet<(u64, u64)>) -> bool {
    true
}
