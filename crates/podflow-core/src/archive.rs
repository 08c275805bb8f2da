//! Capture and restore of the cached environment archive.
//!
//! The archive holds the *contents* of the environment directory (`tar -C venv .`),
//! compressed with zstd. Restore extracts back into the same directory, so the
//! activation marker reappears at `<venv>/bin/activate`. Both sides are built
//! here so they cannot drift apart.

use crate::shell::quote;

/// Shell pipeline that archives `venv` into `archive`.
///
/// Writes to a temporary file next to the archive and renames it into place,
/// so a concurrent restore never sees a half-written archive.
pub fn capture_command(venv: &str, archive: &str) -> String {
    let tmp = format!("{archive}.tmp");
    format!(
        "tar -c -C {venv} . | zstd -q -T0 -f -o {tmp} && mv -f {tmp} {archive}",
        venv = quote(venv),
        tmp = quote(&tmp),
        archive = quote(archive),
    )
}

/// Shell command that restores `archive` into `venv`.
pub fn restore_command(archive: &str, venv: &str) -> String {
    format!(
        "mkdir -p {venv} && tar --use-compress-program='zstd -d --threads=0' -xf {archive} -C {venv}",
        venv = quote(venv),
        archive = quote(archive),
    )
}
