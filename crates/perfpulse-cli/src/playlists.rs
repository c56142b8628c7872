//! `playlists` command: validate the playlist file and print its slots.

use std::fmt::Write as _;
use std::path::Path;

use perfpulse_core::PlaylistsFile;

/// Load, validate and print the playlist file at `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or fails validation.
pub(crate) fn run_playlists(path: &Path) -> anyhow::Result<()> {
    let file = perfpulse_core::load_playlists(path)?;
    print!("{}", format_playlists(&file));
    println!("{} playlist(s) valid in {}", file.playlists.len(), path.display());
    Ok(())
}

pub(crate) fn format_playlists(file: &PlaylistsFile) -> String {
    let mut out = String::new();
    for playlist in &file.playlists {
        let name = playlist.name.as_deref().unwrap_or("-");
        let _ = writeln!(
            out,
            "{} ({name}): {} slot(s)",
            playlist.id,
            playlist.slots.len()
        );
        if !playlist.flags.is_empty() {
            let _ = writeln!(out, "  flags: {}", playlist.flags.join(", "));
        }
        for slot in &playlist.slots {
            let _ = writeln!(
                out,
                "  {:<20}{:<16}{}",
                slot.id, slot.device, slot.location
            );
        }
    }
    out
}
