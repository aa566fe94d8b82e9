//! State-file reading and writing.

use std::path::Path;

use crate::BookmarkState;

/// Read a state file from disk and parse it.
pub fn read_state_file<P: AsRef<Path>>(path: P) -> anyhow::Result<BookmarkState> {
    let path = path.as_ref();
    let blob = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read state file {}: {e}", path.display()))?;
    BookmarkState::load(&blob)
        .map_err(|e| anyhow::anyhow!("Failed to parse state file {}: {e}", path.display()))
}

/// Write a state file to disk in the canonical serialized form.
pub fn write_state_file<P: AsRef<Path>>(path: P, state: &BookmarkState) -> anyhow::Result<()> {
    let path = path.as_ref();
    let blob = state.serialize()?;
    std::fs::write(path, blob)
        .map_err(|e| anyhow::anyhow!("Failed to write state file {}: {e}", path.display()))?;
    tracing::debug!("Wrote state file: {}", path.display());
    Ok(())
}
