//! Destination-path policy for generated artifacts.

use std::path::{Path, PathBuf};

/// Force a model-proposed path under the output root.
///
/// Paths already inside the root pass through unchanged; anything else is
/// rewritten to `<output_root>/<basename>` so the builder never writes
/// outside the directory it owns.
pub fn normalize_output_path(raw: &str, output_root: &Path) -> PathBuf {
    let candidate = Path::new(raw);
    if candidate.starts_with(output_root) {
        return candidate.to_path_buf();
    }
    match candidate.file_name() {
        Some(name) => output_root.join(name),
        None => output_root.to_path_buf(),
    }
}
