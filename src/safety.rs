//! Guards against overwriting collector input with merge output.

use anyhow::{bail, Result};
use std::path::Path;

/// Validates that an output path is safe to overwrite.
///
/// The output must carry one of `allowed_extensions` and must not be any of
/// the `inputs`. Paths are compared after canonicalizing when the file exists.
pub fn validate_output_path(
    output: &Path,
    inputs: &[&Path],
    allowed_extensions: &[&str],
) -> Result<()> {
    let ext = output
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    if !allowed_extensions.iter().any(|allowed| ext == *allowed) {
        bail!(
            "Safety check failed: output '{}' must have one of the extensions: {}",
            output.display(),
            allowed_extensions.join(", ")
        );
    }

    let resolved_output = output.canonicalize().unwrap_or_else(|_| output.to_path_buf());
    for input in inputs {
        let resolved_input = input.canonicalize().unwrap_or_else(|_| input.to_path_buf());
        if resolved_output == resolved_input {
            bail!(
                "Safety check failed: output '{}' cannot be the same as input '{}'",
                output.display(),
                input.display()
            );
        }
    }

    Ok(())
}
