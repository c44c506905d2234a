//! Skip detection for inputs whose compressed output already exists.

use std::path::Path;

/// Returns true iff a file already exists at `output_path`.
///
/// Pure check with no side effects; callers run it before any probing or
/// encoding for the task.
pub fn should_skip(input_path: &Path, output_path: &Path) -> bool {
    debug_assert_ne!(input_path, output_path, "output must never alias input");
    output_path.exists()
}
