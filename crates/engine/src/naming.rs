//! Output path mapping.
//!
//! Every input `<root>/<rel>/<stem>.<ext>` maps to
//! `<root>/output_wm/<rel>/<stem>_h265.<ext>`. The mapping is total over files
//! under the root and injective: the relative directory is kept as-is and the
//! file name can be recovered by stripping the `_h265` suffix from the stem.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the output directory created directly under the scan root.
pub const OUTPUT_DIR_NAME: &str = "output_wm";

/// Suffix appended to the file stem of every output.
pub const OUTPUT_SUFFIX: &str = "_h265";

/// Marker placed before the extension of an encode still in progress.
pub const PARTIAL_MARKER: &str = ".partial";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NamingError {
    #[error("{} is not under root {}", .input.display(), .root.display())]
    NotUnderRoot { input: PathBuf, root: PathBuf },

    #[error("{} has no file name", .0.display())]
    MissingFileName(PathBuf),
}

/// Directory that receives all outputs for `root`.
pub fn output_root(root: &Path) -> PathBuf {
    root.join(OUTPUT_DIR_NAME)
}

/// Output file name for an input file name: `name.ext` -> `name_h265.ext`.
pub fn output_file_name(input_name: &OsStr) -> Option<OsString> {
    let as_path = Path::new(input_name);
    let stem = as_path.file_stem()?;

    let mut name = stem.to_os_string();
    name.push(OUTPUT_SUFFIX);
    if let Some(ext) = as_path.extension() {
        name.push(".");
        name.push(ext);
    }
    Some(name)
}

/// Temporary sibling an encode writes to until it is committed.
///
/// `dir/name_h265.ext` -> `dir/.name_h265.partial.ext`. The extension is kept
/// so ffmpeg still picks the container from it, and the name never collides
/// with a real output.
pub fn partial_path_for(output: &Path) -> Option<PathBuf> {
    let stem = output.file_stem()?;
    let mut name = OsString::from(".");
    name.push(stem);
    name.push(PARTIAL_MARKER);
    if let Some(ext) = output.extension() {
        name.push(".");
        name.push(ext);
    }
    Some(output.with_file_name(name))
}

/// Derives the output path for `input`, mirroring its location under `root`.
pub fn output_path_for(root: &Path, input: &Path) -> Result<PathBuf, NamingError> {
    let relative = input
        .strip_prefix(root)
        .map_err(|_| NamingError::NotUnderRoot {
            input: input.to_path_buf(),
            root: root.to_path_buf(),
        })?;

    let file_name = relative
        .file_name()
        .and_then(output_file_name)
        .ok_or_else(|| NamingError::MissingFileName(input.to_path_buf()))?;

    let mut output = output_root(root);
    if let Some(parent) = relative.parent() {
        output.push(parent);
    }
    output.push(file_name);
    Ok(output)
}
