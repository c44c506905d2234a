//! Preflight checks
//!
//! Verifies that the encoder and prober executables can be run before any
//! scanning starts.

use std::path::Path;
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::{info, warn};

/// Oldest ffmpeg release known to accept the `p1`-`p7` NVENC presets
const MIN_FFMPEG_MAJOR: u32 = 5;

/// Error types for preflight checks
#[derive(Debug, Error)]
pub enum PreflightError {
    #[error("{tool} not available ({program}): {reason}")]
    ToolUnavailable {
        tool: &'static str,
        program: String,
        reason: String,
    },
}

/// Extract the version token from `<tool> -version` output
///
/// Handles release versions (`ffmpeg version 6.1.1-3ubuntu5 ...`), n-prefixed
/// git builds (`ffmpeg version n8.0-...`) and snapshot builds
/// (`ffmpeg version N-113445-g...`).
pub fn parse_tool_version(version_output: &str, tool: &str) -> Option<String> {
    let marker = format!("{} version", tool);
    let version_line = version_output
        .lines()
        .find(|line| line.to_lowercase().contains(&marker))?;

    let lower = version_line.to_lowercase();
    let start = lower.find(&marker)? + marker.len();
    version_line
        .get(start..)?
        .split_whitespace()
        .next()
        .map(String::from)
}

/// Major version number of a release version token (`6.1.1-3ubuntu5`, `n7.0.2`)
///
/// Snapshot builds (`N-113445-g...`) carry no release number.
pub fn major_version(version: &str) -> Option<u32> {
    version
        .trim_start_matches('n')
        .split(|c| c == '.' || c == '-')
        .next()?
        .parse()
        .ok()
}

/// Run `<program> -version` and return the reported version, if any
pub fn check_tool_available(tool: &'static str, program: &Path) -> Result<Option<String>, PreflightError> {
    let unavailable = |reason: String| PreflightError::ToolUnavailable {
        tool,
        program: program.display().to_string(),
        reason,
    };

    let output = Command::new(program)
        .arg("-version")
        .stdin(Stdio::null())
        .output()
        .map_err(|e| unavailable(format!("is it installed and in PATH? {}", e)))?;

    if !output.status.success() {
        return Err(unavailable(format!("-version exited with {}", output.status)));
    }

    Ok(parse_tool_version(&String::from_utf8_lossy(&output.stdout), tool))
}

/// Check the encoder, then the prober
pub fn run_preflight_checks(ffmpeg: &Path, ffprobe: &Path) -> Result<(), PreflightError> {
    for (tool, program) in [("ffmpeg", ffmpeg), ("ffprobe", ffprobe)] {
        let version = check_tool_available(tool, program)?;
        info!(
            "Using {} {} ({})",
            tool,
            version.as_deref().unwrap_or("(unknown version)"),
            program.display()
        );
        if tool == "ffmpeg" {
            if let Some(major) = version.as_deref().and_then(major_version) {
                if major < MIN_FFMPEG_MAJOR {
                    warn!(
                        "ffmpeg {} is older than {}.0, hevc_nvenc may reject preset p6",
                        major, MIN_FFMPEG_MAJOR
                    );
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_release_version() {
        let output = "ffmpeg version 6.1.1-3ubuntu5 Copyright (c) 2000-2023 the FFmpeg developers\nbuilt with gcc 13";
        assert_eq!(parse_tool_version(output, "ffmpeg").as_deref(), Some("6.1.1-3ubuntu5"));
        let version = parse_tool_version(output, "ffmpeg").unwrap();
        assert_eq!(major_version(&version), Some(6));
    }

    #[test]
    fn test_parse_ffprobe_version() {
        let output = "ffprobe version n7.0.2 Copyright (c) 2007-2024 the FFmpeg developers";
        assert_eq!(parse_tool_version(output, "ffprobe").as_deref(), Some("n7.0.2"));
        assert_eq!(parse_tool_version(output, "ffmpeg"), None);
    }

    #[test]
    fn test_parse_snapshot_build() {
        let output = "ffmpeg version N-113445-g6f6b2f8a2c Copyright (c) 2000-2024";
        assert_eq!(parse_tool_version(output, "ffmpeg").as_deref(), Some("N-113445-g6f6b2f8a2c"));
        assert_eq!(major_version("N-113445-g6f6b2f8a2c"), None);
    }

    #[test]
    fn test_parse_garbage() {
        assert_eq!(parse_tool_version("", "ffmpeg"), None);
        assert_eq!(parse_tool_version("command not found", "ffmpeg"), None);
    }

    #[test]
    fn test_missing_tool_is_unavailable() {
        let result = run_preflight_checks(
            Path::new("/nonexistent/ffmpeg-xyz-12345"),
            Path::new("/nonexistent/ffprobe-xyz-12345"),
        );
        match result {
            Err(PreflightError::ToolUnavailable { tool, .. }) => assert_eq!(tool, "ffmpeg"),
            other => panic!("expected ToolUnavailable, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_old_release_still_passes() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::TempDir::new().unwrap();
        let fake = |tool: &str| {
            let path = dir.path().join(tool);
            std::fs::write(
                &path,
                format!("#!/bin/sh\necho '{} version 4.2.7-0ubuntu0.1 Copyright (c) 2000-2022'\n", tool),
            )
            .unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        };
        let (ffmpeg, ffprobe) = (fake("ffmpeg"), fake("ffprobe"));

        let version = check_tool_available("ffmpeg", &ffmpeg).unwrap();
        assert_eq!(version.as_deref(), Some("4.2.7-0ubuntu0.1"));
        assert_eq!(version.as_deref().and_then(major_version), Some(4));
        assert!(run_preflight_checks(&ffmpeg, &ffprobe).is_ok());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Release and n-prefixed versions both yield their major number.
        #[test]
        fn prop_ffmpeg_major_version(
            major in 1u32..100,
            minor in 0u32..10,
            n_prefix in any::<bool>(),
            suffix in "[a-z0-9]{0,8}",
        ) {
            let prefix = if n_prefix { "n" } else { "" };
            let output = format!(
                "ffmpeg version {}{}.{}-{} Copyright (c) 2000-2024 the FFmpeg developers",
                prefix, major, minor, suffix
            );
            let version = parse_tool_version(&output, "ffmpeg").unwrap();
            prop_assert_eq!(major_version(&version), Some(major));
        }
    }
}
