// src/tool/backend.rs

//! Removal of `backend` blocks from Terraform configuration text.
//!
//! Two strategies, selected by Terraform version:
//!
//! - Pre-0.12 syntax: locate the `terraform { … }` block with a brace-aware
//!   scan and delete its `backend` child block, leaving the rest of the
//!   document untouched.
//! - 0.12+ syntax: regex surgery on a `backend "<name>" { … }` block whose
//!   body contains no nested braces. A body with nested `{…}` fails with
//!   "unsupported syntax" rather than risking corrupt output; this
//!   limitation is deliberate.

use std::sync::OnceLock;

use anyhow::{anyhow, bail, Result};
use regex::Regex;
use semver::Version;

use crate::versions::version_matches;

/// Remove the backend configuration from one Terraform file's contents,
/// choosing the strategy for the given Terraform version. Input without a
/// backend block is returned unchanged.
pub fn delete_backend_config(input: &str, version: &Version) -> Result<String> {
    if version_matches(version, "<0.12") {
        delete_backend_pre012(input)
    } else {
        delete_backend_012(input)
    }
}

/// Pre-0.12: delete the `backend` child of the `terraform { … }` block.
fn delete_backend_pre012(input: &str) -> Result<String> {
    fn terraform_open_re() -> &'static Regex {
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| Regex::new(r#"(^|\s)terraform\s*\{"#).expect("terraform block regex"))
    }
    fn backend_open_re() -> &'static Regex {
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| Regex::new(r#"backend(\s+"[^"]*")?\s*\{"#).expect("backend block regex"))
    }

    let open = terraform_open_re()
        .find(input)
        .map(|m| m.end() - 1)
        .ok_or_else(|| anyhow!("could not parse \"terraform\" block in config"))?;
    let close = matching_brace(input, open)
        .ok_or_else(|| anyhow!("could not parse \"terraform\" block in config"))?;

    let body_start = open + 1;
    let body = &input[body_start..close];

    let Some(backend) = backend_open_re().find(body) else {
        // No backend configured in this file; nothing to delete.
        return Ok(input.to_string());
    };

    let backend_start = body_start + backend.start();
    let backend_open = body_start + backend.end() - 1;
    let backend_close = matching_brace(input, backend_open)
        .ok_or_else(|| anyhow!("could not parse \"backend\" block in config"))?;

    // Take the trailing newline with the block so no blank line is left
    // behind.
    let mut removal_end = backend_close + 1;
    if input[removal_end..].starts_with('\n') {
        removal_end += 1;
    }

    // Also swallow indentation whitespace at the start of the backend line.
    let mut removal_start = backend_start;
    while removal_start > 0 {
        let prev = input.as_bytes()[removal_start - 1];
        if prev == b' ' || prev == b'\t' {
            removal_start -= 1;
        } else {
            break;
        }
    }

    let mut result = String::with_capacity(input.len());
    result.push_str(&input[..removal_start]);
    result.push_str(&input[removal_end..]);
    Ok(result)
}

/// 0.12+: regex-bounded removal of a simple backend block.
fn delete_backend_012(input: &str) -> Result<String> {
    // Detects that some backend configuration exists at all. `[{\s]` keeps
    // identifiers like `some_backend` from matching.
    fn definition_re() -> &'static Regex {
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| {
            Regex::new(r#"(?s)[{\s]backend\s+"[^"]+"\s*\{"#).expect("backend definition regex")
        })
    }
    // Captures a backend block whose body contains no nested opening brace.
    // The brace that opens the surrounding `terraform` block is not part of
    // the capture, so it survives the removal.
    fn block_re() -> &'static Regex {
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| {
            Regex::new(r#"(?s)(\s*backend\s+"[^"]+"\s*\{[^{]*?\})"#).expect("backend block regex")
        })
    }

    if !definition_re().is_match(input) {
        return Ok(input.to_string());
    }

    let Some(captures) = block_re().captures(input) else {
        bail!("unable to delete backend config: unsupported syntax");
    };
    let Some(block) = captures.get(1) else {
        bail!("unable to delete backend config: unsupported syntax");
    };

    let mut result = String::with_capacity(input.len());
    result.push_str(&input[..block.start()]);
    result.push_str(&input[block.end()..]);
    Ok(result)
}

/// Index of the `}` matching the `{` at `open`, skipping braces inside
/// double-quoted strings and `#`/`//` comments. Returns `None` when the
/// block never closes.
fn matching_brace(input: &str, open: usize) -> Option<usize> {
    let bytes = input.as_bytes();
    if bytes.get(open) != Some(&b'{') {
        return None;
    }

    let mut depth = 0usize;
    let mut index = open;

    while index < bytes.len() {
        match bytes[index] {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(index);
                }
            }
            b'"' => {
                // Skip the string literal, honouring escapes.
                index += 1;
                while index < bytes.len() && bytes[index] != b'"' {
                    if bytes[index] == b'\\' {
                        index += 1;
                    }
                    index += 1;
                }
            }
            b'#' => {
                while index < bytes.len() && bytes[index] != b'\n' {
                    index += 1;
                }
            }
            b'/' if bytes.get(index + 1) == Some(&b'/') => {
                while index < bytes.len() && bytes[index] != b'\n' {
                    index += 1;
                }
            }
            _ => {}
        }
        index += 1;
    }

    None
}
