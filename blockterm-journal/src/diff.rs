//! Unified diff application.

use crate::entry::ForwardPayload;
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// A diff payload containing this marker replaces the whole file with the
/// text that follows it.
pub const REPLACE_MARKER: &str = "===REPLACE===";

static HUNK_HEADER: OnceLock<Regex> = OnceLock::new();

fn hunk_header() -> &'static Regex {
    HUNK_HEADER.get_or_init(|| {
        Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@")
            .expect("Failed to compile hunk header regex")
    })
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatchError {
    #[error("diff contains no hunks")]
    NoHunks,

    #[error("malformed hunk at diff line {line}: {message}")]
    MalformedHunk { line: usize, message: String },

    #[error("hunk at diff line {line} does not match the file: expected {expected:?}, found {found:?}")]
    ContextMismatch {
        line: usize,
        expected: String,
        found: Option<String>,
    },

    #[error("hunk at diff line {line} is out of order or past the end of the file")]
    OutOfRange { line: usize },

    #[error("a diff cannot be applied to a file that does not exist")]
    MissingFile,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum HunkLine {
    Context(String),
    Remove(String),
    Add { text: String, newline: bool },
}

#[derive(Debug, Clone)]
struct Hunk {
    /// 1-based diff line of the header, for error messages.
    line: usize,
    old_start: usize,
    old_len: usize,
    lines: Vec<HunkLine>,
}

/// Compute the content `forward` produces from `current` (`None` if the file
/// does not exist).
pub fn resolve(forward: &ForwardPayload, current: Option<&str>) -> Result<String, PatchError> {
    match forward {
        ForwardPayload::Replace(content) => Ok(content.clone()),
        ForwardPayload::UnifiedDiff(diff) => {
            if let Some(pos) = diff.find(REPLACE_MARKER) {
                return Ok(diff[pos + REPLACE_MARKER.len()..].to_string());
            }
            let current = current.ok_or(PatchError::MissingFile)?;
            apply_unified_diff(current, diff)
        }
    }
}

/// Apply the hunks of `diff` to `original`. File headers (`---`, `+++`,
/// `diff`, `index`) are skipped.
pub fn apply_unified_diff(original: &str, diff: &str) -> Result<String, PatchError> {
    let hunks = parse(diff)?;
    if hunks.is_empty() {
        return Err(PatchError::NoHunks);
    }

    let source: Vec<&str> = original.split_inclusive('\n').collect();
    let mut out = String::with_capacity(original.len());
    let mut cursor = 0;

    for hunk in &hunks {
        // A zero-length old range names the line after which to insert.
        let start = if hunk.old_len == 0 {
            hunk.old_start
        } else {
            hunk.old_start.saturating_sub(1)
        };
        if start < cursor || start > source.len() {
            return Err(PatchError::OutOfRange { line: hunk.line });
        }
        source[cursor..start].iter().for_each(|l| out.push_str(l));
        cursor = start;

        for op in &hunk.lines {
            match op {
                HunkLine::Context(text) | HunkLine::Remove(text) => {
                    let found = source.get(cursor).copied();
                    if found.map(strip_eol) != Some(text.as_str()) {
                        return Err(PatchError::ContextMismatch {
                            line: hunk.line,
                            expected: text.clone(),
                            found: found.map(|l| strip_eol(l).to_string()),
                        });
                    }
                    if let (HunkLine::Context(_), Some(line)) = (op, found) {
                        out.push_str(line);
                    }
                    cursor += 1;
                }
                HunkLine::Add { text, newline } => {
                    out.push_str(text);
                    if *newline {
                        out.push('\n');
                    }
                }
            }
        }
    }

    source[cursor..].iter().for_each(|l| out.push_str(l));
    Ok(out)
}

fn strip_eol(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

fn parse(diff: &str) -> Result<Vec<Hunk>, PatchError> {
    let lines: Vec<&str> = diff.lines().collect();
    let mut hunks = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let Some(caps) = hunk_header().captures(lines[i]) else {
            // File headers and any other text between hunks.
            i += 1;
            continue;
        };
        let header_line = i + 1;
        let number = |idx: usize, default: usize| -> Result<usize, PatchError> {
            caps.get(idx)
                .map(|m| m.as_str().parse::<usize>())
                .transpose()
                .map(|n| n.unwrap_or(default))
                .map_err(|e| PatchError::MalformedHunk {
                    line: header_line,
                    message: e.to_string(),
                })
        };
        let old_start = number(1, 1)?;
        let old_len = number(2, 1)?;
        let new_len = number(4, 1)?;
        i += 1;

        let mut hunk = Hunk {
            line: header_line,
            old_start,
            old_len,
            lines: Vec::new(),
        };
        let (mut old_seen, mut new_seen) = (0, 0);
        while i < lines.len() && (old_seen < old_len || new_seen < new_len) {
            let line = lines[i];
            let op = match line.chars().next() {
                Some(' ') => HunkLine::Context(line[1..].to_string()),
                // Some tools strip the trailing space of empty context lines.
                None => HunkLine::Context(String::new()),
                Some('-') => HunkLine::Remove(line[1..].to_string()),
                Some('+') => HunkLine::Add {
                    text: line[1..].to_string(),
                    newline: true,
                },
                Some('\\') => {
                    mark_no_newline(&mut hunk);
                    i += 1;
                    continue;
                }
                Some(_) => {
                    return Err(PatchError::MalformedHunk {
                        line: i + 1,
                        message: format!("unexpected line {:?}", line),
                    });
                }
            };
            match op {
                HunkLine::Context(_) => {
                    old_seen += 1;
                    new_seen += 1;
                }
                HunkLine::Remove(_) => old_seen += 1,
                HunkLine::Add { .. } => new_seen += 1,
            }
            hunk.lines.push(op);
            i += 1;
        }

        if old_seen != old_len || new_seen != new_len {
            return Err(PatchError::MalformedHunk {
                line: header_line,
                message: format!(
                    "expected -{} +{} lines, found -{} +{}",
                    old_len, new_len, old_seen, new_seen
                ),
            });
        }
        // A trailing "\ No newline at end of file" belongs to this hunk.
        if i < lines.len() && lines[i].starts_with('\\') {
            mark_no_newline(&mut hunk);
            i += 1;
        }
        hunks.push(hunk);
    }

    Ok(hunks)
}

fn mark_no_newline(hunk: &mut Hunk) {
    if let Some(HunkLine::Add { newline, .. }) = hunk.lines.last_mut() {
        *newline = false;
    }
}
