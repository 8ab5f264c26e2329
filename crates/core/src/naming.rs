//! Upload filtering and output naming rules.
//!
//! Only `.docx` uploads are accepted (case-insensitive). Each converted
//! output keeps the original base name with the extension swapped for
//! `.pdf`, which is also the name of its entry inside the job archive.

use std::collections::HashSet;

/// Extension (without the dot) an upload must carry to be converted.
pub const ACCEPTED_EXTENSION: &str = "docx";

/// Extension (without the dot) of every converted output.
pub const OUTPUT_EXTENSION: &str = "pdf";

/// Reduce a client-supplied filename to its final path component.
///
/// Browsers and CLI tools may send relative paths (`dir/report.docx`) or
/// Windows paths (`C:\docs\report.docx`). Returns `None` when nothing usable
/// remains (empty, `.` or `..`).
pub fn base_name(filename: &str) -> Option<&str> {
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
        .trim();

    match name {
        "" | "." | ".." => None,
        other => Some(other),
    }
}

/// Whether `filename` ends in the accepted extension (case-insensitive).
/// A bare `.docx` qualifies.
pub fn is_accepted(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .is_some_and(|(_, ext)| ext.eq_ignore_ascii_case(ACCEPTED_EXTENSION))
}

/// Name of the converted output for `filename`: the last extension is
/// replaced by [`OUTPUT_EXTENSION`] (`a.b.docx` -> `a.b.pdf`).
pub fn output_name(filename: &str) -> String {
    let stem = match filename.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => filename,
    };
    format!("{stem}.{OUTPUT_EXTENSION}")
}

/// Return `name`, or `stem (n).ext` for the smallest `n >= 2` not already in
/// `taken`. The returned name is inserted into `taken`.
///
/// Distinct uploads can map to the same output (`a.docx` and `a.DOCX`);
/// archive entry names must stay unique.
pub fn unique_entry_name(name: &str, taken: &mut HashSet<String>) -> String {
    if taken.insert(name.to_string()) {
        return name.to_string();
    }

    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) => (stem, Some(ext)),
        None => (name, None),
    };

    let mut n = 2u32;
    loop {
        let candidate = match ext {
            Some(ext) => format!("{stem} ({n}).{ext}"),
            None => format!("{stem} ({n})"),
        };
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
