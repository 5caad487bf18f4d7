//! Entry-name sanitisation.
//!
//! Entry names come out of the archive as decrypted byte strings with
//! `/`-separated components. Before joining a name to the destination
//! directory it must not be able to escape it or carry characters that
//! are invalid in a path component.

use std::path::PathBuf;

/// Characters replaced inside a path component.
const INVALID: &[char] = &['\\', ':', '*', '?', '"', '<', '>', '|'];

/// Turn a decrypted entry name into a safe relative path.
///
/// Splits on `/`, drops empty, `.` and `..` components, and replaces
/// control characters and characters from [`INVALID`] with `_`.
pub fn escape_entry_name(name: &str) -> PathBuf {
    let mut path = PathBuf::new();

    for component in name.split('/') {
        if component.is_empty() || component == "." || component == ".." {
            continue;
        }

        let escaped: String = component
            .chars()
            .map(|c| {
                if c.is_control() || INVALID.contains(&c) {
                    '_'
                } else {
                    c
                }
            })
            .collect();
        path.push(escaped);
    }

    path
}
