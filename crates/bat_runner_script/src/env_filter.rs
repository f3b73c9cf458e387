//! Rules deciding which runtime variables end up in a generated batch script,
//! and how their values are escaped for `cmd.exe`.

use std::collections::HashSet;

/// Name prefixes of variables produced by the pipeline context. These carry
/// structured data and must not leak into the script environment.
pub const RESERVED_NAME_PREFIXES: &[&str] = &[
    "variables.",
    "settings.",
    "envs.",
    "ci.",
    "job.",
    "jobs.",
    "steps.",
];

/// Characters that cannot appear in a single-line `set` statement.
pub const LINE_BREAKS: &[char] = &['\n', '\r'];

/// Characters with special meaning to `cmd.exe` and their escaped forms.
pub const ESCAPE_TABLE: &[(char, &str)] = &[
    ('&', "^&"),
    ('<', "^<"),
    ('>', "^>"),
    ('|', "^|"),
    ('"', "\\\""),
];

/// Returns true if the variable name lives in a reserved context namespace.
pub fn is_reserved_name(name: &str) -> bool {
    let name = name.trim();
    RESERVED_NAME_PREFIXES
        .iter()
        .any(|prefix| name.starts_with(prefix))
}

/// Returns true if the value spans more than one line.
pub fn has_line_break(value: &str) -> bool {
    value.contains(LINE_BREAKS)
}

/// Returns true if the variable must not be emitted into the script.
pub fn is_filtered(name: &str, value: &str, excluded_names: &HashSet<String>) -> bool {
    is_reserved_name(name) || has_line_break(value) || excluded_names.contains(name)
}

/// Escape every character covered by [`ESCAPE_TABLE`].
pub fn escape_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match ESCAPE_TABLE.iter().find(|(special, _)| *special == c) {
            Some((_, replacement)) => escaped.push_str(replacement),
            None => escaped.push(c),
        }
    }
    escaped
}
