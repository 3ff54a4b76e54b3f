/// Prefix for identifiers whose first character is a digit.
pub const DIGIT_PREFIX: char = '$';

/// Maps a free-text spreadsheet label to a machine-safe field identifier.
///
/// The label is lower-cased, a leading digit gets [`DIGIT_PREFIX`], and every
/// character outside `[a-z0-9_:$]` becomes `_`. Applying it to its own output
/// returns the output unchanged.
pub fn normalize_field_name(label: &str) -> String {
    let lowered = label.to_lowercase();
    let mut normalized = String::with_capacity(lowered.len() + 1);
    if lowered.chars().next().is_some_and(|ch| ch.is_ascii_digit()) {
        normalized.push(DIGIT_PREFIX);
    }
    for ch in lowered.chars() {
        if is_identifier_char(ch) {
            normalized.push(ch);
        } else {
            normalized.push('_');
        }
    }
    normalized
}

pub fn is_identifier_char(ch: char) -> bool {
    ch.is_ascii_lowercase() || ch.is_ascii_digit() || matches!(ch, '_' | ':' | '$')
}
