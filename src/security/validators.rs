//! Shape checks for patient-supplied identifiers.

/// True iff `value` is a DNI: 7 or 8 ASCII digits, no separators.
pub fn validate_dni(value: &str) -> bool {
    (7..=8).contains(&value.len()) && value.bytes().all(|b| b.is_ascii_digit())
}

/// True iff `value` is an access code: 8 to 10 characters from `[A-Z0-9]`.
pub fn validate_code(value: &str) -> bool {
    (8..=10).contains(&value.len())
        && value
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}

/// True iff `value` can name a platform record inside a storage path:
/// 1 to 64 ASCII letters, digits or `-` (UUIDs included).
pub fn validate_record_id(value: &str) -> bool {
    (1..=64).contains(&value.len())
        && value.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
}
