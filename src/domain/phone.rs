//! Phone number canonicalization.

/// Normalize a phone number to the international `+<digits>` form.
///
/// Rules, in order:
/// - everything but digits is stripped;
/// - a local number with a leading trunk `0` and at least 10 digits has the
///   `0` replaced by the `380` country code;
/// - a number already starting with `380` and at least 12 digits long is
///   only prefixed with `+`;
/// - any other digit string is prefixed with `+` as-is.
///
/// Normalizing an already-canonical number returns it unchanged.
pub fn normalize_phone(phone_text: &str) -> String {
    let digits_only: String = phone_text.chars().filter(char::is_ascii_digit).collect();

    if digits_only.starts_with('0') && digits_only.len() >= 10 {
        return format!("+380{}", &digits_only[1..]);
    }

    if digits_only.starts_with("380") && digits_only.len() >= 12 {
        return format!("+{digits_only}");
    }

    format!("+{digits_only}")
}
