/// Human-transcribed codes
///
/// Approval codes (`TP-XXXXXX`) are emailed to approved agencies and typed
/// back in at signup; group codes (`GRP-XXXXXX`) are read out to travelers.
/// Both draw from the same 32-symbol alphabet, which leaves out `I`, `O`,
/// `0` and `1` so a code copied by hand cannot be misread.
///
/// Six symbols give 32^6 (about 1.07 billion) codes. Uniqueness is still
/// enforced by storage; callers retry on collision.
///
/// # Example
///
/// ```
/// use travelpanel_shared::access::code::{generate_approval_code, is_approval_code_format};
///
/// let code = generate_approval_code();
/// assert!(is_approval_code_format(&code));
/// ```

use rand::Rng;

/// Prefix of approval codes
pub const APPROVAL_PREFIX: &str = "TP-";

/// Prefix of group join codes
pub const GROUP_PREFIX: &str = "GRP-";

/// Number of random symbols after the prefix
pub const CODE_LENGTH: usize = 6;

/// A-Z and 2-9 without `I` and `O`
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Generates a fresh `TP-XXXXXX` approval code
pub fn generate_approval_code() -> String {
    format!("{}{}", APPROVAL_PREFIX, random_symbols(CODE_LENGTH))
}

/// Generates a fresh `GRP-XXXXXX` group join code
pub fn generate_group_code() -> String {
    format!("{}{}", GROUP_PREFIX, random_symbols(CODE_LENGTH))
}

fn random_symbols(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Checks the `TP-` + six uppercase alphanumerics shape
///
/// Accepts any `[A-Z0-9]` so codes issued before the alphabet was narrowed
/// still validate.
pub fn is_approval_code_format(code: &str) -> bool {
    code.strip_prefix(APPROVAL_PREFIX).map_or(false, |rest| {
        rest.len() == CODE_LENGTH
            && rest
                .bytes()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
    })
}

/// Trims and uppercases a code as typed by a user
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}
