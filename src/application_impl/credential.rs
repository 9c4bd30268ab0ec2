use nanoid::nanoid;
use std::sync::LazyLock;

pub const CREDENTIAL_LEN: usize = 50;

static ALPHANUMERIC: LazyLock<Vec<char>> = LazyLock::new(|| {
    ('a'..='z').chain('A'..='Z').chain('0'..='9').collect()
});

/// Opaque 50-char alphanumeric credential from the OS-seeded CSPRNG.
///
/// Used for client ids, client secrets, access and refresh tokens. There is
/// no fallback source: an RNG failure aborts the calling task.
pub fn generate_credential() -> String {
    nanoid!(CREDENTIAL_LEN, &ALPHANUMERIC)
}
