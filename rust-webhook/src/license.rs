//! License key generation.

use uuid::Uuid;

/// Metadata key the license is stored under on the subscription.
pub const LICENSE_METADATA_KEY: &str = "license_key";

/// Mint a new license key: a random v4 UUID in uppercase hyphenated form.
///
/// Keys are not checked against earlier issuances; collisions are treated
/// as negligible.
pub fn generate_license_key() -> String {
    Uuid::new_v4()
        .hyphenated()
        .encode_upper(&mut Uuid::encode_buffer())
        .to_string()
}
