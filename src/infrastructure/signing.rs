//! Request signing
//!
//! The remote API authenticates every call with an MD5-based signature:
//! each parameter value is hashed independently, the hex digests are sorted
//! lexicographically and concatenated after the shared secret salt, and the
//! result is hashed once more. Sorting makes the signature independent of
//! parameter insertion order.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use md5::{Digest, Md5};

/// Computes the order-independent signature over the given parameter values.
#[must_use]
pub fn sign<'a, I>(salt: &str, values: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut digests: Vec<String> = values
        .into_iter()
        .map(|value| hex::encode(Md5::digest(value.as_bytes())))
        .collect();
    digests.sort_unstable();

    let payload = format!("{salt}{}", digests.concat());
    hex::encode(Md5::digest(payload.as_bytes()))
}

/// Base64 credential for a basic-auth header value.
#[must_use]
pub fn basic_auth(username: &str, password: &str) -> String {
    STANDARD.encode(format!("{username}:{password}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_is_order_independent() {
        let salt = "ABCDEF00G";
        let forward = sign(salt, ["token-value", "42", "category-7"]);
        let backward = sign(salt, ["category-7", "42", "token-value"]);
        assert_eq!(forward, backward);
    }

    #[test]
    fn sign_depends_on_values() {
        let salt = "ABCDEF00G";
        assert_ne!(sign(salt, ["a"]), sign(salt, ["b"]));
    }

    #[test]
    fn sign_of_empty_params_is_salt_hash() {
        let salt = "ABCDEF00G";
        let expected = hex::encode(Md5::digest(salt.as_bytes()));
        assert_eq!(sign(salt, std::iter::empty()), expected);
    }

    #[test]
    fn basic_auth_encodes_credentials() {
        // "user:pass" in base64
        assert_eq!(basic_auth("user", "pass"), "dXNlcjpwYXNz");
    }

    proptest::proptest! {
        #[test]
        fn sign_is_permutation_invariant(
            values in proptest::collection::vec("[a-zA-Z0-9._-]{0,12}", 0..8),
            seed in 0usize..64,
        ) {
            let mut shuffled = values.clone();
            shuffled.rotate_left(seed % values.len().max(1));

            let original = sign("ABCDEF00G", values.iter().map(String::as_str));
            let rotated = sign("ABCDEF00G", shuffled.iter().map(String::as_str));
            proptest::prop_assert_eq!(original, rotated);
        }
    }
}
