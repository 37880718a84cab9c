//! Convenience functions throughout the crate go here
use rand::RngCore;
use url::Url;

/// Generate a vector of cryptographically secure random bytes of length `len`.
pub fn generate_random_bytes(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    rand::rngs::OsRng.fill_bytes(&mut buf); // Uses the OS's secure RNG
    buf
}

/// Returns the value of the first occurrence of `key` in a raw query string.
/// Later duplicates are deliberately ignored.
pub fn first_query_value(query: &str, key: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .filter(|(name, _)| name == key)
        .map(|(_, value)| value.into_owned())
        .next()
}

/// Returns `target` unchanged when it is already an absolute URL, otherwise
/// resolves it against the origin of `base`.
pub fn to_absolute(target: &str, base: &str) -> Result<String, url::ParseError> {
    match Url::parse(target) {
        Ok(url) => Ok(url.into()),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Ok(Url::parse(base)?.join(target)?.into())
        }
        Err(err) => Err(err),
    }
}
