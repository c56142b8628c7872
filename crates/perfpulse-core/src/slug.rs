use rand::Rng;

const SLUG_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Random lowercase alphanumeric pulse slug of `len` characters.
#[must_use]
pub fn generate_slug(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| char::from(SLUG_ALPHABET[rng.random_range(0..SLUG_ALPHABET.len())]))
        .collect()
}

/// Generate a URL-safe slug from a display name.
#[must_use]
pub fn slugify(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}
