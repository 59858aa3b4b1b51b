//! URL slugs derived from display names.

use super::error::ServiceError;

/// Lowercase `text`, turn whitespace into hyphens, drop everything except
/// ASCII letters, digits and hyphens, then collapse and trim hyphens.
#[must_use]
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars().flat_map(char::to_lowercase) {
        let c = if c.is_whitespace() { '-' } else { c };
        if c == '-' {
            if !slug.is_empty() && !slug.ends_with('-') {
                slug.push('-');
            }
        } else if c.is_ascii_lowercase() || c.is_ascii_digit() {
            slug.push(c);
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// [`slugify`] a validated name, rejecting names that leave nothing behind.
pub(crate) fn checked_slug(name: &str) -> Result<String, ServiceError> {
    let slug = slugify(name);
    if slug.is_empty() {
        return Err(ServiceError::invalid("name must contain letters or digits"));
    }
    Ok(slug)
}
