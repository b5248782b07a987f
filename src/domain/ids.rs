use uuid::Uuid;

/// Generates a fresh message identifier (random v4 UUID).
#[must_use]
pub fn new_id() -> Uuid {
    Uuid::new_v4()
}

/// Reports whether a path segment has the shape of a generated message id:
/// lowercase hex in the canonical 8-4-4-4-12 hyphenated layout.
///
/// Anything else is treated as a username by the routing layer.
#[must_use]
pub fn looks_like_message_id(segment: &str) -> bool {
    const HYPHENS: [usize; 4] = [8, 13, 18, 23];

    segment.len() == 36
        && segment.char_indices().all(|(i, c)| {
            if HYPHENS.contains(&i) { c == '-' } else { c.is_ascii_digit() || ('a'..='f').contains(&c) }
        })
}
