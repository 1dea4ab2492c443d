//! ULID identifiers for requests, transactions and messages.

/// Generate a fresh, lexicographically sortable identifier.
#[must_use]
pub fn generate_id() -> String {
    ulid::Ulid::new().to_string()
}
