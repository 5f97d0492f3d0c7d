//! Small free-standing helpers shared across crates.

use uuid::Uuid;

/// Generate a new document/aggregate id.
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}
