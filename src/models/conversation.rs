use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Conversation {
    pub id: Uuid,
    pub project_id: Option<Uuid>,
    /// Canonical sorted uuid pair, set only for two-party conversations.
    pub pair_key: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Refreshed whenever a contained message is created.
    pub updated_at: DateTime<Utc>,
}

/// Canonical key for an unordered two-party participant set. Both orderings
/// of the same pair produce the same key, which backs the uniqueness
/// constraint on direct conversations.
pub fn pair_key(a: Uuid, b: Uuid) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{lo}:{hi}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_key_is_order_independent() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(pair_key(a, b), pair_key(b, a));
    }

    #[test]
    fn pair_key_distinguishes_pairs() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        assert_ne!(pair_key(a, b), pair_key(a, c));
    }
}
