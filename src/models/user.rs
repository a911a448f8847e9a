//! User model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A team member who can author pull requests and review them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub user_id: String,
    pub username: String,
    /// Name of the single team this user belongs to.
    pub team_name: String,
    /// Only active users are eligible for reviewer assignment.
    pub is_active: bool,
}
