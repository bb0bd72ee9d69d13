use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Serialize, Deserialize, Clone, FromRow, PartialEq, Eq)]
pub struct CleanedLink {
    pub original_url: String,
    pub cleaned_url: String,
    pub updated_at: i64, // unix seconds of the last write
}
