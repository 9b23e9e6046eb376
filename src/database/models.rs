use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::FromRow;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    /// Argon2 PHC string, never the plaintext password.
    pub password: String,
    pub profile_picture: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, FromRow)]
pub struct Project {
    pub id: i64,
    pub project_name: String,
    pub description: String,
    pub project_image: Option<String>,
    pub created_at: NaiveDateTime,
}
