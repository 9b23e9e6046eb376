use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHasher,
};
use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::Error;

pub mod fairing;
pub mod models;

use models::{Project, User};

/// Hashes the password and inserts the user. The UNIQUE constraint on
/// `users.email` is the sole authority on duplicates; a violation comes
/// back as [`Error::EmailTaken`].
pub async fn create_user(
    db: &SqlitePool,
    name: &str,
    email: &str,
    password: &str,
    profile_picture: Option<&str>,
) -> Result<(), Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    let password_hash = argon2.hash_password(password.as_bytes(), &salt)?.to_string();

    sqlx::query("INSERT INTO users (name, email, password, profile_picture) VALUES (?, ?, ?, ?)")
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .bind(profile_picture)
        .execute(db)
        .await
        .map_err(|e| {
            if e.as_database_error()
                .map_or(false, |db_error| db_error.is_unique_violation())
            {
                Error::EmailTaken
            } else {
                Error::Database(e)
            }
        })?;

    Ok(())
}

pub async fn get_user_by_email(db: &SqlitePool, email: &str) -> Result<Option<User>, Error> {
    Ok(sqlx::query_as::<_, User>(
        "SELECT id, name, email, password, profile_picture FROM users WHERE email = ?",
    )
    .bind(email)
    .fetch_optional(db)
    .await?)
}

pub async fn create_project(
    db: &SqlitePool,
    name: &str,
    description: &str,
    image: Option<&str>,
) -> Result<(), Error> {
    sqlx::query(
        "INSERT INTO projects (project_name, description, project_image, created_at) \
         VALUES (?, ?, ?, ?)",
    )
    .bind(name)
    .bind(description)
    .bind(image)
    .bind(Utc::now().naive_utc())
    .execute(db)
    .await?;

    Ok(())
}

/// All projects, newest first.
pub async fn get_all_projects(db: &SqlitePool) -> Result<Vec<Project>, Error> {
    Ok(sqlx::query_as::<_, Project>(
        "SELECT id, project_name, description, project_image, created_at \
         FROM projects ORDER BY id DESC",
    )
    .fetch_all(db)
    .await?)
}

pub async fn get_project(db: &SqlitePool, id: i64) -> Result<Option<Project>, Error> {
    Ok(sqlx::query_as::<_, Project>(
        "SELECT id, project_name, description, project_image, created_at \
         FROM projects WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(db)
    .await?)
}
