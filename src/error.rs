use std::io::Cursor;

use rocket::{
    http::{ContentType, Status},
    response::{self, Responder},
    Request, Response,
};
use thiserror::Error;

use crate::{session::SessionError, templates::TemplateError};

/// Message shown to clients whenever an infrastructure failure occurs. The
/// real cause only ever goes to the server log.
pub const GENERIC_FAILURE: &str = "Something went wrong on our end. Please try again later.";

#[derive(Debug, Error)]
pub enum Error {
    #[error("An error occured whilst trying to access the database: {0}")]
    Database(#[from] sqlx::Error),
    #[error("An error occured whilst rendering")]
    TeraRendering(#[from] tera::Error),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("Could not process the password: {0}")]
    PasswordHash(#[from] argon2::password_hash::Error),
    #[error("An error occured in the session store: {0}")]
    Session(#[from] SessionError),
    #[error("The session store is not available.")]
    SessionStoreNotFound,
    #[error("The template engine is not available.")]
    TemplateNotFound,
    #[error("Failed to store the uploaded file: {0}")]
    UploadFailed(std::io::Error),
    #[error("That email address is already registered.")]
    EmailTaken,
    #[error("No project with id {0} could be found.")]
    ProjectNotFound(i64),
}

/// Single classification point for every failure the application can
/// produce: business failures keep their message, infrastructure failures
/// collapse into [`GENERIC_FAILURE`].
pub trait ErrorResponder {
    fn response(&self) -> (Status, String);
}

impl ErrorResponder for Error {
    fn response(&self) -> (Status, String) {
        match self {
            Error::Database(_)
            | Error::TeraRendering(_)
            | Error::Template(_)
            | Error::PasswordHash(_)
            | Error::Session(_)
            | Error::SessionStoreNotFound
            | Error::TemplateNotFound
            | Error::UploadFailed(_) => (Status::InternalServerError, GENERIC_FAILURE.to_string()),
            Error::EmailTaken => (Status::Conflict, self.to_string()),
            Error::ProjectNotFound(_) => (Status::NotFound, self.to_string()),
        }
    }
}

impl<'r> Responder<'r, 'static> for Error {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        let (status, body) = self.response();
        if status.code >= 500 {
            error!("Request failed: {self}");
        }
        Response::build()
            .status(status)
            .header(ContentType::Plain)
            .sized_body(body.len(), Cursor::new(body))
            .ok()
    }
}
