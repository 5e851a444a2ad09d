pub use actix_web::web::{Data, Json, Path, Query};
use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use crossbuild_common::api::ErrorResponse;
use crossbuild_common::errors::{self, BuildError};
use std::fmt;

#[derive(Debug)]
pub struct Error {
    err: errors::Error,
}

pub type Result<T> = ::std::result::Result<T, Error>;

impl Error {
    fn build_error(&self) -> Option<&BuildError> {
        self.err.downcast_ref::<BuildError>()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, w: &mut fmt::Formatter) -> fmt::Result {
        write!(w, "{:#}", self.err)
    }
}

impl actix_web::error::ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self.build_error() {
            Some(err) if err.is_validation() => StatusCode::BAD_REQUEST,
            Some(BuildError::QueueClosed) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.to_string(),
        })
    }
}

impl From<errors::Error> for Error {
    fn from(err: errors::Error) -> Error {
        errors::error!("Error occurred in http handler: {err:#}");
        Error { err }
    }
}

impl From<BuildError> for Error {
    fn from(err: BuildError) -> Error {
        if err.is_validation() {
            errors::debug!("Rejecting request: {err}");
        } else {
            errors::error!("Error occurred in http handler: {err}");
        }
        Error { err: err.into() }
    }
}
