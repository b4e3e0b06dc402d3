mod admin;
mod events;
mod problems;
mod submissions;

pub use admin::{get_stats_handler, get_top_problems_handler};
pub use events::events_handler;
pub use problems::{
    get_problem_handler, get_problems_handler, post_problem_handler, put_problem_handler,
};
pub use submissions::{
    get_problem_submissions_handler, get_user_submissions_handler, post_submit_handler,
};

use actix_web::dev::Payload;
use actix_web::error::{InternalError, JsonPayloadError};
use actix_web::http::StatusCode;
use actix_web::{FromRequest, HttpRequest, HttpResponse, ResponseError};
use futures::future::{Ready, ready};
use serde::Serialize;

use crate::error::JudgeError;

/// Header carrying the caller's identity, set by whatever authenticates in front of us
pub const USER_ID_HEADER: &str = "X-User-Id";

/// Set to `true` alongside [`USER_ID_HEADER`] for callers with admin rights
pub const ADMIN_HEADER: &str = "X-User-Admin";

#[derive(Serialize)]
struct ErrorResponse {
    reason: &'static str,
    code: u32,
}

#[derive(Serialize)]
struct ErrorResponseWithMessage {
    reason: &'static str,
    code: u32,
    message: String,
}

pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let response = HttpResponse::BadRequest().json(ErrorResponseWithMessage {
        reason: "ERR_INVALID_ARGUMENT",
        code: 1,
        message: err.to_string(),
    });
    InternalError::from_response(err, response).into()
}

fn external_error() -> HttpResponse {
    HttpResponse::InternalServerError().json(ErrorResponse {
        reason: "ERR_EXTERNAL",
        code: 5,
    })
}

impl ResponseError for JudgeError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::BAD_REQUEST)
    }

    fn error_response(&self) -> HttpResponse {
        let (reason, code) = match self {
            Self::ProblemNotFound => ("ERR_NOT_FOUND", 3),
            Self::UnsupportedLanguage(_) | Self::CompileFailure { .. } => {
                ("ERR_INVALID_ARGUMENT", 1)
            }
            Self::Database(_) | Self::Internal(_) => ("ERR_EXTERNAL", 5),
        };
        HttpResponse::build(ResponseError::status_code(self)).json(ErrorResponseWithMessage {
            reason,
            code,
            message: self.to_string(),
        })
    }
}

/// Identity of the caller, taken from the `X-User-Id` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub String);

fn caller_from(req: &HttpRequest) -> Result<Caller, actix_web::Error> {
    req.headers()
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| Caller(value.to_string()))
        .ok_or_else(|| {
            let response = HttpResponse::Unauthorized().json(ErrorResponseWithMessage {
                reason: "ERR_UNAUTHENTICATED",
                code: 2,
                message: "User not authenticated or user ID missing.".to_string(),
            });
            InternalError::from_response("missing caller identity", response).into()
        })
}

impl FromRequest for Caller {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(caller_from(req))
    }
}

/// A caller that also carries `X-User-Admin: true`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admin(pub String);

impl FromRequest for Admin {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let admin = caller_from(req).and_then(|Caller(user_id)| {
            let is_admin = req
                .headers()
                .get(ADMIN_HEADER)
                .and_then(|value| value.to_str().ok())
                .is_some_and(|value| value.trim().eq_ignore_ascii_case("true"));
            if is_admin {
                return Ok(Admin(user_id));
            }

            log::info!("Rejected admin request from user {user_id}");
            let response = HttpResponse::Forbidden().json(ErrorResponseWithMessage {
                reason: "ERR_FORBIDDEN",
                code: 4,
                message: "Admin access required.".to_string(),
            });
            Err(InternalError::from_response("caller is not an admin", response).into())
        });
        ready(admin)
    }
}
