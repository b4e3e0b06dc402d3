use actix_web::{HttpResponse, Responder, get, post, web};
use anyhow::Context;
use serde::Deserialize;
use sqlx::sqlite::SqlitePool;

use super::{Caller, external_error};
use crate::database as db;
use crate::error::JudgeError;
use crate::judge::Judge;

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub problem_id: i64,
    pub language: String,
    pub code: String,
}

/// Waits for the verdict before answering; a client that hangs up early does not cancel judging
#[post("/submit")]
pub async fn post_submit_handler(
    judge: web::Data<Judge>,
    caller: Caller,
    body: web::Json<SubmitRequest>,
) -> Result<HttpResponse, JudgeError> {
    let Caller(user_id) = caller;
    let SubmitRequest {
        problem_id,
        language,
        code,
    } = body.into_inner();
    log::info!("Received submission from user {user_id} for problem {problem_id}");

    let submission = judge
        .into_inner()
        .submit(user_id, problem_id, language, code)
        .await
        .context("Judging task failed")??;
    Ok(HttpResponse::Ok().json(submission))
}

#[get("/submissions/user/{id}")]
pub async fn get_user_submissions_handler(
    pool: web::Data<SqlitePool>,
    _caller: Caller,
    path: web::Path<(String,)>,
) -> impl Responder {
    let user_id = path.into_inner().0;

    match db::fetch_submissions_by_user(&pool, &user_id).await {
        Ok(submissions) => {
            log::info!("Got {} submissions of user {user_id}", submissions.len());
            HttpResponse::Ok().json(submissions)
        }
        Err(e) => {
            log::error!("Failed to retrieve submissions of user {user_id}: {e}");
            external_error()
        }
    }
}

#[get("/submissions/problem/{id}")]
pub async fn get_problem_submissions_handler(
    pool: web::Data<SqlitePool>,
    path: web::Path<(i64,)>,
) -> impl Responder {
    let problem_id = path.into_inner().0;

    match db::fetch_submissions_by_problem(&pool, problem_id).await {
        Ok(submissions) => {
            log::info!("Got {} submissions for problem {problem_id}", submissions.len());
            HttpResponse::Ok().json(submissions)
        }
        Err(e) => {
            log::error!("Failed to retrieve submissions for problem {problem_id}: {e}");
            external_error()
        }
    }
}
