use actix_web::{HttpResponse, Responder, get, post, put, web};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;

use super::{Admin, ErrorResponseWithMessage, external_error};
use crate::database as db;
use crate::models::{Problem, TestCase};

/// A problem as contestants see it: hidden test cases stay on the server
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ProblemStatement {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub input_format: String,
    pub output_format: String,
    pub constraints: String,
    pub sample_test_cases: Vec<TestCase>,
}

impl From<Problem> for ProblemStatement {
    fn from(problem: Problem) -> Self {
        Self {
            id: problem.id,
            title: problem.title,
            description: problem.description,
            input_format: problem.input_format,
            output_format: problem.output_format,
            constraints: problem.constraints,
            sample_test_cases: problem.sample_test_cases,
        }
    }
}

/// Problem body accepted from admins; the id comes from the path or the database
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ProblemDraft {
    pub title: String,
    pub description: String,
    pub input_format: String,
    pub output_format: String,
    pub constraints: String,
    #[serde(default)]
    pub sample_test_cases: Vec<TestCase>,
    #[serde(default)]
    pub hidden_test_cases: Vec<TestCase>,
}

impl ProblemDraft {
    fn into_problem(self, id: i64) -> Problem {
        Problem {
            id,
            title: self.title,
            description: self.description,
            input_format: self.input_format,
            output_format: self.output_format,
            constraints: self.constraints,
            sample_test_cases: self.sample_test_cases,
            hidden_test_cases: self.hidden_test_cases,
        }
    }
}

fn blank_title() -> HttpResponse {
    HttpResponse::BadRequest().json(ErrorResponseWithMessage {
        reason: "ERR_INVALID_ARGUMENT",
        code: 1,
        message: "Problem title must not be empty.".to_string(),
    })
}

fn problem_not_found(problem_id: i64) -> HttpResponse {
    HttpResponse::NotFound().json(ErrorResponseWithMessage {
        reason: "ERR_NOT_FOUND",
        code: 3,
        message: format!("Problem {problem_id} not found."),
    })
}

#[get("/problems")]
pub async fn get_problems_handler(pool: web::Data<SqlitePool>) -> impl Responder {
    match db::list_problems(&pool).await {
        Ok(problems) => {
            let statements: Vec<ProblemStatement> = problems.into_iter().map(Into::into).collect();
            HttpResponse::Ok().json(statements)
        }
        Err(e) => {
            log::error!("Failed to list problems: {e}");
            external_error()
        }
    }
}

#[get("/problems/{id}")]
pub async fn get_problem_handler(
    pool: web::Data<SqlitePool>,
    path: web::Path<(i64,)>,
) -> impl Responder {
    let problem_id = path.into_inner().0;

    match db::find_problem(&pool, problem_id).await {
        Ok(Some(problem)) => HttpResponse::Ok().json(ProblemStatement::from(problem)),
        Ok(None) => {
            log::info!("Got nothing with problem id {problem_id} from database");
            problem_not_found(problem_id)
        }
        Err(e) => {
            log::error!("Failed to retrieve problem {problem_id}: {e}");
            external_error()
        }
    }
}

/// Admins get the full problem back, hidden test cases included
#[post("/problems")]
pub async fn post_problem_handler(
    pool: web::Data<SqlitePool>,
    admin: Admin,
    body: web::Json<ProblemDraft>,
) -> impl Responder {
    let draft = body.into_inner();
    if draft.title.trim().is_empty() {
        return blank_title();
    }

    let mut problem = draft.into_problem(0);
    match db::create_problem(&pool, &problem).await {
        Ok(id) => {
            problem.id = id;
            log::info!("Admin {} created problem {id}", admin.0);
            HttpResponse::Created().json(problem)
        }
        Err(e) => {
            log::error!("Failed to create problem: {e}");
            external_error()
        }
    }
}

#[put("/problems/{id}")]
pub async fn put_problem_handler(
    pool: web::Data<SqlitePool>,
    admin: Admin,
    path: web::Path<(i64,)>,
    body: web::Json<ProblemDraft>,
) -> impl Responder {
    let problem_id = path.into_inner().0;
    let draft = body.into_inner();
    if draft.title.trim().is_empty() {
        return blank_title();
    }

    match db::find_problem(&pool, problem_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return problem_not_found(problem_id),
        Err(e) => {
            log::error!("Failed to retrieve problem {problem_id}: {e}");
            return external_error();
        }
    }

    let problem = draft.into_problem(problem_id);
    match db::upsert_problem(&pool, &problem).await {
        Ok(()) => {
            log::info!("Admin {} updated problem {problem_id}", admin.0);
            HttpResponse::Ok().json(problem)
        }
        Err(e) => {
            log::error!("Failed to update problem {problem_id}: {e}");
            external_error()
        }
    }
}
