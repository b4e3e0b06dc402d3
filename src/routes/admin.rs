use actix_web::{HttpResponse, Responder, get, web};
use serde::Serialize;
use sqlx::sqlite::SqlitePool;

use super::{Admin, external_error};
use crate::database as db;

const TOP_PROBLEMS_LIMIT: i64 = 5;

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PlatformStats {
    pub total_users: i64,
    pub total_submissions: i64,
    /// Percentage of submissions judged `Pass`, two decimals
    pub pass_rate: String,
}

impl From<db::SubmissionCounts> for PlatformStats {
    fn from(counts: db::SubmissionCounts) -> Self {
        Self {
            total_users: counts.total_users,
            total_submissions: counts.total_submissions,
            pass_rate: pass_rate(counts.total_passed, counts.total_submissions),
        }
    }
}

fn pass_rate(passed: i64, total: i64) -> String {
    if total == 0 {
        return "0.00".to_string();
    }
    format!("{:.2}", passed as f64 * 100.0 / total as f64)
}

#[get("/admin/stats")]
pub async fn get_stats_handler(pool: web::Data<SqlitePool>, _admin: Admin) -> impl Responder {
    match db::count_submissions(&pool).await {
        Ok(counts) => HttpResponse::Ok().json(PlatformStats::from(counts)),
        Err(e) => {
            log::error!("Failed to count submissions: {e}");
            external_error()
        }
    }
}

#[get("/admin/top-problems")]
pub async fn get_top_problems_handler(
    pool: web::Data<SqlitePool>,
    _admin: Admin,
) -> impl Responder {
    match db::most_solved_problems(&pool, TOP_PROBLEMS_LIMIT).await {
        Ok(problems) => HttpResponse::Ok().json(problems),
        Err(e) => {
            log::error!("Failed to rank problems: {e}");
            external_error()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_rate_formatting() {
        assert_eq!(pass_rate(0, 0), "0.00");
        assert_eq!(pass_rate(1, 3), "33.33");
        assert_eq!(pass_rate(2, 3), "66.67");
        assert_eq!(pass_rate(4, 4), "100.00");
    }
}
