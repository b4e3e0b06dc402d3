use std::sync::Arc;

use actix_web::{App, test, web};
use assert_json_diff::assert_json_include;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use sqlx::sqlite::SqlitePool;
use tempfile::TempDir;

use judge::broadcast::StatusBroadcaster;
use judge::config::{JudgeConfig, ToolchainConfig};
use judge::database as db;
use judge::judge::Judge;
use judge::models::{SubmissionStatus, Verdict};
use judge::routes::{ADMIN_HEADER, USER_ID_HEADER};
use judge::web_server::api_routes;

struct TestContext {
    pool: SqlitePool,
    judge: Arc<Judge>,
    _dir: TempDir,
}

async fn setup() -> TestContext {
    let dir = tempfile::tempdir().unwrap();
    let pool = db::init_db(dir.path().join("judge.sqlite3")).await.unwrap();
    let config = JudgeConfig {
        workspace_root: Some(dir.path().join("workspaces")),
        ..JudgeConfig::default()
    };
    let judge = Arc::new(Judge::new(
        pool.clone(),
        Arc::new(StatusBroadcaster::new()),
        &config,
        ToolchainConfig::default(),
    ));

    TestContext {
        pool,
        judge,
        _dir: dir,
    }
}

fn echo_problem(title: &str) -> Value {
    json!({
        "title": title,
        "description": "Print the input back.",
        "inputFormat": "One line.",
        "outputFormat": "The same line.",
        "constraints": "At most 100 characters.",
        "sampleTestCases": [{ "input": "hi", "output": "hi" }],
        "hiddenTestCases": [{ "input": "secret", "output": "secret" }],
    })
}

async fn record(pool: &SqlitePool, user: &str, problem_id: i64, verdict: Verdict) {
    let mut submission = db::create_submission(pool, user, problem_id, "python", "")
        .await
        .unwrap();
    submission.status = SubmissionStatus::Completed;
    submission.verdict = Some(verdict);
    db::save_result(pool, &submission).await.unwrap();
}

#[actix_web::test]
async fn test_admin_routes_require_admin_header() {
    let ctx = setup().await;
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(ctx.pool.clone()))
            .app_data(web::Data::from(ctx.judge.clone()))
            .configure(api_routes),
    )
    .await;

    let req = test::TestRequest::get().uri("/api/admin/stats").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);

    let req = test::TestRequest::get()
        .uri("/api/admin/stats")
        .insert_header((USER_ID_HEADER, "alice"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["reason"], "ERR_FORBIDDEN");

    let req = test::TestRequest::post()
        .uri("/api/problems")
        .insert_header((USER_ID_HEADER, "alice"))
        .insert_header((ADMIN_HEADER, "false"))
        .set_json(echo_problem("Echo"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);
    assert!(db::list_problems(&ctx.pool).await.unwrap().is_empty());

    let req = test::TestRequest::get()
        .uri("/api/admin/top-problems")
        .insert_header((USER_ID_HEADER, "root"))
        .insert_header((ADMIN_HEADER, "TRUE"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
}

#[actix_web::test]
async fn test_create_and_update_problem() {
    let ctx = setup().await;
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(ctx.pool.clone()))
            .app_data(web::Data::from(ctx.judge.clone()))
            .configure(api_routes),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/problems")
        .insert_header((USER_ID_HEADER, "root"))
        .insert_header((ADMIN_HEADER, "true"))
        .set_json(echo_problem("Echo"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);

    let created: Value = test::read_body_json(resp).await;
    assert_json_include!(
        actual: created.clone(),
        expected: json!({
            "title": "Echo",
            "hiddenTestCases": [{ "input": "secret", "output": "secret" }],
        })
    );
    let id = created["id"].as_i64().unwrap();

    // contestants still only see the samples
    let req = test::TestRequest::get()
        .uri(&format!("/api/problems/{id}"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let statement: Value = test::read_body_json(resp).await;
    assert_eq!(statement["title"], "Echo");
    assert!(statement.get("hiddenTestCases").is_none());

    let mut edited = echo_problem("Loud Echo");
    edited["hiddenTestCases"] = json!([]);
    let req = test::TestRequest::put()
        .uri(&format!("/api/problems/{id}"))
        .insert_header((USER_ID_HEADER, "root"))
        .insert_header((ADMIN_HEADER, "true"))
        .set_json(&edited)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let stored = db::find_problem(&ctx.pool, id).await.unwrap().unwrap();
    assert_eq!(stored.title, "Loud Echo");
    assert!(stored.hidden_test_cases.is_empty());
    assert_eq!(stored.sample_test_cases.len(), 1);

    let req = test::TestRequest::put()
        .uri("/api/problems/999")
        .insert_header((USER_ID_HEADER, "root"))
        .insert_header((ADMIN_HEADER, "true"))
        .set_json(&edited)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
    assert_eq!(db::find_problem(&ctx.pool, 999).await.unwrap(), None);
}

#[actix_web::test]
async fn test_create_problem_rejects_bad_bodies() {
    let ctx = setup().await;
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(ctx.pool.clone()))
            .app_data(web::Data::from(ctx.judge.clone()))
            .configure(api_routes),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/problems")
        .insert_header((USER_ID_HEADER, "root"))
        .insert_header((ADMIN_HEADER, "true"))
        .set_json(echo_problem("  "))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    let req = test::TestRequest::post()
        .uri("/api/problems")
        .insert_header((USER_ID_HEADER, "root"))
        .insert_header((ADMIN_HEADER, "true"))
        .set_json(json!({ "title": "No description" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["reason"], "ERR_INVALID_ARGUMENT");

    assert!(db::list_problems(&ctx.pool).await.unwrap().is_empty());
}

#[actix_web::test]
async fn test_stats_and_top_problems() {
    let ctx = setup().await;
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(ctx.pool.clone()))
            .app_data(web::Data::from(ctx.judge.clone()))
            .configure(api_routes),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/api/admin/stats")
        .insert_header((USER_ID_HEADER, "root"))
        .insert_header((ADMIN_HEADER, "true"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(
        body,
        json!({ "totalUsers": 0, "totalSubmissions": 0, "passRate": "0.00" })
    );

    let mut ids = Vec::new();
    for title in ["Echo", "Reverse"] {
        let req = test::TestRequest::post()
            .uri("/api/problems")
            .insert_header((USER_ID_HEADER, "root"))
            .insert_header((ADMIN_HEADER, "true"))
            .set_json(echo_problem(title))
            .to_request();
        let created: Value = test::call_and_read_body_json(&app, req).await;
        ids.push(created["id"].as_i64().unwrap());
    }

    record(&ctx.pool, "alice", ids[0], Verdict::Pass).await;
    record(&ctx.pool, "bob", ids[1], Verdict::Pass).await;
    record(&ctx.pool, "carol", ids[1], Verdict::Pass).await;
    record(&ctx.pool, "carol", ids[0], Verdict::Fail).await;

    let req = test::TestRequest::get()
        .uri("/api/admin/stats")
        .insert_header((USER_ID_HEADER, "root"))
        .insert_header((ADMIN_HEADER, "true"))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(
        body,
        json!({ "totalUsers": 3, "totalSubmissions": 4, "passRate": "75.00" })
    );

    let req = test::TestRequest::get()
        .uri("/api/admin/top-problems")
        .insert_header((USER_ID_HEADER, "root"))
        .insert_header((ADMIN_HEADER, "true"))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(
        body,
        json!([
            { "problemId": ids[1], "title": "Reverse", "count": 2 },
            { "problemId": ids[0], "title": "Echo", "count": 1 },
        ])
    );
}
