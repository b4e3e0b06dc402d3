use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteSynchronous,
};

use crate::create_timestamp;
use crate::models::{PlagiarismReport, Problem, Submission, SubmissionStatus, TestCase, Verdict};

const DATABASE_NAME: &str = "judge.sqlite3";

const SUBMISSION_COLUMNS: &str = "id, created_time, updated_time, user_id, problem_id, language, \
     code, status, verdict, output, error, plagiarism_flagged, plagiarism_submission_id, \
     plagiarism_score, plagiarism_error";

pub fn get_db_path() -> PathBuf {
    use directories::ProjectDirs;

    let proj_dirs = ProjectDirs::from("", "", "judge").expect("Unable to find user directory");
    let data_dir = proj_dirs.data_local_dir();

    fs::create_dir_all(data_dir).expect("Failed to create local data dir");

    data_dir.join(DATABASE_NAME)
}

pub async fn init_db(db_path: impl AsRef<Path>) -> sqlx::Result<SqlitePool> {
    // Connection options apply to every pooled connection, not just the first
    let options = SqliteConnectOptions::new()
        .filename(db_path.as_ref())
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(2))
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal);

    let db_pool = SqlitePoolOptions::new()
        .max_connections(4)
        .min_connections(0)
        .connect_with(options)
        .await?;

    let mut tx = db_pool.begin().await?;

    for sql in &[
        r"
        CREATE TABLE IF NOT EXISTS problems (
            id             INTEGER  PRIMARY KEY,
            title          TEXT     NOT NULL,
            description    TEXT     NOT NULL DEFAULT '',
            input_format   TEXT     NOT NULL DEFAULT '',
            output_format  TEXT     NOT NULL DEFAULT '',
            constraints    TEXT     NOT NULL DEFAULT ''
        );",
        r"
        CREATE TABLE IF NOT EXISTS test_cases (
            problem_id     INTEGER  NOT NULL,
            hidden         INTEGER  NOT NULL,
            position       INTEGER  NOT NULL,
            input          TEXT,
            output         TEXT     NOT NULL,
            PRIMARY KEY (problem_id, hidden, position),
            FOREIGN KEY (problem_id)  REFERENCES problems (id) ON DELETE CASCADE
        );",
        r"
        CREATE TABLE IF NOT EXISTS submissions (
            id                        INTEGER  PRIMARY KEY AUTOINCREMENT,
            created_time              TEXT     NOT NULL,
            updated_time              TEXT     NOT NULL,
            user_id                   TEXT     NOT NULL,
            problem_id                INTEGER  NOT NULL,
            language                  TEXT     NOT NULL,
            code                      TEXT     NOT NULL,
            status                    TEXT     NOT NULL,
            verdict                   TEXT,
            output                    TEXT     NOT NULL DEFAULT '',
            error                     TEXT     NOT NULL DEFAULT '',
            plagiarism_flagged        INTEGER,
            plagiarism_submission_id  INTEGER,
            plagiarism_score          REAL,
            plagiarism_error          TEXT
        );",
        "CREATE INDEX IF NOT EXISTS idx_submissions_problem ON submissions(problem_id, verdict);",
        "CREATE INDEX IF NOT EXISTS idx_submissions_user ON submissions(user_id);",
    ] {
        sqlx::query(sql).execute(tx.as_mut()).await?;
    }

    tx.commit().await?;

    log::info!("Initialized database at {}", db_path.as_ref().display());

    Ok(db_pool)
}

pub fn remove_db(db_path: impl AsRef<Path>) {
    // Remove WAL and SHM files (ignore errors as they might not exist)
    let wal_path = format!("{}-wal", db_path.as_ref().display());
    let shm_path = format!("{}-shm", db_path.as_ref().display());
    let _ = fs::remove_file(wal_path);
    let _ = fs::remove_file(shm_path);

    if let Err(e) = std::fs::remove_file(&db_path) {
        log::warn!(
            "Unable to remove database at {}: {e}",
            db_path.as_ref().display()
        );
    } else {
        log::info!("Removed database at {}", db_path.as_ref().display());
    }
}

/// Inserts the problem or overwrites the stored one, replacing all of its test cases
pub async fn upsert_problem(pool: &SqlitePool, problem: &Problem) -> sqlx::Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO problems (id, title, description, input_format, output_format, constraints)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            title = excluded.title,
            description = excluded.description,
            input_format = excluded.input_format,
            output_format = excluded.output_format,
            constraints = excluded.constraints
        "#,
    )
    .bind(problem.id)
    .bind(&problem.title)
    .bind(&problem.description)
    .bind(&problem.input_format)
    .bind(&problem.output_format)
    .bind(&problem.constraints)
    .execute(tx.as_mut())
    .await?;

    replace_test_cases(tx.as_mut(), problem.id, problem).await?;

    tx.commit().await?;
    log::debug!("Stored problem {} ({})", problem.id, problem.title);
    Ok(())
}

/// Inserts `problem` under a freshly assigned id, ignoring `problem.id`
///
/// Returns the assigned id.
pub async fn create_problem(pool: &SqlitePool, problem: &Problem) -> sqlx::Result<i64> {
    let mut tx = pool.begin().await?;

    let id = sqlx::query(
        r#"
        INSERT INTO problems (title, description, input_format, output_format, constraints)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&problem.title)
    .bind(&problem.description)
    .bind(&problem.input_format)
    .bind(&problem.output_format)
    .bind(&problem.constraints)
    .execute(tx.as_mut())
    .await?
    .last_insert_rowid();

    replace_test_cases(tx.as_mut(), id, problem).await?;

    tx.commit().await?;
    log::debug!("Created problem {id} ({})", problem.title);
    Ok(id)
}

async fn replace_test_cases(
    conn: &mut SqliteConnection,
    problem_id: i64,
    problem: &Problem,
) -> sqlx::Result<()> {
    sqlx::query("DELETE FROM test_cases WHERE problem_id = ?")
        .bind(problem_id)
        .execute(&mut *conn)
        .await?;

    let cases = problem
        .sample_test_cases
        .iter()
        .enumerate()
        .map(|(i, case)| (false, i, case))
        .chain(
            problem
                .hidden_test_cases
                .iter()
                .enumerate()
                .map(|(i, case)| (true, i, case)),
        );
    for (hidden, position, case) in cases {
        sqlx::query(
            r#"
            INSERT INTO test_cases (problem_id, hidden, position, input, output)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(problem_id)
        .bind(hidden)
        .bind(position as i64)
        .bind(&case.input)
        .bind(&case.output)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

#[derive(sqlx::FromRow)]
struct ProblemRow {
    id: i64,
    title: String,
    description: String,
    input_format: String,
    output_format: String,
    constraints: String,
}

#[derive(sqlx::FromRow)]
struct TestCaseRow {
    problem_id: i64,
    hidden: bool,
    input: Option<String>,
    output: String,
}

impl ProblemRow {
    fn into_problem(self, cases: impl IntoIterator<Item = TestCaseRow>) -> Problem {
        let mut problem = Problem {
            id: self.id,
            title: self.title,
            description: self.description,
            input_format: self.input_format,
            output_format: self.output_format,
            constraints: self.constraints,
            sample_test_cases: Vec::new(),
            hidden_test_cases: Vec::new(),
        };
        for row in cases {
            let case = TestCase {
                input: row.input,
                output: row.output,
            };
            if row.hidden {
                problem.hidden_test_cases.push(case);
            } else {
                problem.sample_test_cases.push(case);
            }
        }
        problem
    }
}

pub async fn find_problem(pool: &SqlitePool, id: i64) -> sqlx::Result<Option<Problem>> {
    let Some(row) = sqlx::query_as::<_, ProblemRow>(
        r#"
        SELECT id, title, description, input_format, output_format, constraints
        FROM problems
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    else {
        return Ok(None);
    };

    let cases = sqlx::query_as::<_, TestCaseRow>(
        r#"
        SELECT problem_id, hidden, input, output
        FROM test_cases
        WHERE problem_id = ?
        ORDER BY position
        "#,
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    Ok(Some(row.into_problem(cases)))
}

pub async fn list_problems(pool: &SqlitePool) -> sqlx::Result<Vec<Problem>> {
    let rows = sqlx::query_as::<_, ProblemRow>(
        r#"
        SELECT id, title, description, input_format, output_format, constraints
        FROM problems
        ORDER BY id
        "#,
    )
    .fetch_all(pool)
    .await?;

    let cases = sqlx::query_as::<_, TestCaseRow>(
        r#"
        SELECT problem_id, hidden, input, output
        FROM test_cases
        ORDER BY problem_id, position
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut cases = cases.into_iter().peekable();
    let mut problems = Vec::with_capacity(rows.len());
    for row in rows {
        let id = row.id;
        let mut own = Vec::new();
        while let Some(case) = cases.next_if(|c| c.problem_id <= id) {
            if case.problem_id == id {
                own.push(case);
            }
        }
        problems.push(row.into_problem(own));
    }

    Ok(problems)
}

#[derive(sqlx::FromRow)]
struct SubmissionRow {
    id: i64,
    created_time: String,
    updated_time: String,
    user_id: String,
    problem_id: i64,
    language: String,
    code: String,
    status: String,
    verdict: Option<String>,
    output: String,
    error: String,
    plagiarism_flagged: Option<bool>,
    plagiarism_submission_id: Option<i64>,
    plagiarism_score: Option<f64>,
    plagiarism_error: Option<String>,
}

impl TryFrom<SubmissionRow> for Submission {
    type Error = sqlx::Error;

    fn try_from(row: SubmissionRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<SubmissionStatus>()
            .map_err(|e: anyhow::Error| sqlx::Error::Decode(e.into()))?;
        let verdict = row
            .verdict
            .as_deref()
            .map(str::parse::<Verdict>)
            .transpose()
            .map_err(|e: anyhow::Error| sqlx::Error::Decode(e.into()))?;
        let plagiarism_report = row.plagiarism_flagged.map(|is_flagged| PlagiarismReport {
            is_flagged,
            most_similar_submission_id: row.plagiarism_submission_id,
            similarity_score: row.plagiarism_score,
            error: row.plagiarism_error,
        });

        Ok(Submission {
            id: row.id,
            user_id: row.user_id,
            problem_id: row.problem_id,
            language: row.language,
            code: row.code,
            status,
            verdict,
            output: row.output,
            error: row.error,
            created_time: row.created_time,
            updated_time: row.updated_time,
            plagiarism_report,
        })
    }
}

/// Inserts a new `Pending` submission and returns it
pub async fn create_submission(
    pool: &SqlitePool,
    user_id: &str,
    problem_id: i64,
    language: &str,
    code: &str,
) -> sqlx::Result<Submission> {
    let now = create_timestamp();

    let result = sqlx::query(
        r#"
        INSERT INTO submissions (user_id, problem_id, language, code, status, created_time, updated_time)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(problem_id)
    .bind(language)
    .bind(code)
    .bind(SubmissionStatus::Pending.as_str())
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    Ok(Submission {
        id: result.last_insert_rowid(),
        user_id: user_id.to_string(),
        problem_id,
        language: language.to_string(),
        code: code.to_string(),
        status: SubmissionStatus::Pending,
        verdict: None,
        output: String::new(),
        error: String::new(),
        created_time: now.clone(),
        updated_time: now,
        plagiarism_report: None,
    })
}

pub async fn update_status(
    pool: &SqlitePool,
    id: i64,
    status: SubmissionStatus,
) -> sqlx::Result<String> {
    let now = create_timestamp();

    sqlx::query(
        r#"
        UPDATE submissions
        SET status = ?, updated_time = ?
        WHERE id = ?
        "#,
    )
    .bind(status.as_str())
    .bind(&now)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(now)
}

/// Writes the judged state of `submission` back: status, verdict, logs and report
pub async fn save_result(pool: &SqlitePool, submission: &Submission) -> sqlx::Result<String> {
    let now = create_timestamp();
    let report = submission.plagiarism_report.as_ref();

    sqlx::query(
        r#"
        UPDATE submissions
        SET status = ?, verdict = ?, output = ?, error = ?,
            plagiarism_flagged = ?, plagiarism_submission_id = ?,
            plagiarism_score = ?, plagiarism_error = ?,
            updated_time = ?
        WHERE id = ?
        "#,
    )
    .bind(submission.status.as_str())
    .bind(submission.verdict.map(|v| v.as_str()))
    .bind(&submission.output)
    .bind(&submission.error)
    .bind(report.map(|r| r.is_flagged))
    .bind(report.and_then(|r| r.most_similar_submission_id))
    .bind(report.and_then(|r| r.similarity_score))
    .bind(report.and_then(|r| r.error.as_deref()))
    .bind(&now)
    .bind(submission.id)
    .execute(pool)
    .await?;

    Ok(now)
}

pub async fn fetch_submission(pool: &SqlitePool, id: i64) -> sqlx::Result<Submission> {
    let sql = format!("SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE id = ?");
    sqlx::query_as::<_, SubmissionRow>(&sql)
        .bind(id)
        .fetch_one(pool)
        .await?
        .try_into()
}

pub async fn fetch_submissions_by_user(
    pool: &SqlitePool,
    user_id: &str,
) -> sqlx::Result<Vec<Submission>> {
    let sql = format!("SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE user_id = ? ORDER BY id");
    sqlx::query_as::<_, SubmissionRow>(&sql)
        .bind(user_id)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(Submission::try_from)
        .collect()
}

pub async fn fetch_submissions_by_problem(
    pool: &SqlitePool,
    problem_id: i64,
) -> sqlx::Result<Vec<Submission>> {
    let sql =
        format!("SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE problem_id = ? ORDER BY id");
    sqlx::query_as::<_, SubmissionRow>(&sql)
        .bind(problem_id)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(Submission::try_from)
        .collect()
}

/// Every passing submission of `problem_id` except `exclude_id`, oldest first
pub async fn find_passing_submissions(
    pool: &SqlitePool,
    problem_id: i64,
    exclude_id: i64,
) -> sqlx::Result<Vec<Submission>> {
    let sql = format!(
        "SELECT {SUBMISSION_COLUMNS} FROM submissions \
         WHERE problem_id = ? AND id != ? AND verdict = 'Pass' ORDER BY id"
    );
    sqlx::query_as::<_, SubmissionRow>(&sql)
        .bind(problem_id)
        .bind(exclude_id)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(Submission::try_from)
        .collect()
}

/// Marks submissions a previous process left unfinished as failed
///
/// Returns the number of records touched.
pub async fn fail_unfinished_submissions(pool: &SqlitePool, reason: &str) -> sqlx::Result<u64> {
    let now = create_timestamp();

    let result = sqlx::query(
        r#"
        UPDATE submissions
        SET status = 'Error', verdict = NULL, error = ?, updated_time = ?
        WHERE status IN ('Pending', 'Running')
        "#,
    )
    .bind(reason)
    .bind(&now)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Platform-wide submission counters
#[derive(sqlx::FromRow, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionCounts {
    /// Distinct users that submitted at least once
    pub total_users: i64,
    pub total_submissions: i64,
    pub total_passed: i64,
}

pub async fn count_submissions(pool: &SqlitePool) -> sqlx::Result<SubmissionCounts> {
    sqlx::query_as::<_, SubmissionCounts>(
        r#"
        SELECT COUNT(DISTINCT user_id) AS total_users,
               COUNT(*) AS total_submissions,
               COUNT(CASE WHEN verdict = 'Pass' THEN 1 END) AS total_passed
        FROM submissions
        "#,
    )
    .fetch_one(pool)
    .await
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SolvedProblem {
    pub problem_id: i64,
    pub title: String,
    pub count: i64,
}

/// Problems with the most passing submissions, most solved first
///
/// Passing submissions for problems that no longer exist are not counted.
pub async fn most_solved_problems(
    pool: &SqlitePool,
    limit: i64,
) -> sqlx::Result<Vec<SolvedProblem>> {
    sqlx::query_as::<_, SolvedProblem>(
        r#"
        SELECT s.problem_id AS problem_id, p.title AS title, COUNT(*) AS count
        FROM submissions s
        JOIN problems p ON p.id = s.problem_id
        WHERE s.verdict = 'Pass'
        GROUP BY s.problem_id, p.title
        ORDER BY COUNT(*) DESC, s.problem_id
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
}
