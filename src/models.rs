use std::fmt;
use std::str::FromStr;

use anyhow::{Error, anyhow};
use serde::{Deserialize, Serialize};

use crate::config::{ProblemConfig, TestCaseConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionStatus {
    Pending,
    Running,
    Completed,
    Error,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Completed => "Completed",
            Self::Error => "Error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl FromStr for SubmissionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Running" => Ok(Self::Running),
            "Completed" => Ok(Self::Completed),
            "Error" => Ok(Self::Error),
            other => Err(anyhow!("Unknown submission status `{other}`")),
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Pass,
    Fail,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "Pass",
            Self::Fail => "Fail",
        }
    }
}

impl FromStr for Verdict {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pass" => Ok(Self::Pass),
            "Fail" => Ok(Self::Fail),
            other => Err(anyhow!("Unknown verdict `{other}`")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlagiarismReport {
    pub is_flagged: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub most_similar_submission_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity_score: Option<f64>,
    /// Set when the check itself failed and the report is a fallback
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PlagiarismReport {
    pub fn unflagged() -> Self {
        Self {
            is_flagged: false,
            most_similar_submission_id: None,
            similarity_score: None,
            error: None,
        }
    }

    pub fn flagged(submission_id: i64, score: f64) -> Self {
        Self {
            is_flagged: true,
            most_similar_submission_id: Some(submission_id),
            similarity_score: Some(score),
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::unflagged()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: i64,
    pub user_id: String,
    pub problem_id: i64,
    pub language: String,
    pub code: String,
    pub status: SubmissionStatus,
    pub verdict: Option<Verdict>,
    pub output: String,
    pub error: String,
    pub created_time: String,
    pub updated_time: String,
    pub plagiarism_report: Option<PlagiarismReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: Option<String>,
    pub output: String,
}

impl From<TestCaseConfig> for TestCase {
    fn from(config: TestCaseConfig) -> Self {
        Self {
            input: config.input,
            output: config.output,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub input_format: String,
    pub output_format: String,
    pub constraints: String,
    pub sample_test_cases: Vec<TestCase>,
    pub hidden_test_cases: Vec<TestCase>,
}

impl Problem {
    /// Hidden cases first, then samples
    pub fn judging_order(&self) -> impl Iterator<Item = &TestCase> {
        self.hidden_test_cases
            .iter()
            .chain(self.sample_test_cases.iter())
    }
}

impl From<ProblemConfig> for Problem {
    fn from(config: ProblemConfig) -> Self {
        Self {
            id: config.id,
            title: config.title,
            description: config.description,
            input_format: config.input_format,
            output_format: config.output_format,
            constraints: config.constraints,
            sample_test_cases: config.sample_test_cases.into_iter().map(Into::into).collect(),
            hidden_test_cases: config.hidden_test_cases.into_iter().map(Into::into).collect(),
        }
    }
}
