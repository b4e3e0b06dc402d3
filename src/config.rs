use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

#[derive(Parser)]
#[command(name = "judge", version = "1.0", about, long_about = None)]
pub struct CliArgs {
    /// Path to the configuration file
    #[arg(long = "config", short = 'c')]
    pub config_path: String,

    /// Whether to flush the existing database
    #[arg(long = "flush-data", short = 'f', default_value_t = false)]
    pub flush_data: bool,
}

impl CliArgs {
    /// Load the configuration from the specified file
    pub fn to_config(&self) -> std::io::Result<Config> {
        let file = std::fs::File::open(&self.config_path)?;
        let reader = std::io::BufReader::new(file);
        serde_json::from_reader(reader).map_err(|e| e.into())
    }
}

#[derive(Deserialize, Debug)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub judge: JudgeConfig,
    #[serde(default)]
    pub toolchains: ToolchainConfig,
    #[serde(default)]
    pub problems: Vec<ProblemConfig>,
}

#[derive(Deserialize, Debug)]
pub struct ServerConfig {
    pub bind_address: Option<String>,
    pub bind_port: Option<u16>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct JudgeConfig {
    /// Root under which every submission gets its own workspace directory.
    /// Falls back to `<tmp>/judge-workspaces` when absent.
    pub workspace_root: Option<PathBuf>,
    pub compile_time_limit: MilliSecond,
    pub run_time_limit: MilliSecond,
    pub max_concurrent_judges: usize,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            workspace_root: None,
            compile_time_limit: MilliSecond(30_000),
            run_time_limit: MilliSecond(5_000),
            max_concurrent_judges: 4,
        }
    }
}

impl JudgeConfig {
    pub fn workspace_root(&self) -> PathBuf {
        self.workspace_root
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("judge-workspaces"))
    }
}

/// Toolchain binaries, looked up on `PATH` unless given as absolute paths
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ToolchainConfig {
    pub python: String,
    pub cxx: String,
    pub javac: String,
    pub java: String,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            cxx: "g++".to_string(),
            javac: "javac".to_string(),
            java: "java".to_string(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MilliSecond(pub u64);

impl From<MilliSecond> for Duration {
    fn from(value: MilliSecond) -> Self {
        Duration::from_millis(value.0)
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct ProblemConfig {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub input_format: String,
    #[serde(default)]
    pub output_format: String,
    #[serde(default)]
    pub constraints: String,
    #[serde(default)]
    pub sample_test_cases: Vec<TestCaseConfig>,
    #[serde(default)]
    pub hidden_test_cases: Vec<TestCaseConfig>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TestCaseConfig {
    pub input: Option<String>,
    pub output: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserialization() {
        let file = std::fs::File::open("data/example.json").unwrap();
        let reader = std::io::BufReader::new(file);
        let config: Config = serde_json::from_reader(reader).unwrap();
        assert_eq!(config.server.bind_address, Some("127.0.0.1".to_string()));
        assert_eq!(config.judge.run_time_limit, MilliSecond(2000));
        assert_eq!(config.problems[0].title, "Sum of Two Numbers");
        assert_eq!(
            config.problems[0].sample_test_cases[0],
            TestCaseConfig {
                input: Some("2 3".to_string()),
                output: "5".to_string(),
            }
        );
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config: Config = serde_json::from_str(r#"{"server": {}}"#).unwrap();
        assert_eq!(config.server.bind_port, None);
        assert_eq!(config.judge.compile_time_limit, MilliSecond(30_000));
        assert_eq!(config.judge.max_concurrent_judges, 4);
        assert_eq!(config.toolchains, ToolchainConfig::default());
        assert!(config.problems.is_empty());
    }

    #[test]
    fn test_partial_judge_section() {
        let config: Config = serde_json::from_str(
            r#"{"server": {}, "judge": {"workspace_root": "/srv/ws", "max_concurrent_judges": 1}}"#,
        )
        .unwrap();
        assert_eq!(config.judge.workspace_root(), PathBuf::from("/srv/ws"));
        assert_eq!(config.judge.max_concurrent_judges, 1);
        assert_eq!(config.judge.run_time_limit, MilliSecond(5_000));
    }
}
