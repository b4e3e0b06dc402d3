use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::ToolchainConfig;

/// Name of the native executable produced by compiled languages
const EXECUTABLE_NAME: &str = "main";
/// Entry class the managed runtime is told to load
const JAVA_ENTRY_CLASS: &str = "Main";

/// Languages the judge knows how to build and run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    /// Interpreted, the source runs directly
    Python,
    /// Compiled to a native executable
    Cpp,
    /// Compiled to a class file and run on the JVM
    Java,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedLanguage(pub String);

impl fmt::Display for UnsupportedLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported language `{}`", self.0)
    }
}

impl std::error::Error for UnsupportedLanguage {}

impl FromStr for Language {
    type Err = UnsupportedLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "python" => Ok(Self::Python),
            "cpp" => Ok(Self::Cpp),
            "java" => Ok(Self::Java),
            other => Err(UnsupportedLanguage(other.to_string())),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

/// How the staged source file is named
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceName {
    /// `main.<extension>`
    Extension(&'static str),
    /// A name mandated by the toolchain
    Fixed(&'static str),
}

/// One external command line, fully resolved against a workspace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl Invocation {
    fn new(program: impl Into<String>, args: Vec<String>, cwd: &Path) -> Self {
        Self {
            program: program.into(),
            args,
            cwd: cwd.to_path_buf(),
        }
    }
}

impl Language {
    pub const ALL: [Language; 3] = [Language::Python, Language::Cpp, Language::Java];

    pub fn identifier(&self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::Cpp => "cpp",
            Self::Java => "java",
        }
    }

    pub fn source_name(&self) -> SourceName {
        match self {
            Self::Python => SourceName::Extension("py"),
            Self::Cpp => SourceName::Extension("cpp"),
            Self::Java => SourceName::Fixed("Main.java"),
        }
    }

    pub fn source_file_name(&self) -> String {
        match self.source_name() {
            SourceName::Extension(ext) => format!("main.{ext}"),
            SourceName::Fixed(name) => name.to_string(),
        }
    }

    /// Files a successful compile leaves behind in `dir`
    pub fn artifacts(&self, dir: &Path) -> Vec<PathBuf> {
        match self {
            Self::Python => Vec::new(),
            Self::Cpp => vec![dir.join(EXECUTABLE_NAME)],
            Self::Java => vec![dir.join(format!("{JAVA_ENTRY_CLASS}.class"))],
        }
    }

    /// Returns `None` for languages that run straight from source
    pub fn compile_step(
        &self,
        toolchains: &ToolchainConfig,
        dir: &Path,
        source: &Path,
    ) -> Option<Invocation> {
        let source = source.to_string_lossy().into_owned();
        match self {
            Self::Python => None,
            Self::Cpp => {
                let output = dir.join(EXECUTABLE_NAME).to_string_lossy().into_owned();
                Some(Invocation::new(
                    &toolchains.cxx,
                    vec![source, "-o".to_string(), output],
                    dir,
                ))
            }
            Self::Java => Some(Invocation::new(&toolchains.javac, vec![source], dir)),
        }
    }

    pub fn run_step(&self, toolchains: &ToolchainConfig, dir: &Path, source: &Path) -> Invocation {
        match self {
            Self::Python => Invocation::new(
                &toolchains.python,
                vec![source.to_string_lossy().into_owned()],
                dir,
            ),
            Self::Cpp => Invocation::new(
                dir.join(EXECUTABLE_NAME).to_string_lossy().into_owned(),
                Vec::new(),
                dir,
            ),
            Self::Java => Invocation::new(
                &toolchains.java,
                vec![JAVA_ENTRY_CLASS.to_string()],
                dir,
            ),
        }
    }
}
