mod language;
mod process;
mod workspace;

pub use language::{Invocation, Language, SourceName, UnsupportedLanguage};
pub use process::{LocalRunner, OUTPUT_LIMIT, ProcessOutput, ProcessRunner, Termination};
pub use workspace::{Workspace, WorkspaceManager};
