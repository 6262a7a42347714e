//! External process execution for pipeline stages.
//!
//! - [`process`]: one child process with timeout and graceful termination
//! - [`stage`]: runs a stage's command sequence and records the attempt

pub mod process;
pub mod stage;

pub use process::{ProcessHandle, ProcessOutcome, ProcessState};
pub use stage::{StageExecutor, StageInput, StageRequest};

use crate::error::{OrchestratorError, OrchestratorResult, ResourceKind};
use std::path::PathBuf;

/// Finds an executable, preferring an explicitly configured path.
///
/// `configured` may be an absolute path, a relative path, or a bare name to
/// look up on `PATH`. When it is empty the `candidates` are tried in order.
///
/// # Errors
///
/// Returns `NotFound` with kind `Executable` if nothing resolves.
pub fn resolve_executable(configured: &str, candidates: &[&str]) -> OrchestratorResult<PathBuf> {
    let not_found = |name: &str| OrchestratorError::NotFound {
        kind: ResourceKind::Executable,
        name: name.to_string(),
    };

    let configured = configured.trim();
    if !configured.is_empty() {
        return which::which(configured).map_err(|_| not_found(configured));
    }

    candidates
        .iter()
        .find_map(|name| which::which(name).ok())
        .ok_or_else(|| not_found(&candidates.join(" or ")))
}
