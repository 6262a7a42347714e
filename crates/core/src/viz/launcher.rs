//! Hands session scripts to the molecular viewer.
//!
//! Launching never blocks on the viewer: the process is spawned, a task
//! reaps it in the background, and a receipt comes back right away.

use crate::config::models::ServiceConfig;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::executor::resolve_executable;
use crate::viz::session::VIZ_DIR;
use crate::workflow::metadata::write_atomically;
use crate::workflow::quota;
use async_trait::async_trait;
use chrono::Utc;
use mdk_protocol::{LaunchReceipt, SessionScript};
use std::fs::File;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Executable names tried when no viewer path is configured.
pub const VMD_CANDIDATES: &[&str] = &["vmd"];

/// Something that can display a session.
#[async_trait]
pub trait VisualizationLauncher: Send + Sync {
    /// Starts the viewer on `session` and returns without waiting for it.
    ///
    /// With `headless` the viewer runs without a display and exits when the
    /// script ends.
    async fn launch(&self, session: &SessionScript, headless: bool) -> OrchestratorResult<LaunchReceipt>;
}

/// Launches VMD.
pub struct VmdLauncher {
    config: Arc<ServiceConfig>,
}

impl VmdLauncher {
    pub fn new(config: Arc<ServiceConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl VisualizationLauncher for VmdLauncher {
    async fn launch(&self, session: &SessionScript, headless: bool) -> OrchestratorResult<LaunchReceipt> {
        let vmd = resolve_executable(&self.config.global.tools.vmd_path, VMD_CANDIDATES)?;

        quota::ensure_capacity(
            session.workflow_id,
            &session.working_dir,
            self.config.size_ceiling_bytes(),
            session.script.len() as u64,
        )?;

        let viz_dir = session.working_dir.join(VIZ_DIR);
        std::fs::create_dir_all(&viz_dir).map_err(|e| OrchestratorError::io(&viz_dir, e))?;

        let stem = format!(
            "session-{}-{}",
            Utc::now().format("%Y%m%dT%H%M%S%3f"),
            session.template
        );
        let script_path = viz_dir.join(format!("{stem}.tcl"));
        write_atomically(&script_path, session.script.as_bytes())?;

        let log_path = viz_dir.join(format!("{stem}.log"));
        let log = File::create(&log_path).map_err(|e| OrchestratorError::io(&log_path, e))?;
        let log_err = log.try_clone().map_err(|e| OrchestratorError::io(&log_path, e))?;

        let mut cmd = Command::new(&vmd);
        if headless {
            cmd.args(["-dispdev", "text", "-eofexit"]);
        }
        cmd.arg("-e")
            .arg(&script_path)
            .current_dir(&session.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err));

        let mut child = cmd
            .spawn()
            .map_err(|e| OrchestratorError::io(&vmd, e))?;
        let pid = child.id();
        info!(workflow_id = %session.workflow_id, ?pid, headless, script = %script_path.display(), "Viewer launched");

        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => debug!(?pid, %status, "Viewer exited"),
                Err(err) => warn!(?pid, error = %err, "Lost track of viewer"),
            }
        });

        Ok(LaunchReceipt {
            pid,
            script_path,
            headless,
        })
    }
}
