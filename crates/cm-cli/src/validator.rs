//! The validator web server, run as a child process.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::Context;
use cm_core::AppConfig;
use tokio::process::{Child, Command};

const SERVER_BIN: &str = if cfg!(windows) {
    "cm-server.exe"
} else {
    "cm-server"
};

/// Where to find the server: `CM_SERVER_BIN`, else next to this executable.
pub(crate) fn server_binary_path(configured: Option<&Path>, current_exe: &Path) -> PathBuf {
    configured.map_or_else(|| current_exe.with_file_name(SERVER_BIN), Path::to_path_buf)
}

pub(crate) struct Validator {
    child: Child,
    path: PathBuf,
}

impl Validator {
    /// Starts the server with this process's environment.
    ///
    /// # Errors
    ///
    /// Fails when the binary cannot be located or started.
    pub(crate) fn spawn(config: &AppConfig) -> anyhow::Result<Self> {
        let current_exe = std::env::current_exe().context("cannot locate the running executable")?;
        let path = server_binary_path(config.server_bin.as_deref(), &current_exe);
        let child = Command::new(&path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to start validator server at {}", path.display()))?;
        tracing::info!(
            path = %path.display(),
            pid = child.id(),
            addr = %config.bind_addr,
            "validator server started"
        );
        Ok(Self { child, path })
    }

    /// Waits for the server to exit on its own, or stops it on shutdown.
    pub(crate) async fn wait_or_shutdown<F: Future<Output = ()>>(&mut self, shutdown: F) {
        tokio::select! {
            status = self.child.wait() => match status {
                Ok(status) => tracing::info!(path = %self.path.display(), %status, "validator server exited"),
                Err(e) => tracing::error!(error = %e, "could not wait on validator server"),
            },
            () = shutdown => self.stop().await,
        }
    }

    /// Kills the server if it is still running and reaps it.
    pub(crate) async fn stop(&mut self) {
        match self.child.try_wait() {
            Ok(Some(status)) => {
                tracing::info!(%status, "validator server had already exited");
                return;
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "could not poll validator server"),
        }
        if let Err(e) = self.child.kill().await {
            tracing::warn!(error = %e, "could not stop validator server");
        } else {
            tracing::info!("validator server stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_binary_wins() {
        let path = server_binary_path(
            Some(Path::new("/opt/cm/bin/cm-server")),
            Path::new("/usr/local/bin/content-machine"),
        );
        assert_eq!(path, PathBuf::from("/opt/cm/bin/cm-server"));
    }

    #[test]
    fn default_binary_is_a_sibling_of_the_cli() {
        let path = server_binary_path(None, Path::new("/usr/local/bin/content-machine"));
        assert_eq!(path, Path::new("/usr/local/bin").join(SERVER_BIN));
    }
}
