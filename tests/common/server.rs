//! Process-level test harness.
//!
//! Builds a throwaway config, spawns the shelfd binary against it, and
//! tears both down when the test finishes.

use std::path::PathBuf;
use std::process::{Child, Command};
use std::time::Duration;
use tokio::time::sleep;

/// A running shelfd child process and its scratch directory.
pub struct TestServer {
    child: Child,
    port: u16,
    metrics_port: u16,
    data_dir: PathBuf,
}

impl TestServer {
    /// Spawn a test server with the built-in admission profiles.
    /// A `metrics_port` of 0 leaves the ops server off.
    pub async fn spawn(port: u16, metrics_port: u16) -> anyhow::Result<Self> {
        Self::spawn_with(port, metrics_port, "development", "").await
    }

    /// Spawn a test server with a custom environment and an extra TOML
    /// fragment appended to the config (admission profiles, telemetry caps).
    pub async fn spawn_with(
        port: u16,
        metrics_port: u16,
        environment: &str,
        extra_toml: &str,
    ) -> anyhow::Result<Self> {
        // Scratch directory keyed by port so parallel tests stay apart.
        let data_dir = std::env::temp_dir().join(format!("shelfd-test-{}", port));
        std::fs::create_dir_all(&data_dir)?;

        let config_path = data_dir.join("config.toml");
        let config_content = format!(
            r#"
[server]
listen = "127.0.0.1:{}"
metrics_port = {}
environment = "{}"

[database]
path = "{}/test.db"

{}
"#,
            port,
            metrics_port,
            environment,
            data_dir.display(),
            extra_toml
        );

        std::fs::write(&config_path, config_content)?;

        // `cargo test` compiles the bin target before integration tests run,
        // so the debug binary is guaranteed to exist here.
        let cargo_manifest_dir = env!("CARGO_MANIFEST_DIR");
        let binary_path = PathBuf::from(cargo_manifest_dir).join("target/debug/shelfd");

        let child = Command::new(&binary_path)
            .arg(config_path.to_str().unwrap())
            .spawn()?;

        let server = Self {
            child,
            port,
            metrics_port,
            data_dir,
        };

        server.wait_until_ready().await?;

        Ok(server)
    }

    /// Wait until the server (and the ops server, if enabled) accepts
    /// connections.
    async fn wait_until_ready(&self) -> anyhow::Result<()> {
        self.wait_for_port(self.port).await?;
        if self.metrics_port != 0 {
            self.wait_for_port(self.metrics_port).await?;
        }
        Ok(())
    }

    async fn wait_for_port(&self, port: u16) -> anyhow::Result<()> {
        for _ in 0..30 {
            if tokio::net::TcpStream::connect(("127.0.0.1", port))
                .await
                .is_ok()
            {
                return Ok(());
            }
            sleep(Duration::from_millis(100)).await;
        }
        anyhow::bail!("Server failed to start within 3 seconds on port {}", port)
    }

    /// URL of a books API route.
    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }

    /// URL of an ops server route.
    pub fn ops_url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.metrics_port, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        // Reap the child so it cannot outlive the test run.
        let _ = self.child.kill();
        let _ = self.child.wait();

        // Best effort; a still-open SQLite handle just leaves a stale temp dir.
        let _ = std::fs::remove_dir_all(&self.data_dir);
    }
}
