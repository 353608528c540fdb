use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;
use url::Url;

/// An isolated data directory and file backend for one test.
pub struct Env {
    pub temp: TempDir,
}

impl Env {
    pub fn new() -> Self {
        Self {
            temp: TempDir::new().unwrap(),
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.temp.path().join("data")
    }

    pub fn remote_dir(&self) -> PathBuf {
        self.temp.path().join("remote")
    }

    pub fn remote_url(&self) -> String {
        file_url(&self.remote_dir())
    }

    /// Write a file under the temp dir and return its path as a string.
    pub fn write(&self, name: &str, content: &str) -> String {
        let path = self.temp.path().join(name);
        std::fs::write(&path, content).unwrap();
        path.to_string_lossy().to_string()
    }

    /// Run the CLI against this environment, optionally with a backend URL.
    pub fn run(&self, args: &[&str], with_backend: bool) -> Output {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_agora"));
        cmd.args(args);
        cmd.env("HOME", self.temp.path().join("home"));
        cmd.env("XDG_DATA_HOME", self.temp.path().join("home/data"));
        cmd.env("AGORA_DATA_DIR", self.data_dir());
        cmd.env("NO_COLOR", "1");
        cmd.env_remove("AGORA_API_KEY");
        cmd.env_remove("AGORA_ACCESS_TOKEN");
        cmd.env_remove("RUST_LOG");
        if with_backend {
            cmd.env("AGORA_URL", self.remote_url());
        } else {
            cmd.env_remove("AGORA_URL");
        }
        cmd.output().expect("Failed to execute CLI")
    }

    /// Run the CLI and expect success.
    pub fn run_success(&self, args: &[&str], with_backend: bool) -> String {
        let output = self.run(args, with_backend);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            panic!("CLI command failed: {:?}\nstderr: {}", args, stderr);
        }
        String::from_utf8_lossy(&output.stdout).to_string()
    }
}

fn file_url(path: &Path) -> String {
    Url::from_directory_path(path)
        .expect("Failed to convert path to file URL")
        .to_string()
}
