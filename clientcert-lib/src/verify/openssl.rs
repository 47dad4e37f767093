//! Verification through the `openssl verify` executable.
//!
//! The certificate and CA bundle are written to uniquely named temporary
//! files that are removed when they go out of scope, on success, failure
//! or timeout alike. Output goes to anonymous temp files instead of pipes so
//! the child can never block on a full pipe while we poll it.

use super::{ChainVerifier, VerifierOutput};
use crate::ClientCertError;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant, SystemTime};

/// Prefix of every temporary file this crate writes.
pub const TEMP_FILE_PREFIX: &str = "clientcert-";

/// Default upper bound on one `openssl verify` run.
pub const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_secs(10);

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Runs `openssl verify -CAfile <bundle> <cert>`.
#[derive(Debug, Clone)]
pub struct OpensslVerifier {
    program: PathBuf,
    timeout: Duration,
    temp_dir: PathBuf,
}

impl Default for OpensslVerifier {
    fn default() -> Self {
        OpensslVerifier {
            program: PathBuf::from("openssl"),
            timeout: DEFAULT_VERIFY_TIMEOUT,
            temp_dir: std::env::temp_dir(),
        }
    }
}

impl OpensslVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    fn write_temp(&self, label: &str, contents: &str) -> Result<tempfile::NamedTempFile, ClientCertError> {
        let mut file = tempfile::Builder::new()
            .prefix(&format!("{}{}-", TEMP_FILE_PREFIX, label))
            .suffix(".pem")
            .tempfile_in(&self.temp_dir)?;
        file.write_all(contents.as_bytes())?;
        file.flush()?;
        Ok(file)
    }
}

impl ChainVerifier for OpensslVerifier {
    fn verify(&self, cert_pem: &str, ca_bundle_pem: &str) -> Result<VerifierOutput, ClientCertError> {
        let cert_file = self.write_temp("cert", cert_pem)?;
        let bundle_file = self.write_temp("ca-bundle", ca_bundle_pem)?;
        let mut stdout = tempfile::tempfile_in(&self.temp_dir)?;
        let mut stderr = tempfile::tempfile_in(&self.temp_dir)?;

        let mut child = Command::new(&self.program)
            .arg("verify")
            .arg("-CAfile")
            .arg(bundle_file.path())
            .arg(cert_file.path())
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout.try_clone()?))
            .stderr(Stdio::from(stderr.try_clone()?))
            .spawn()
            .map_err(|e| {
                ClientCertError::VerifierExecution(format!(
                    "failed to run {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        let started = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if started.elapsed() >= self.timeout {
                if let Err(e) = child.kill() {
                    tracing::warn!(error = %e, "failed to kill timed-out verifier");
                }
                let _ = child.wait();
                return Err(ClientCertError::VerifierTimeout(self.timeout));
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        let mut text = String::new();
        for stream in [&mut stdout, &mut stderr] {
            stream.seek(SeekFrom::Start(0))?;
            let mut bytes = Vec::new();
            stream.read_to_end(&mut bytes)?;
            text.push_str(&String::from_utf8_lossy(&bytes));
        }

        let passed = status.success() && text.contains("OK");
        tracing::debug!(exit = ?status.code(), passed, "openssl verify finished");
        Ok(VerifierOutput { passed, text })
    }
}

/// Delete files named `clientcert-*` in `dir` that were last modified more
/// than `max_age` ago. Returns how many were removed.
pub fn sweep_stale_temp_files(dir: &Path, max_age: Duration) -> Result<usize, ClientCertError> {
    let now = SystemTime::now();
    let mut removed = 0;

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_name().to_string_lossy().starts_with(TEMP_FILE_PREFIX) {
            continue;
        }
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }
        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());
        if age.is_some_and(|age| age > max_age) {
            match std::fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(path = %entry.path().display(), error = %e, "could not remove stale temp file"),
            }
        }
    }

    Ok(removed)
}
