use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::api::RelayError;

/// The normalizing step is an injectable capability so tests (and embedders
/// with an in-process normalizer) can substitute the external executable.
/// Implementations must be deterministic: the same SQL text always yields
/// the same fingerprint text.
#[async_trait]
pub trait Fingerprinter {
    async fn fingerprint(&self, sql: &str) -> Result<String, RelayError>;
}

/// Invokes an external normalizer (`pt-fingerprint` by default) with the SQL
/// text on stdin and reads the fingerprint from stdout.
pub struct PtFingerprint {
    command: String,
}

impl PtFingerprint {
    pub fn new(command: impl Into<String>) -> PtFingerprint {
        PtFingerprint {
            command: command.into(),
        }
    }
}

#[async_trait]
impl Fingerprinter for PtFingerprint {
    async fn fingerprint(&self, sql: &str) -> Result<String, RelayError> {
        let mut child = Command::new(&self.command)
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                RelayError::FingerprintError(format!("failed to spawn {}: {}", self.command, e))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| RelayError::FingerprintError(String::from("child stdin unavailable")))?;

        // Feed stdin while draining stdout/stderr. A normalizer that streams
        // its output fills the stdout pipe on large input and stops reading
        // stdin; writing sequentially before collecting output would deadlock
        // against it.
        let write = async {
            let result = stdin.write_all(sql.as_bytes()).await;
            drop(stdin);
            result
        };
        let (written, output) = tokio::join!(write, child.wait_with_output());

        // The normalizer may exit before draining stdin; its exit status
        // decides success, so a broken pipe here is not itself an error.
        if let Err(e) = written {
            if e.kind() != std::io::ErrorKind::BrokenPipe {
                return Err(RelayError::FingerprintError(e.to_string()));
            }
        }

        let output = output.map_err(|e| RelayError::FingerprintError(e.to_string()))?;

        if !output.status.success() {
            return Err(RelayError::FingerprintError(
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ));
        }

        String::from_utf8(output.stdout)
            .map_err(|e| RelayError::FingerprintError(format!("invalid fingerprint output: {e}")))
    }
}

/// Content identity of a fingerprint: `0x` plus the lowercase hex MD5 of the
/// fingerprint text. Pure function, no salt; downstream consumers compare
/// these identities across implementations.
pub fn fingerprint_id(fingerprint: &str) -> String {
    format!("0x{:x}", md5::compute(fingerprint))
}
