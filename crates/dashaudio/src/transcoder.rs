// External transcoder (ffmpeg) invocation.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use process_utils::{find_executable, tokio_command};
use tracing::{debug, info, warn};

use crate::config::TranscodeConfig;
use crate::error::TranscodeError;

/// Converts the reassembled container into the final audio file.
#[derive(Debug, Clone)]
pub struct Transcoder {
    config: TranscodeConfig,
}

impl Transcoder {
    pub fn new(config: TranscodeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TranscodeConfig {
        &self.config
    }

    /// Resolve the configured program, failing if it cannot be executed.
    pub fn ensure_available(&self) -> Result<PathBuf, TranscodeError> {
        find_executable(&self.config.program).ok_or_else(|| TranscodeError::NotFound {
            program: self.config.program.clone(),
        })
    }

    /// Build the argument list for converting `input` into `output`.
    pub fn build_args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-y".into(), "-hide_banner".into()];
        args.extend(["-i".into(), input.as_os_str().to_owned()]);
        args.extend(["-acodec".into(), OsString::from(&self.config.codec)]);
        args.extend(["-ar".into(), self.config.sample_rate.to_string().into()]);
        args.push(output.as_os_str().to_owned());
        args
    }

    /// Run the transcoder and wait for it to exit.
    ///
    /// The child is killed if this future is dropped before it exits. Both
    /// output streams are captured and returned in the error on a non-zero
    /// exit status.
    pub async fn transcode(&self, input: &Path, output: &Path) -> Result<(), TranscodeError> {
        let program = self.ensure_available()?;
        let args = self.build_args(input, output);
        debug!(program = %program.display(), ?args, "Running transcoder");

        let spawn_error = |source: std::io::Error| TranscodeError::Spawn {
            program: self.config.program.clone(),
            source,
        };

        let start = std::time::Instant::now();
        let child = tokio_command(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_error)?;

        let result = child.wait_with_output().await.map_err(spawn_error)?;
        let stderr = String::from_utf8_lossy(&result.stderr).into_owned();
        let stdout = String::from_utf8_lossy(&result.stdout).into_owned();

        if !result.status.success() {
            warn!(status = %result.status, "Transcoder failed");
            return Err(TranscodeError::Failed {
                status: result.status,
                stderr,
                stdout,
            });
        }

        for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
            debug!("transcoder: {}", line);
        }
        info!(
            output = %output.display(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Transcoding complete"
        );
        Ok(())
    }
}
