//! External proof-of-work solver invocation
//!
//! Runs the `pow-miner` binary as a child process with an argument vector
//! (never through a shell), bounds it with a wall-clock timeout, and
//! validates its stderr against the success marker. The solver hands its
//! result back through a per-cycle artifact file.

use crate::config::Config;
use crate::types::{AccountAddress, ChallengeParameterSet};
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info};

/// Confirmation substring the solver prints to stderr on success
pub const SUCCESS_MARKER: &str = "bytes of serialized external message into file";

/// Invokes the external solver once per mining cycle
pub struct SolverInvoker {
    binary: PathBuf,
    workers: u32,
    threads: u32,
    timeout: Duration,
    output_dir: PathBuf,
}

impl SolverInvoker {
    /// Create an invoker from configuration
    pub fn new(config: &Config) -> Self {
        Self {
            binary: config.solver_bin.clone(),
            workers: config.solver_workers,
            threads: config.solver_threads,
            timeout: config.solver_timeout_duration(),
            output_dir: config.output_dir.clone(),
        }
    }

    /// Artifact path for the given cycle.
    ///
    /// Paths are cycle-scoped so a stale or half-written artifact from an
    /// earlier cycle can never be mistaken for this cycle's result.
    pub fn output_path(&self, cycle: u64) -> PathBuf {
        self.output_dir.join(format!("mined-{}.boc", cycle))
    }

    /// Solver argument vector:
    /// `-vv -w<workers> -t<threads> <operator> <params...> <giver> <output>`
    fn build_args(
        &self,
        operator: &AccountAddress,
        params: &ChallengeParameterSet,
        giver: &AccountAddress,
        output: &Path,
    ) -> Result<Vec<String>> {
        let mut args = vec![
            "-vv".to_string(),
            format!("-w{}", self.workers),
            format!("-t{}", self.threads),
            operator.to_friendly(false, false),
        ];
        args.extend(params.solver_args()?);
        args.push(giver.to_friendly(true, false));
        args.push(output.display().to_string());
        Ok(args)
    }

    /// Run one solver attempt and wait for it to exit.
    ///
    /// On success the solver has written the mined artifact to `output`; the
    /// file, not the return value, carries the result.
    pub async fn run(
        &self,
        operator: &AccountAddress,
        params: &ChallengeParameterSet,
        giver: &AccountAddress,
        output: &Path,
    ) -> Result<()> {
        let args = self.build_args(operator, params, giver, output)?;
        debug!("Running solver: {} {:?}", self.binary.display(), args);

        let child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::solver(format!("failed to spawn solver: {}", e)))?;

        // kill_on_drop terminates the child when the timeout wins.
        let result = timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| Error::timeout(format!("solver run ({:?})", self.timeout)))?
            .map_err(|e| Error::solver(format!("solver wait failed: {}", e)))?;

        let stderr = String::from_utf8_lossy(&result.stderr);

        if !result.status.success() {
            return Err(Error::solver(format!(
                "solver exited with code {}: {}",
                result.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        classify_stderr(&stderr)?;
        info!("Solver finished, artifact at {}", output.display());
        Ok(())
    }
}

/// Classify solver stderr output.
///
/// The solver logs progress and its final confirmation line to stderr, so
/// non-empty stderr is an error only when the success marker is absent.
/// The byte count and hash on the marker line are not parsed.
fn classify_stderr(stderr: &str) -> Result<()> {
    if !stderr.is_empty() && !stderr.contains(SUCCESS_MARKER) {
        return Err(Error::solver(format!(
            "solver produced no result: {}",
            stderr.trim()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::str::FromStr;

    fn test_config(binary: &str, timeout_secs: u64, output_dir: &Path) -> Config {
        use clap::Parser;
        Config::try_parse_from([
            "ton-giver-miner",
            "--my-address",
            "EQDe1EaGTLsqY5K_lQcqViPXxBg6ANjlZ3v4PxzaQkolOqW8",
            "--testnet",
            "--solver-bin",
            binary,
            "--solver-timeout",
            &timeout_secs.to_string(),
            "--output-dir",
            &output_dir.display().to_string(),
        ])
        .unwrap()
    }

    fn params(values: &[&str]) -> ChallengeParameterSet {
        use crate::types::ChallengeParameter;
        ChallengeParameterSet(
            values
                .iter()
                .map(|v| ChallengeParameter {
                    kind: "num".to_string(),
                    num: Some(v.to_string()),
                })
                .collect(),
        )
    }

    fn addr() -> AccountAddress {
        AccountAddress::from_str("EQDe1EaGTLsqY5K_lQcqViPXxBg6ANjlZ3v4PxzaQkolOqW8").unwrap()
    }

    #[test]
    fn test_classify_stderr() {
        assert!(classify_stderr("").is_ok());
        assert!(classify_stderr(&format!(
            "[ mining in progress ]\nSaving 176 {} `mined-0.boc`\n",
            SUCCESS_MARKER
        ))
        .is_ok());
        assert_matches!(
            classify_stderr("FATAL: cannot parse giver address"),
            Err(Error::Solver { .. })
        );
    }

    #[test]
    fn test_build_args_order() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = SolverInvoker::new(&test_config("pow-miner", 1000, dir.path()));
        let output = invoker.output_path(3);
        assert!(output.ends_with("mined-3.boc"));

        let args = invoker
            .build_args(&addr(), &params(&["1", "2", "9"]), &addr(), &output)
            .unwrap();

        assert_eq!(args[0], "-vv");
        assert_eq!(args[1], "-w30");
        assert_eq!(args[2], "-t500");
        // Operator, rendered params with the final entry dropped, giver, output.
        assert_eq!(args[3], addr().to_friendly(false, false));
        assert_eq!(&args[4..6], &["1".to_string(), "2".to_string()]);
        assert_eq!(args[6], addr().to_friendly(true, false));
        assert_eq!(args[7], output.display().to_string());
    }

    #[cfg(unix)]
    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_success_with_marker_on_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(
            dir.path(),
            "solver-ok.sh",
            &format!(
                "for out; do :; done\necho mined > \"$out\"\necho 'Saving 176 {} '\"$out\" >&2"
            , SUCCESS_MARKER),
        );

        let invoker = SolverInvoker::new(&test_config(
            &script.display().to_string(),
            10,
            dir.path(),
        ));
        let output = invoker.output_path(0);

        invoker
            .run(&addr(), &params(&["1", "9"]), &addr(), &output)
            .await
            .unwrap();
        assert!(output.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_fails_on_unexpected_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "solver-noise.sh", "echo 'mining failed' >&2");

        let invoker = SolverInvoker::new(&test_config(
            &script.display().to_string(),
            10,
            dir.path(),
        ));
        let output = invoker.output_path(0);

        let err = invoker
            .run(&addr(), &params(&["9"]), &addr(), &output)
            .await
            .unwrap_err();
        assert_matches!(err, Error::Solver { .. });
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_fails_on_nonzero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "solver-exit.sh", "exit 3");

        let invoker = SolverInvoker::new(&test_config(
            &script.display().to_string(),
            10,
            dir.path(),
        ));
        let output = invoker.output_path(0);

        let err = invoker
            .run(&addr(), &params(&["9"]), &addr(), &output)
            .await
            .unwrap_err();
        assert_matches!(err, Error::Solver { .. });
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "solver-slow.sh", "sleep 30");

        let mut config = test_config(&script.display().to_string(), 10, dir.path());
        config.solver_timeout = 1;
        let mut invoker = SolverInvoker::new(&config);
        invoker.timeout = Duration::from_millis(100);
        let output = invoker.output_path(0);

        let err = invoker
            .run(&addr(), &params(&["9"]), &addr(), &output)
            .await
            .unwrap_err();
        assert_matches!(err, Error::Timeout { .. });
    }

    #[tokio::test]
    async fn test_run_fails_on_missing_binary() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = SolverInvoker::new(&test_config(
            "/nonexistent/pow-miner",
            10,
            dir.path(),
        ));
        let output = invoker.output_path(0);

        let err = invoker
            .run(&addr(), &params(&["9"]), &addr(), &output)
            .await
            .unwrap_err();
        assert_matches!(err, Error::Solver { .. });
    }
}
