// src/exec/process.rs

//! Runs a job as a shell command taken from its safe object's payload.

use std::process::Stdio;

use anyhow::{Context, Result, anyhow};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::exec::backend::{ExecuteFuture, JobExecutor};
use crate::fs::WorkArea;
use crate::jobs::RunnableJob;
use crate::types::JobOutcome;

/// Production executor: `sh -c <payload[command_key]>`.
///
/// The child sees the working directories and the data-file paths of every
/// parameter in its environment. Its own outputs reach the Orchestrator by
/// writing a data file and then a marker in the signals directory.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    work_area: WorkArea,
    command_key: String,
}

impl ProcessExecutor {
    pub fn new(work_area: WorkArea, command_key: impl Into<String>) -> Self {
        Self {
            work_area,
            command_key: command_key.into(),
        }
    }

    /// Environment passed to the child, in a stable order.
    pub fn environment(&self, job: &RunnableJob) -> Vec<(String, String)> {
        let mut env = vec![
            ("JOBGATE_JOB_ID".to_string(), job.job_id.clone()),
            (
                "JOBGATE_SAFE_OBJECT_ID".to_string(),
                job.safe_object_id.clone(),
            ),
            (
                "JOBGATE_DATA_DIR".to_string(),
                self.work_area.data_dir().display().to_string(),
            ),
            (
                "JOBGATE_SIGNALS_DIR".to_string(),
                self.work_area.signals_dir().display().to_string(),
            ),
            (
                "JOBGATE_JOBS_SIGNAL_DIR".to_string(),
                self.work_area.jobs_signal_dir().display().to_string(),
            ),
        ];

        for parameter in &job.parameters {
            let paths: Vec<String> = parameter
                .values
                .iter()
                .map(|value| self.work_area.data_path(value).display().to_string())
                .collect();
            env.push((param_env_name(&parameter.name), paths.join(":")));
        }

        env
    }

    fn command_for(&self, job: &RunnableJob) -> Result<String> {
        job.payload
            .get(&self.command_key)
            .and_then(|value| value.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                anyhow!(
                    "safe object '{}' has no string '{}' in its payload",
                    job.safe_object_id,
                    self.command_key
                )
            })
    }

    async fn run(&self, job: &RunnableJob) -> Result<JobOutcome> {
        let script = self.command_for(job)?;

        info!(
            job = %job.job_id,
            safe_object = %job.safe_object_id,
            epoch = job.epoch,
            cmd = %script,
            "starting job process"
        );

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&script)
            .envs(self.environment(job))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning process for job '{}'", job.job_id))?;

        // Always drain both pipes so the child cannot block on a full buffer.
        if let Some(stdout) = child.stdout.take() {
            forward_lines(job.job_id.clone(), "stdout", stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(job.job_id.clone(), "stderr", stderr);
        }

        let status = child
            .wait()
            .await
            .with_context(|| format!("waiting for process of job '{}'", job.job_id))?;

        let code = status.code().unwrap_or(-1);
        info!(
            job = %job.job_id,
            exit_code = code,
            success = status.success(),
            "job process exited"
        );

        Ok(if status.success() {
            JobOutcome::Done
        } else {
            JobOutcome::Failed(format!("exit status {code}"))
        })
    }
}

impl JobExecutor for ProcessExecutor {
    fn execute(&self, job: RunnableJob) -> ExecuteFuture<'_> {
        Box::pin(async move {
            match self.run(&job).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    error!(job = %job.job_id, error = %err, "job execution error");
                    JobOutcome::Failed(format!("{err:#}"))
                }
            }
        })
    }
}

/// `JOBGATE_PARAM_<NAME>`, with anything outside `[A-Za-z0-9_]` mapped to `_`.
pub fn param_env_name(parameter: &str) -> String {
    let name: String = parameter
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("JOBGATE_PARAM_{name}")
}

fn forward_lines<R>(job_id: String, stream: &'static str, reader: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(job = %job_id, stream, "{}", line);
        }
    });
}
