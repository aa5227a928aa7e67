use std::fmt::Display;
use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::AppResult;
use crate::git::GitRepo;
use crate::process::{CommandOutput, kill_editors};

/// Everything a pipeline needs to know, resolved from the CLI flags.
///
/// The defaults mirror the values the tool is normally run with: remote
/// `origin`, branch `main`, a 60 second push timeout, and `vim`/`vi` as the
/// editors to clear out first.
#[derive(Debug, Clone)]
pub struct PushConfig {
    pub repo: PathBuf,
    pub remote: String,
    /// Remote URL to register; only the fresh pipeline uses it.
    pub url: Option<String>,
    pub branch: String,
    pub message: String,
    pub timeout: Duration,
    pub editors: Vec<String>,
    pub kill_editors: bool,
}

/// The three recovery pipelines.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineKind {
    /// Abort any merge, hard-reset the tree, force push.
    Push,
    /// Abort any merge and force push the tree as it stands. No reset.
    Quick,
    /// Delete `.git`, reinitialize, commit everything, force push.
    Fresh,
}

impl Display for PipelineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PipelineKind::Push => "push",
            PipelineKind::Quick => "quick",
            PipelineKind::Fresh => "fresh",
        };
        write!(f, "{}", s)
    }
}

impl PipelineKind {
    /// Ordered steps for this pipeline. `kill` controls whether the
    /// editor-kill step is prepended.
    pub fn steps(&self, kill: bool) -> Vec<Step> {
        let mut steps = if kill {
            vec![Step::KillEditors]
        } else {
            Vec::new()
        };
        match self {
            PipelineKind::Push => {
                steps.extend([Step::AbortMerge, Step::ResetHard, Step::ForcePush]);
            }
            PipelineKind::Quick => {
                steps.extend([Step::AbortMerge, Step::Status, Step::ForcePush]);
            }
            PipelineKind::Fresh => {
                steps.extend([
                    Step::WipeGitDir,
                    Step::Init,
                    Step::AddAll,
                    Step::Commit,
                    Step::AddRemote,
                    Step::RenameBranch,
                    Step::ForcePush,
                ]);
            }
        }
        steps
    }
}

/// A single recovery action in a push pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    KillEditors,
    AbortMerge,
    ResetHard,
    Status,
    WipeGitDir,
    Init,
    AddAll,
    Commit,
    AddRemote,
    RenameBranch,
    ForcePush,
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::KillEditors => "kill-editors",
            Step::AbortMerge => "abort-merge",
            Step::ResetHard => "reset-hard",
            Step::Status => "status",
            Step::WipeGitDir => "wipe-git-dir",
            Step::Init => "init",
            Step::AddAll => "add-all",
            Step::Commit => "commit",
            Step::AddRemote => "add-remote",
            Step::RenameBranch => "rename-branch",
            Step::ForcePush => "force-push",
        }
    }

    /// Whether a failure of this step aborts the rest of the pipeline.
    ///
    /// Best-effort steps (merge abort on a tree with no merge, commit with
    /// nothing to commit, re-adding an existing remote) are expected to fail
    /// in normal operation; the pipeline logs them and moves on.
    pub fn required(&self) -> bool {
        matches!(
            self,
            Step::ResetHard | Step::Init | Step::AddAll | Step::RenameBranch | Step::ForcePush
        )
    }

    /// External commands this step will issue, argv-style. Internal
    /// filesystem steps report an empty list.
    pub fn commands(&self, config: &PushConfig) -> Vec<Vec<String>> {
        fn git(args: &[&str]) -> Vec<String> {
            std::iter::once("git")
                .chain(args.iter().copied())
                .map(str::to_owned)
                .collect()
        }

        match self {
            Step::KillEditors => config
                .editors
                .iter()
                .map(|editor| vec!["pkill".to_owned(), "-9".to_owned(), editor.clone()])
                .collect(),
            Step::AbortMerge => vec![git(&["merge", "--abort"])],
            Step::ResetHard => vec![git(&["reset", "--hard", "HEAD"])],
            Step::Status => vec![git(&["status"])],
            Step::WipeGitDir => vec![],
            Step::Init => vec![git(&["init"])],
            Step::AddAll => vec![git(&["add", "."])],
            Step::Commit => vec![git(&["commit", "-m", &config.message])],
            Step::AddRemote => match &config.url {
                Some(url) => vec![git(&["remote", "add", &config.remote, url])],
                None => vec![],
            },
            Step::RenameBranch => vec![git(&["branch", "-M", &config.branch])],
            Step::ForcePush => {
                vec![git(&["push", "-u", &config.remote, &config.branch, "--force"])]
            }
        }
    }
}

impl Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Resolved step sequence for a pipeline, produced without executing
/// anything. This is what `repush plan` prints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub pipeline: PipelineKind,
    pub repo: PathBuf,
    pub steps: Vec<PlannedStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedStep {
    pub step: Step,
    pub required: bool,
    pub commands: Vec<Vec<String>>,
}

pub fn build_plan(kind: PipelineKind, config: &PushConfig) -> Plan {
    let steps = kind
        .steps(config.kill_editors && !config.editors.is_empty())
        .into_iter()
        .map(|step| PlannedStep {
            step,
            required: step.required(),
            commands: step.commands(config),
        })
        .collect();
    Plan {
        pipeline: kind,
        repo: config.repo.clone(),
        steps,
    }
}

/// How an executed step ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    Ok,
    Failed,
    TimedOut,
    Skipped,
}

/// Record of one executed step: what ran, how it exited, what it printed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    pub step: Step,
    pub required: bool,
    pub status: StepStatus,
    pub commands: Vec<CommandOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl StepReport {
    fn internal(step: Step, status: StepStatus, note: Option<String>) -> Self {
        StepReport {
            step,
            required: step.required(),
            status,
            commands: Vec::new(),
            note,
        }
    }

    fn skipped(step: Step, note: &str) -> Self {
        Self::internal(step, StepStatus::Skipped, Some(note.to_owned()))
    }
}

/// Full record of one pipeline run. Serializes to the JSON report printed at
/// the end of every run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub pipeline: PipelineKind,
    pub repo: PathBuf,
    /// True iff every required step succeeded.
    pub success: bool,
    #[serde(with = "crate::serde_helpers::offset_datetime")]
    pub started_at: OffsetDateTime,
    #[serde(with = "crate::serde_helpers::duration")]
    pub elapsed: Duration,
    pub steps: Vec<StepReport>,
}

/// Execute every step of the pipeline in order, one child process at a time.
///
/// Best-effort step failures are logged and execution continues, matching
/// the try-the-next-step-anyway behavior this tool exists to provide. A
/// required step failure marks the run failed and skips everything after it.
#[tracing::instrument(name = "Running push pipeline", level = "info", skip(config))]
pub async fn run_pipeline(kind: PipelineKind, config: &PushConfig) -> AppResult<RunReport> {
    let repo = GitRepo::new(&config.repo);
    let started_at = OffsetDateTime::now_utc();
    let start = std::time::Instant::now();

    let steps = kind.steps(config.kill_editors && !config.editors.is_empty());
    let mut reports = Vec::with_capacity(steps.len());
    let mut success = true;
    let mut aborted = false;

    for step in steps {
        if aborted {
            reports.push(StepReport::skipped(step, "earlier required step failed"));
            continue;
        }
        let report = execute_step(step, &repo, config).await?;
        match report.status {
            StepStatus::Ok | StepStatus::Skipped => {}
            StepStatus::Failed | StepStatus::TimedOut => {
                if step.required() {
                    warn!("Required step {} failed; skipping the rest", step);
                    success = false;
                    aborted = true;
                } else {
                    debug!("Best-effort step {} failed; continuing", step);
                }
            }
        }
        reports.push(report);
    }

    if success {
        info!("{} pipeline completed successfully", kind);
    } else {
        warn!("{} pipeline failed", kind);
    }

    Ok(RunReport {
        pipeline: kind,
        repo: repo.workdir().to_path_buf(),
        success,
        started_at,
        elapsed: start.elapsed(),
        steps: reports,
    })
}

async fn execute_step(step: Step, repo: &GitRepo, config: &PushConfig) -> AppResult<StepReport> {
    info!("Step {}", step);
    let report = match step {
        Step::KillEditors => {
            let commands = kill_editors(&config.editors).await;
            StepReport {
                step,
                required: step.required(),
                status: StepStatus::Ok,
                commands,
                note: None,
            }
        }
        Step::WipeGitDir => match repo.wipe_git_dir().await {
            Ok(true) => StepReport::internal(
                step,
                StepStatus::Ok,
                Some(".git directory removed".to_owned()),
            ),
            Ok(false) => StepReport::internal(
                step,
                StepStatus::Ok,
                Some(".git directory not found".to_owned()),
            ),
            Err(e) => {
                warn!("Unable to remove the .git directory: {}", e);
                StepReport::internal(step, StepStatus::Failed, Some(e.to_string()))
            }
        },
        Step::AbortMerge => from_output(step, repo.abort_merge().await?),
        Step::ResetHard => from_output(step, repo.reset_hard().await?),
        Step::Status => {
            let output = repo.status().await?;
            info!("Working tree status:\n{}", output.stdout);
            from_output(step, output)
        }
        Step::Init => from_output(step, repo.init().await?),
        Step::AddAll => from_output(step, repo.add_all().await?),
        Step::Commit => {
            let output = repo.commit(&config.message).await?;
            let mut report = from_output(step, output);
            if report.status == StepStatus::Failed
                && report
                    .commands
                    .iter()
                    .any(|c| c.stdout.contains("nothing to commit"))
            {
                report.note = Some("nothing to commit".to_owned());
            }
            report
        }
        Step::AddRemote => match &config.url {
            Some(url) => from_output(step, repo.add_remote(&config.remote, url).await?),
            None => StepReport::skipped(step, "no remote url configured"),
        },
        Step::RenameBranch => from_output(step, repo.rename_branch(&config.branch).await?),
        Step::ForcePush => {
            let output = repo
                .force_push(&config.remote, &config.branch, config.timeout)
                .await?;
            // The push result is the one the user actually cares about; echo
            // it at info level the way the log file always carried it.
            if !output.stdout.is_empty() {
                info!("push stdout:\n{}", output.stdout);
            }
            if !output.stderr.is_empty() {
                info!("push stderr:\n{}", output.stderr);
            }
            from_output(step, output)
        }
    };

    for cmd in &report.commands {
        if !cmd.stdout.is_empty() {
            debug!("{} stdout:\n{}", report.step, cmd.stdout);
        }
        if !cmd.stderr.is_empty() {
            debug!("{} stderr:\n{}", report.step, cmd.stderr);
        }
    }

    Ok(report)
}

fn from_output(step: Step, output: CommandOutput) -> StepReport {
    let status = if output.timed_out {
        StepStatus::TimedOut
    } else if output.success() {
        StepStatus::Ok
    } else {
        StepStatus::Failed
    };
    StepReport {
        step,
        required: step.required(),
        status,
        commands: vec![output],
        note: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|p| (*p).to_owned()).collect()
    }

    fn test_config() -> PushConfig {
        PushConfig {
            repo: PathBuf::from("/work/tree"),
            remote: "origin".to_owned(),
            url: Some("https://example.invalid/repo.git".to_owned()),
            branch: "main".to_owned(),
            message: "snapshot".to_owned(),
            timeout: Duration::from_secs(60),
            editors: vec!["vim".to_owned(), "vi".to_owned()],
            kill_editors: true,
        }
    }

    fn flat_commands(plan: &Plan) -> Vec<Vec<String>> {
        plan.steps
            .iter()
            .flat_map(|s| s.commands.clone())
            .collect()
    }

    #[test]
    fn push_plan_matches_recovery_sequence() {
        let plan = build_plan(PipelineKind::Push, &test_config());
        assert_eq!(
            flat_commands(&plan),
            vec![
                argv(&["pkill", "-9", "vim"]),
                argv(&["pkill", "-9", "vi"]),
                argv(&["git", "merge", "--abort"]),
                argv(&["git", "reset", "--hard", "HEAD"]),
                argv(&["git", "push", "-u", "origin", "main", "--force"]),
            ]
        );
    }

    #[test]
    fn fresh_plan_matches_reinit_sequence() {
        let plan = build_plan(PipelineKind::Fresh, &test_config());
        let steps: Vec<Step> = plan.steps.iter().map(|s| s.step).collect();
        assert_eq!(
            steps,
            vec![
                Step::KillEditors,
                Step::WipeGitDir,
                Step::Init,
                Step::AddAll,
                Step::Commit,
                Step::AddRemote,
                Step::RenameBranch,
                Step::ForcePush,
            ]
        );
        let commands = flat_commands(&plan);
        assert_eq!(
            commands[2..].to_vec(),
            vec![
                argv(&["git", "init"]),
                argv(&["git", "add", "."]),
                argv(&["git", "commit", "-m", "snapshot"]),
                argv(&[
                    "git",
                    "remote",
                    "add",
                    "origin",
                    "https://example.invalid/repo.git"
                ]),
                argv(&["git", "branch", "-M", "main"]),
                argv(&["git", "push", "-u", "origin", "main", "--force"]),
            ]
        );
    }

    #[test]
    fn quick_plan_skips_reset() {
        let plan = build_plan(PipelineKind::Quick, &test_config());
        let steps: Vec<Step> = plan.steps.iter().map(|s| s.step).collect();
        assert!(steps.contains(&Step::Status));
        assert!(!steps.contains(&Step::ResetHard));
    }

    #[test]
    fn no_kill_drops_the_pkill_step() {
        let config = PushConfig {
            kill_editors: false,
            ..test_config()
        };
        let plan = build_plan(PipelineKind::Push, &config);
        assert!(plan.steps.iter().all(|s| s.step != Step::KillEditors));
    }

    #[test]
    fn only_mutating_steps_are_required() {
        for step in [Step::KillEditors, Step::AbortMerge, Step::Status, Step::Commit] {
            assert!(!step.required(), "{} should be best-effort", step);
        }
        for step in [Step::ResetHard, Step::Init, Step::AddAll, Step::ForcePush] {
            assert!(step.required(), "{} should be required", step);
        }
    }

    #[test]
    fn step_names_serialize_kebab_case() {
        assert_eq!(
            serde_json::to_value(Step::ForcePush).unwrap(),
            serde_json::json!("force-push")
        );
        assert_eq!(
            serde_json::to_value(StepStatus::TimedOut).unwrap(),
            serde_json::json!("timed-out")
        );
        assert_eq!(
            serde_json::to_value(PipelineKind::Fresh).unwrap(),
            serde_json::json!("fresh")
        );
    }

    #[tokio::test]
    async fn required_failure_skips_the_push() {
        // A hard reset outside any repository fails, which must abort the
        // pipeline before the push.
        let tree = tempfile::tempdir().unwrap();
        let config = PushConfig {
            repo: tree.path().to_path_buf(),
            url: None,
            kill_editors: false,
            ..test_config()
        };
        let report = run_pipeline(PipelineKind::Push, &config).await.unwrap();
        assert!(!report.success);

        let reset = report
            .steps
            .iter()
            .find(|s| s.step == Step::ResetHard)
            .unwrap();
        assert_eq!(reset.status, StepStatus::Failed);

        let push = report
            .steps
            .iter()
            .find(|s| s.step == Step::ForcePush)
            .unwrap();
        assert_eq!(push.status, StepStatus::Skipped);
    }

    #[tokio::test]
    async fn report_serializes_and_parses_back() {
        let tree = tempfile::tempdir().unwrap();
        let config = PushConfig {
            repo: tree.path().to_path_buf(),
            url: None,
            kill_editors: false,
            ..test_config()
        };
        let report = run_pipeline(PipelineKind::Quick, &config).await.unwrap();
        let json = serde_json::to_string_pretty(&report).unwrap();
        let parsed: RunReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.success, report.success);
        assert_eq!(parsed.steps.len(), report.steps.len());
    }
}
