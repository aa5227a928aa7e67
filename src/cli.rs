use std::io::Write;
use std::path::{Path, PathBuf};

use clap::builder::styling::{AnsiColor, Color, Style, Styles};
use clap::{ArgAction, Args, ColorChoice, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::aot::{Generator, Shell, generate};
use clap_complete_nushell::Nushell;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use tracing::info;

use crate::pipeline::{self, PipelineKind, PushConfig, RunReport};
use crate::{AppResult, report};

const STYLES: Styles = Styles::styled()
    .header(Style::new().bold())
    .usage(Style::new().bold())
    .error(Style::new().fg_color(Some(Color::Ansi(AnsiColor::Red))))
    .literal(
        Style::new()
            .bold()
            .fg_color(Some(Color::Ansi(AnsiColor::Green))),
    )
    .placeholder(Style::new().fg_color(Some(Color::Ansi(AnsiColor::Yellow))))
    .valid(Style::new().fg_color(Some(Color::Ansi(AnsiColor::Cyan))))
    .invalid(Style::new().fg_color(Some(Color::Ansi(AnsiColor::BrightRed))))
    .context(Style::new().fg_color(Some(Color::Ansi(AnsiColor::Magenta))))
    .context_value(
        Style::new()
            .bold()
            .fg_color(Some(Color::Ansi(AnsiColor::Cyan))),
    );

/// Long-form CLI description shown in `--help`.
const LONG_ABOUT: &str = "repush - get a working tree onto its remote, no matter what

A last-resort push tool for trees in a bad state: an editor holding swap
files, a merge stuck halfway, or a .git directory not worth saving. Pick a
pipeline, and repush kills the editors, repairs or rebuilds the repository
with the external git binary, and force-pushes the result, reporting what
every step did.

All version-control work is delegated to git itself; repush only sequences
the commands and records their output.";

/// Default commit message for the fresh pipeline's snapshot commit.
pub const DEFAULT_MESSAGE: &str = "Automated snapshot commit";

/// repush - force a working tree onto its remote.
#[derive(Parser, Debug, Clone)]
#[command(author, version, propagate_version = true, about, long_about = Some(LONG_ABOUT), styles = STYLES)]
pub struct Cli {
    /// Color choice for the output
    #[arg(long, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,

    /// Subcommand to run
    #[command(subcommand)]
    pub cmd: Cmd,
}

/// Top-level commands supported by the CLI.
#[derive(Subcommand, Debug, Clone)]
pub enum Cmd {
    /// Abort any merge, hard-reset the tree, and force push
    ///
    /// The tree is reset to HEAD, so uncommitted changes are discarded.
    Push {
        #[command(flatten)]
        target: TargetArgs,
        #[command(flatten)]
        verbosity: Verbosity<InfoLevel>,
    },

    /// Force push the tree as it stands, only aborting any in-progress merge
    ///
    /// Unlike `push`, nothing is reset; the tree's current commits go out
    /// unchanged. `git status` output is logged for the record first.
    Quick {
        #[command(flatten)]
        target: TargetArgs,
        #[command(flatten)]
        verbosity: Verbosity<InfoLevel>,
    },

    /// Delete .git, reinitialize, commit everything, and force push
    ///
    /// The nuclear option: all history is discarded and replaced with a
    /// single snapshot commit of the current tree contents.
    Fresh {
        #[command(flatten)]
        target: TargetArgs,
        #[command(flatten)]
        fresh: FreshArgs,
        #[command(flatten)]
        verbosity: Verbosity<InfoLevel>,
    },

    /// Print the resolved step sequence for a pipeline without executing it
    Plan {
        /// The pipeline to plan
        #[arg(value_enum)]
        pipeline: PipelineKind,

        /// Remote URL the fresh pipeline would register
        #[arg(long)]
        url: Option<String>,

        /// Commit message the fresh pipeline would use
        #[arg(short, long)]
        message: Option<String>,

        #[command(flatten)]
        target: TargetArgs,
        #[command(flatten)]
        verbosity: Verbosity<InfoLevel>,
    },

    /// Generate shell completion for a given shell
    Completion {
        /// Output file to write the completion script to
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// The shell to generate the completion for
        #[arg(value_enum)]
        shell: CompletionShell,

        #[command(flatten)]
        verbosity: Verbosity<InfoLevel>,
    },
}

/// Supported completion targets for shell auto-completion.
#[derive(ValueEnum, Clone, Debug)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
    Nushell,
}

impl std::fmt::Display for CompletionShell {
    /// Render the canonical shell name string.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CompletionShell::Bash => "bash",
            CompletionShell::Zsh => "zsh",
            CompletionShell::Fish => "fish",
            CompletionShell::PowerShell => "powershell",
            CompletionShell::Elvish => "elvish",
            CompletionShell::Nushell => "nushell",
        };
        write!(f, "{}", s)
    }
}

impl Generator for &CompletionShell {
    fn generate(&self, cmd: &clap::builder::Command, buf: &mut dyn Write) {
        match self {
            CompletionShell::Bash => Shell::Bash.generate(cmd, buf),
            CompletionShell::Zsh => Shell::Zsh.generate(cmd, buf),
            CompletionShell::Fish => Shell::Fish.generate(cmd, buf),
            CompletionShell::PowerShell => Shell::PowerShell.generate(cmd, buf),
            CompletionShell::Elvish => Shell::Elvish.generate(cmd, buf),
            CompletionShell::Nushell => Nushell.generate(cmd, buf),
        }
    }

    fn file_name(&self, name: &str) -> String {
        match self {
            CompletionShell::Bash => Shell::Bash.file_name(name),
            CompletionShell::Zsh => Shell::Zsh.file_name(name),
            CompletionShell::Fish => Shell::Fish.file_name(name),
            CompletionShell::PowerShell => Shell::PowerShell.file_name(name),
            CompletionShell::Elvish => Shell::Elvish.file_name(name),
            CompletionShell::Nushell => Nushell.file_name(name),
        }
    }
}

/// Options shared by every pipeline, naming the tree and remote to act on.
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Path to the working tree to push
    #[arg(long, default_value = ".")]
    pub repo: PathBuf,

    /// Name of the remote to push to
    #[arg(long, default_value = "origin")]
    pub remote: String,

    /// Branch to push
    #[arg(short, long, default_value = "main")]
    pub branch: String,

    /// Timeout for the push step
    ///
    /// Some valid suffixes are:
    /// - Minutes: `m`, `min`, or `minutes`
    /// - Seconds: `s`, `sec`, or `seconds`
    ///
    /// Defaults to 60s
    #[arg(short, long, default_value = "60s")]
    pub timeout: String,

    /// Editor process names to kill before touching the tree
    ///
    /// Repeat the flag to name more than one process
    #[arg(long = "editor", value_name = "NAME", default_values_t = ["vim".to_owned(), "vi".to_owned()])]
    pub editors: Vec<String>,

    /// Skip killing editor processes
    #[arg(long, default_value_t = false, action = ArgAction::SetTrue)]
    pub no_kill: bool,

    /// Mirror step logging to a plaintext file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Write the JSON step report to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl TargetArgs {
    /// Resolve the CLI flags into a pipeline configuration.
    pub fn to_config(
        &self,
        url: Option<String>,
        message: Option<String>,
    ) -> AppResult<PushConfig> {
        Ok(PushConfig {
            repo: self.repo.clone(),
            remote: self.remote.clone(),
            url,
            branch: self.branch.clone(),
            message: message.unwrap_or_else(|| DEFAULT_MESSAGE.to_owned()),
            timeout: humantime::parse_duration(&self.timeout)?,
            editors: self.editors.clone(),
            kill_editors: !self.no_kill,
        })
    }
}

/// Options for rebuilding the repository from scratch.
#[derive(Args, Debug, Clone)]
pub struct FreshArgs {
    /// Remote URL to register after reinitializing
    #[arg(short, long)]
    pub url: String,

    /// Commit message for the snapshot commit
    #[arg(short, long, default_value = DEFAULT_MESSAGE)]
    pub message: String,
}

/// Helper trait for accessing verbosity flags on commands.
pub trait GetVerbosity {
    fn get_verbosity(&self) -> &Verbosity<InfoLevel>;
}

impl GetVerbosity for Cmd {
    fn get_verbosity(&self) -> &Verbosity<InfoLevel> {
        match self {
            Cmd::Push { verbosity, .. }
            | Cmd::Quick { verbosity, .. }
            | Cmd::Fresh { verbosity, .. }
            | Cmd::Plan { verbosity, .. }
            | Cmd::Completion { verbosity, .. } => verbosity,
        }
    }
}

impl Cmd {
    /// Log file configured for this command, if any.
    pub fn log_file(&self) -> Option<&Path> {
        match self {
            Cmd::Push { target, .. }
            | Cmd::Quick { target, .. }
            | Cmd::Fresh { target, .. }
            | Cmd::Plan { target, .. } => target.log_file.as_deref(),
            Cmd::Completion { .. } => None,
        }
    }

    /// Execute the chosen top-level command.
    #[tracing::instrument(name = "Running command", level = "info", skip(self))]
    pub async fn run(&self) -> AppResult<RunReport> {
        match self {
            Cmd::Push { target, .. } => {
                Self::run_pipeline(PipelineKind::Push, target, None, None).await
            }
            Cmd::Quick { target, .. } => {
                Self::run_pipeline(PipelineKind::Quick, target, None, None).await
            }
            Cmd::Fresh { target, fresh, .. } => {
                Self::run_pipeline(
                    PipelineKind::Fresh,
                    target,
                    Some(fresh.url.clone()),
                    Some(fresh.message.clone()),
                )
                .await
            }
            Cmd::Plan {
                pipeline,
                url,
                message,
                target,
                ..
            } => {
                let config = target.to_config(url.clone(), message.clone())?;
                let plan = pipeline::build_plan(*pipeline, &config);
                report::write_json(target.output.as_deref(), &plan).await?;
                std::process::exit(0);
            }
            Cmd::Completion { shell, output, .. } => {
                let mut cmd = Cli::command();
                if let Some(output_path) = output {
                    let mut file = std::fs::OpenOptions::new()
                        .write(true)
                        .truncate(true)
                        .create(true)
                        .open(output_path)?;
                    // Write completion script to the requested file.
                    generate(shell, &mut cmd, "repush", &mut file);
                    info!(
                        "Generated completion script for {} at {}",
                        shell,
                        output_path.display()
                    );
                } else {
                    // Fallback: print completion script to stdout.
                    generate(shell, &mut cmd, "repush", &mut std::io::stdout());
                }
                std::process::exit(0);
            }
        }
    }

    async fn run_pipeline(
        kind: PipelineKind,
        target: &TargetArgs,
        url: Option<String>,
        message: Option<String>,
    ) -> AppResult<RunReport> {
        let config = target.to_config(url, message)?;
        let report = pipeline::run_pipeline(kind, &config).await?;
        report::write_json(target.output.as_deref(), &report).await?;
        Ok(report)
    }
}
