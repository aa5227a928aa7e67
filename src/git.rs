use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs;
use tracing::{debug, info};

use crate::AppResult;
use crate::process::{CommandOutput, run_command};

/// Thin wrapper over the external `git` binary, bound to one working tree.
///
/// All version-control logic stays in git itself; this type only knows which
/// argv to hand it for each recovery action.
#[derive(Debug, Clone)]
pub struct GitRepo {
    workdir: PathBuf,
}

impl GitRepo {
    pub fn new<P: AsRef<Path>>(workdir: P) -> Self {
        GitRepo {
            workdir: workdir.as_ref().to_path_buf(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    async fn git(&self, args: &[&str], limit: Option<Duration>) -> AppResult<CommandOutput> {
        run_command("git", args, &self.workdir, limit).await
    }

    /// `git merge --abort`. Exits nonzero when no merge is in progress,
    /// which callers treat as best-effort.
    pub async fn abort_merge(&self) -> AppResult<CommandOutput> {
        self.git(&["merge", "--abort"], None).await
    }

    /// `git reset --hard HEAD`.
    pub async fn reset_hard(&self) -> AppResult<CommandOutput> {
        self.git(&["reset", "--hard", "HEAD"], None).await
    }

    /// `git status`, for the record rather than for branching logic.
    pub async fn status(&self) -> AppResult<CommandOutput> {
        self.git(&["status"], None).await
    }

    /// `git init`.
    pub async fn init(&self) -> AppResult<CommandOutput> {
        self.git(&["init"], None).await
    }

    /// `git add .`.
    pub async fn add_all(&self) -> AppResult<CommandOutput> {
        self.git(&["add", "."], None).await
    }

    /// `git commit -m <message>`.
    pub async fn commit(&self, message: &str) -> AppResult<CommandOutput> {
        self.git(&["commit", "-m", message], None).await
    }

    /// `git remote add <name> <url>`. Fails when the remote already exists.
    pub async fn add_remote(&self, name: &str, url: &str) -> AppResult<CommandOutput> {
        self.git(&["remote", "add", name, url], None).await
    }

    /// `git branch -M <branch>`.
    pub async fn rename_branch(&self, branch: &str) -> AppResult<CommandOutput> {
        self.git(&["branch", "-M", branch], None).await
    }

    /// `git push -u <remote> <branch> --force`, bounded by `limit`.
    ///
    /// The push is the only step that talks to the network, so it is the only
    /// one that carries a timeout.
    pub async fn force_push(
        &self,
        remote: &str,
        branch: &str,
        limit: Duration,
    ) -> AppResult<CommandOutput> {
        info!("Force pushing {} to {}", branch, remote);
        self.git(&["push", "-u", remote, branch, "--force"], Some(limit))
            .await
    }

    /// Recursively delete the `.git` directory, returning whether anything
    /// was there to delete.
    pub async fn wipe_git_dir(&self) -> AppResult<bool> {
        let git_dir = self.workdir.join(".git");
        if fs::try_exists(&git_dir).await? {
            debug!("Removing {:?}", git_dir);
            fs::remove_dir_all(&git_dir).await?;
            Ok(true)
        } else {
            debug!("{:?} not found; nothing to remove", git_dir);
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seed_identity(repo: &GitRepo) {
        for (key, value) in [("user.name", "repush test"), ("user.email", "repush@localhost")] {
            let out = repo.git(&["config", key, value], None).await.unwrap();
            assert!(out.success(), "git config {} failed: {}", key, out.stderr);
        }
    }

    #[tokio::test]
    async fn fresh_sequence_pushes_to_local_bare_remote() {
        let tree = tempfile::tempdir().unwrap();
        let remote = tempfile::tempdir().unwrap();

        let bare = GitRepo::new(remote.path());
        let out = bare.git(&["init", "--bare"], None).await.unwrap();
        assert!(out.success(), "bare init failed: {}", out.stderr);

        std::fs::write(tree.path().join("README.md"), "snapshot\n").unwrap();

        let repo = GitRepo::new(tree.path());
        assert!(repo.init().await.unwrap().success());
        seed_identity(&repo).await;
        assert!(repo.add_all().await.unwrap().success());
        let commit = repo.commit("snapshot").await.unwrap();
        assert!(commit.success(), "commit failed: {}", commit.stderr);

        let url = remote.path().to_str().unwrap().to_owned();
        assert!(repo.add_remote("origin", &url).await.unwrap().success());
        assert!(repo.rename_branch("main").await.unwrap().success());

        let push = repo
            .force_push("origin", "main", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(push.success(), "push failed: {}", push.stderr);
        assert_eq!(push.args, ["push", "-u", "origin", "main", "--force"]);

        let heads = bare.git(&["branch", "--list", "main"], None).await.unwrap();
        assert!(heads.stdout.contains("main"), "got: {}", heads.stdout);
    }

    #[tokio::test]
    async fn add_remote_twice_reports_failure() {
        let tree = tempfile::tempdir().unwrap();
        let repo = GitRepo::new(tree.path());
        assert!(repo.init().await.unwrap().success());
        assert!(
            repo.add_remote("origin", "https://example.invalid/repo.git")
                .await
                .unwrap()
                .success()
        );
        let second = repo
            .add_remote("origin", "https://example.invalid/repo.git")
            .await
            .unwrap();
        assert!(!second.success());
        assert!(second.stderr.contains("already exists"), "got: {}", second.stderr);
    }

    #[tokio::test]
    async fn wipe_git_dir_reports_absence() {
        let tree = tempfile::tempdir().unwrap();
        let repo = GitRepo::new(tree.path());
        assert!(!repo.wipe_git_dir().await.unwrap());
        assert!(repo.init().await.unwrap().success());
        assert!(repo.wipe_git_dir().await.unwrap());
        assert!(!tree.path().join(".git").exists());
    }
}
