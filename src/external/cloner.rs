//! Repository cloning.

use crate::external::runner::{BuildError, ProcessRunner};
use log::info;
use std::fs;
use std::path::Path;

/// Errors raised while fetching a third-party repository.
#[derive(Debug, thiserror::Error)]
pub enum CloneError {
    #[error("failed to clone repository '{name}' from {url}")]
    Git {
        name: String,
        url: String,
        #[source]
        source: BuildError,
    },

    #[error("failed to switch repository '{name}' to branch '{branch}'")]
    Checkout {
        name: String,
        branch: String,
        #[source]
        source: BuildError,
    },

    #[error("failed to prepare clone destination")]
    Destination(#[from] std::io::Error),
}

/// Fetches a named repository at a branch into a destination directory.
pub trait RepositoryCloner {
    fn clone_repo(
        &self,
        name: &str,
        branch: &str,
        url: &str,
        dest_dir: &Path,
    ) -> Result<(), CloneError>;
}

/// Git-backed cloner. Idempotent: an existing checkout is switched to the
/// requested branch instead of being re-cloned.
pub struct GitCloner<'r> {
    runner: &'r dyn ProcessRunner,
}

impl<'r> GitCloner<'r> {
    pub fn new(runner: &'r dyn ProcessRunner) -> Self {
        Self { runner }
    }
}

impl RepositoryCloner for GitCloner<'_> {
    fn clone_repo(
        &self,
        name: &str,
        branch: &str,
        url: &str,
        dest_dir: &Path,
    ) -> Result<(), CloneError> {
        let checkout = dest_dir.join(name);

        if checkout.join(".git").is_dir() {
            info!(
                "Repository '{}' already present, switching to branch '{}'",
                name, branch
            );
            self.runner
                .run("git", &["checkout", branch], &checkout)
                .map_err(|source| CloneError::Checkout {
                    name: name.to_string(),
                    branch: branch.to_string(),
                    source,
                })?;
            return Ok(());
        }

        fs::create_dir_all(dest_dir)?;
        info!("Cloning '{}' ({}) from {}", name, branch, url);
        self.runner
            .run("git", &["clone", "--branch", branch, url, name], dest_dir)
            .map_err(|source| CloneError::Git {
                name: name.to_string(),
                url: url.to_string(),
                source,
            })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::runner::ProcessOutput;
    use std::cell::RefCell;
    use std::path::PathBuf;

    /// Runner that records invocations instead of spawning anything.
    struct RecordingRunner {
        calls: RefCell<Vec<(String, Vec<String>, PathBuf)>>,
        fail: bool,
    }

    impl RecordingRunner {
        fn new(fail: bool) -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
                fail,
            }
        }
    }

    impl ProcessRunner for RecordingRunner {
        fn run(
            &self,
            command: &str,
            args: &[&str],
            cwd: &Path,
        ) -> Result<ProcessOutput, BuildError> {
            self.calls.borrow_mut().push((
                command.to_string(),
                args.iter().map(|a| a.to_string()).collect(),
                cwd.to_path_buf(),
            ));
            if self.fail {
                return Err(BuildError::ExitStatus {
                    command: command.to_string(),
                    code: 128,
                    stderr: "fatal: repository not found".to_string(),
                });
            }
            Ok(ProcessOutput {
                stdout: String::new(),
                stderr: String::new(),
                exit_code: 0,
            })
        }
    }

    #[test]
    fn test_fresh_clone() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RecordingRunner::new(false);
        let cloner = GitCloner::new(&runner);

        cloner
            .clone_repo("delivery", "master", "https://example.com/delivery.git", dir.path())
            .unwrap();

        let calls = runner.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "git");
        assert_eq!(
            calls[0].1,
            vec!["clone", "--branch", "master", "https://example.com/delivery.git", "delivery"]
        );
    }

    #[test]
    fn test_existing_checkout_switches_branch() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("delivery").join(".git")).unwrap();

        let runner = RecordingRunner::new(false);
        let cloner = GitCloner::new(&runner);
        cloner
            .clone_repo("delivery", "develop", "https://example.com/delivery.git", dir.path())
            .unwrap();

        let calls = runner.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, vec!["checkout", "develop"]);
        assert!(calls[0].2.ends_with("delivery"));
    }

    #[test]
    fn test_clone_failure_is_clone_error() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RecordingRunner::new(true);
        let cloner = GitCloner::new(&runner);

        let err = cloner
            .clone_repo("delivery", "master", "https://example.com/missing.git", dir.path())
            .unwrap_err();
        assert!(matches!(err, CloneError::Git { .. }));
    }
}
