//! Git resolver plug-in
//!
//! Resolves a file at a revision from a Git repository: clone into a
//! scratch directory, optionally check out a branch or a specific commit,
//! and return the file bytes with the resolved commit hash attached as an
//! annotation.
//!
//! Transport is the system `git` binary driven through
//! `tokio::process`; child processes are spawned with kill-on-drop so
//! cancelling the resolution tears down in-flight clones.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::warn;

use crate::crd::LABEL_KEY_RESOLVER_TYPE;
use crate::error::BoxError;
use crate::resolver::{ResolutionContext, ResolvedArtifact, Resolver};

/// Parameter naming the repository URL to clone
pub const URL_PARAM: &str = "url";
/// Parameter naming the file path inside the repository
pub const PATH_PARAM: &str = "path";
/// Parameter naming the branch to clone
pub const BRANCH_PARAM: &str = "branch";
/// Parameter naming the specific commit to check out
pub const COMMIT_PARAM: &str = "commit";

/// Value of the resolver-type label this resolver accepts
pub const LABEL_VALUE_GIT_RESOLVER_TYPE: &str = "git";

/// Config field carrying the per-request timeout override (e.g. "1m")
pub const CONFIG_FIELD_TIMEOUT: &str = "fetch-timeout";
/// Config field carrying the repository URL used when a request omits one
pub const CONFIG_FIELD_DEFAULT_URL: &str = "default-url";
/// Name of the ConfigMap this resolver watches
pub const CONFIG_NAME: &str = "git-resolver-config";

/// Annotation carrying the commit hash the content was resolved at
pub const ANNOTATION_KEY_COMMIT_HASH: &str = "commit";
/// Annotation carrying the content type of the resolved bytes
pub const ANNOTATION_KEY_CONTENT_TYPE: &str = "content-type";

const YAML_CONTENT_TYPE: &str = "application/x-yaml";

/// Resolver fetching file content from Git repositories
#[derive(Clone, Copy, Debug, Default)]
pub struct GitResolver;

#[async_trait]
impl Resolver for GitResolver {
    fn get_name(&self, _ctx: &ResolutionContext) -> String {
        "Git".to_string()
    }

    fn get_selector(&self, _ctx: &ResolutionContext) -> BTreeMap<String, String> {
        BTreeMap::from([(
            LABEL_KEY_RESOLVER_TYPE.to_string(),
            LABEL_VALUE_GIT_RESOLVER_TYPE.to_string(),
        )])
    }

    fn get_config_name(&self, _ctx: &ResolutionContext) -> String {
        CONFIG_NAME.to_string()
    }

    async fn validate_params(
        &self,
        _ctx: &ResolutionContext,
        params: &BTreeMap<String, String>,
    ) -> Result<(), BoxError> {
        if !params.contains_key(PATH_PARAM) {
            return Err(format!("missing required git resolver param {PATH_PARAM:?}").into());
        }
        if params.contains_key(COMMIT_PARAM) && params.contains_key(BRANCH_PARAM) {
            return Err(format!(
                "supplied both {COMMIT_PARAM:?} and {BRANCH_PARAM:?} git resolver params"
            )
            .into());
        }
        Ok(())
    }

    async fn resolve(
        &self,
        ctx: &ResolutionContext,
        params: &BTreeMap<String, String>,
    ) -> Result<ResolvedArtifact, BoxError> {
        // The request URL wins; the configured default covers requests
        // that only name a path.
        let url = params
            .get(URL_PARAM)
            .or_else(|| ctx.config().get(CONFIG_FIELD_DEFAULT_URL))
            .ok_or_else(|| format!("missing required git resolver param {URL_PARAM:?}"))?;
        let path = params
            .get(PATH_PARAM)
            .ok_or_else(|| format!("missing required git resolver param {PATH_PARAM:?}"))?;

        let scratch = tempfile::tempdir()
            .map_err(|e| format!("error creating scratch dir: {e}"))?;
        let checkout = scratch.path().join("repo");
        let checkout_str = checkout.to_string_lossy().into_owned();

        let mut clone_args = vec!["clone", "--quiet", url.as_str(), checkout_str.as_str()];
        if let Some(branch) = params.get(BRANCH_PARAM) {
            clone_args.extend(["--branch", branch.as_str()]);
        }
        run_git(None, &clone_args)
            .await
            .map_err(|e| format!("clone error: {e}"))?;

        if let Some(commit) = params.get(COMMIT_PARAM) {
            run_git(Some(&checkout), &["checkout", "--quiet", commit.as_str()])
                .await
                .map_err(|e| format!("checkout error: {e}"))?;
        }

        let head = run_git(Some(&checkout), &["rev-parse", "HEAD"])
            .await
            .map_err(|e| format!("error resolving HEAD: {e}"))?;

        let content = tokio::fs::read(checkout.join(path))
            .await
            .map_err(|e| format!("error opening file {path:?}: {e}"))?;

        Ok(ResolvedArtifact::new(content)
            .annotation(ANNOTATION_KEY_COMMIT_HASH, head)
            .annotation(ANNOTATION_KEY_CONTENT_TYPE, YAML_CONTENT_TYPE))
    }

    fn get_resolution_timeout(&self, ctx: &ResolutionContext, default: Duration) -> Duration {
        match ctx.config().get(CONFIG_FIELD_TIMEOUT) {
            Some(raw) => match humantime::parse_duration(raw) {
                Ok(timeout) => timeout,
                Err(e) => {
                    warn!(value = %raw, error = %e, "unparseable fetch-timeout, using default");
                    default
                }
            },
            None => default,
        }
    }
}

/// Run one git command, returning trimmed stdout or trimmed stderr as the
/// error text. kill-on-drop tears the child down when the resolution
/// worker is aborted at the deadline.
async fn run_git(dir: Option<&Path>, args: &[&str]) -> Result<String, String> {
    let mut cmd = Command::new("git");
    if let Some(dir) = dir {
        cmd.current_dir(dir);
    }
    let output = cmd
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| format!("failed to run git: {e}"))?;
    if !output.status.success() {
        return Err(String::from_utf8_lossy(&output.stderr).trim().to_string());
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use tempfile::TempDir;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn ctx_with_config(pairs: &[(&str, &str)]) -> ResolutionContext {
        ResolutionContext::new(
            "test",
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    // ===== Selector and Validation =====

    #[test]
    fn selector_routes_on_the_git_type_label() {
        let sel = GitResolver.get_selector(&ResolutionContext::background());
        assert_eq!(
            sel.get(LABEL_KEY_RESOLVER_TYPE).map(String::as_str),
            Some(LABEL_VALUE_GIT_RESOLVER_TYPE)
        );
    }

    #[tokio::test]
    async fn validate_accepts_path_with_commit_or_branch() {
        let ctx = ResolutionContext::background();
        for extra in [COMMIT_PARAM, BRANCH_PARAM] {
            let p = params(&[(PATH_PARAM, "bar"), (extra, "baz")]);
            GitResolver
                .validate_params(&ctx, &p)
                .await
                .expect("params should validate");
        }
    }

    #[tokio::test]
    async fn validate_rejects_missing_path() {
        let ctx = ResolutionContext::background();
        let p = params(&[(URL_PARAM, "foo"), (BRANCH_PARAM, "baz")]);
        let err = GitResolver.validate_params(&ctx, &p).await.unwrap_err();
        assert!(err.to_string().contains("path"));
    }

    #[tokio::test]
    async fn validate_rejects_conflicting_commit_and_branch() {
        let ctx = ResolutionContext::background();
        let p = params(&[
            (URL_PARAM, "foo"),
            (PATH_PARAM, "bar"),
            (COMMIT_PARAM, "baz"),
            (BRANCH_PARAM, "quux"),
        ]);
        let err = GitResolver.validate_params(&ctx, &p).await.unwrap_err();
        assert!(err.to_string().contains("both"));
    }

    // ===== Timeout Override =====

    #[test]
    fn timeout_defaults_without_config() {
        let timeout = GitResolver.get_resolution_timeout(
            &ResolutionContext::background(),
            Duration::from_secs(1800),
        );
        assert_eq!(timeout, Duration::from_secs(1800));
    }

    #[test]
    fn timeout_honors_the_fetch_timeout_config_field() {
        let ctx = ctx_with_config(&[(CONFIG_FIELD_TIMEOUT, "5s")]);
        let timeout = GitResolver.get_resolution_timeout(&ctx, Duration::from_secs(1800));
        assert_eq!(timeout, Duration::from_secs(5));
    }

    #[test]
    fn unparseable_timeout_falls_back_to_default() {
        let ctx = ctx_with_config(&[(CONFIG_FIELD_TIMEOUT, "soonish")]);
        let timeout = GitResolver.get_resolution_timeout(&ctx, Duration::from_secs(30));
        assert_eq!(timeout, Duration::from_secs(30));
    }

    // ===== Resolve against real repositories =====
    //
    // These tests drive the resolver against throwaway repositories built
    // with the git CLI, mirroring how it is used in production.

    struct CommitSpec {
        dir: &'static str,
        filename: &'static str,
        content: &'static str,
        branch: Option<&'static str>,
    }

    fn git_in(dir: &Path, args: &[&str]) -> String {
        let output = std::process::Command::new("git")
            .current_dir(dir)
            .args(args)
            .output()
            .expect("running git");
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    /// Build a repository with the given commits, returning the scratch
    /// dir and the commit hashes recorded per branch in creation order.
    fn create_test_repo(commits: &[CommitSpec]) -> (TempDir, HashMap<String, Vec<String>>) {
        let tmp = tempfile::tempdir().expect("creating repo dir");
        let root = tmp.path();
        git_in(root, &["init", "-q"]);
        git_in(root, &["config", "user.name", "Someone"]);
        git_in(root, &["config", "user.email", "someone@example.com"]);

        std::fs::write(root.join("README"), "This is a test").unwrap();
        git_in(root, &["add", "README"]);
        git_in(root, &["commit", "-q", "-m", "initial"]);
        let start = git_in(root, &["rev-parse", "HEAD"]);
        let default_branch = git_in(root, &["rev-parse", "--abbrev-ref", "HEAD"]);

        let mut hashes: HashMap<String, Vec<String>> = HashMap::new();
        for commit in commits {
            let branch = commit.branch.unwrap_or(default_branch.as_str());
            if branch != default_branch && !hashes.contains_key(branch) {
                git_in(root, &["checkout", "-q", "-b", branch, start.as_str()]);
            } else {
                git_in(root, &["checkout", "-q", branch]);
            }
            let target = root.join(commit.dir);
            std::fs::create_dir_all(&target).unwrap();
            std::fs::write(target.join(commit.filename), commit.content).unwrap();
            git_in(root, &["add", "."]);
            git_in(root, &["commit", "-q", "-m", "adding file for test"]);
            hashes
                .entry(branch.to_string())
                .or_default()
                .push(git_in(root, &["rev-parse", "HEAD"]));
        }
        git_in(root, &["checkout", "-q", default_branch.as_str()]);
        (tmp, hashes)
    }

    fn repo_url(repo: &TempDir) -> String {
        repo.path().to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn resolves_a_file_from_the_default_branch() {
        let (repo, hashes) = create_test_repo(&[CommitSpec {
            dir: "foo/bar",
            filename: "somefile",
            content: "some content",
            branch: None,
        }]);

        let artifact = GitResolver
            .resolve(
                &ResolutionContext::background(),
                &params(&[(URL_PARAM, &repo_url(&repo)), (PATH_PARAM, "foo/bar/somefile")]),
            )
            .await
            .expect("resolve should succeed");

        assert_eq!(artifact.data, b"some content");
        let latest = hashes.values().next().unwrap().last().unwrap();
        assert_eq!(&artifact.annotations[ANNOTATION_KEY_COMMIT_HASH], latest);
        assert_eq!(
            artifact.annotations[ANNOTATION_KEY_CONTENT_TYPE],
            YAML_CONTENT_TYPE
        );
    }

    #[tokio::test]
    async fn resolves_a_file_from_a_named_branch() {
        let (repo, hashes) = create_test_repo(&[
            CommitSpec {
                dir: "foo/bar",
                filename: "somefile",
                content: "some content",
                branch: Some("other-branch"),
            },
            CommitSpec {
                dir: "foo/bar",
                filename: "somefile",
                content: "wrong content",
                branch: None,
            },
        ]);

        let artifact = GitResolver
            .resolve(
                &ResolutionContext::background(),
                &params(&[
                    (URL_PARAM, &repo_url(&repo)),
                    (PATH_PARAM, "foo/bar/somefile"),
                    (BRANCH_PARAM, "other-branch"),
                ]),
            )
            .await
            .expect("resolve should succeed");

        assert_eq!(artifact.data, b"some content");
        assert_eq!(
            &artifact.annotations[ANNOTATION_KEY_COMMIT_HASH],
            hashes["other-branch"].last().unwrap()
        );
    }

    #[tokio::test]
    async fn resolves_an_earlier_specific_commit() {
        let (repo, hashes) = create_test_repo(&[
            CommitSpec {
                dir: "foo/bar",
                filename: "somefile",
                content: "some content",
                branch: None,
            },
            CommitSpec {
                dir: "foo/bar",
                filename: "somefile",
                content: "different content",
                branch: None,
            },
        ]);
        let first = hashes.values().next().unwrap().first().unwrap().clone();

        let artifact = GitResolver
            .resolve(
                &ResolutionContext::background(),
                &params(&[
                    (URL_PARAM, &repo_url(&repo)),
                    (PATH_PARAM, "foo/bar/somefile"),
                    (COMMIT_PARAM, &first),
                ]),
            )
            .await
            .expect("resolve should succeed");

        assert_eq!(artifact.data, b"some content");
        assert_eq!(artifact.annotations[ANNOTATION_KEY_COMMIT_HASH], first);
    }

    #[tokio::test]
    async fn missing_file_reports_an_open_error() {
        let (repo, _) = create_test_repo(&[CommitSpec {
            dir: "foo/bar",
            filename: "somefile",
            content: "some content",
            branch: None,
        }]);

        let err = GitResolver
            .resolve(
                &ResolutionContext::background(),
                &params(&[
                    (URL_PARAM, &repo_url(&repo)),
                    (PATH_PARAM, "foo/bar/some other file"),
                ]),
            )
            .await
            .unwrap_err();

        assert!(err
            .to_string()
            .contains(r#"error opening file "foo/bar/some other file""#));
    }

    #[tokio::test]
    async fn missing_branch_reports_a_clone_error() {
        let (repo, _) = create_test_repo(&[CommitSpec {
            dir: "foo/bar",
            filename: "somefile",
            content: "some content",
            branch: None,
        }]);

        let err = GitResolver
            .resolve(
                &ResolutionContext::background(),
                &params(&[
                    (URL_PARAM, &repo_url(&repo)),
                    (PATH_PARAM, "foo/bar/somefile"),
                    (BRANCH_PARAM, "does-not-exist"),
                ]),
            )
            .await
            .unwrap_err();

        assert!(err.to_string().starts_with("clone error:"));
    }

    #[tokio::test]
    async fn missing_commit_reports_a_checkout_error() {
        let (repo, _) = create_test_repo(&[CommitSpec {
            dir: "foo/bar",
            filename: "somefile",
            content: "some content",
            branch: None,
        }]);

        let err = GitResolver
            .resolve(
                &ResolutionContext::background(),
                &params(&[
                    (URL_PARAM, &repo_url(&repo)),
                    (PATH_PARAM, "foo/bar/somefile"),
                    (COMMIT_PARAM, "0000000000000000000000000000000000000000"),
                ]),
            )
            .await
            .unwrap_err();

        assert!(err.to_string().starts_with("checkout error:"));
    }

    #[tokio::test]
    async fn configured_default_url_covers_requests_without_one() {
        let (repo, _) = create_test_repo(&[CommitSpec {
            dir: "foo/bar",
            filename: "somefile",
            content: "some content",
            branch: None,
        }]);
        let ctx = ctx_with_config(&[(CONFIG_FIELD_DEFAULT_URL, &repo_url(&repo))]);

        let artifact = GitResolver
            .resolve(&ctx, &params(&[(PATH_PARAM, "foo/bar/somefile")]))
            .await
            .expect("resolve should succeed");

        assert_eq!(artifact.data, b"some content");
    }

    #[tokio::test]
    async fn missing_url_everywhere_is_an_error() {
        let err = GitResolver
            .resolve(
                &ResolutionContext::background(),
                &params(&[(PATH_PARAM, "foo/bar/somefile")]),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("url"));
    }
}
