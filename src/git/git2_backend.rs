use anyhow::{Context, Result, anyhow, bail};
use git2::{
    BranchType, Cred, FetchOptions, FetchPrune, PushOptions, RemoteCallbacks, Repository,
    ResetType, Signature, StashFlags, Status, StatusOptions, build::CheckoutBuilder,
};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::env;
use std::fs;
use std::path::Path;

use super::{GitBackend, Invocation, Outcome};
use crate::bulk::{
    CheckoutParams, CleanParams, CreateBranchParams, DeleteBranchParams, FetchParams,
    RemoteParams, ResetMode, ResetParams, StashParams,
};

/// [`GitBackend`] built on libgit2.
///
/// Each call opens the repository fresh, so calls for different
/// repositories share nothing and can run on any thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct Git2Backend;

impl Git2Backend {
    pub fn new() -> Self {
        Self
    }
}

impl GitBackend for Git2Backend {
    fn invoke(&self, invocation: &Invocation) -> Result<Outcome> {
        let path = invocation
            .repo_path()
            .ok_or_else(|| anyhow!("missing repoPath"))?;
        let args = &invocation.args;
        let message = match invocation.command {
            "fetch_from_remote" => fetch(&open(&path)?, &params(args)?)?,
            "pull_from_remote" => pull(&open(&path)?, &params(args)?)?,
            "push_to_remote" => push(&open(&path)?, &params(args)?)?,
            "sync_with_remote" => sync(&open(&path)?, &params(args)?)?,
            "switch_branch" => switch_branch(&open(&path)?, &params(args)?)?,
            "create_branch" => create_branch(&open(&path)?, &params(args)?)?,
            "delete_branch" => delete_branch(&open(&path)?, &params(args)?)?,
            "create_stash" => stash(&mut open(&path)?, &params(args)?)?,
            "reset_to_commit" => reset(&open(&path)?, &params(args)?)?,
            "clean_working_tree" => clean(&open(&path)?, &params(args)?)?,
            "get_repository_status" => status(&open(&path)?)?,
            other => bail!("unsupported command: {}", other),
        };
        Ok(Outcome::new(message))
    }
}

fn open(path: &Path) -> Result<Repository> {
    Repository::open(path).with_context(|| format!("failed to open repository {}", path.display()))
}

fn params<T: DeserializeOwned>(args: &Map<String, Value>) -> Result<T> {
    serde_json::from_value(Value::Object(args.clone())).context("invalid parameters")
}

/// Credential callbacks: SSH agent first, then `GIT_USERNAME`/`GIT_PASSWORD`,
/// then libgit2's default.
fn callbacks() -> RemoteCallbacks<'static> {
    let mut cb = RemoteCallbacks::new();
    cb.credentials(|_url, username_from_url, _allowed| {
        let user = username_from_url.unwrap_or("git");
        Cred::ssh_key_from_agent(user)
            .or_else(|_| match (env::var("GIT_USERNAME"), env::var("GIT_PASSWORD")) {
                (Ok(u), Ok(p)) => Cred::userpass_plaintext(&u, &p),
                _ => Err(git2::Error::from_str("no credentials in environment")),
            })
            .or_else(|_| Cred::default())
    });
    cb
}

fn fetch_opts(prune: bool) -> FetchOptions<'static> {
    let mut fo = FetchOptions::new();
    fo.remote_callbacks(callbacks());
    if prune {
        fo.prune(FetchPrune::On);
    }
    fo
}

/// Branch name HEAD is attached to.
fn current_branch(repo: &Repository) -> Result<String> {
    let head = repo.head().context("failed to read HEAD")?;
    if !head.is_branch() {
        bail!("HEAD is detached; specify a branch");
    }
    head.shorthand()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("invalid branch name"))
}

fn branch_or_head(repo: &Repository, branch: &Option<String>) -> Result<String> {
    match branch {
        Some(b) => Ok(b.clone()),
        None => current_branch(repo),
    }
}

fn fetch_remote(repo: &Repository, remote: &str, prune: bool) -> Result<()> {
    let mut r = repo
        .find_remote(remote)
        .with_context(|| format!("remote '{}' not found", remote))?;
    r.fetch(&[] as &[&str], Some(&mut fetch_opts(prune)), None)
        .with_context(|| format!("git fetch {}", remote))?;
    Ok(())
}

fn fetch(repo: &Repository, p: &FetchParams) -> Result<String> {
    fetch_remote(repo, &p.remote, p.prune)?;
    Ok(format!("fetched {}", p.remote))
}

/// Fetch, then fast-forward `branch` to its remote counterpart.
fn pull(repo: &Repository, p: &RemoteParams) -> Result<String> {
    let branch = branch_or_head(repo, &p.branch)?;
    fetch_remote(repo, &p.remote, false)?;

    let remote_ref = format!("refs/remotes/{}/{}", p.remote, branch);
    let remote_tip = repo
        .find_reference(&remote_ref)
        .with_context(|| format!("remote branch {}/{} not found", p.remote, branch))?
        .peel_to_commit()?;
    let local_ref = format!("refs/heads/{}", branch);
    let mut local = repo
        .find_reference(&local_ref)
        .with_context(|| format!("local branch {} not found", branch))?;
    let local_tip = local.peel_to_commit()?;

    if local_tip.id() == remote_tip.id() {
        return Ok(format!("{} already up to date", branch));
    }
    let base = repo.merge_base(local_tip.id(), remote_tip.id())?;
    if base == remote_tip.id() {
        return Ok(format!("{} is ahead of {}/{}", branch, p.remote, branch));
    }
    if base != local_tip.id() {
        bail!(
            "cannot fast-forward {} to {}/{}: histories diverged",
            branch,
            p.remote,
            branch
        );
    }

    // Working tree first, while HEAD still names the old tree as baseline.
    if current_branch(repo).ok().as_deref() == Some(branch.as_str()) {
        repo.checkout_tree(remote_tip.as_object(), Some(CheckoutBuilder::new().safe()))
            .context("failed to update working tree")?;
    }
    local.set_target(remote_tip.id(), "gitfleet: fast-forward")?;
    Ok(format!(
        "fast-forwarded {} to {}",
        branch,
        &remote_tip.id().to_string()[..7]
    ))
}

fn push(repo: &Repository, p: &RemoteParams) -> Result<String> {
    let branch = branch_or_head(repo, &p.branch)?;
    let mut remote = repo
        .find_remote(&p.remote)
        .with_context(|| format!("remote '{}' not found", p.remote))?;
    let mut cb = callbacks();
    cb.push_update_reference(|refname, rejected| match rejected {
        Some(msg) => Err(git2::Error::from_str(&format!(
            "{} rejected: {}",
            refname, msg
        ))),
        None => Ok(()),
    });
    let mut po = PushOptions::new();
    po.remote_callbacks(cb);
    let refspec = format!("refs/heads/{0}:refs/heads/{0}", branch);
    remote
        .push(&[refspec.as_str()], Some(&mut po))
        .with_context(|| format!("git push {} {}", p.remote, branch))?;
    Ok(format!("pushed {} to {}", branch, p.remote))
}

fn sync(repo: &Repository, p: &RemoteParams) -> Result<String> {
    let pulled = pull(repo, p)?;
    let pushed = push(repo, p)?;
    Ok(format!("{}; {}", pulled, pushed))
}

fn has_tracked_changes(repo: &Repository) -> Result<bool> {
    let mut opts = StatusOptions::new();
    opts.include_untracked(false).include_ignored(false);
    Ok(!repo.statuses(Some(&mut opts))?.is_empty())
}

/// Attach HEAD to a local branch. When only a remote-tracking branch
/// exists, a local tracking branch is created from it, looking at `origin`
/// first and then the other remotes.
fn switch_branch(repo: &Repository, p: &CheckoutParams) -> Result<String> {
    if has_tracked_changes(repo)? {
        bail!("working tree has uncommitted changes");
    }
    let branch = match repo.find_branch(&p.branch, BranchType::Local) {
        Ok(b) => b,
        Err(_) => {
            let upstream = find_remote_branch(repo, &p.branch)?
                .ok_or_else(|| anyhow!("branch '{}' not found", p.branch))?;
            let tip = repo
                .find_branch(&upstream, BranchType::Remote)?
                .get()
                .peel_to_commit()?;
            let mut b = repo.branch(&p.branch, &tip, false)?;
            b.set_upstream(Some(&upstream))?;
            b
        }
    };
    let reference = branch.into_reference();
    let name = reference
        .name()
        .ok_or_else(|| anyhow!("invalid reference name"))?;
    let commit = reference.peel_to_commit()?;
    repo.checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().safe()))?;
    repo.set_head(name)?;
    Ok(format!("switched to {}", p.branch))
}

/// `<remote>/<branch>` of the first remote that has it, `origin` first.
fn find_remote_branch(repo: &Repository, branch: &str) -> Result<Option<String>> {
    let remotes = repo.remotes()?;
    let mut names: Vec<&str> = remotes.iter().flatten().collect();
    names.sort_by_key(|r| *r != "origin");
    Ok(names
        .into_iter()
        .map(|remote| format!("{}/{}", remote, branch))
        .find(|name| repo.find_branch(name, BranchType::Remote).is_ok()))
}

fn create_branch(repo: &Repository, p: &CreateBranchParams) -> Result<String> {
    if repo.find_branch(&p.name, BranchType::Local).is_ok() {
        bail!("branch '{}' already exists", p.name);
    }
    let head = repo
        .head()
        .context("failed to read HEAD")?
        .peel_to_commit()?;
    repo.branch(&p.name, &head, false)?;
    if p.checkout {
        repo.set_head(&format!("refs/heads/{}", p.name))?;
        return Ok(format!("created and switched to {}", p.name));
    }
    Ok(format!("created {}", p.name))
}

fn delete_branch(repo: &Repository, p: &DeleteBranchParams) -> Result<String> {
    let mut branch = repo
        .find_branch(&p.name, BranchType::Local)
        .map_err(|_| anyhow!("branch '{}' not found", p.name))?;
    if branch.is_head() {
        bail!("cannot delete the current branch '{}'", p.name);
    }
    if !p.force {
        let tip = branch.get().peel_to_commit()?.id();
        let head = repo.head()?.peel_to_commit()?.id();
        let merged = tip == head || repo.graph_descendant_of(head, tip)?;
        if !merged {
            bail!("branch '{}' is not fully merged", p.name);
        }
    }
    branch.delete()?;
    Ok(format!("deleted {}", p.name))
}

fn signature(repo: &Repository) -> Result<Signature<'static>> {
    repo.signature()
        .or_else(|_| Signature::now("gitfleet", "gitfleet@localhost"))
        .map_err(Into::into)
}

fn stash(repo: &mut Repository, p: &StashParams) -> Result<String> {
    let sig = signature(repo)?;
    let flags = if p.include_untracked {
        StashFlags::INCLUDE_UNTRACKED
    } else {
        StashFlags::DEFAULT
    };
    let message = p.message.as_deref().unwrap_or("gitfleet stash");
    let oid = match repo.stash_save(&sig, message, Some(flags)) {
        Ok(oid) => oid,
        Err(e) if e.code() == git2::ErrorCode::NotFound => bail!("nothing to stash"),
        Err(e) => return Err(e).context("failed to stash"),
    };
    Ok(format!("stashed {}", &oid.to_string()[..7]))
}

fn reset(repo: &Repository, p: &ResetParams) -> Result<String> {
    let obj = repo
        .revparse_single(&p.target)
        .with_context(|| format!("rev not found: {}", p.target))?;
    let commit = obj.peel_to_commit()?;
    let kind = match p.mode {
        ResetMode::Soft => ResetType::Soft,
        ResetMode::Mixed => ResetType::Mixed,
        ResetMode::Hard => ResetType::Hard,
    };
    repo.reset(commit.as_object(), kind, None)?;
    Ok(format!(
        "reset ({:?}) to {}",
        p.mode,
        &commit.id().to_string()[..7]
    )
    .to_lowercase())
}

/// Remove untracked entries. Untracked directories show up as one entry
/// ending in `/` and are only removed with `directories`.
fn clean(repo: &Repository, p: &CleanParams) -> Result<String> {
    let workdir = repo
        .workdir()
        .ok_or_else(|| anyhow!("bare repository has no working tree"))?;
    let mut opts = StatusOptions::new();
    opts.include_untracked(true)
        .recurse_untracked_dirs(false)
        .include_ignored(false);

    let mut removed = 0usize;
    for entry in repo.statuses(Some(&mut opts))?.iter() {
        if !entry.status().contains(Status::WT_NEW) {
            continue;
        }
        let Some(rel) = entry.path() else { continue };
        let full = workdir.join(rel);
        if rel.ends_with('/') {
            if p.directories {
                fs::remove_dir_all(&full)
                    .with_context(|| format!("failed to remove {}", full.display()))?;
                removed += 1;
            }
        } else {
            fs::remove_file(&full)
                .with_context(|| format!("failed to remove {}", full.display()))?;
            removed += 1;
        }
    }
    Ok(format!("removed {} untracked entries", removed))
}

fn status(repo: &Repository) -> Result<String> {
    let branch = current_branch(repo).unwrap_or_else(|_| "HEAD".to_string());
    let mut opts = StatusOptions::new();
    opts.include_untracked(true).recurse_untracked_dirs(true);

    let (mut modified, mut added, mut deleted, mut untracked) = (0, 0, 0, 0);
    for entry in repo.statuses(Some(&mut opts))?.iter() {
        let s = entry.status();
        if s.intersects(Status::WT_MODIFIED | Status::INDEX_MODIFIED) {
            modified += 1;
        }
        if s.contains(Status::INDEX_NEW) {
            added += 1;
        }
        if s.intersects(Status::WT_DELETED | Status::INDEX_DELETED) {
            deleted += 1;
        }
        if s.contains(Status::WT_NEW) {
            untracked += 1;
        }
    }
    Ok(format!(
        "{}: {} modified, {} added, {} deleted, {} untracked",
        branch, modified, added, deleted, untracked
    ))
}
