//! The Link Manager: materializes in-issue relationship edges as filesystem
//! references under each project's `relationships/` subtree.
//!
//! References are plain text files at
//! `{repo}/projects/{project}/relationships/{kind}/{peer-identifier}`
//! whose contents are the relative path to the peer's issue file, or empty
//! for a dangling reference (peer not in the known set).
//!
//! Runs once at batch end over the full set of in-batch plus previously-known
//! records — never recursed through edges, one issue at a time, per the
//! cyclic-graph design note: `A blocks B, B blocks A` is malformed but must
//! not cause unbounded traversal.

use isync_core::{Identifier, IssueRecord, RelationshipKind};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

type Result<T> = std::result::Result<T, LinkError>;

#[derive(Debug, Clone, Default)]
pub struct ReconcileOutcome {
    /// Reference paths created or updated this run.
    pub written: Vec<PathBuf>,
    /// Reference paths removed by the stale-link sweep.
    pub removed: Vec<PathBuf>,
    /// Reference paths written as dangling markers (peer unknown).
    pub dangling: Vec<PathBuf>,
}

/// Desired edge: subject project + kind directory, peer identifier, and peer
/// known-ness (which decides whether the reference target is real or
/// dangling).
struct DesiredRef {
    peer: Identifier,
    target_artifact: Option<PathBuf>,
}

/// Reconciles the on-disk relationship tree so it matches the edges declared
/// across `records`, given `known_set` (identifiers present in the state plus
/// those committed this batch).
///
/// `artifact_path` resolves an identifier to its issue file's repo-relative
/// path, used to compute reference targets for known peers.
pub fn reconcile(
    repo_root: &Path,
    records: &[IssueRecord],
    known_set: &HashSet<Identifier>,
    artifact_path: impl Fn(&Identifier) -> Option<PathBuf>,
) -> Result<ReconcileOutcome> {
    let mut outcome = ReconcileOutcome::default();

    // project -> kind -> desired refs
    let mut desired: BTreeMap<String, BTreeMap<&'static str, Vec<DesiredRef>>> = BTreeMap::new();

    for record in records {
        let subject = &record.identifier;
        for edge in &record.relationships {
            let materialize = if edge.kind.is_inverse_pair() {
                // Canonical (lexicographically smaller) side is always
                // authoritative; the other side only materializes when its
                // peer (the canonical side) is itself known.
                subject <= &edge.peer || known_set.contains(&edge.peer)
            } else {
                true
            };
            if !materialize {
                continue;
            }

            let target = if known_set.contains(&edge.peer) {
                artifact_path(&edge.peer)
            } else {
                None
            };

            desired
                .entry(subject.project_key().to_owned())
                .or_default()
                .entry(kind_dir(&edge.kind))
                .or_default()
                .push(DesiredRef { peer: edge.peer.clone(), target_artifact: target });
        }
    }

    for (project, kinds) in &desired {
        for (kind_name, refs) in kinds {
            let dir = repo_root
                .join("projects")
                .join(project)
                .join("relationships")
                .join(kind_name);
            reconcile_dir(&dir, refs, &mut outcome)?;
        }
    }

    // Stale-link sweep: remove kind directories under known projects that no
    // longer have any desired entry, and any file within a still-live kind
    // directory that isn't in this run's desired set.
    sweep_known_projects(repo_root, records, &desired, &mut outcome)?;

    debug!(
        written = outcome.written.len(),
        removed = outcome.removed.len(),
        dangling = outcome.dangling.len(),
        "relationship reconcile complete"
    );
    Ok(outcome)
}

fn kind_dir(kind: &RelationshipKind) -> &'static str {
    // `as_str()` returns a `&str` borrowed from `self`; known variants are
    // `'static` string literals in the macro, so this is safe to widen for
    // the known set we actually construct directories from here.
    match kind {
        RelationshipKind::EpicParent => "epic-parent",
        RelationshipKind::Subtask => "subtask",
        RelationshipKind::Blocks => "blocks",
        RelationshipKind::BlockedBy => "blocked-by",
        RelationshipKind::Clones => "clones",
        RelationshipKind::ClonedBy => "cloned-by",
        RelationshipKind::RelatesTo => "relates-to",
        RelationshipKind::Causes => "causes",
        RelationshipKind::CausedBy => "caused-by",
        RelationshipKind::Duplicates => "duplicates",
        RelationshipKind::DuplicatedBy => "duplicated-by",
        RelationshipKind::Custom(_) => "custom",
    }
}

fn reconcile_dir(dir: &Path, desired: &[DesiredRef], outcome: &mut ReconcileOutcome) -> Result<()> {
    fs::create_dir_all(dir).map_err(|source| LinkError::Io { path: dir.to_path_buf(), source })?;

    for desired_ref in desired {
        let path = dir.join(desired_ref.peer.as_str());
        let content = desired_ref
            .target_artifact
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();

        let needs_write = match fs::read_to_string(&path) {
            Ok(existing) => existing != content,
            Err(_) => true,
        };

        if needs_write {
            fs::write(&path, &content).map_err(|source| LinkError::Io { path: path.clone(), source })?;
            outcome.written.push(path.clone());
            if content.is_empty() {
                outcome.dangling.push(path);
            }
        }
    }

    // Remove entries in this directory that aren't in the desired set.
    let desired_names: HashSet<&str> = desired.iter().map(|d| d.peer.as_str()).collect();
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
            if !desired_names.contains(name) {
                fs::remove_file(&path).map_err(|source| LinkError::Io { path: path.clone(), source })?;
                outcome.removed.push(path);
            }
        }
    }

    Ok(())
}

fn sweep_known_projects(
    repo_root: &Path,
    records: &[IssueRecord],
    desired: &BTreeMap<String, BTreeMap<&'static str, Vec<DesiredRef>>>,
    outcome: &mut ReconcileOutcome,
) -> Result<()> {
    let projects: HashSet<&str> = records.iter().map(|r| r.project_key()).collect();
    for project in projects {
        let empty = BTreeMap::new();
        let live_kinds = desired.get(project).unwrap_or(&empty);
        let relationships_dir = repo_root.join("projects").join(project).join("relationships");
        let Ok(kind_entries) = fs::read_dir(&relationships_dir) else { continue };
        for kind_entry in kind_entries.flatten() {
            let kind_path = kind_entry.path();
            let Some(kind_name) = kind_path.file_name().and_then(|n| n.to_str()) else { continue };
            if !live_kinds.contains_key(kind_name) {
                // No record declares this kind anymore for this project:
                // remove every reference file under it.
                if let Ok(file_entries) = fs::read_dir(&kind_path) {
                    for file_entry in file_entries.flatten() {
                        let path = file_entry.path();
                        fs::remove_file(&path).map_err(|source| LinkError::Io { path: path.clone(), source })?;
                        outcome.removed.push(path);
                    }
                }
            }
        }
    }
    Ok(())
}
