//! The Incremental Filter: reduces a candidate identifier set to the subset
//! actually requiring work, given policy and the persisted Sync State.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use isync_core::Identifier;
use isync_state::SyncState;
use tracing::debug;

/// Incremental-sync policy. All fields default to "off"; combine as needed.
#[derive(Debug, Clone, Default)]
pub struct Policy {
    /// Bypasses all other checks; returns the input set unchanged.
    pub force: bool,
    /// Identifiers absent from the state are admitted.
    pub include_new: bool,
    /// Identifiers present in the state are admitted if modified, per `probe`.
    pub include_modified: bool,
    /// Identifiers whose stored last-updated predates this are excluded.
    pub since: Option<DateTime<Utc>>,
    /// Identifiers whose stored last-updated is older than now - max_age are excluded.
    pub max_age: Option<std::time::Duration>,
    /// If non-empty, identifiers whose project key is not in this set are excluded.
    pub project_filter: Vec<String>,
}

/// A cheap out-of-band freshness check, consulted only for identifiers
/// already present in the state under `include_modified`.
///
/// A probe failure (network error, not-found) admits the identifier
/// (fail-open) rather than silently dropping work.
pub trait FreshnessProbe {
    /// The remote's last-modified timestamp for `identifier`, if it can be
    /// determined cheaply. `Ok(None)` means "could not determine" (fail-open).
    fn last_modified(&self, identifier: &Identifier) -> Result<Option<DateTime<Utc>>, String>;
}

/// A probe that never resolves; every present identifier fails open and is
/// admitted purely by fingerprint comparison at fetch time. Useful when no
/// cheap out-of-band check is available.
pub struct NoProbe;

impl FreshnessProbe for NoProbe {
    fn last_modified(&self, _identifier: &Identifier) -> Result<Option<DateTime<Utc>>, String> {
        Ok(None)
    }
}

/// Reduces `candidates` to the subset requiring work under `policy`.
pub fn filter(
    candidates: &[Identifier],
    state: &SyncState,
    policy: &Policy,
    probe: &dyn FreshnessProbe,
) -> Vec<Identifier> {
    if policy.force {
        debug!(count = candidates.len(), "force policy admits all candidates");
        return candidates.to_vec();
    }

    let now = Utc::now();
    let admitted: Vec<Identifier> = candidates
        .iter()
        .filter(|identifier| admits(identifier, state, policy, probe, now))
        .cloned()
        .collect();
    debug!(candidates = candidates.len(), admitted = admitted.len(), "incremental filter applied");
    admitted
}

fn admits(
    identifier: &Identifier,
    state: &SyncState,
    policy: &Policy,
    probe: &dyn FreshnessProbe,
    now: DateTime<Utc>,
) -> bool {
    if !policy.project_filter.is_empty()
        && !policy.project_filter.iter().any(|p| p == identifier.project_key())
    {
        return false;
    }

    let existing = state.get_issue(identifier);

    if let Some(state_entry) = existing {
        if let Some(since) = policy.since {
            if state_entry.last_updated < since {
                return false;
            }
        }
        if let Some(max_age) = policy.max_age {
            if let Ok(max_age) = ChronoDuration::from_std(max_age) {
                if state_entry.last_updated < now - max_age {
                    return false;
                }
            }
        }
    }

    match existing {
        None => policy.include_new,
        Some(state_entry) => {
            if !policy.include_modified {
                return false;
            }
            match probe.last_modified(identifier) {
                Ok(Some(remote_modified)) => remote_modified > state_entry.last_updated,
                Ok(None) => true,
                Err(_) => true,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use isync_core::record::RelationshipEdge;
    use isync_core::{IssueRecord, RelationshipKind};
    use isync_state::{RepositoryDescriptor, SyncState};
    use std::time::Duration;

    fn state_with(id: &str, last_updated: DateTime<Utc>) -> SyncState {
        let mut state = SyncState::new(RepositoryDescriptor {
            path: "/tmp/r".into(),
            branch: "main".into(),
            initial_sync: true,
        });
        let mut record = IssueRecord {
            identifier: Identifier::parse(id).unwrap(),
            summary: "s".into(),
            last_modified: last_updated,
            relationships: vec![RelationshipEdge::new(
                RelationshipKind::RelatesTo,
                Identifier::parse("X-9").unwrap(),
            )],
            extra: Default::default(),
        };
        state.update_issue(&record, format!("projects/{}/issues/{}.yaml", Identifier::parse(id).unwrap().project_key(), id).into());
        record.last_modified = last_updated;
        state
    }

    #[test]
    fn force_bypasses_everything() {
        let state = SyncState::new(RepositoryDescriptor { path: "/tmp/r".into(), branch: "main".into(), initial_sync: true });
        let candidates = vec![Identifier::parse("A-1").unwrap()];
        let policy = Policy { force: true, ..Default::default() };
        let result = filter(&candidates, &state, &policy, &NoProbe);
        assert_eq!(result, candidates);
    }

    #[test]
    fn include_new_admits_unknown_identifiers() {
        let state = SyncState::new(RepositoryDescriptor { path: "/tmp/r".into(), branch: "main".into(), initial_sync: true });
        let candidates = vec![Identifier::parse("A-1").unwrap()];
        let policy = Policy { include_new: true, ..Default::default() };
        assert_eq!(filter(&candidates, &state, &policy, &NoProbe), candidates);
    }

    #[test]
    fn without_include_new_unknown_identifiers_are_excluded() {
        let state = SyncState::new(RepositoryDescriptor { path: "/tmp/r".into(), branch: "main".into(), initial_sync: true });
        let candidates = vec![Identifier::parse("A-1").unwrap()];
        let policy = Policy::default();
        assert!(filter(&candidates, &state, &policy, &NoProbe).is_empty());
    }

    #[test]
    fn include_modified_fails_open_on_probe_error() {
        struct FailingProbe;
        impl FreshnessProbe for FailingProbe {
            fn last_modified(&self, _: &Identifier) -> Result<Option<DateTime<Utc>>, String> {
                Err("network down".into())
            }
        }
        let id = Identifier::parse("A-1").unwrap();
        let state = state_with("A-1", Utc::now());
        let policy = Policy { include_modified: true, ..Default::default() };
        assert_eq!(filter(&[id], &state, &policy, &FailingProbe), vec![Identifier::parse("A-1").unwrap()]);
    }

    #[test]
    fn include_modified_excludes_when_probe_reports_unchanged() {
        struct StaticProbe(DateTime<Utc>);
        impl FreshnessProbe for StaticProbe {
            fn last_modified(&self, _: &Identifier) -> Result<Option<DateTime<Utc>>, String> {
                Ok(Some(self.0))
            }
        }
        let stored_time = Utc::now();
        let id = Identifier::parse("A-1").unwrap();
        let state = state_with("A-1", stored_time);
        let policy = Policy { include_modified: true, ..Default::default() };
        let probe = StaticProbe(stored_time);
        assert!(filter(&[id], &state, &policy, &probe).is_empty());
    }

    #[test]
    fn since_excludes_stale_entries() {
        let id = Identifier::parse("A-1").unwrap();
        let old_time = Utc::now() - ChronoDuration::days(10);
        let state = state_with("A-1", old_time);
        let policy = Policy {
            include_modified: true,
            since: Some(Utc::now() - ChronoDuration::days(1)),
            ..Default::default()
        };
        assert!(filter(&[id], &state, &policy, &NoProbe).is_empty());
    }

    #[test]
    fn max_age_excludes_entries_older_than_window() {
        let id = Identifier::parse("A-1").unwrap();
        let old_time = Utc::now() - ChronoDuration::days(10);
        let state = state_with("A-1", old_time);
        let policy = Policy {
            include_modified: true,
            max_age: Some(Duration::from_secs(3600)),
            ..Default::default()
        };
        assert!(filter(&[id], &state, &policy, &NoProbe).is_empty());
    }

    #[test]
    fn project_filter_excludes_other_projects() {
        let candidates = vec![Identifier::parse("A-1").unwrap(), Identifier::parse("B-1").unwrap()];
        let state = SyncState::new(RepositoryDescriptor { path: "/tmp/r".into(), branch: "main".into(), initial_sync: true });
        let policy = Policy {
            include_new: true,
            project_filter: vec!["A".to_owned()],
            ..Default::default()
        };
        assert_eq!(filter(&candidates, &state, &policy, &NoProbe), vec![Identifier::parse("A-1").unwrap()]);
    }
}
