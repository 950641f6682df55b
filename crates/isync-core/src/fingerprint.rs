//! Deterministic content hashing for issue records.
//!
//! Produces a SHA-256 hex digest over the normalized payload fields
//! (excluding identifier and timestamps) so that identical content produces
//! identical fingerprints regardless of when or where it was fetched.
//!
//! Fingerprints are opaque to consumers: only equality is meaningful.

use sha2::{Digest, Sha256};

use crate::record::IssueRecord;

/// Separator byte written between fields.
const SEP: u8 = 0;

/// Computes a stable fingerprint for a normalized issue record.
///
/// Relationship edges are sorted before hashing so that fetchers that return
/// edges in a different order each call still produce the same fingerprint.
pub fn fingerprint(record: &IssueRecord) -> String {
    let mut h = Sha256::new();

    write_str(&mut h, record.identifier.as_str());
    write_str(&mut h, record.project_key());
    write_str(&mut h, &record.summary);

    let mut edges: Vec<(&str, &str)> = record
        .relationships
        .iter()
        .map(|e| (e.kind.as_str(), e.peer.as_str()))
        .collect();
    edges.sort_unstable();
    for (kind, peer) in edges {
        write_str(&mut h, kind);
        write_str(&mut h, peer);
    }

    // Opaque extra payload: hash its canonical JSON form so unrecognized
    // remote fields still participate in change detection.
    write_str(&mut h, &serde_json::to_string(&record.extra).unwrap_or_default());

    format!("{:x}", h.finalize())
}

fn write_str(h: &mut Sha256, s: &str) {
    h.update(s.as_bytes());
    h.update([SEP]);
}
