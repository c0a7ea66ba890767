use std::collections::HashSet;

use thiserror::Error;

use interunit_core::{MatchStatus, Transaction};

use crate::matcher::{CandidateMatch, MatchConfig, Matcher};

/// Errors surfaced by a store backing the match lifecycle.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("transaction {0} not found")]
    NotFound(String),
    #[error("pair write conflict: {0}")]
    Conflict(String),
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Store port for the reconciliation engine, passed in explicitly at call
/// time. Every pair write is all-or-nothing: either both participants
/// update or neither does, so the symmetric `matched_with` link is never
/// observed half-applied.
#[allow(async_fn_in_trait)]
pub trait MatchStore {
    /// Point-in-time snapshot of unmatched entries.
    async fn fetch_unmatched(&self) -> Result<Vec<Transaction>, StoreError>;

    async fn fetch(&self, uid: &str) -> Result<Option<Transaction>, StoreError>;

    /// unmatched → matched on both participants: symmetric `matched_with`,
    /// the matched reference into `keywords`, a fresh match timestamp.
    /// Fails with `Conflict` (and no changes) when either side is no
    /// longer unmatched.
    async fn mark_matched(&self, candidate: &CandidateMatch) -> Result<(), StoreError>;

    /// matched/confirmed → confirmed on both participants, stamping the
    /// confirming actor and a fresh match timestamp.
    async fn mark_confirmed(&self, uid: &str, partner: &str, actor: &str)
        -> Result<(), StoreError>;

    /// Back to unmatched on both participants, clearing the link, the
    /// matched reference, the confirming actor and the timestamp.
    async fn clear_match(&self, uid: &str, partner: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("transaction {0} not found")]
    NotFound(String),
    #[error("cannot {op} a transaction in state {state}")]
    InvalidState { op: &'static str, state: MatchStatus },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of applying one matcher batch, best-effort per pair.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub applied: Vec<CandidateMatch>,
    /// Candidates whose participant was already claimed earlier in the batch.
    pub skipped: usize,
    pub failed: Vec<(CandidateMatch, StoreError)>,
}

/// Drives the match lifecycle against a store: batch matching plus the
/// confirm/reject operations exposed to callers.
pub struct Reconciler<S> {
    store: S,
    matcher: Matcher,
}

impl<S: MatchStore> Reconciler<S> {
    pub fn new(store: S, config: MatchConfig) -> Self {
        Reconciler {
            store,
            matcher: Matcher::new(config),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// One reconciliation run: snapshot unmatched entries once, find
    /// candidates, apply them pair by pair. A failed pair write is
    /// reported in the outcome and does not abort pairs already applied;
    /// entries inserted concurrently are picked up by a later run.
    pub async fn run(&self) -> Result<BatchOutcome, StoreError> {
        let snapshot = self.store.fetch_unmatched().await?;
        let candidates = self.matcher.find_matches(&snapshot);
        self.apply_batch(candidates).await
    }

    /// As `run`, over a caller-supplied snapshot.
    pub async fn run_with(&self, snapshot: &[Transaction]) -> Result<BatchOutcome, StoreError> {
        let candidates = self.matcher.find_matches(snapshot);
        self.apply_batch(candidates).await
    }

    async fn apply_batch(
        &self,
        candidates: Vec<CandidateMatch>,
    ) -> Result<BatchOutcome, StoreError> {
        let mut outcome = BatchOutcome::default();
        let mut claimed: HashSet<String> = HashSet::new();

        for candidate in candidates {
            if claimed.contains(&candidate.lender_uid) || claimed.contains(&candidate.borrower_uid)
            {
                outcome.skipped += 1;
                continue;
            }
            match self.store.mark_matched(&candidate).await {
                Ok(()) => {
                    claimed.insert(candidate.lender_uid.clone());
                    claimed.insert(candidate.borrower_uid.clone());
                    outcome.applied.push(candidate);
                }
                Err(err) => outcome.failed.push((candidate, err)),
            }
        }
        Ok(outcome)
    }

    /// matched → confirmed on the identified transaction and its partner.
    /// Confirming an already-confirmed transaction is a no-op success.
    pub async fn confirm(&self, uid: &str, actor: &str) -> Result<(), LifecycleError> {
        let tx = self
            .store
            .fetch(uid)
            .await?
            .ok_or_else(|| LifecycleError::NotFound(uid.to_string()))?;

        match (tx.match_status, &tx.matched_with) {
            (MatchStatus::Matched, Some(partner)) => {
                self.store.mark_confirmed(uid, partner, actor).await?;
                Ok(())
            }
            (MatchStatus::Confirmed, _) => Ok(()),
            (state, _) => Err(LifecycleError::InvalidState { op: "confirm", state }),
        }
    }

    /// matched/confirmed → unmatched on both participants. A transaction
    /// without a partner is already unmatched; the call is a no-op, not an
    /// error. `actor` is accepted for parity with `confirm` and not
    /// recorded.
    pub async fn reject(&self, uid: &str, _actor: &str) -> Result<(), LifecycleError> {
        let tx = self
            .store
            .fetch(uid)
            .await?
            .ok_or_else(|| LifecycleError::NotFound(uid.to_string()))?;

        match (tx.match_status, &tx.matched_with) {
            (MatchStatus::Matched | MatchStatus::Confirmed, Some(partner)) => {
                self.store.clear_match(uid, partner).await?;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::RoleConvention;
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;
    use std::collections::HashMap;
    use std::str::FromStr;
    use std::sync::Mutex;

    /// In-memory stand-in honoring the pair-write contract.
    struct MemoryStore {
        rows: Mutex<HashMap<String, Transaction>>,
    }

    impl MemoryStore {
        fn new(rows: Vec<Transaction>) -> Self {
            MemoryStore {
                rows: Mutex::new(rows.into_iter().map(|t| (t.uid.clone(), t)).collect()),
            }
        }

        fn get(&self, uid: &str) -> Transaction {
            self.rows.lock().unwrap().get(uid).cloned().unwrap()
        }
    }

    impl MatchStore for MemoryStore {
        async fn fetch_unmatched(&self) -> Result<Vec<Transaction>, StoreError> {
            let rows = self.rows.lock().unwrap();
            let mut unmatched: Vec<Transaction> = rows
                .values()
                .filter(|t| t.match_status == MatchStatus::Unmatched)
                .cloned()
                .collect();
            unmatched.sort_by(|a, b| a.uid.cmp(&b.uid));
            Ok(unmatched)
        }

        async fn fetch(&self, uid: &str) -> Result<Option<Transaction>, StoreError> {
            Ok(self.rows.lock().unwrap().get(uid).cloned())
        }

        async fn mark_matched(&self, candidate: &CandidateMatch) -> Result<(), StoreError> {
            let mut rows = self.rows.lock().unwrap();
            for uid in [&candidate.lender_uid, &candidate.borrower_uid] {
                let tx = rows
                    .get(uid.as_str())
                    .ok_or_else(|| StoreError::NotFound(uid.to_string()))?;
                if tx.match_status != MatchStatus::Unmatched {
                    return Err(StoreError::Conflict(uid.to_string()));
                }
            }
            let now = Utc::now();
            let pairs = [
                (&candidate.lender_uid, &candidate.borrower_uid),
                (&candidate.borrower_uid, &candidate.lender_uid),
            ];
            for (uid, partner) in pairs {
                let tx = rows.get_mut(uid.as_str()).unwrap();
                tx.match_status = MatchStatus::Matched;
                tx.matched_with = Some(partner.to_string());
                tx.keywords = Some(candidate.reference.clone());
                tx.match_timestamp = Some(now);
            }
            Ok(())
        }

        async fn mark_confirmed(
            &self,
            uid: &str,
            partner: &str,
            actor: &str,
        ) -> Result<(), StoreError> {
            let mut rows = self.rows.lock().unwrap();
            let now = Utc::now();
            for id in [uid, partner] {
                let tx = rows
                    .get_mut(id)
                    .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
                tx.match_status = MatchStatus::Confirmed;
                tx.confirmed_by = Some(actor.to_string());
                tx.match_timestamp = Some(now);
            }
            Ok(())
        }

        async fn clear_match(&self, uid: &str, partner: &str) -> Result<(), StoreError> {
            let mut rows = self.rows.lock().unwrap();
            for id in [uid, partner] {
                let tx = rows
                    .get_mut(id)
                    .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
                tx.match_status = MatchStatus::Unmatched;
                tx.matched_with = None;
                tx.keywords = None;
                tx.confirmed_by = None;
                tx.match_timestamp = None;
            }
            Ok(())
        }
    }

    fn tx(uid: &str, particulars: &str, debit: Option<&str>, credit: Option<&str>) -> Transaction {
        Transaction {
            uid: uid.to_string(),
            lender: "Steel".to_string(),
            borrower: "GeoTex".to_string(),
            statement_month: None,
            statement_year: None,
            date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            particulars: particulars.to_string(),
            voucher_type: String::new(),
            voucher_no: String::new(),
            debit: debit.map(|d| Decimal::from_str(d).unwrap()),
            credit: credit.map(|c| Decimal::from_str(c).unwrap()),
            entered_by: None,
            match_status: MatchStatus::Unmatched,
            matched_with: None,
            keywords: None,
            confirmed_by: None,
            match_timestamp: None,
        }
    }

    fn reconciler(rows: Vec<Transaction>) -> Reconciler<MemoryStore> {
        Reconciler::new(
            MemoryStore::new(rows),
            MatchConfig { convention: RoleConvention::DebitLends },
        )
    }

    #[tokio::test]
    async fn run_links_both_sides_symmetrically() {
        let r = reconciler(vec![
            tx("L1", "ABC/PO/2024/1/100", Some("1000.00"), None),
            tx("B1", "ABC/PO/2024/1/100", None, Some("1000.00")),
        ]);
        let outcome = r.run().await.unwrap();
        assert_eq!(outcome.applied.len(), 1);
        assert_eq!(outcome.skipped, 0);
        assert!(outcome.failed.is_empty());

        let lender = r.store().get("L1");
        let borrower = r.store().get("B1");
        assert_eq!(lender.match_status, MatchStatus::Matched);
        assert_eq!(lender.matched_with.as_deref(), Some("B1"));
        assert_eq!(borrower.matched_with.as_deref(), Some("L1"));
        assert_eq!(lender.keywords.as_deref(), Some("ABC/PO/2024/1/100"));
        assert!(lender.match_timestamp.is_some());
    }

    #[tokio::test]
    async fn ambiguous_candidates_claim_first_pair_only() {
        // Two borrower rows both satisfy L1; the second candidate must be
        // skipped, not silently overwrite the first link.
        let r = reconciler(vec![
            tx("L1", "ABC/PO/2024/1/100", Some("1000.00"), None),
            tx("B1", "ABC/PO/2024/1/100", None, Some("1000.00")),
            tx("B2", "ABC/PO/2024/1/100", None, Some("1000.00")),
        ]);
        let outcome = r.run().await.unwrap();
        assert_eq!(outcome.applied.len(), 1);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(r.store().get("B2").match_status, MatchStatus::Unmatched);
    }

    #[tokio::test]
    async fn confirm_stamps_actor_on_both_sides() {
        let r = reconciler(vec![
            tx("L1", "ABC/PO/2024/1/100", Some("1000.00"), None),
            tx("B1", "ABC/PO/2024/1/100", None, Some("1000.00")),
        ]);
        r.run().await.unwrap();
        r.confirm("L1", "auditor").await.unwrap();

        for uid in ["L1", "B1"] {
            let t = r.store().get(uid);
            assert_eq!(t.match_status, MatchStatus::Confirmed);
            assert_eq!(t.confirmed_by.as_deref(), Some("auditor"));
        }
        // Repeat confirm is a no-op success.
        r.confirm("B1", "auditor").await.unwrap();
    }

    #[tokio::test]
    async fn confirm_on_unmatched_is_invalid() {
        let r = reconciler(vec![tx("L1", "x", Some("1.00"), None)]);
        let err = r.confirm("L1", "auditor").await.unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::InvalidState { op: "confirm", state: MatchStatus::Unmatched }
        ));
        assert!(matches!(
            r.confirm("missing", "auditor").await.unwrap_err(),
            LifecycleError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn reject_resets_both_sides_to_unmatched_defaults() {
        let r = reconciler(vec![
            tx("L1", "ABC/PO/2024/1/100", Some("1000.00"), None),
            tx("B1", "ABC/PO/2024/1/100", None, Some("1000.00")),
        ]);
        r.run().await.unwrap();
        r.confirm("L1", "auditor").await.unwrap();
        r.reject("B1", "auditor").await.unwrap();

        for uid in ["L1", "B1"] {
            let t = r.store().get(uid);
            assert_eq!(t.match_status, MatchStatus::Unmatched);
            assert_eq!(t.matched_with, None);
            assert_eq!(t.keywords, None);
            assert_eq!(t.confirmed_by, None);
            assert_eq!(t.match_timestamp, None);
        }
    }

    #[tokio::test]
    async fn reject_on_unmatched_is_a_noop() {
        let r = reconciler(vec![tx("L1", "x", Some("1.00"), None)]);
        r.reject("L1", "auditor").await.unwrap();
        assert_eq!(r.store().get("L1").match_status, MatchStatus::Unmatched);
    }

    #[tokio::test]
    async fn rejected_pair_is_matchable_again() {
        let r = reconciler(vec![
            tx("L1", "ABC/PO/2024/1/100", Some("1000.00"), None),
            tx("B1", "ABC/PO/2024/1/100", None, Some("1000.00")),
        ]);
        r.run().await.unwrap();
        r.reject("L1", "auditor").await.unwrap();

        let outcome = r.run().await.unwrap();
        assert_eq!(outcome.applied.len(), 1);
        assert_eq!(r.store().get("L1").match_status, MatchStatus::Matched);
    }

    #[tokio::test]
    async fn failed_pair_does_not_abort_the_batch() {
        let r = reconciler(vec![
            tx("L1", "ABC/PO/2024/1/100", Some("1000.00"), None),
            tx("B1", "ABC/PO/2024/1/100", None, Some("1000.00")),
            tx("L2", "XYZ/PO/2024/2/200", Some("2000.00"), None),
            tx("B2", "XYZ/PO/2024/2/200", None, Some("2000.00")),
        ]);
        // Claim B2 out from under the batch.
        let snapshot = r.store().fetch_unmatched().await.unwrap();
        r.store()
            .mark_matched(&CandidateMatch {
                lender_uid: "L2".to_string(),
                borrower_uid: "B2".to_string(),
                amount: Decimal::from(2000),
                kind: crate::reference::ReferenceKind::Po,
                reference: "XYZ/PO/2024/2/200".to_string(),
            })
            .await
            .unwrap();

        let outcome = r.run_with(&snapshot).await.unwrap();
        assert_eq!(outcome.applied.len(), 1);
        assert_eq!(outcome.failed.len(), 1);
        assert!(matches!(outcome.failed[0].1, StoreError::Conflict(_)));
        // The pair that applied first stays applied.
        assert_eq!(r.store().get("L1").match_status, MatchStatus::Matched);
    }
}
