//! Reviewer assignment engine.
//!
//! Decides who reviews a new pull request and who replaces a reviewer that
//! has to be swapped out. The engine owns no data: it reads users from a
//! [`Directory`], reads and updates reviewer lists through a [`Ledger`], and
//! draws randomness from a generator injected at construction.

use crate::db::DbError;
use crate::error::AssignmentError;
use crate::models::{PullRequest, User};
use crate::services::selection::{self, MAX_REVIEWERS};
use rand::rngs::StdRng;
use rand::Rng;
use std::future::Future;
use std::sync::{Arc, Mutex};

/// Read access to users and team membership.
pub trait Directory: Send + Sync {
    /// Look up a user by id. `Ok(None)` when the user does not exist.
    fn get_user(&self, user_id: &str)
        -> impl Future<Output = Result<Option<User>, DbError>> + Send;

    /// Active members of `team_name` in ascending id order, without
    /// `exclude_user_id` when given.
    fn get_active_team_members(
        &self,
        team_name: &str,
        exclude_user_id: Option<&str>,
    ) -> impl Future<Output = Result<Vec<User>, DbError>> + Send;
}

/// Pull request state and reviewer-list mutation.
pub trait Ledger: Send + Sync {
    /// Look up a pull request by id. `Ok(None)` when it does not exist.
    fn get_pull_request(
        &self,
        pr_id: &str,
    ) -> impl Future<Output = Result<Option<PullRequest>, DbError>> + Send;

    fn is_reviewer_assigned(
        &self,
        pr_id: &str,
        user_id: &str,
    ) -> impl Future<Output = Result<bool, DbError>> + Send;

    /// Replace the full reviewer list of `pr_id`, keeping the given order.
    fn replace_reviewers(
        &self,
        pr_id: &str,
        reviewers: &[String],
    ) -> impl Future<Output = Result<(), DbError>> + Send;
}

impl<T: Directory> Directory for Arc<T> {
    fn get_user(&self, user_id: &str) -> impl Future<Output = Result<Option<User>, DbError>> + Send {
        (**self).get_user(user_id)
    }

    fn get_active_team_members(
        &self,
        team_name: &str,
        exclude_user_id: Option<&str>,
    ) -> impl Future<Output = Result<Vec<User>, DbError>> + Send {
        (**self).get_active_team_members(team_name, exclude_user_id)
    }
}

impl<T: Ledger> Ledger for Arc<T> {
    fn get_pull_request(
        &self,
        pr_id: &str,
    ) -> impl Future<Output = Result<Option<PullRequest>, DbError>> + Send {
        (**self).get_pull_request(pr_id)
    }

    fn is_reviewer_assigned(
        &self,
        pr_id: &str,
        user_id: &str,
    ) -> impl Future<Output = Result<bool, DbError>> + Send {
        (**self).is_reviewer_assigned(pr_id, user_id)
    }

    fn replace_reviewers(
        &self,
        pr_id: &str,
        reviewers: &[String],
    ) -> impl Future<Output = Result<(), DbError>> + Send {
        (**self).replace_reviewers(pr_id, reviewers)
    }
}

/// Picks initial reviewers and replacement reviewers.
///
/// The generator sits behind a mutex so one engine can serve concurrent
/// requests; it is never held across an await point.
pub struct AssignmentEngine<D, L, R = StdRng> {
    directory: D,
    ledger: L,
    rng: Mutex<R>,
}

impl<D, L, R> AssignmentEngine<D, L, R>
where
    D: Directory,
    L: Ledger,
    R: Rng + Send,
{
    pub fn new(directory: D, ledger: L, rng: R) -> Self {
        Self {
            directory,
            ledger,
            rng: Mutex::new(rng),
        }
    }

    /// Choose up to two reviewers for a new pull request by `author_id`.
    ///
    /// Candidates are the author's active teammates. The result is a prefix
    /// of a uniform shuffle, so it may be empty or hold a single reviewer
    /// when the team is small. Nothing is persisted.
    pub async fn assign_reviewers(&self, author_id: &str) -> Result<Vec<String>, AssignmentError> {
        let author = self
            .directory
            .get_user(author_id)
            .await?
            .ok_or(AssignmentError::NotFound)?;

        let candidates: Vec<String> = self
            .directory
            .get_active_team_members(&author.team_name, Some(author_id))
            .await?
            .into_iter()
            .map(|user| user.user_id)
            .collect();

        let reviewers =
            self.with_rng(|rng| selection::pick_reviewers(candidates, MAX_REVIEWERS, rng));

        log::debug!(
            "[assign] {} reviewer(s) for author {} in team {}",
            reviewers.len(),
            author_id,
            author.team_name
        );

        Ok(reviewers)
    }

    /// Replace `old_reviewer_id` on `pr_id` with a random eligible teammate
    /// of the old reviewer and return the new reviewer's id.
    ///
    /// Checks run in order: pull request exists, is not merged, has the old
    /// reviewer assigned, and the old reviewer exists. Eligible replacements
    /// are active members of the old reviewer's team other than the author
    /// and anyone already on the reviewer list. On success exactly one
    /// reviewer-list write is issued; on failure none is.
    pub async fn reassign_reviewer(
        &self,
        pr_id: &str,
        old_reviewer_id: &str,
    ) -> Result<String, AssignmentError> {
        let pr = self
            .ledger
            .get_pull_request(pr_id)
            .await?
            .ok_or(AssignmentError::NotFound)?;

        if !pr.is_open() {
            return Err(AssignmentError::PullRequestMerged);
        }

        if !self.ledger.is_reviewer_assigned(pr_id, old_reviewer_id).await? {
            return Err(AssignmentError::NotAssigned);
        }

        let old_reviewer = self
            .directory
            .get_user(old_reviewer_id)
            .await?
            .ok_or(AssignmentError::NotFound)?;

        let candidates: Vec<String> = self
            .directory
            .get_active_team_members(&old_reviewer.team_name, None)
            .await?
            .into_iter()
            .map(|user| user.user_id)
            .filter(|id| *id != pr.author_id && !pr.assigned_reviewers.contains(id))
            .collect();

        let new_reviewer_id = self
            .with_rng(|rng| selection::pick_one(&candidates, rng).cloned())
            .ok_or(AssignmentError::NoCandidate)?;

        let reviewers = substitute_reviewer(&pr.assigned_reviewers, old_reviewer_id, &new_reviewer_id);
        self.ledger.replace_reviewers(pr_id, &reviewers).await?;

        log::info!(
            "[assign] {}: reviewer {} replaced by {}",
            pr_id,
            old_reviewer_id,
            new_reviewer_id
        );

        Ok(new_reviewer_id)
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut R) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut *rng)
    }
}

/// Copy of `reviewers` with every `old` replaced by `new`, order preserved.
fn substitute_reviewer(reviewers: &[String], old: &str, new: &str) -> Vec<String> {
    reviewers
        .iter()
        .map(|id| if id == old { new.to_string() } else { id.clone() })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PullRequestStatus;
    use chrono::Utc;
    use rand::rngs::mock::StepRng;
    use rand::SeedableRng;
    use std::collections::{BTreeMap, HashSet};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// In-memory directory and ledger that counts reviewer-list writes.
    #[derive(Default)]
    struct MemoryStore {
        users: Mutex<BTreeMap<String, User>>,
        pull_requests: Mutex<BTreeMap<String, PullRequest>>,
        writes: AtomicUsize,
        fail_writes: AtomicBool,
    }

    impl MemoryStore {
        fn add_user(&self, id: &str, team: &str, active: bool) {
            self.users.lock().unwrap().insert(
                id.to_string(),
                User {
                    user_id: id.to_string(),
                    username: id.to_uppercase(),
                    team_name: team.to_string(),
                    is_active: active,
                },
            );
        }

        fn remove_user(&self, id: &str) {
            self.users.lock().unwrap().remove(id);
        }

        fn add_pull_request(&self, id: &str, author: &str, reviewers: &[&str], status: PullRequestStatus) {
            self.pull_requests.lock().unwrap().insert(
                id.to_string(),
                PullRequest {
                    pull_request_id: id.to_string(),
                    pull_request_name: format!("Change {}", id),
                    author_id: author.to_string(),
                    status,
                    assigned_reviewers: reviewers.iter().map(|s| s.to_string()).collect(),
                    created_at: Utc::now(),
                    merged_at: None,
                },
            );
        }

        fn reviewers(&self, id: &str) -> Vec<String> {
            self.pull_requests.lock().unwrap()[id].assigned_reviewers.clone()
        }

        fn writes(&self) -> usize {
            self.writes.load(Ordering::SeqCst)
        }
    }

    impl Directory for MemoryStore {
        async fn get_user(&self, user_id: &str) -> Result<Option<User>, DbError> {
            Ok(self.users.lock().unwrap().get(user_id).cloned())
        }

        async fn get_active_team_members(
            &self,
            team_name: &str,
            exclude_user_id: Option<&str>,
        ) -> Result<Vec<User>, DbError> {
            Ok(self
                .users
                .lock()
                .unwrap()
                .values()
                .filter(|u| u.team_name == team_name && u.is_active)
                .filter(|u| Some(u.user_id.as_str()) != exclude_user_id)
                .cloned()
                .collect())
        }
    }

    impl Ledger for MemoryStore {
        async fn get_pull_request(&self, pr_id: &str) -> Result<Option<PullRequest>, DbError> {
            Ok(self.pull_requests.lock().unwrap().get(pr_id).cloned())
        }

        async fn is_reviewer_assigned(&self, pr_id: &str, user_id: &str) -> Result<bool, DbError> {
            Ok(self
                .pull_requests
                .lock()
                .unwrap()
                .get(pr_id)
                .is_some_and(|pr| pr.assigned_reviewers.iter().any(|r| r == user_id)))
        }

        async fn replace_reviewers(&self, pr_id: &str, reviewers: &[String]) -> Result<(), DbError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(DbError::Sqlite(sqlx::Error::PoolClosed));
            }
            self.writes.fetch_add(1, Ordering::SeqCst);
            if let Some(pr) = self.pull_requests.lock().unwrap().get_mut(pr_id) {
                pr.assigned_reviewers = reviewers.to_vec();
            }
            Ok(())
        }
    }

    type TestEngine<R> = AssignmentEngine<Arc<MemoryStore>, Arc<MemoryStore>, R>;

    fn engine_with<R: Rng + Send>(store: &Arc<MemoryStore>, rng: R) -> TestEngine<R> {
        AssignmentEngine::new(store.clone(), store.clone(), rng)
    }

    fn engine(store: &Arc<MemoryStore>, seed: u64) -> TestEngine<StdRng> {
        engine_with(store, StdRng::seed_from_u64(seed))
    }

    /// Team "core": a (author), b and c active, d inactive.
    fn core_team() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::default());
        store.add_user("a", "core", true);
        store.add_user("b", "core", true);
        store.add_user("c", "core", true);
        store.add_user("d", "core", false);
        store.add_user("x", "platform", true);
        store
    }

    #[tokio::test]
    async fn test_assign_picks_permutation_of_active_teammates() {
        let store = core_team();
        for seed in 0..20 {
            let reviewers = engine(&store, seed).assign_reviewers("a").await.unwrap();
            let mut sorted = reviewers.clone();
            sorted.sort();
            assert_eq!(sorted, vec!["b", "c"]);
        }
    }

    #[tokio::test]
    async fn test_assign_both_orders_occur() {
        let store = core_team();
        let engine = engine(&store, 1);
        let mut orders = HashSet::new();
        for _ in 0..50 {
            orders.insert(engine.assign_reviewers("a").await.unwrap());
        }
        assert_eq!(orders.len(), 2);
    }

    #[tokio::test]
    async fn test_assign_count_is_min_of_teammates_and_two() {
        for teammates in 0..=5usize {
            let store = Arc::new(MemoryStore::default());
            store.add_user("author", "t", true);
            store.add_user("idle", "t", false);
            store.add_user("outsider", "other", true);
            for i in 0..teammates {
                store.add_user(&format!("m{}", i), "t", true);
            }

            let engine = engine(&store, teammates as u64);
            for _ in 0..10 {
                let reviewers = engine.assign_reviewers("author").await.unwrap();
                assert_eq!(reviewers.len(), teammates.min(2));
                let distinct: HashSet<_> = reviewers.iter().collect();
                assert_eq!(distinct.len(), reviewers.len());
                assert!(reviewers.iter().all(|r| r.starts_with('m')));
            }
        }
    }

    #[tokio::test]
    async fn test_assign_single_and_empty_candidates() {
        let store = Arc::new(MemoryStore::default());
        store.add_user("solo", "tiny", true);
        assert!(engine(&store, 0).assign_reviewers("solo").await.unwrap().is_empty());

        store.add_user("pal", "tiny", true);
        assert_eq!(engine(&store, 0).assign_reviewers("solo").await.unwrap(), vec!["pal"]);
    }

    #[tokio::test]
    async fn test_assign_unknown_author() {
        let store = core_team();
        let err = engine(&store, 0).assign_reviewers("ghost").await.unwrap_err();
        assert!(matches!(err, AssignmentError::NotFound));
    }

    #[tokio::test]
    async fn test_reassign_missing_pull_request() {
        let store = core_team();
        let err = engine(&store, 0).reassign_reviewer("nope", "b").await.unwrap_err();
        assert!(matches!(err, AssignmentError::NotFound));
    }

    #[tokio::test]
    async fn test_reassign_merged_fails_before_other_checks() {
        let store = core_team();
        store.add_user("e", "core", true);
        store.add_pull_request("pr1", "a", &["b", "c"], PullRequestStatus::Merged);
        let engine = engine(&store, 0);

        for old in ["b", "c", "e", "ghost"] {
            let err = engine.reassign_reviewer("pr1", old).await.unwrap_err();
            assert!(matches!(err, AssignmentError::PullRequestMerged));
        }
        assert_eq!(store.writes(), 0);
        assert_eq!(store.reviewers("pr1"), vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_reassign_not_assigned() {
        let store = core_team();
        store.add_pull_request("pr1", "a", &["b"], PullRequestStatus::Open);
        let engine = engine(&store, 0);

        let err = engine.reassign_reviewer("pr1", "c").await.unwrap_err();
        assert!(matches!(err, AssignmentError::NotAssigned));

        // Unknown users are not assigned either; that check comes first.
        let err = engine.reassign_reviewer("pr1", "ghost").await.unwrap_err();
        assert!(matches!(err, AssignmentError::NotAssigned));
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_reassign_assigned_reviewer_missing_from_directory() {
        let store = core_team();
        store.add_user("gone", "core", true);
        store.add_pull_request("pr1", "a", &["gone"], PullRequestStatus::Open);
        store.remove_user("gone");

        let err = engine(&store, 0).reassign_reviewer("pr1", "gone").await.unwrap_err();
        assert!(matches!(err, AssignmentError::NotFound));
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_reassign_no_candidate_leaves_list_unchanged() {
        let store = core_team();
        store.add_pull_request("pr1", "a", &["b", "c"], PullRequestStatus::Open);

        let err = engine(&store, 0).reassign_reviewer("pr1", "b").await.unwrap_err();
        assert!(matches!(err, AssignmentError::NoCandidate));
        assert_eq!(store.reviewers("pr1"), vec!["b", "c"]);
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_reassign_picks_only_remaining_teammate() {
        let store = core_team();
        store.add_user("e", "core", true);

        for seed in 0..10 {
            store.add_pull_request("pr1", "a", &["b", "c"], PullRequestStatus::Open);
            let new_id = engine(&store, seed).reassign_reviewer("pr1", "b").await.unwrap();
            assert_eq!(new_id, "e");
            assert_eq!(store.reviewers("pr1"), vec!["e", "c"]);
        }
        assert_eq!(store.writes(), 10);
    }

    #[tokio::test]
    async fn test_reassign_draws_from_old_reviewers_team() {
        let store = core_team();
        // Author in "core", reviewer from "platform".
        store.add_user("y", "platform", true);
        store.add_user("z", "platform", false);
        store.add_pull_request("pr1", "a", &["b", "x"], PullRequestStatus::Open);

        let new_id = engine(&store, 3).reassign_reviewer("pr1", "x").await.unwrap();
        assert_eq!(new_id, "y");
        assert_eq!(store.reviewers("pr1"), vec!["b", "y"]);
    }

    #[tokio::test]
    async fn test_reassign_keeps_position_length_and_invariants() {
        for seed in 0..25 {
            let store = core_team();
            for id in ["e", "f", "g"] {
                store.add_user(id, "core", true);
            }
            store.add_pull_request("pr1", "a", &["b", "c"], PullRequestStatus::Open);

            let new_id = engine(&store, seed).reassign_reviewer("pr1", "c").await.unwrap();
            let reviewers = store.reviewers("pr1");

            assert!(["e", "f", "g"].contains(&new_id.as_str()));
            assert_eq!(reviewers.len(), 2);
            assert_eq!(reviewers[0], "b");
            assert_eq!(reviewers[1], new_id);
            assert!(!reviewers.contains(&"a".to_string()));
        }
    }

    #[tokio::test]
    async fn test_reassign_is_not_idempotent() {
        let store = core_team();
        store.add_user("e", "core", true);
        store.add_pull_request("pr1", "a", &["b", "c"], PullRequestStatus::Open);
        let engine = engine(&store, 0);

        engine.reassign_reviewer("pr1", "b").await.unwrap();
        let err = engine.reassign_reviewer("pr1", "b").await.unwrap_err();
        assert!(matches!(err, AssignmentError::NotAssigned));
        assert_eq!(store.writes(), 1);
    }

    #[tokio::test]
    async fn test_reassign_zero_generator_picks_lowest_id() {
        let store = core_team();
        for id in ["g", "e", "f"] {
            store.add_user(id, "core", true);
        }
        store.add_pull_request("pr1", "a", &["b", "c"], PullRequestStatus::Open);

        let engine = engine_with(&store, StepRng::new(0, 0));
        assert_eq!(engine.reassign_reviewer("pr1", "b").await.unwrap(), "e");
    }

    #[tokio::test]
    async fn test_reassign_propagates_ledger_failure() {
        let store = core_team();
        store.add_user("e", "core", true);
        store.add_pull_request("pr1", "a", &["b", "c"], PullRequestStatus::Open);
        store.fail_writes.store(true, Ordering::SeqCst);

        let err = engine(&store, 0).reassign_reviewer("pr1", "b").await.unwrap_err();
        assert!(matches!(err, AssignmentError::Store(DbError::Sqlite(_))));
        assert_eq!(store.reviewers("pr1"), vec!["b", "c"]);
    }

    #[test]
    fn test_substitute_reviewer_replaces_every_occurrence() {
        let list: Vec<String> = ["b", "c", "b"].iter().map(|s| s.to_string()).collect();
        assert_eq!(substitute_reviewer(&list, "b", "e"), vec!["e", "c", "e"]);
        assert_eq!(substitute_reviewer(&list, "z", "e"), list);
    }
}
