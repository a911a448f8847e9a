//! SQLite-backed team directory and pull request ledger.

use crate::db::locks::PullRequestLocks;
use crate::db::pool::DbPool;
use crate::db::DbError;
use crate::models::pull_request::PullRequestRow;
use crate::models::{PullRequest, PullRequestShort, PullRequestStatus, Team, TeamMember, User};
use crate::services::assignment::{Directory, Ledger};
use sqlx::{Sqlite, Transaction};

const USER_COLUMNS: &str = "user_id, username, team_name, is_active";

/// Store for teams, users and pull requests.
///
/// Cloning is cheap; clones share the pool and the per-pull-request locks.
#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
    locks: PullRequestLocks,
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            locks: PullRequestLocks::new(),
        }
    }

    /// Locks that serialize read-modify-write sequences on one pull request.
    pub fn pull_request_locks(&self) -> &PullRequestLocks {
        &self.locks
    }

    // ── Teams & users ────────────────────────────────────────────────────

    /// Create a team and upsert its members.
    ///
    /// Members that already exist are moved into the new team with the
    /// given name and active flag.
    pub async fn create_team(&self, team: &Team) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;

        let exists: (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM teams WHERE team_name = ?)")
                .bind(&team.team_name)
                .fetch_one(&mut *tx)
                .await?;
        if exists.0 {
            return Err(DbError::TeamExists(team.team_name.clone()));
        }

        sqlx::query("INSERT INTO teams (team_name) VALUES (?)")
            .bind(&team.team_name)
            .execute(&mut *tx)
            .await?;

        for member in &team.members {
            sqlx::query(
                r#"
                INSERT INTO users (user_id, username, team_name, is_active)
                VALUES (?, ?, ?, ?)
                ON CONFLICT (user_id) DO UPDATE SET
                    username = excluded.username,
                    team_name = excluded.team_name,
                    is_active = excluded.is_active,
                    updated_at = strftime('%s', 'now')
                "#,
            )
            .bind(&member.user_id)
            .bind(&member.username)
            .bind(&team.team_name)
            .bind(member.is_active)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        log::info!(
            "[db] Created team {} with {} member(s)",
            team.team_name,
            team.members.len()
        );
        Ok(())
    }

    /// Get a team with its members ordered by id.
    pub async fn get_team(&self, team_name: &str) -> Result<Option<Team>, DbError> {
        let exists: (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM teams WHERE team_name = ?)")
                .bind(team_name)
                .fetch_one(&self.pool)
                .await?;
        if !exists.0 {
            return Ok(None);
        }

        let members: Vec<TeamMember> = sqlx::query_as(
            "SELECT user_id, username, is_active FROM users WHERE team_name = ? ORDER BY user_id",
        )
        .bind(team_name)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(Team {
            team_name: team_name.to_string(),
            members,
        }))
    }

    /// Set a user's active flag and return the updated user.
    pub async fn set_user_active(
        &self,
        user_id: &str,
        is_active: bool,
    ) -> Result<Option<User>, DbError> {
        let user: Option<User> = sqlx::query_as(&format!(
            "UPDATE users SET is_active = ?, updated_at = strftime('%s', 'now') WHERE user_id = ? RETURNING {}",
            USER_COLUMNS
        ))
        .bind(is_active)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    // ── Pull requests ────────────────────────────────────────────────────

    /// Insert a new OPEN pull request with its initial reviewers.
    ///
    /// Fails with [`DbError::PullRequestExists`] on a duplicate id and
    /// [`DbError::UserNotFound`] when the author is unknown. The stored
    /// `created_at` replaces the one on `pr`.
    pub async fn create_pull_request(&self, pr: &PullRequest) -> Result<PullRequest, DbError> {
        let mut tx = self.pool.begin().await?;

        let exists: (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM pull_requests WHERE pull_request_id = ?)",
        )
        .bind(&pr.pull_request_id)
        .fetch_one(&mut *tx)
        .await?;
        if exists.0 {
            return Err(DbError::PullRequestExists(pr.pull_request_id.clone()));
        }

        let author: Option<(String,)> = sqlx::query_as("SELECT user_id FROM users WHERE user_id = ?")
            .bind(&pr.author_id)
            .fetch_optional(&mut *tx)
            .await?;
        if author.is_none() {
            return Err(DbError::UserNotFound(pr.author_id.clone()));
        }

        sqlx::query(
            r#"
            INSERT INTO pull_requests (pull_request_id, pull_request_name, author_id, status, created_at)
            VALUES (?, ?, ?, 'OPEN', ?)
            "#,
        )
        .bind(&pr.pull_request_id)
        .bind(&pr.pull_request_name)
        .bind(&pr.author_id)
        .bind(now())
        .execute(&mut *tx)
        .await?;

        insert_reviewers(&mut tx, &pr.pull_request_id, &pr.assigned_reviewers).await?;

        tx.commit().await?;
        log::info!(
            "[db] Created pull request {} with reviewers {:?}",
            pr.pull_request_id,
            pr.assigned_reviewers
        );

        self.get_pull_request(&pr.pull_request_id)
            .await?
            .ok_or_else(|| DbError::Sqlite(sqlx::Error::RowNotFound))
    }

    /// Mark a pull request MERGED. Merging twice keeps the first `merged_at`.
    ///
    /// Returns the pull request afterwards, or `None` if it does not exist.
    pub async fn merge_pull_request(&self, pr_id: &str) -> Result<Option<PullRequest>, DbError> {
        let result = sqlx::query(
            "UPDATE pull_requests SET status = 'MERGED', merged_at = ? WHERE pull_request_id = ? AND status = 'OPEN'",
        )
        .bind(now())
        .bind(pr_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            log::info!("[db] Merged pull request {}", pr_id);
        }

        self.get_pull_request(pr_id).await
    }

    /// Pull requests on which `user_id` is a reviewer, newest first.
    pub async fn reviews_for_user(&self, user_id: &str) -> Result<Vec<PullRequestShort>, DbError> {
        let rows: Vec<(String, String, String, String)> = sqlx::query_as(
            r#"
            SELECT pr.pull_request_id, pr.pull_request_name, pr.author_id, pr.status
            FROM pull_requests pr
            JOIN pull_request_reviewers prr ON pr.pull_request_id = prr.pull_request_id
            WHERE prr.user_id = ?
            ORDER BY pr.created_at DESC, pr.rowid DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(pull_request_id, pull_request_name, author_id, status)| PullRequestShort {
                    pull_request_id,
                    pull_request_name,
                    author_id,
                    status: PullRequestStatus::from(status.as_str()),
                },
            )
            .collect())
    }
}

async fn insert_reviewers(
    tx: &mut Transaction<'_, Sqlite>,
    pr_id: &str,
    reviewers: &[String],
) -> Result<(), DbError> {
    for (position, reviewer_id) in reviewers.iter().enumerate() {
        sqlx::query(
            "INSERT INTO pull_request_reviewers (pull_request_id, user_id, position) VALUES (?, ?, ?)",
        )
        .bind(pr_id)
        .bind(reviewer_id)
        .bind(position as i64)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

impl Directory for SqliteStore {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>, DbError> {
        let user: Option<User> = sqlx::query_as(&format!("SELECT {} FROM users WHERE user_id = ?", USER_COLUMNS))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn get_active_team_members(
        &self,
        team_name: &str,
        exclude_user_id: Option<&str>,
    ) -> Result<Vec<User>, DbError> {
        let users: Vec<User> = sqlx::query_as(&format!(
            r#"
            SELECT {}
            FROM users
            WHERE team_name = ? AND is_active = 1 AND (? IS NULL OR user_id != ?)
            ORDER BY user_id
            "#,
            USER_COLUMNS
        ))
        .bind(team_name)
        .bind(exclude_user_id)
        .bind(exclude_user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }
}

impl Ledger for SqliteStore {
    async fn get_pull_request(&self, pr_id: &str) -> Result<Option<PullRequest>, DbError> {
        let row: Option<PullRequestRow> = sqlx::query_as(
            r#"
            SELECT pull_request_id, pull_request_name, author_id, status, created_at, merged_at
            FROM pull_requests
            WHERE pull_request_id = ?
            "#,
        )
        .bind(pr_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let reviewers: Vec<(String,)> = sqlx::query_as(
            "SELECT user_id FROM pull_request_reviewers WHERE pull_request_id = ? ORDER BY position",
        )
        .bind(pr_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(row.into_pull_request(
            reviewers.into_iter().map(|(id,)| id).collect(),
        )))
    }

    async fn is_reviewer_assigned(&self, pr_id: &str, user_id: &str) -> Result<bool, DbError> {
        let assigned: (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM pull_request_reviewers WHERE pull_request_id = ? AND user_id = ?)",
        )
        .bind(pr_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(assigned.0)
    }

    async fn replace_reviewers(&self, pr_id: &str, reviewers: &[String]) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM pull_request_reviewers WHERE pull_request_id = ?")
            .bind(pr_id)
            .execute(&mut *tx)
            .await?;

        insert_reviewers(&mut tx, pr_id, reviewers).await?;

        tx.commit().await?;
        Ok(())
    }
}
