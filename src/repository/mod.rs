//! Repository interfaces and Diesel-backed implementation.
//!
//! This module defines traits for reading subscribers and content, moving
//! the per-subject sequence cursor and recording delivery outcomes,
//! alongside [`DieselRepository`], a small wrapper around a Diesel
//! connection pool.

use diesel::r2d2::PoolError;
use thiserror::Error;

use crate::db::{DbConnection, DbPool};
use crate::domain::{
    Audience, Campaign, CampaignId, DeliveryKey, DeliveryOutcome, DomainError, Issue, IssueId,
    Subject, SubjectId, Subscriber, Topic, UserId,
};

pub mod content;
pub mod delivery;
pub mod subscriber;

/// Failures of the persistence layer.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation error: {0}")]
    ValidationError(String),
}

impl From<DomainError> for RepositoryError {
    fn from(err: DomainError) -> Self {
        RepositoryError::ValidationError(err.to_string())
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Concrete repository backed by a Diesel connection pool.
#[derive(Clone)]
pub struct DieselRepository {
    pool: DbPool, // r2d2::Pool is cheap to clone
}

impl DieselRepository {
    /// Creates a new [`DieselRepository`] from the given pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> RepositoryResult<DbConnection> {
        Ok(self.pool.get()?)
    }
}

/// Read-only access to the people a run is addressed to.
pub trait SubscriberReader {
    /// Returns page `page` (zero based) of `audience`, ordered by a stable
    /// insertion key. An empty page means the audience is exhausted.
    fn list_active_subscribers(
        &self,
        audience: Audience,
        page: i64,
        page_size: i64,
    ) -> RepositoryResult<Vec<Subscriber>>;
}

/// Signup and unsubscribe.
pub trait SubscriptionWriter {
    /// Creates the user if needed and activates its subscription to
    /// `subject_id`. Returns the user id.
    fn subscribe(
        &self,
        email: &str,
        name: Option<&str>,
        subject_id: SubjectId,
    ) -> RepositoryResult<UserId>;

    /// Deactivates the user's subscription to `subject_id`, or every active
    /// subscription when `subject_id` is `None`. Returns how many rows
    /// changed; repeating the call is harmless.
    fn deactivate_subscriptions(
        &self,
        user_id: UserId,
        subject_id: Option<SubjectId>,
    ) -> RepositoryResult<usize>;
}

/// Read-only operations for subjects, topics, issues and campaigns.
pub trait ContentReader {
    fn get_subject_by_id(&self, id: SubjectId) -> RepositoryResult<Option<Subject>>;

    /// Looks up the topic scheduled at `sequence` for a subject.
    fn get_topic_by_sequence(
        &self,
        subject_id: SubjectId,
        sequence: i32,
    ) -> RepositoryResult<Option<Topic>>;

    /// Most recent approved issue generated for `topic_id`, if any.
    fn find_approved_issue(&self, topic_id: i32) -> RepositoryResult<Option<Issue>>;

    fn get_issue_by_id(&self, id: IssueId) -> RepositoryResult<Option<Issue>>;

    fn get_campaign_by_id(&self, id: CampaignId) -> RepositoryResult<Option<Campaign>>;
}

/// State transitions driven by the daily sequence.
pub trait SequenceWriter {
    /// Moves the subject's cursor from `expected` to `expected + 1`.
    ///
    /// The update is conditional on the stored value still being
    /// `expected`; `Ok(false)` means another invocation got there first.
    fn advance_sequence(&self, subject_id: SubjectId, expected: i32) -> RepositoryResult<bool>;

    /// Moves an approved issue to `sent`. Returns `false` if the issue was
    /// not in the approved state.
    fn mark_issue_sent(&self, issue_id: IssueId) -> RepositoryResult<bool>;
}

/// Delivery and transactional-email bookkeeping.
///
/// Every method issues a single batched statement regardless of how many
/// users are involved.
pub trait DeliveryLedger {
    /// Returns the subset of `user_ids` without a sent record or a live
    /// `pending` claim for `key`, preserving input order.
    fn filter_unsent(&self, key: &DeliveryKey, user_ids: &[UserId])
    -> RepositoryResult<Vec<UserId>>;

    /// Upserts `pending` rows for users about to be sent to. Rows already in
    /// a sent state are left untouched.
    fn mark_pending(&self, key: &DeliveryKey, user_ids: &[UserId]) -> RepositoryResult<()>;

    /// Upserts the final status of each user in a batch. A user already
    /// recorded as sent or delivered keeps that row.
    ///
    /// # Example
    /// ```no_run
    /// use newsletter_dispatch::domain::{DeliveryKey, DeliveryOutcome, DeliveryStatus, IssueId, UserId};
    /// use newsletter_dispatch::repository::{DeliveryLedger, DieselRepository};
    /// # fn demo(repo: &DieselRepository) {
    /// let _ = repo.record_outcomes(
    ///     &DeliveryKey::Issue(IssueId::new(1)),
    ///     &[DeliveryOutcome {
    ///         user_id: UserId::new(7),
    ///         status: DeliveryStatus::Sent,
    ///         provider_message_id: Some("msg-1".into()),
    ///         error: None,
    ///     }],
    /// );
    /// # }
    /// ```
    fn record_outcomes(
        &self,
        key: &DeliveryKey,
        outcomes: &[DeliveryOutcome],
    ) -> RepositoryResult<()>;
}
