//! Domain types shared by the repository, the delivery pipeline and the API.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raised when a persisted value cannot be mapped onto a domain type.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("unknown issue status: {0}")]
    UnknownIssueStatus(String),
    #[error("unknown delivery status: {0}")]
    UnknownDeliveryStatus(String),
}

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i32);

        impl $name {
            pub const fn new(id: i32) -> Self {
                Self(id)
            }

            pub const fn get(self) -> i32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

id_type!(
    /// Identifier of a user / subscriber.
    UserId
);
id_type!(
    /// Identifier of a newsletter subject.
    SubjectId
);
id_type!(
    /// Identifier of a generated issue.
    IssueId
);
id_type!(
    /// Identifier of a marketing campaign.
    CampaignId
);

/// A user with an active subscription, as returned by the pager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscriber {
    pub user_id: UserId,
    pub subject_id: Option<SubjectId>,
    pub email: String,
    pub name: Option<String>,
}

/// A newsletter subject together with its sequence cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub id: SubjectId,
    pub name: String,
    pub current_sequence: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub id: i32,
    pub subject_id: SubjectId,
    pub sequence: i32,
    pub title: String,
}

/// Lifecycle of an issue. Only approved issues are eligible for delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueStatus {
    Draft,
    Approved,
    Sent,
}

impl IssueStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            IssueStatus::Draft => "draft",
            IssueStatus::Approved => "approved",
            IssueStatus::Sent => "sent",
        }
    }

    /// Issues move forward only: draft -> approved -> sent.
    pub fn can_transition_to(self, next: IssueStatus) -> bool {
        matches!(
            (self, next),
            (IssueStatus::Draft, IssueStatus::Approved) | (IssueStatus::Approved, IssueStatus::Sent)
        )
    }
}

impl FromStr for IssueStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(IssueStatus::Draft),
            "approved" => Ok(IssueStatus::Approved),
            "sent" => Ok(IssueStatus::Sent),
            other => Err(DomainError::UnknownIssueStatus(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub id: IssueId,
    pub subject_id: SubjectId,
    pub topic_id: i32,
    pub title: String,
    pub html: String,
    pub text: Option<String>,
    pub status: IssueStatus,
}

impl Issue {
    pub fn content(&self) -> EmailContent {
        EmailContent {
            subject: self.title.clone(),
            html: self.html.clone(),
            text: self.text.clone(),
        }
    }
}

/// A marketing or transactional send event. `email_type` is the
/// deduplication key: a user receives a given email type at most once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Campaign {
    pub id: CampaignId,
    pub name: String,
    pub email_type: String,
    pub subject_id: Option<SubjectId>,
    pub title: String,
    pub html: String,
    pub text: Option<String>,
}

impl Campaign {
    pub fn content(&self) -> EmailContent {
        EmailContent {
            subject: self.title.clone(),
            html: self.html.clone(),
            text: self.text.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Failed,
    Delivered,
}

impl DeliveryStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Failed => "failed",
            DeliveryStatus::Delivered => "delivered",
        }
    }
}

impl FromStr for DeliveryStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DeliveryStatus::Pending),
            "sent" => Ok(DeliveryStatus::Sent),
            "failed" => Ok(DeliveryStatus::Failed),
            "delivered" => Ok(DeliveryStatus::Delivered),
            other => Err(DomainError::UnknownDeliveryStatus(other.to_owned())),
        }
    }
}

/// Which ledger a send is recorded in, and the key used to skip users that
/// were already served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryKey {
    /// One delivery row per (issue, user).
    Issue(IssueId),
    /// One transactional email row per (user, email type).
    Campaign {
        campaign_id: CampaignId,
        email_type: String,
    },
}

impl DeliveryKey {
    pub const NEWSLETTER_EMAIL_TYPE: &'static str = "newsletter";

    pub fn for_campaign(campaign: &Campaign) -> Self {
        DeliveryKey::Campaign {
            campaign_id: campaign.id,
            email_type: campaign.email_type.clone(),
        }
    }

    pub fn email_type(&self) -> &str {
        match self {
            DeliveryKey::Issue(_) => Self::NEWSLETTER_EMAIL_TYPE,
            DeliveryKey::Campaign { email_type, .. } => email_type,
        }
    }

    /// Value of the `campaign_id` provider tag.
    pub fn campaign_tag(&self) -> String {
        match self {
            DeliveryKey::Issue(issue_id) => format!("issue-{issue_id}"),
            DeliveryKey::Campaign { campaign_id, .. } => format!("campaign-{campaign_id}"),
        }
    }
}

/// Who a run is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// Active subscribers of one subject, in subscription order.
    Subject(SubjectId),
    /// Every user with at least one active subscription, in user order.
    AllActive,
}

/// Renderable body of an email before per-user personalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailContent {
    pub subject: String,
    pub html: String,
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tag {
    pub name: String,
    pub value: String,
}

/// Provider-agnostic request to send one email to one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRequest {
    pub user_id: UserId,
    pub to: String,
    pub from: String,
    pub reply_to: Option<String>,
    pub subject: String,
    pub html: String,
    pub text: String,
    pub tags: Vec<Tag>,
    pub headers: Vec<(String, String)>,
}

/// Status transition to persist for one user after a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub user_id: UserId,
    pub status: DeliveryStatus,
    pub provider_message_id: Option<String>,
    pub error: Option<String>,
}

/// Aggregate result of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliverySummary {
    pub total_sent: usize,
    pub total_failed: usize,
    pub failed_user_ids: Vec<UserId>,
    /// Users skipped because they already have a sent record.
    pub skipped: usize,
}

impl DeliverySummary {
    pub fn merge(&mut self, other: DeliverySummary) {
        self.total_sent += other.total_sent;
        self.total_failed += other.total_failed;
        self.failed_user_ids.extend(other.failed_user_ids);
        self.skipped += other.skipped;
    }

    pub fn attempted(&self) -> usize {
        self.total_sent + self.total_failed
    }
}
