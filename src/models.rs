use chrono::NaiveDateTime;
use diesel::prelude::*;

use crate::domain::{
    Campaign as DomainCampaign, CampaignId, DomainError, Issue as DomainIssue, IssueId,
    Subject as DomainSubject, SubjectId, Topic as DomainTopic,
};
use crate::schema::{
    campaigns, deliveries, issues, subjects, subscriptions, topics, transactional_emails, users,
};

#[derive(Debug, Queryable, Selectable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: i32,
    pub email: String,
    pub name: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = users)]
pub struct NewUser<'a> {
    pub email: &'a str,
    pub name: Option<&'a str>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Queryable, Selectable, Identifiable)]
#[diesel(table_name = subjects)]
pub struct Subject {
    pub id: i32,
    pub name: String,
    pub current_sequence: i32,
    pub updated_at: NaiveDateTime,
}

impl From<Subject> for DomainSubject {
    fn from(subject: Subject) -> Self {
        DomainSubject {
            id: SubjectId::new(subject.id),
            name: subject.name,
            current_sequence: subject.current_sequence,
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = subscriptions)]
pub struct NewSubscription {
    pub user_id: i32,
    pub subject_id: i32,
    pub active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Queryable, Selectable, Identifiable)]
#[diesel(table_name = topics)]
pub struct Topic {
    pub id: i32,
    pub subject_id: i32,
    pub sequence: i32,
    pub title: String,
}

impl From<Topic> for DomainTopic {
    fn from(topic: Topic) -> Self {
        DomainTopic {
            id: topic.id,
            subject_id: SubjectId::new(topic.subject_id),
            sequence: topic.sequence,
            title: topic.title,
        }
    }
}

#[derive(Debug, Queryable, Selectable, Identifiable)]
#[diesel(table_name = issues)]
pub struct Issue {
    pub id: i32,
    pub subject_id: i32,
    pub topic_id: i32,
    pub title: String,
    pub html: String,
    pub text: Option<String>,
    pub status: String,
    pub created_at: NaiveDateTime,
    pub sent_at: Option<NaiveDateTime>,
}

impl TryFrom<Issue> for DomainIssue {
    type Error = DomainError;

    fn try_from(issue: Issue) -> Result<Self, Self::Error> {
        Ok(DomainIssue {
            id: IssueId::new(issue.id),
            subject_id: SubjectId::new(issue.subject_id),
            topic_id: issue.topic_id,
            title: issue.title,
            html: issue.html,
            text: issue.text,
            status: issue.status.parse()?,
        })
    }
}

#[derive(Debug, Queryable, Selectable, Identifiable)]
#[diesel(table_name = campaigns)]
pub struct Campaign {
    pub id: i32,
    pub name: String,
    pub email_type: String,
    pub subject_id: Option<i32>,
    pub title: String,
    pub html: String,
    pub text: Option<String>,
    pub created_at: NaiveDateTime,
}

impl From<Campaign> for DomainCampaign {
    fn from(campaign: Campaign) -> Self {
        DomainCampaign {
            id: CampaignId::new(campaign.id),
            name: campaign.name,
            email_type: campaign.email_type,
            subject_id: campaign.subject_id.map(SubjectId::new),
            title: campaign.title,
            html: campaign.html,
            text: campaign.text,
        }
    }
}

/// Row written for every (issue, user) status transition.
#[derive(Insertable)]
#[diesel(table_name = deliveries)]
#[diesel(treat_none_as_default_value = false)]
pub struct DeliveryRow<'a> {
    pub issue_id: i32,
    pub user_id: i32,
    pub status: &'a str,
    pub provider_message_id: Option<&'a str>,
    pub error: Option<&'a str>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub sent_at: Option<NaiveDateTime>,
}

/// Row written for every (user, email type) status transition.
#[derive(Insertable)]
#[diesel(table_name = transactional_emails)]
#[diesel(treat_none_as_default_value = false)]
pub struct TransactionalEmailRow<'a> {
    pub user_id: i32,
    pub email_type: &'a str,
    pub campaign_id: Option<i32>,
    pub status: &'a str,
    pub provider_message_id: Option<&'a str>,
    pub error: Option<&'a str>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub sent_at: Option<NaiveDateTime>,
}
