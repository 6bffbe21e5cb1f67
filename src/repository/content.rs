//! Subject, topic, issue and campaign queries plus sequence transitions.

use chrono::Utc;
use diesel::prelude::*;

use crate::domain::{Campaign, CampaignId, Issue, IssueId, IssueStatus, Subject, SubjectId, Topic};
use crate::models::{
    Campaign as DbCampaign, Issue as DbIssue, Subject as DbSubject, Topic as DbTopic,
};
use crate::repository::{
    ContentReader, DieselRepository, RepositoryError, RepositoryResult, SequenceWriter,
};

impl ContentReader for DieselRepository {
    fn get_subject_by_id(&self, id: SubjectId) -> RepositoryResult<Option<Subject>> {
        use crate::schema::subjects;
        let mut conn = self.conn()?;
        let result = subjects::table
            .filter(subjects::id.eq(id.get()))
            .select(DbSubject::as_select())
            .first::<DbSubject>(&mut conn)
            .optional()?;
        Ok(result.map(Into::into))
    }

    fn get_topic_by_sequence(
        &self,
        subject_id: SubjectId,
        sequence: i32,
    ) -> RepositoryResult<Option<Topic>> {
        use crate::schema::topics;
        let mut conn = self.conn()?;
        let result = topics::table
            .filter(topics::subject_id.eq(subject_id.get()))
            .filter(topics::sequence.eq(sequence))
            .select(DbTopic::as_select())
            .first::<DbTopic>(&mut conn)
            .optional()?;
        Ok(result.map(Into::into))
    }

    fn find_approved_issue(&self, topic_id: i32) -> RepositoryResult<Option<Issue>> {
        use crate::schema::issues;
        let mut conn = self.conn()?;
        let result = issues::table
            .filter(issues::topic_id.eq(topic_id))
            .filter(issues::status.eq(IssueStatus::Approved.as_str()))
            .order(issues::id.desc())
            .select(DbIssue::as_select())
            .first::<DbIssue>(&mut conn)
            .optional()?;

        result
            .map(|issue| Issue::try_from(issue).map_err(RepositoryError::from))
            .transpose()
    }

    fn get_issue_by_id(&self, id: IssueId) -> RepositoryResult<Option<Issue>> {
        use crate::schema::issues;
        let mut conn = self.conn()?;
        let result = issues::table
            .filter(issues::id.eq(id.get()))
            .select(DbIssue::as_select())
            .first::<DbIssue>(&mut conn)
            .optional()?;

        result
            .map(|issue| Issue::try_from(issue).map_err(RepositoryError::from))
            .transpose()
    }

    fn get_campaign_by_id(&self, id: CampaignId) -> RepositoryResult<Option<Campaign>> {
        use crate::schema::campaigns;
        let mut conn = self.conn()?;
        let result = campaigns::table
            .filter(campaigns::id.eq(id.get()))
            .select(DbCampaign::as_select())
            .first::<DbCampaign>(&mut conn)
            .optional()?;
        Ok(result.map(Into::into))
    }
}

impl SequenceWriter for DieselRepository {
    fn advance_sequence(&self, subject_id: SubjectId, expected: i32) -> RepositoryResult<bool> {
        use crate::schema::subjects;
        let mut conn = self.conn()?;

        let updated = diesel::update(
            subjects::table
                .filter(subjects::id.eq(subject_id.get()))
                .filter(subjects::current_sequence.eq(expected)),
        )
        .set((
            subjects::current_sequence.eq(expected + 1),
            subjects::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(&mut conn)?;

        Ok(updated == 1)
    }

    fn mark_issue_sent(&self, issue_id: IssueId) -> RepositoryResult<bool> {
        use crate::schema::issues;
        let mut conn = self.conn()?;

        let updated = diesel::update(
            issues::table
                .filter(issues::id.eq(issue_id.get()))
                .filter(issues::status.eq(IssueStatus::Approved.as_str())),
        )
        .set((
            issues::status.eq(IssueStatus::Sent.as_str()),
            issues::sent_at.eq(Some(Utc::now().naive_utc())),
        ))
        .execute(&mut conn)?;

        Ok(updated == 1)
    }
}
