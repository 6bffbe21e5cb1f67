//! The daily driver: send the issue scheduled at a subject's current
//! sequence, then move the cursor forward by one.

use serde::Serialize;

use crate::delivery::request_builder::select_personalizer;
use crate::delivery::service::{DispatchStore, Dispatcher};
use crate::domain::{Audience, DeliveryKey, DeliverySummary, IssueId, SubjectId};
use crate::errors::{Error, Precondition};

/// Result of one daily run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyReport {
    pub subject_id: SubjectId,
    /// Sequence the run delivered.
    pub sequence: i32,
    /// Sequence stored after the run.
    pub next_sequence: i32,
    pub issue_id: IssueId,
    pub topic: String,
    #[serde(flatten)]
    pub summary: DeliverySummary,
}

impl<R: DispatchStore> Dispatcher<R> {
    /// Runs the daily send for `subject_id`.
    ///
    /// Nothing is sent and the cursor stays put when the subject has no
    /// topic or no approved issue at its current sequence. The cursor also
    /// stays put when every attempted send failed, so the next invocation
    /// retries the same issue. Otherwise it advances with a conditional
    /// update; losing that race to a concurrent run is reported as
    /// [`Error::SequenceConflict`].
    pub async fn run_daily(&self, subject_id: SubjectId) -> Result<DailyReport, Error> {
        let repo = self.repo();

        let subject = repo
            .get_subject_by_id(subject_id)?
            .ok_or_else(|| Error::NotFound(format!("subject#{subject_id}")))?;
        let sequence = subject.current_sequence;

        let topic = repo
            .get_topic_by_sequence(subject_id, sequence)?
            .ok_or_else(|| {
                Error::precondition(
                    Precondition::NoTopic,
                    format!("subject#{subject_id} has no topic at sequence {sequence}"),
                )
            })?;

        let issue = repo.find_approved_issue(topic.id)?.ok_or_else(|| {
            Error::precondition(
                Precondition::NoApprovedIssue,
                format!(
                    "topic \"{}\" (sequence {sequence}) has no approved issue",
                    topic.title
                ),
            )
        })?;

        if issue.html.trim().is_empty() {
            return Err(Error::precondition(
                Precondition::EmptyContent,
                format!("issue#{} has no content", issue.id),
            ));
        }

        log::info!(
            "Daily run for subject#{subject_id}: sequence {sequence}, issue#{}",
            issue.id
        );

        let content = issue.content();
        let summary = self
            .deliver(
                Audience::Subject(subject_id),
                &DeliveryKey::Issue(issue.id),
                &content,
                select_personalizer(&content, self.template()),
            )
            .await?;

        if summary.total_sent == 0 && summary.total_failed > 0 {
            return Err(Error::Delivery(format!(
                "all {} send(s) for issue#{} failed; sequence {sequence} not advanced",
                summary.total_failed, issue.id
            )));
        }

        if !repo.advance_sequence(subject_id, sequence)? {
            return Err(Error::SequenceConflict {
                subject_id,
                expected: sequence,
            });
        }

        if !repo.mark_issue_sent(issue.id)? {
            log::warn!("issue#{} was no longer approved when marking it sent", issue.id);
        }

        log::info!(
            "Subject#{subject_id} advanced from {sequence} to {}",
            sequence + 1
        );

        Ok(DailyReport {
            subject_id,
            sequence,
            next_sequence: sequence + 1,
            issue_id: issue.id,
            topic: topic.title,
            summary,
        })
    }
}
