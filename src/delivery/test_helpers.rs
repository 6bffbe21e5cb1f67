//! In-memory provider and store used by the delivery unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::delivery::Dispatcher;
use crate::delivery::batch_sender::BatchConfig;
use crate::delivery::provider::{EmailProvider, ProviderError, Receipt};
use crate::delivery::request_builder::{RequestBuilder, TemplatePersonalizer};
use crate::domain::{
    Audience, Campaign, CampaignId, DeliveryKey, DeliveryOutcome, DeliveryStatus, Issue, IssueId,
    IssueStatus, SendRequest, Subject, SubjectId, Subscriber, Topic, UserId,
};
use crate::repository::{
    ContentReader, DeliveryLedger, RepositoryResult, SequenceWriter, SubscriberReader,
};
use crate::unsubscribe::UnsubscribeLinks;

/// Records every provider call and fails any batch containing one of the
/// configured users.
#[derive(Default)]
pub struct MockProvider {
    calls: Mutex<Vec<Vec<UserId>>>,
    failing_users: Mutex<HashSet<UserId>>,
    transient_failures: Mutex<usize>,
    accept_once: Mutex<Option<usize>>,
}

fn receipts(ids: &[UserId]) -> Vec<Receipt> {
    ids.iter()
        .map(|id| Receipt {
            message_id: Some(format!("msg-{id}")),
        })
        .collect()
}

impl MockProvider {
    pub fn failing_for(users: &[UserId]) -> Self {
        Self {
            failing_users: Mutex::new(users.iter().copied().collect()),
            ..Self::default()
        }
    }

    /// Fails the first `times` calls, then accepts everything.
    pub fn flaky(times: usize) -> Self {
        Self {
            transient_failures: Mutex::new(times),
            ..Self::default()
        }
    }

    /// Accepts only the first `count` requests of the next call and then
    /// fails it, the way an SMTP session can die midway through a batch.
    pub fn accepting_once(count: usize) -> Self {
        Self {
            accept_once: Mutex::new(Some(count)),
            ..Self::default()
        }
    }

    pub fn fail_for(&self, users: &[UserId]) {
        self.failing_users.lock().unwrap().extend(users.iter().copied());
    }

    pub fn calls(&self) -> Vec<Vec<UserId>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_failures(&self) {
        self.failing_users.lock().unwrap().clear();
    }
}

#[async_trait]
impl EmailProvider for MockProvider {
    async fn send_batch(&self, requests: &[SendRequest]) -> Result<Vec<Receipt>, ProviderError> {
        let ids: Vec<UserId> = requests.iter().map(|r| r.user_id).collect();
        self.calls.lock().unwrap().push(ids.clone());

        {
            let mut remaining = self.transient_failures.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ProviderError::Status {
                    status: 503,
                    body: "try again".into(),
                });
            }
        }

        if let Some(count) = self.accept_once.lock().unwrap().take() {
            return Err(ProviderError::after(
                receipts(&ids[..count.min(ids.len())]),
                ProviderError::Status {
                    status: 550,
                    body: "mailbox unavailable".into(),
                },
            ));
        }

        let failing = self.failing_users.lock().unwrap();
        if ids.iter().any(|id| failing.contains(id)) {
            return Err(ProviderError::Status {
                status: 500,
                body: "provider unavailable".into(),
            });
        }

        Ok(receipts(&ids))
    }
}

fn is_sent(outcome: Option<&DeliveryOutcome>) -> bool {
    matches!(
        outcome.map(|o| o.status),
        Some(DeliveryStatus::Sent | DeliveryStatus::Delivered)
    )
}

fn ledger_key(key: &DeliveryKey) -> String {
    match key {
        DeliveryKey::Issue(issue_id) => format!("issue:{issue_id}"),
        DeliveryKey::Campaign { email_type, .. } => format!("type:{email_type}"),
    }
}

#[derive(Default)]
struct Inner {
    subscriptions: Vec<(SubjectId, Subscriber)>,
    subjects: HashMap<SubjectId, Subject>,
    topics: Vec<Topic>,
    issues: Vec<Issue>,
    campaigns: Vec<Campaign>,
    records: HashMap<(String, UserId), DeliveryOutcome>,
    outcome_writes: usize,
}

/// Minimal in-memory stand-in for the Diesel repository.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn add_subscriber(&self, subject_id: SubjectId, user_id: i32) -> UserId {
        let user_id = UserId::new(user_id);
        self.inner.lock().unwrap().subscriptions.push((
            subject_id,
            Subscriber {
                user_id,
                subject_id: Some(subject_id),
                email: format!("user{user_id}@example.com"),
                name: None,
            },
        ));
        user_id
    }

    pub fn add_subject(&self, id: i32, current_sequence: i32) -> SubjectId {
        let id = SubjectId::new(id);
        self.inner.lock().unwrap().subjects.insert(
            id,
            Subject {
                id,
                name: format!("subject {id}"),
                current_sequence,
            },
        );
        id
    }

    pub fn add_topic(&self, subject_id: SubjectId, id: i32, sequence: i32) {
        self.inner.lock().unwrap().topics.push(Topic {
            id,
            subject_id,
            sequence,
            title: format!("topic {sequence}"),
        });
    }

    pub fn add_issue(
        &self,
        subject_id: SubjectId,
        topic_id: i32,
        id: i32,
        status: IssueStatus,
        html: &str,
    ) -> IssueId {
        let id = IssueId::new(id);
        self.inner.lock().unwrap().issues.push(Issue {
            id,
            subject_id,
            topic_id,
            title: format!("Issue {id}"),
            html: html.to_owned(),
            text: None,
            status,
        });
        id
    }

    pub fn add_campaign(
        &self,
        id: i32,
        email_type: &str,
        subject_id: Option<SubjectId>,
    ) -> CampaignId {
        let id = CampaignId::new(id);
        self.inner.lock().unwrap().campaigns.push(Campaign {
            id,
            name: format!("campaign {id}"),
            email_type: email_type.to_owned(),
            subject_id,
            title: "Launch".into(),
            html: "<p>Big news, {name}</p>".into(),
            text: None,
        });
        id
    }

    pub fn sequence_of(&self, subject_id: SubjectId) -> i32 {
        self.inner.lock().unwrap().subjects[&subject_id].current_sequence
    }

    pub fn issue_status(&self, issue_id: IssueId) -> IssueStatus {
        let inner = self.inner.lock().unwrap();
        inner
            .issues
            .iter()
            .find(|issue| issue.id == issue_id)
            .map(|issue| issue.status)
            .unwrap()
    }

    pub fn status_of(&self, key: &DeliveryKey, user_id: UserId) -> Option<DeliveryStatus> {
        self.inner
            .lock()
            .unwrap()
            .records
            .get(&(ledger_key(key), user_id))
            .map(|outcome| outcome.status)
    }

    pub fn outcome_writes(&self) -> usize {
        self.inner.lock().unwrap().outcome_writes
    }
}

impl SubscriberReader for MemoryStore {
    fn list_active_subscribers(
        &self,
        audience: Audience,
        page: i64,
        page_size: i64,
    ) -> RepositoryResult<Vec<Subscriber>> {
        let inner = self.inner.lock().unwrap();
        let mut seen = HashSet::new();
        let matching: Vec<Subscriber> = inner
            .subscriptions
            .iter()
            .filter(|(subject_id, _)| match audience {
                Audience::Subject(wanted) => *subject_id == wanted,
                Audience::AllActive => true,
            })
            .filter(|(_, subscriber)| seen.insert(subscriber.user_id))
            .map(|(_, subscriber)| match audience {
                Audience::Subject(_) => subscriber.clone(),
                Audience::AllActive => Subscriber {
                    subject_id: None,
                    ..subscriber.clone()
                },
            })
            .collect();

        Ok(matching
            .into_iter()
            .skip((page * page_size) as usize)
            .take(page_size as usize)
            .collect())
    }
}

impl ContentReader for MemoryStore {
    fn get_subject_by_id(&self, id: SubjectId) -> RepositoryResult<Option<Subject>> {
        Ok(self.inner.lock().unwrap().subjects.get(&id).cloned())
    }

    fn get_topic_by_sequence(
        &self,
        subject_id: SubjectId,
        sequence: i32,
    ) -> RepositoryResult<Option<Topic>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .topics
            .iter()
            .find(|topic| topic.subject_id == subject_id && topic.sequence == sequence)
            .cloned())
    }

    fn find_approved_issue(&self, topic_id: i32) -> RepositoryResult<Option<Issue>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .issues
            .iter()
            .rev()
            .find(|issue| issue.topic_id == topic_id && issue.status == IssueStatus::Approved)
            .cloned())
    }

    fn get_issue_by_id(&self, id: IssueId) -> RepositoryResult<Option<Issue>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .issues
            .iter()
            .find(|issue| issue.id == id)
            .cloned())
    }

    fn get_campaign_by_id(&self, id: CampaignId) -> RepositoryResult<Option<Campaign>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .campaigns
            .iter()
            .find(|campaign| campaign.id == id)
            .cloned())
    }
}

impl SequenceWriter for MemoryStore {
    fn advance_sequence(&self, subject_id: SubjectId, expected: i32) -> RepositoryResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        match inner.subjects.get_mut(&subject_id) {
            Some(subject) if subject.current_sequence == expected => {
                subject.current_sequence += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn mark_issue_sent(&self, issue_id: IssueId) -> RepositoryResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        match inner
            .issues
            .iter_mut()
            .find(|issue| issue.id == issue_id && issue.status == IssueStatus::Approved)
        {
            Some(issue) => {
                issue.status = IssueStatus::Sent;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl DeliveryLedger for MemoryStore {
    fn filter_unsent(
        &self,
        key: &DeliveryKey,
        user_ids: &[UserId],
    ) -> RepositoryResult<Vec<UserId>> {
        let inner = self.inner.lock().unwrap();
        let key = ledger_key(key);
        Ok(user_ids
            .iter()
            .copied()
            .filter(|id| {
                // claims here never expire
                !matches!(
                    inner.records.get(&(key.clone(), *id)).map(|o| o.status),
                    Some(DeliveryStatus::Sent | DeliveryStatus::Delivered | DeliveryStatus::Pending)
                )
            })
            .collect())
    }

    fn mark_pending(&self, key: &DeliveryKey, user_ids: &[UserId]) -> RepositoryResult<()> {
        let mut inner = self.inner.lock().unwrap();
        for &user_id in user_ids {
            let record = (ledger_key(key), user_id);
            if is_sent(inner.records.get(&record)) {
                continue;
            }
            inner.records.insert(
                record,
                DeliveryOutcome {
                    user_id,
                    status: DeliveryStatus::Pending,
                    provider_message_id: None,
                    error: None,
                },
            );
        }
        Ok(())
    }

    fn record_outcomes(
        &self,
        key: &DeliveryKey,
        outcomes: &[DeliveryOutcome],
    ) -> RepositoryResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.outcome_writes += 1;
        for outcome in outcomes {
            let record = (ledger_key(key), outcome.user_id);
            if is_sent(inner.records.get(&record)) {
                continue;
            }
            inner.records.insert(record, outcome.clone());
        }
        Ok(())
    }
}

pub fn fast_batch_config(batch_size: usize, max_retries: u32) -> BatchConfig {
    BatchConfig {
        batch_size,
        batch_delay: Duration::ZERO,
        max_retries,
        retry_delay: Duration::ZERO,
    }
}

pub fn test_dispatcher(
    store: Arc<MemoryStore>,
    provider: Arc<MockProvider>,
    batch_size: usize,
    page_size: i64,
) -> Dispatcher<MemoryStore> {
    let links = UnsubscribeLinks::new("https://news.example.com", "secret");
    Dispatcher::new(
        store,
        provider,
        RequestBuilder::new("Daily <daily@example.com>".into(), None, links.clone()),
        TemplatePersonalizer::new("https://news.example.com", links),
        fast_batch_config(batch_size, 1),
        page_size,
    )
}
