//! Orchestrates a run: page the audience, skip users already served, build
//! requests and hand them to the batch sender.

use std::collections::HashSet;
use std::sync::Arc;

use crate::delivery::batch_sender::{BatchConfig, BatchSender};
use crate::delivery::pager::SubscriberPager;
use crate::delivery::provider::EmailProvider;
use crate::delivery::request_builder::{
    Personalizer, RequestBuilder, TemplatePersonalizer, select_personalizer,
};
use crate::domain::{
    Audience, CampaignId, DeliveryKey, DeliverySummary, EmailContent, IssueId, IssueStatus,
    Subscriber, UserId,
};
use crate::errors::{Error, Precondition};
use crate::repository::{ContentReader, DeliveryLedger, SequenceWriter, SubscriberReader};

/// Everything a [`Dispatcher`] needs from storage.
pub trait DispatchStore:
    SubscriberReader + ContentReader + SequenceWriter + DeliveryLedger + Send + Sync
{
}

impl<T> DispatchStore for T where
    T: SubscriberReader + ContentReader + SequenceWriter + DeliveryLedger + Send + Sync
{
}

pub struct Dispatcher<R> {
    repo: Arc<R>,
    sender: BatchSender,
    builder: RequestBuilder,
    template: TemplatePersonalizer,
    page_size: i64,
}

impl<R: DispatchStore> Dispatcher<R> {
    pub fn new(
        repo: Arc<R>,
        provider: Arc<dyn EmailProvider>,
        builder: RequestBuilder,
        template: TemplatePersonalizer,
        batch: BatchConfig,
        page_size: i64,
    ) -> Self {
        Self {
            repo,
            sender: BatchSender::new(provider, batch),
            builder,
            template,
            page_size,
        }
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }

    pub(crate) fn template(&self) -> &TemplatePersonalizer {
        &self.template
    }

    /// Sends `content` to every active member of `audience` that has no sent
    /// record under `key`.
    ///
    /// Subscribers are processed one page at a time; each page is filtered
    /// against the ledger, marked pending and then sent.
    pub async fn deliver(
        &self,
        audience: Audience,
        key: &DeliveryKey,
        content: &EmailContent,
        personalizer: &dyn Personalizer,
    ) -> Result<DeliverySummary, Error> {
        let repo: &R = &self.repo;
        let mut pager = SubscriberPager::new(repo, audience, self.page_size);
        let mut summary = DeliverySummary::default();

        while let Some(page) = pager.next_page()? {
            let ids: Vec<UserId> = page.iter().map(|s| s.user_id).collect();
            let unsent = repo.filter_unsent(key, &ids)?;
            summary.skipped += ids.len() - unsent.len();
            if unsent.is_empty() {
                continue;
            }

            let wanted: HashSet<UserId> = unsent.iter().copied().collect();
            let recipients: Vec<&Subscriber> = page
                .iter()
                .filter(|subscriber| wanted.contains(&subscriber.user_id))
                .collect();

            repo.mark_pending(key, &unsent)?;

            let requests: Vec<_> = recipients
                .into_iter()
                .map(|subscriber| self.builder.build(subscriber, content, key, personalizer))
                .collect();

            let page_summary = self.sender.send(repo, key, &requests).await?;
            summary.merge(page_summary);
        }

        log::info!(
            "{}: {} sent, {} failed, {} skipped across {} page(s)",
            key.campaign_tag(),
            summary.total_sent,
            summary.total_failed,
            summary.skipped,
            pager.pages_read()
        );

        Ok(summary)
    }

    /// Sends one specific issue to its subject's audience without touching
    /// the sequence cursor.
    pub async fn send_issue(&self, issue_id: IssueId) -> Result<DeliverySummary, Error> {
        let issue = self
            .repo
            .get_issue_by_id(issue_id)?
            .ok_or_else(|| Error::NotFound(format!("issue#{issue_id}")))?;

        if issue.status == IssueStatus::Draft {
            return Err(Error::precondition(
                Precondition::IssueNotApproved,
                format!("issue#{issue_id} is not approved"),
            ));
        }
        if issue.html.trim().is_empty() {
            return Err(Error::precondition(
                Precondition::EmptyContent,
                format!("issue#{issue_id} has no content"),
            ));
        }

        let content = issue.content();
        let personalizer = select_personalizer(&content, &self.template);
        self.deliver(
            Audience::Subject(issue.subject_id),
            &DeliveryKey::Issue(issue.id),
            &content,
            personalizer,
        )
        .await
    }

    /// Sends a campaign once per user and email type.
    ///
    /// Campaigns bound to a subject go to that subject's subscribers; the
    /// rest go to every user with an active subscription.
    pub async fn send_campaign(&self, campaign_id: CampaignId) -> Result<DeliverySummary, Error> {
        let campaign = self
            .repo
            .get_campaign_by_id(campaign_id)?
            .ok_or_else(|| Error::NotFound(format!("campaign#{campaign_id}")))?;

        if campaign.html.trim().is_empty() {
            return Err(Error::precondition(
                Precondition::EmptyContent,
                format!("campaign#{campaign_id} has no content"),
            ));
        }

        let audience = campaign
            .subject_id
            .map(Audience::Subject)
            .unwrap_or(Audience::AllActive);
        let content = campaign.content();
        let personalizer = select_personalizer(&content, &self.template);

        self.deliver(
            audience,
            &DeliveryKey::for_campaign(&campaign),
            &content,
            personalizer,
        )
        .await
    }
}
