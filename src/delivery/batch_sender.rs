//! Chunked delivery with retry and per-batch persistence.

use std::sync::Arc;
use std::time::Duration;

use crate::delivery::provider::{EmailProvider, ProviderError, Receipt};
use crate::domain::{DeliveryKey, DeliveryOutcome, DeliveryStatus, DeliverySummary, SendRequest};
use crate::errors::Error;
use crate::repository::DeliveryLedger;

/// Tuning knobs for [`BatchSender`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    /// Maximum number of requests per provider call.
    pub batch_size: usize,
    /// Pause between consecutive batches.
    pub batch_delay: Duration,
    /// Additional attempts after the first failure of a batch.
    pub max_retries: u32,
    /// Pause between attempts of the same batch.
    pub retry_delay: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            batch_delay: Duration::from_millis(1000),
            max_retries: 3,
            retry_delay: Duration::from_millis(2000),
        }
    }
}

pub struct BatchSender {
    provider: Arc<dyn EmailProvider>,
    config: BatchConfig,
}

impl BatchSender {
    pub fn new(provider: Arc<dyn EmailProvider>, config: BatchConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Sends `requests` in batches of at most `batch_size`.
    ///
    /// Outcomes of each batch are written to `ledger` before the next batch
    /// starts, so an interrupted run leaves accurate rows behind. Requests a
    /// batch still has not delivered after all retries are marked failed;
    /// the run carries on with the next batch.
    pub async fn send<L>(
        &self,
        ledger: &L,
        key: &DeliveryKey,
        requests: &[SendRequest],
    ) -> Result<DeliverySummary, Error>
    where
        L: DeliveryLedger + ?Sized,
    {
        let mut summary = DeliverySummary::default();
        if requests.is_empty() {
            return Ok(summary);
        }

        let batch_size = self.config.batch_size.max(1);
        let total_batches = requests.len().div_ceil(batch_size);

        for (index, batch) in requests.chunks(batch_size).enumerate() {
            if index > 0 && !self.config.batch_delay.is_zero() {
                tokio::time::sleep(self.config.batch_delay).await;
            }

            let label = format!(
                "Batch {}/{} for {}",
                index + 1,
                total_batches,
                key.campaign_tag()
            );
            let outcomes = self.send_with_retry(batch, &label).await;

            ledger.record_outcomes(key, &outcomes)?;

            let before = summary.total_sent;
            for outcome in outcomes {
                if outcome.status == DeliveryStatus::Sent {
                    summary.total_sent += 1;
                } else {
                    summary.total_failed += 1;
                    summary.failed_user_ids.push(outcome.user_id);
                }
            }

            log::info!(
                "{label}: {} sent of {}",
                summary.total_sent - before,
                batch.len()
            );
        }

        Ok(summary)
    }

    /// Returns one outcome per request of `batch`, in order. Each retry only
    /// carries the requests the provider has not accepted yet.
    async fn send_with_retry(&self, batch: &[SendRequest], label: &str) -> Vec<DeliveryOutcome> {
        let mut outcomes = Vec::with_capacity(batch.len());
        let mut attempt: u32 = 0;
        loop {
            let remaining = &batch[outcomes.len()..];
            let error = match self.provider.send_batch(remaining).await {
                Ok(receipts) => {
                    outcomes.extend(sent_outcomes(remaining, receipts));
                    return outcomes;
                }
                Err(ProviderError::Partial { accepted, source }) => {
                    let count = accepted.len().min(remaining.len());
                    outcomes.extend(sent_outcomes(&remaining[..count], accepted));
                    if outcomes.len() == batch.len() {
                        return outcomes;
                    }
                    *source
                }
                Err(e) => e,
            };

            if attempt >= self.config.max_retries {
                log::error!(
                    "{label}: {} request(s) failed after {} attempt(s): {error}",
                    batch.len() - outcomes.len(),
                    attempt + 1
                );
                outcomes.extend(failed_outcomes(
                    &batch[outcomes.len()..],
                    &error.to_string(),
                ));
                return outcomes;
            }

            attempt += 1;
            log::warn!(
                "{label}: provider rejected {} request(s) (attempt {attempt}): {error}; retrying",
                batch.len() - outcomes.len()
            );
            if !self.config.retry_delay.is_zero() {
                tokio::time::sleep(self.config.retry_delay).await;
            }
        }
    }
}

fn sent_outcomes(batch: &[SendRequest], receipts: Vec<Receipt>) -> Vec<DeliveryOutcome> {
    let mut receipts = receipts.into_iter();
    batch
        .iter()
        .map(|request| DeliveryOutcome {
            user_id: request.user_id,
            status: DeliveryStatus::Sent,
            provider_message_id: receipts.next().and_then(|receipt| receipt.message_id),
            error: None,
        })
        .collect()
}

fn failed_outcomes(batch: &[SendRequest], error: &str) -> Vec<DeliveryOutcome> {
    batch
        .iter()
        .map(|request| DeliveryOutcome {
            user_id: request.user_id,
            status: DeliveryStatus::Failed,
            provider_message_id: None,
            error: Some(error.to_owned()),
        })
        .collect()
}
