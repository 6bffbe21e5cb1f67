//! Newsletter and campaign delivery.
//!
//! A run pages through the audience ([`pager`]), drops users that already
//! have a sent record, turns the rest into provider requests
//! ([`request_builder`]) and sends them in retried batches
//! ([`batch_sender`]) through an [`provider::EmailProvider`]. The daily
//! driver in [`sequence`] wraps that pipeline with the per-subject cursor.

pub mod batch_sender;
pub mod pager;
pub mod provider;
pub mod request_builder;
pub mod sequence;
pub mod service;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use sequence::DailyReport;
pub use service::{DispatchStore, Dispatcher};
