use std::sync::Arc;

use crate::delivery::Dispatcher;
use crate::repository::DieselRepository;
use crate::unsubscribe::UnsubscribeLinks;

/// Shared state handed to every handler. Cloning only bumps reference counts.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher<DieselRepository>>,
    pub links: UnsubscribeLinks,
    pub cron_secret: Arc<str>,
}

impl AppState {
    pub fn new(
        dispatcher: Arc<Dispatcher<DieselRepository>>,
        links: UnsubscribeLinks,
        cron_secret: &str,
    ) -> Self {
        Self {
            dispatcher,
            links,
            cron_secret: Arc::from(cron_secret),
        }
    }
}
