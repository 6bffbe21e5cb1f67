use crate::domain::{Audience, Subscriber};
use crate::repository::{RepositoryResult, SubscriberReader};

/// Walks an audience one page at a time so memory stays bounded by
/// `page_size` regardless of how many subscribers there are.
pub struct SubscriberPager<'a, R: SubscriberReader + ?Sized> {
    repo: &'a R,
    audience: Audience,
    page_size: i64,
    next_page: i64,
    exhausted: bool,
}

impl<'a, R: SubscriberReader + ?Sized> SubscriberPager<'a, R> {
    pub fn new(repo: &'a R, audience: Audience, page_size: i64) -> Self {
        Self {
            repo,
            audience,
            page_size: page_size.max(1),
            next_page: 0,
            exhausted: false,
        }
    }

    /// Fetches the next page, or `None` once an empty page has been seen.
    ///
    /// A short page does not end the walk; only an empty one does.
    pub fn next_page(&mut self) -> RepositoryResult<Option<Vec<Subscriber>>> {
        if self.exhausted {
            return Ok(None);
        }

        let page = self
            .repo
            .list_active_subscribers(self.audience, self.next_page, self.page_size)?;
        if page.is_empty() {
            self.exhausted = true;
            return Ok(None);
        }

        self.next_page += 1;
        Ok(Some(page))
    }

    /// Number of pages fetched so far.
    pub fn pages_read(&self) -> i64 {
        self.next_page
    }
}
