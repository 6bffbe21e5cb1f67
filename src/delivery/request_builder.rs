use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use crate::domain::{DeliveryKey, EmailContent, SendRequest, Subscriber, Tag};
use crate::unsubscribe::UnsubscribeLinks;

/// Replace {key} with values from `vars`; leave unknown {key} intact.
static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([\p{L}\p{N}_]+?)\}").unwrap());

fn fill_template(template: &str, vars: &HashMap<&str, String>) -> String {
    PLACEHOLDER_RE
        .replace_all(template, |caps: &regex::Captures| {
            let key = &caps[1];
            vars.get(key)
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn has_placeholders(content: &EmailContent) -> bool {
    PLACEHOLDER_RE.is_match(&content.subject)
        || PLACEHOLDER_RE.is_match(&content.html)
        || content
            .text
            .as_deref()
            .is_some_and(|text| PLACEHOLDER_RE.is_match(text))
}

/// Render HTML as plain text for the text/plain alternative.
pub fn html_to_text(html: &str) -> String {
    let plain =
        html2text::from_read(html.as_bytes(), usize::MAX).unwrap_or_else(|_| html.to_string());
    plain.replace('\u{00a0}', " ")
}

/// Per-user content rewriting, chosen per campaign at call time.
pub trait Personalizer: Send + Sync {
    fn personalize(&self, content: &EmailContent, subscriber: &Subscriber) -> EmailContent;
}

/// Every recipient receives identical content.
pub struct NoPersonalization;

impl Personalizer for NoPersonalization {
    fn personalize(&self, content: &EmailContent, _subscriber: &Subscriber) -> EmailContent {
        content.clone()
    }
}

/// Substitutes `{email}`, `{name}`, `{unsubscribe_url}` and `{feedback_url}`.
pub struct TemplatePersonalizer {
    base_url: String,
    links: UnsubscribeLinks,
}

impl TemplatePersonalizer {
    pub fn new(base_url: &str, links: UnsubscribeLinks) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            links,
        }
    }

    fn feedback_url(&self, subscriber: &Subscriber) -> String {
        match subscriber.subject_id {
            Some(subject_id) => format!(
                "{}/feedback?user={}&subject={}",
                self.base_url, subscriber.user_id, subject_id
            ),
            None => format!("{}/feedback?user={}", self.base_url, subscriber.user_id),
        }
    }
}

impl Personalizer for TemplatePersonalizer {
    fn personalize(&self, content: &EmailContent, subscriber: &Subscriber) -> EmailContent {
        let mut vars: HashMap<&str, String> = HashMap::new();
        vars.insert("email", subscriber.email.clone());
        vars.insert(
            "name",
            subscriber
                .name
                .clone()
                .unwrap_or_else(|| "there".to_owned()),
        );
        vars.insert("unsubscribe_url", self.links.url_for(subscriber));
        vars.insert("feedback_url", self.feedback_url(subscriber));

        EmailContent {
            subject: fill_template(&content.subject, &vars),
            html: fill_template(&content.html, &vars),
            text: content.text.as_deref().map(|text| fill_template(text, &vars)),
        }
    }
}

/// Picks the template personalizer for content that carries placeholders and
/// skips per-user rendering otherwise.
pub fn select_personalizer<'a>(
    content: &EmailContent,
    template: &'a TemplatePersonalizer,
) -> &'a dyn Personalizer {
    if has_placeholders(content) {
        template
    } else {
        &NoPersonalization
    }
}

/// Maps a subscriber and rendered content onto a provider-agnostic request.
#[derive(Clone)]
pub struct RequestBuilder {
    from: String,
    reply_to: Option<String>,
    links: UnsubscribeLinks,
}

impl RequestBuilder {
    pub fn new(from: String, reply_to: Option<String>, links: UnsubscribeLinks) -> Self {
        Self {
            from,
            reply_to,
            links,
        }
    }

    #[must_use]
    pub fn build(
        &self,
        subscriber: &Subscriber,
        content: &EmailContent,
        key: &DeliveryKey,
        personalizer: &dyn Personalizer,
    ) -> SendRequest {
        let rendered = personalizer.personalize(content, subscriber);

        let text = match rendered.text {
            Some(text) if !text.trim().is_empty() => text,
            _ => html_to_text(&rendered.html),
        };

        let unsubscribe_url = self.links.url_for(subscriber);

        SendRequest {
            user_id: subscriber.user_id,
            to: subscriber.email.clone(),
            from: self.from.clone(),
            reply_to: self.reply_to.clone(),
            subject: rendered.subject,
            html: rendered.html,
            text,
            tags: vec![
                Tag {
                    name: "email_type".into(),
                    value: key.email_type().to_owned(),
                },
                Tag {
                    name: "campaign_id".into(),
                    value: key.campaign_tag(),
                },
                Tag {
                    name: "user_id".into(),
                    value: subscriber.user_id.to_string(),
                },
            ],
            headers: vec![
                ("List-Unsubscribe".into(), format!("<{unsubscribe_url}>")),
                (
                    "List-Unsubscribe-Post".into(),
                    "List-Unsubscribe=One-Click".into(),
                ),
            ],
        }
    }
}
