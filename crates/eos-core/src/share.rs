//! Share targets built from the page URL and title.

use serde::Serialize;
use url::form_urlencoded;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShareLinks {
    pub email: String,
    pub sms: String,
    pub twitter: String,
    pub facebook: String,
    pub linkedin: String,
}

// form_urlencoded writes spaces as '+', which mail and SMS clients show
// literally. A literal '+' is always escaped, so every '+' left is a space.
fn encode(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

impl ShareLinks {
    pub fn for_page(page_url: &str, title: &str) -> Self {
        let url = encode(page_url);
        let text = encode(title);
        let body = encode(&format!("{title} {page_url}"));
        Self {
            email: format!("mailto:?subject={text}&body={body}"),
            sms: format!("sms:?&body={body}"),
            twitter: format!("https://twitter.com/intent/tweet?text={text}&url={url}"),
            facebook: format!("https://www.facebook.com/sharer/sharer.php?u={url}"),
            linkedin: format!("https://www.linkedin.com/sharing/share-offsite/?url={url}"),
        }
    }
}
