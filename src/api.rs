use log::debug;
use reqwest::{header, StatusCode, Url};

use crate::{
    config::Config, cookie_store::Credentials, data_collector::RecordSource, schema::UserId,
};

/// Bodies shorter than this are quoted in [`TransportFailure::Status`].
const QUOTED_BODY_LIMIT: usize = 500;

#[derive(Debug, thiserror::Error)]
pub enum TransportFailure {
    #[error("server returned {status} {body}")]
    Status { status: StatusCode, body: String },
    #[error("request timed out: {0}")]
    Timeout(reqwest::Error),
    #[error("request failed: {0}")]
    Request(reqwest::Error),
}
impl From<reqwest::Error> for TransportFailure {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e)
        } else {
            Self::Request(e)
        }
    }
}

pub struct LuoguClient {
    client: reqwest::Client,
    base_url: Url,
    credentials: Option<Credentials>,
    content_only: bool,
}

impl LuoguClient {
    pub fn new(config: &Config, credentials: Option<Credentials>) -> reqwest::Result<Self> {
        Ok(Self {
            client: reqwest_client(config)?,
            base_url: config.base_url.clone(),
            credentials,
            content_only: config.content_only,
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.credentials.is_some()
    }

    fn referer(&self, user: &UserId) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .clear()
            .append_pair("user", user.as_str());
        url
    }
}

impl RecordSource for LuoguClient {
    async fn fetch_page(&self, user: &UserId, page: u32) -> Result<String, TransportFailure> {
        let mut query = vec![("user", user.to_string()), ("page", page.to_string())];
        if self.content_only {
            query.push(("_contentOnly", "1".to_owned()));
        }
        let mut request = self
            .client
            .get(self.base_url.clone())
            .query(&query)
            .header(header::REFERER, self.referer(user).as_str());
        if let Some(credentials) = &self.credentials {
            request = request.header(header::COOKIE, credentials.cookie_header());
        }
        let response = request.send().await?;
        let status = response.status();
        debug!("GET {} -> {status}", response.url());
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportFailure::Status {
                status,
                body: if body.len() < QUOTED_BODY_LIMIT {
                    body
                } else {
                    String::new()
                },
            });
        }
        Ok(response.text().await?)
    }
}

fn reqwest_client(config: &Config) -> reqwest::Result<reqwest::Client> {
    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        header::HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
    );
    reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .default_headers(headers)
        .timeout(config.timeout)
        .build()
}
