//! Turns the body of a record list response into a [`RecordList`].
//!
//! The judge answers either with JSON or with an HTML page that carries the same
//! JSON, URL-encoded, in `window._feInjection = JSON.parse(decodeURIComponent("..."))`.
//! Both shapes go through [`RecordPageDecoder::decode`].

use scraper::Html;
use serde_json::{Map, Value};

use crate::schema::RecordList;

/// Global variable the judge assigns the page payload to.
pub const FE_INJECTION_MARKER: &str = "window._feInjection";
/// Text present on the login page the judge redirects to without a valid session.
pub const LOGIN_MARKER: &str = "登录";

const SNIPPET_LEN: usize = 200;

#[derive(Clone, PartialEq, Eq, Debug, thiserror::Error)]
pub enum DecodeFailure {
    #[error("redirected to the login page; the cookie might be invalid or expired")]
    LoginRequired,
    #[error("unknown page content: {snippet:?}")]
    UnrecognizedContent { snippet: String },
    #[error("API error or unexpected structure: {summary}")]
    ApiError { summary: String },
}

pub type JsonObject = Map<String, Value>;

pub trait ExtractStrategy {
    fn name(&self) -> &'static str;
    /// Returns the payload object, or `None` if this strategy does not apply.
    fn extract(&self, body: &str) -> Option<JsonObject>;
}

/// The body itself is the JSON object.
#[derive(Clone, Copy, Debug, Default)]
pub struct DirectJson;

impl ExtractStrategy for DirectJson {
    fn name(&self) -> &'static str {
        "json"
    }

    fn extract(&self, body: &str) -> Option<JsonObject> {
        non_empty_object(serde_json::from_str(body).ok()?)
    }
}

/// The payload is embedded in the first script mentioning [`FE_INJECTION_MARKER`].
#[derive(Clone, Copy, Debug, Default)]
pub struct InjectedScript;

impl ExtractStrategy for InjectedScript {
    fn name(&self) -> &'static str {
        "fe-injection"
    }

    fn extract(&self, body: &str) -> Option<JsonObject> {
        let document = Html::parse_document(body);
        let script = document
            .select(selector!("script"))
            .map(|script| script.text().collect::<String>())
            .find(|text| text.contains(FE_INJECTION_MARKER))?;
        let encoded = regex!(r#"decodeURIComponent\("([^"]*)"\)"#)
            .captures(&script)?
            .get(1)?
            .as_str();
        let decoded = urlencoding::decode(encoded).ok()?;
        non_empty_object(serde_json::from_str(&decoded).ok()?)
    }
}

fn non_empty_object(value: Value) -> Option<JsonObject> {
    match value {
        Value::Object(map) if !map.is_empty() => Some(map),
        _ => None,
    }
}

/// Records of one page together with how they were found.
#[derive(Debug)]
pub struct RecordPage {
    pub records: RecordList,
    pub strategy: &'static str,
    /// `currentData` was absent, so the top-level object served as the container.
    pub used_fallback_container: bool,
    /// Set when `records` existed but did not have the expected shape.
    pub malformed: Option<String>,
}

pub struct RecordPageDecoder {
    strategies: Vec<Box<dyn ExtractStrategy + Send + Sync>>,
}

impl Default for RecordPageDecoder {
    fn default() -> Self {
        Self::new(vec![Box::new(DirectJson), Box::new(InjectedScript)])
    }
}

impl RecordPageDecoder {
    /// Strategies are tried in the given order.
    pub fn new(strategies: Vec<Box<dyn ExtractStrategy + Send + Sync>>) -> Self {
        Self { strategies }
    }

    pub fn decode(&self, body: &str) -> Result<RecordPage, DecodeFailure> {
        let (strategy, object) = self
            .strategies
            .iter()
            .find_map(|strategy| Some((strategy.name(), strategy.extract(body)?)))
            .ok_or_else(|| classify_undecodable(body))?;
        locate_records(object, strategy)
    }
}

fn classify_undecodable(body: &str) -> DecodeFailure {
    if body.contains(LOGIN_MARKER) {
        DecodeFailure::LoginRequired
    } else {
        DecodeFailure::UnrecognizedContent {
            snippet: body.chars().take(SNIPPET_LEN).collect(),
        }
    }
}

fn locate_records(
    mut object: JsonObject,
    strategy: &'static str,
) -> Result<RecordPage, DecodeFailure> {
    let has_current_data = object.contains_key("currentData");
    let current_data = match object.remove("currentData") {
        Some(Value::Object(map)) if !map.is_empty() => Some(map),
        _ => None,
    };
    let used_fallback_container = current_data.is_none();
    let container = match current_data {
        Some(map) => map,
        None => {
            if let Some(code) = object.get("code") {
                if !has_current_data && code.as_i64() != Some(200) {
                    let summary = Value::Object(object).to_string();
                    return Err(DecodeFailure::ApiError {
                        summary: summary.chars().take(SNIPPET_LEN / 2).collect(),
                    });
                }
            }
            object
        }
    };

    let (records, malformed) = match container.get("records") {
        None | Some(Value::Null) => (RecordList::default(), None),
        Some(records) => match serde_json::from_value::<RecordList>(records.clone()) {
            Ok(records) => (records, None),
            Err(e) => (RecordList::default(), Some(e.to_string())),
        },
    };
    Ok(RecordPage {
        records,
        strategy,
        used_fallback_container,
        malformed,
    })
}
