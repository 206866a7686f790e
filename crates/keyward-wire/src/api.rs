//! Remote authority payloads
//!
//! Response bodies are parsed leniently: anything before the first `{` is
//! skipped, since some authority deployments prefix the JSON with noise.

use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};

use keyward_core::{KeywardError, KeywardResult, TagId};

/// `GET /api/{device}/checkin/`
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct CheckinResponse {
    #[serde(default, deserialize_with = "lenient_bool")]
    pub success: bool,
    #[serde(rename = "hashOfTags", default)]
    pub hash_of_tags: Option<String>,
}

/// `GET /api/{device}/authorised/`, also the persisted cache document
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorisedTags {
    pub authorised_tags: Vec<TagId>,
    #[serde(default)]
    pub authorised_tags_hash: String,
}

/// `GET /api/{device}/check/{tag}/`
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct AccessResponse {
    #[serde(default)]
    pub access: bool,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Deserialize a response body, skipping any prefix before the JSON object
pub fn parse_body<T: DeserializeOwned>(body: &str) -> KeywardResult<T> {
    let start = body
        .find('{')
        .ok_or_else(|| KeywardError::ParseFailure("no JSON object in body".into()))?;
    Ok(serde_json::from_str(body[start..].trim_end())?)
}

/// Accepts `true`, `"true"` and non-zero numbers
fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Bool(b) => b,
        serde_json::Value::String(s) => s.eq_ignore_ascii_case("true"),
        serde_json::Value::Number(n) => n.as_i64().is_some_and(|n| n != 0),
        _ => false,
    })
}
