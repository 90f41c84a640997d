//! Share-link wire format.
//!
//! A share link is a base URL whose fragment is a form-encoded key/value
//! list. `start` holds the JSON document
//!
//! ```text
//! {"initSources": [...init urls, {"sharedCatalogMembers": {...}}, ...], "version": "0.0.05"}
//! ```
//!
//! and every other key is a user property. Unknown keys are ignored when
//! decoding, and user properties go through the ambient whitelist on both
//! sides.

use serde::Deserialize;
use serde_json::{Map, Value};
use url::{Url, form_urlencoded};

use crate::config::SHARE_VERSION;
use crate::error::CatalogError;
use crate::serialize::{ShareMap, ShareState};
use crate::whitelist::{AmbientWhitelist, UserProperties};

pub const START_KEY: &str = "start";
pub const INIT_SOURCES_KEY: &str = "initSources";
pub const SHARED_MEMBERS_KEY: &str = "sharedCatalogMembers";
pub const VERSION_KEY: &str = "version";

/// Decoded `start` document.
#[derive(Debug, Clone, PartialEq)]
pub struct SharePayload {
    pub version: String,
    /// Plain string init sources, in order.
    pub init_urls: Vec<String>,
    pub shared: ShareMap,
    /// Object init sources other than the shared-members entry (view state
    /// and the like), passed through untouched.
    pub extra: Vec<Value>,
}

impl Default for SharePayload {
    fn default() -> Self {
        Self {
            version: SHARE_VERSION.to_string(),
            init_urls: Vec::new(),
            shared: ShareMap::new(),
            extra: Vec::new(),
        }
    }
}

impl SharePayload {
    pub fn new(shared: ShareMap) -> Self {
        Self {
            shared,
            ..Self::default()
        }
    }
}

#[derive(Deserialize)]
struct StartDocument {
    #[serde(default = "default_version")]
    version: String,
    #[serde(rename = "initSources")]
    init_sources: Vec<Value>,
}

fn default_version() -> String {
    SHARE_VERSION.to_string()
}

/// Everything pulled out of a share-link fragment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedShare {
    /// `None` when the link carried no `start` key.
    pub payload: Option<SharePayload>,
    pub user_properties: UserProperties,
}

impl DecodedShare {
    pub fn shared(&self) -> ShareMap {
        self.payload
            .as_ref()
            .map(|p| p.shared.clone())
            .unwrap_or_default()
    }

    pub fn state(&self) -> ShareState {
        ShareState {
            shared: self.shared(),
            user_properties: self.user_properties.clone(),
        }
    }
}

/// Renders the `start` JSON. The shared-members entry is left out when
/// there is nothing to share.
pub fn encode_start(payload: &SharePayload) -> String {
    let mut init_sources: Vec<Value> = payload
        .init_urls
        .iter()
        .map(|u| Value::String(u.clone()))
        .collect();
    if !payload.shared.is_empty() {
        let members: Map<String, Value> = payload
            .shared
            .iter()
            .map(|(address, diff)| (address.clone(), Value::Object(diff.clone())))
            .collect();
        let mut entry = Map::new();
        entry.insert(SHARED_MEMBERS_KEY.to_string(), Value::Object(members));
        init_sources.push(Value::Object(entry));
    }
    init_sources.extend(payload.extra.iter().cloned());

    let mut doc = Map::new();
    doc.insert(VERSION_KEY.to_string(), Value::String(payload.version.clone()));
    doc.insert(INIT_SOURCES_KEY.to_string(), Value::Array(init_sources));
    Value::Object(doc).to_string()
}

pub fn decode_start(start: &str) -> Result<SharePayload, CatalogError> {
    let doc: StartDocument = serde_json::from_str(start)
        .map_err(|e| CatalogError::MalformedPayload(format!("`start` is not a share document: {e}")))?;

    let mut payload = SharePayload {
        version: doc.version,
        ..SharePayload::default()
    };
    for source in doc.init_sources {
        match source {
            Value::String(url) => payload.init_urls.push(url),
            Value::Object(mut entry) => match entry.remove(SHARED_MEMBERS_KEY) {
                Some(members) => payload.shared.extend(share_map_from(members)?),
                None => payload.extra.push(Value::Object(entry)),
            },
            other => {
                return Err(CatalogError::MalformedPayload(format!(
                    "init source must be a string or an object, got {other}"
                )));
            }
        }
    }
    Ok(payload)
}

fn share_map_from(members: Value) -> Result<ShareMap, CatalogError> {
    let Value::Object(members) = members else {
        return Err(CatalogError::MalformedPayload(format!(
            "`{SHARED_MEMBERS_KEY}` must be an object"
        )));
    };
    members
        .into_iter()
        .map(|(address, diff)| match diff {
            Value::Object(diff) => Ok((address, diff)),
            other => Err(CatalogError::MalformedPayload(format!(
                "shared member {address} must be an object, got {other}"
            ))),
        })
        .collect()
}

/// The fragment string: `start` first, then the whitelisted user
/// properties in key order.
pub fn encode_fragment(
    payload: &SharePayload,
    user_properties: &UserProperties,
    ambient: &AmbientWhitelist,
) -> String {
    let mut fragment = form_urlencoded::Serializer::new(String::new());
    fragment.append_pair(START_KEY, &encode_start(payload));
    for (key, value) in ambient.filter(user_properties) {
        if key == START_KEY {
            continue;
        }
        fragment.append_pair(&key, &value);
    }
    fragment.finish()
}

/// Builds the full share URL; any fragment already on `base_url` is
/// replaced.
pub fn encode_share_url(
    base_url: &str,
    payload: &SharePayload,
    user_properties: &UserProperties,
    ambient: &AmbientWhitelist,
) -> Result<String, CatalogError> {
    let mut url = Url::parse(base_url)?;
    url.set_fragment(Some(&encode_fragment(payload, user_properties, ambient)));
    Ok(url.into())
}

pub fn decode_fragment(fragment: &str, ambient: &AmbientWhitelist) -> Result<DecodedShare, CatalogError> {
    let fragment = fragment.strip_prefix('#').unwrap_or(fragment);
    let mut decoded = DecodedShare::default();

    for (key, value) in form_urlencoded::parse(fragment.as_bytes()) {
        if key == START_KEY {
            decoded.payload = Some(decode_start(&value)?);
        } else if ambient.contains(&key) {
            decoded
                .user_properties
                .insert(key.into_owned(), value.into_owned());
        } else {
            tracing::warn!(key = %key, "ignoring unrecognised share link key");
        }
    }
    Ok(decoded)
}

/// Decodes a share URL or an embed snippet wrapping one.
pub fn decode_share_url(input: &str, ambient: &AmbientWhitelist) -> Result<DecodedShare, CatalogError> {
    let input = input.trim();
    let link = embed_src(input).unwrap_or(input);
    let url = Url::parse(link)?;
    decode_fragment(url.fragment().unwrap_or_default(), ambient)
}

pub fn embed_code(url: &str) -> String {
    format!(
        r#"<iframe style="width: 720px; height: 405px; border: none;" src="{url}" allowFullScreen mozAllowFullScreen webkitAllowFullScreen></iframe>"#
    )
}

/// The `src` attribute of an embed snippet.
pub fn embed_src(code: &str) -> Option<&str> {
    let start = code.find("src=\"")? + "src=\"".len();
    let len = code[start..].find('"')?;
    Some(&code[start..start + len])
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const BASE: &str = "http://localhost:3001/";

    fn ambient() -> AmbientWhitelist {
        let mut ambient = AmbientWhitelist::default();
        ambient.extend(["couldBeAnyString"]);
        ambient
    }

    fn shared() -> ShareMap {
        serde_json::from_value(json!({
            "Root Group/Group": {"type": "group", "isOpen": true},
            "blahId": {"type": "csv", "isEnabled": true, "opacity": 0.8}
        }))
        .unwrap()
    }

    fn user_properties() -> UserProperties {
        let mut props = UserProperties::new();
        props.insert("activeTabId".into(), "Search".into());
        props.insert("couldBeAnyString".into(), "Any string value".into());
        props.insert("notWhiteListed".into(), "Any string value".into());
        props
    }

    /// Parses the fragment without any whitelist, the way a browser would.
    fn raw_fragment(url: &str) -> UserProperties {
        let url = Url::parse(url).unwrap();
        form_urlencoded::parse(url.fragment().unwrap().as_bytes())
            .into_owned()
            .collect()
    }

    fn share_url(payload: &SharePayload) -> String {
        encode_share_url(BASE, payload, &user_properties(), &ambient()).unwrap()
    }

    #[test]
    fn whitelisted_user_properties_are_embedded() {
        let url = share_url(&SharePayload::default());
        let raw = raw_fragment(&url);

        assert_eq!(raw.get("activeTabId").map(String::as_str), Some("Search"));
        assert_eq!(
            raw.get("couldBeAnyString").map(String::as_str),
            Some("Any string value")
        );
        assert!(!raw.contains_key("notWhiteListed"));
    }

    #[test]
    fn shared_members_follow_the_init_urls() {
        let mut payload = SharePayload::new(shared());
        payload.init_urls.push("init/catalog.json".into());
        payload.extra.push(json!({"initialCamera": {"west": 1.0}}));

        let raw = raw_fragment(&share_url(&payload));
        let start: Value = serde_json::from_str(&raw["start"]).unwrap();
        let init_sources = start["initSources"].as_array().unwrap();

        assert_eq!(init_sources.len(), 3);
        assert_eq!(init_sources[0], json!("init/catalog.json"));
        assert_eq!(
            init_sources[1]["sharedCatalogMembers"]["blahId"],
            json!({"type": "csv", "isEnabled": true, "opacity": 0.8})
        );
        assert_eq!(start["version"], json!(SHARE_VERSION));
    }

    #[test]
    fn empty_share_map_is_left_out() {
        let start: Value = serde_json::from_str(&encode_start(&SharePayload::default())).unwrap();
        assert_eq!(start, json!({"version": SHARE_VERSION, "initSources": []}));
    }

    #[test]
    fn url_decodes_to_the_same_state() {
        let mut payload = SharePayload::new(shared());
        payload.init_urls.push("init/catalog.json".into());
        payload.extra.push(json!({"initialCamera": {"west": 1.0}}));

        let decoded = decode_share_url(&share_url(&payload), &ambient()).unwrap();

        assert_eq!(decoded.payload, Some(payload));
        assert_eq!(
            decoded.user_properties.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["activeTabId", "couldBeAnyString"]
        );
    }

    #[test]
    fn embed_code_wraps_the_same_url() {
        let url = share_url(&SharePayload::new(shared()));
        let code = embed_code(&url);

        assert!(code.starts_with("<iframe "));
        assert_eq!(embed_src(&code), Some(url.as_str()));
        assert_eq!(
            decode_share_url(&code, &ambient()).unwrap(),
            decode_share_url(&url, &ambient()).unwrap()
        );
    }

    #[test]
    fn decode_filters_ambient_keys_again() {
        let fragment = "activeTabId=Data&notWhiteListed=x&somethingNew=1";
        let decoded = decode_fragment(fragment, &AmbientWhitelist::default()).unwrap();

        assert_eq!(decoded.payload, None);
        assert!(decoded.shared().is_empty());
        assert_eq!(decoded.user_properties.len(), 1);
        assert_eq!(decoded.user_properties["activeTabId"], "Data");
    }

    #[test]
    fn payload_without_shared_entry_is_empty() {
        let payload = decode_start(r#"{"initSources": ["a.json", {"camera": 1}]}"#).unwrap();
        assert!(payload.shared.is_empty());
        assert_eq!(payload.init_urls, vec!["a.json".to_string()]);
        assert_eq!(payload.extra, vec![json!({"camera": 1})]);
        assert_eq!(payload.version, SHARE_VERSION);
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        for start in [
            "not json",
            r#"{"version": "0.0.05"}"#,
            r#"{"initSources": {"sharedCatalogMembers": {}}}"#,
            r#"{"initSources": [{"sharedCatalogMembers": []}]}"#,
            r#"{"initSources": [{"sharedCatalogMembers": {"a": true}}]}"#,
            r#"{"initSources": [3]}"#,
        ] {
            let err = decode_start(start).unwrap_err();
            assert!(
                matches!(err, CatalogError::MalformedPayload(_)),
                "{start}: {err:?}"
            );
            assert!(err.is_structural());
        }

        let fragment = format!("start={}", "%7Bbroken");
        assert!(matches!(
            decode_fragment(&fragment, &AmbientWhitelist::default()),
            Err(CatalogError::MalformedPayload(_))
        ));
    }

    #[test]
    fn relative_base_url_is_an_error() {
        let err = encode_share_url("./", &SharePayload::default(), &UserProperties::new(), &ambient())
            .unwrap_err();
        assert!(matches!(err, CatalogError::Url(_)));
    }
}
