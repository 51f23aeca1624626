//! JobEnvelope - キューを流れる 1 件分の作業単位
//!
//! ワイヤ形式は JSON テキスト `{"id": "...", "callback": ...}` です。
//! - `id` は必須。欠落・空・不正文字はデコード失敗（黙ってデフォルトにしない）
//! - `callback` は任意で、解釈も配送もせずにそのまま運ぶ（`null` もキーごと残す）
//! - 旧 producer が書いた `songhash` フィールドも `id` として受け付ける

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::ids::JobId;

/// Envelope を decode できなかった
///
/// ポイズンメッセージはリトライしても直らないので、ログに残して捨てる。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed envelope: {reason}")]
pub struct EnvelopeError {
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEnvelope {
    #[serde(alias = "songhash")]
    pub id: JobId,

    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub callback: Option<Value>,
}

/// キーがあれば値が `null` でも Some にする（キー自体が無ければ default で None）
pub(crate) fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl JobEnvelope {
    pub fn new(id: JobId, callback: Option<Value>) -> Self {
        Self { id, callback }
    }

    /// キューに積む文字列表現
    pub fn encode(&self) -> String {
        let mut obj = Map::new();
        obj.insert("id".to_string(), Value::String(self.id.to_string()));
        if let Some(callback) = &self.callback {
            obj.insert("callback".to_string(), callback.clone());
        }
        Value::Object(obj).to_string()
    }

    pub fn decode(raw: &str) -> Result<Self, EnvelopeError> {
        serde_json::from_str(raw).map_err(|e| EnvelopeError {
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn id(s: &str) -> JobId {
        JobId::parse(s).unwrap()
    }

    #[test]
    fn encodes_without_callback() {
        let env = JobEnvelope::new(id("abc123"), None);
        assert_eq!(env.encode(), r#"{"id":"abc123"}"#);
    }

    #[test]
    fn callback_passes_through_untouched() {
        let callback = json!({"url": "http://example.test/done", "data": {"k": [1, 2]}});
        let env = JobEnvelope::new(id("abc123"), Some(callback.clone()));

        let back = JobEnvelope::decode(&env.encode()).unwrap();
        assert_eq!(back.id, id("abc123"));
        assert_eq!(back.callback, Some(callback));
    }

    #[test]
    fn null_callback_is_kept() {
        let env = JobEnvelope::decode(r#"{"id":"abc","callback":null}"#).unwrap();
        assert_eq!(env.callback, Some(Value::Null));
        let encoded: Value = serde_json::from_str(&env.encode()).unwrap();
        assert_eq!(encoded, json!({ "id": "abc", "callback": null }));
    }

    #[test]
    fn accepts_legacy_songhash_field() {
        let env = JobEnvelope::decode(r#"{"songhash":"f00d"}"#).unwrap();
        assert_eq!(env.id, id("f00d"));
        assert_eq!(env.callback, None);
    }

    #[rstest]
    #[case::not_json("not json")]
    #[case::missing_id(r#"{"callback":"x"}"#)]
    #[case::empty_id(r#"{"id":""}"#)]
    #[case::id_not_string(r#"{"id":42}"#)]
    #[case::path_in_id(r#"{"id":"../x"}"#)]
    #[case::array("[]")]
    fn rejects_malformed(#[case] raw: &str) {
        assert!(JobEnvelope::decode(raw).is_err());
    }
}
