use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serializer};

const B64_PREFIX: &str = "b64:";

/// Serialises a file payload into a string, keeping UTF-8 text intact and
/// falling back to base64 for anything else.
/// 檔案內容若為 UTF-8 文字則直接輸出；否則以 base64 保存。
pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&encode(bytes))
}

/// Deserialises a payload from a string produced by [`serialize`].
/// 從上述序列化結果還原位元組內容。
pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    decode(&text).map_err(serde::de::Error::custom)
}

fn encode(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        // text that happens to start with the marker must round-trip too
        Ok(text) if !text.starts_with(B64_PREFIX) => text.to_string(),
        _ => format!("{B64_PREFIX}{}", BASE64.encode(bytes)),
    }
}

fn decode(text: &str) -> Result<Vec<u8>, String> {
    if let Some(rest) = text.strip_prefix(B64_PREFIX) {
        BASE64
            .decode(rest.as_bytes())
            .map_err(|err| format!("invalid base64 content payload: {err}"))
    } else {
        Ok(text.as_bytes().to_vec())
    }
}
