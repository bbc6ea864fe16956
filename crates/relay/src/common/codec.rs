//! JSON wire format shared by the bus and the HTTP bus routes.

use domain::protocol::{CommandEnvelope, ResponseEnvelope};

use crate::error::CodecError;

pub fn decode(raw: &[u8]) -> Result<CommandEnvelope, CodecError> {
    let envelope: CommandEnvelope =
        serde_json::from_slice(raw).map_err(|e| CodecError::Malformed(e.to_string()))?;
    if envelope.request_id.trim().is_empty() {
        return Err(CodecError::Malformed("request_id is empty".to_string()));
    }
    if envelope.path.trim().is_empty() {
        return Err(CodecError::Malformed("path is empty".to_string()));
    }
    Ok(envelope)
}

pub fn encode(response: &ResponseEnvelope) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(response).map_err(|e| CodecError::Encoding(e.to_string()))
}

pub fn encode_command(command: &CommandEnvelope) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(command).map_err(|e| CodecError::Encoding(e.to_string()))
}

pub fn decode_response(raw: &[u8]) -> Result<ResponseEnvelope, CodecError> {
    serde_json::from_slice(raw).map_err(|e| CodecError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_command() {
        let raw = br#"{"request_id":"r1","path":"/comments","method":"POST","body":{"text":"hi","post_id":42}}"#;
        let cmd = decode(raw).unwrap();
        assert_eq!(cmd.request_id, "r1");
        assert_eq!(cmd.path, "/comments");
        assert_eq!(cmd.method, "POST");
        assert_eq!(cmd.body, json!({ "text": "hi", "post_id": 42 }));
    }

    #[test]
    fn method_and_body_are_optional() {
        let cmd = decode(br#"{"request_id":"r2","path":"/comments/5"}"#).unwrap();
        assert_eq!(cmd.method, "");
        assert!(cmd.body.is_null());
    }

    #[test]
    fn rejects_malformed_input() {
        let cases: [&[u8]; 5] = [
            b"not json",
            br#"{"path":"/comments"}"#,
            br#"{"request_id":"","path":"/comments"}"#,
            br#"{"request_id":"r1","path":"  "}"#,
            br#"{"request_id":7,"path":"/comments"}"#,
        ];
        for raw in cases {
            assert!(
                matches!(decode(raw), Err(CodecError::Malformed(_))),
                "{:?} should be malformed",
                String::from_utf8_lossy(raw)
            );
        }
    }

    #[test]
    fn encodes_response() {
        let resp = ResponseEnvelope::failure("r1", 404, "article not found");
        let bytes = encode(&resp).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value, json!({ "request_id": "r1", "status": 404, "error": "article not found" }));
        assert_eq!(decode_response(&bytes).unwrap(), resp);
    }
}
