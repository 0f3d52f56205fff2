use crate::agent::messages::Frame;
use once_cell::sync::OnceCell;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("{codec} codec: {message}")]
pub struct CodecError {
    pub codec: &'static str,
    pub message: String,
}

/// Turns frames into text messages and back.
pub trait FrameCodec: Send + Sync {
    fn name(&self) -> &'static str;
    fn encode(&self, frame: &Frame) -> Result<String, CodecError>;
    fn decode(&self, text: &str) -> Result<Frame, CodecError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl FrameCodec for JsonCodec {
    fn name(&self) -> &'static str { "json" }

    fn encode(&self, frame: &Frame) -> Result<String, CodecError> {
        serde_json::to_string(frame).map_err(|err| CodecError {
            codec: self.name(),
            message: err.to_string(),
        })
    }

    fn decode(&self, text: &str) -> Result<Frame, CodecError> {
        serde_json::from_str(text).map_err(|err| CodecError {
            codec: self.name(),
            message: err.to_string(),
        })
    }
}

static CODEC: OnceCell<Box<dyn FrameCodec>> = OnceCell::new();

/// Sets the process-wide codec. Only the first call wins; returns `false`
/// when a codec was already in place.
pub fn install(codec: Box<dyn FrameCodec>) -> bool {
    let name = codec.name();
    let installed = CODEC.set(codec).is_ok();
    if installed {
        log::debug!("[codec] installed {name} frame codec");
    }
    installed
}

/// The installed codec, falling back to [`JsonCodec`].
pub fn codec() -> &'static dyn FrameCodec { CODEC.get_or_init(|| Box::new(JsonCodec)).as_ref() }

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_codec() {
        let frame = Frame::Request {
            id: u64::MAX - 1,
            kind: "log_manage".into(),
            body: Some(json!({"level": "debug", "loggers": ["root", "rpc"]})),
        };

        let text = JsonCodec.encode(&frame).unwrap();
        assert_eq!(JsonCodec.decode(&text).unwrap(), frame);
    }

    #[test]
    fn test_decode_garbage() {
        let err = JsonCodec.decode("{not json").unwrap_err();
        assert_eq!(err.codec, "json");
    }

    #[test]
    fn test_install_once() {
        let _ = codec();
        assert!(!install(Box::new(JsonCodec)));
        assert_eq!(codec().name(), "json");
    }
}
