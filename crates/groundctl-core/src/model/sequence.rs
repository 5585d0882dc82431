use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use serde::{Deserialize, Serialize};

/// Name of the sequence the server runs on abort. Submitting a script
/// under this name replaces the abort procedure instead of adding one.
pub const ABORT_SEQUENCE: &str = "abort";

/// A named executable procedure stored on the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
    pub name: String,
    pub script: String,
}

impl Sequence {
    pub fn new(name: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: script.into(),
        }
    }

    /// Script as it travels on the wire.
    pub fn encoded_script(&self) -> String {
        BASE64_STANDARD.encode(self.script.as_bytes())
    }

    pub fn is_abort(&self) -> bool {
        self.name == ABORT_SEQUENCE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_is_base64_on_the_wire() {
        let seq = Sequence::new("press", "print(1)");
        assert_eq!(seq.encoded_script(), "cHJpbnQoMSk=");
        assert!(!seq.is_abort());
        assert!(Sequence::new("abort", "").is_abort());
    }
}
