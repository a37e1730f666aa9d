use multio_frame::PAGE_SIZE;

use crate::error::{MuxError, Result};

/// Multiplexer configuration.
#[derive(Debug, Clone)]
pub struct MuxConfig {
    /// Label used for thread names and the tracing span. Default: `multio`.
    pub name: String,
    /// Largest payload of one Data frame. Writes are split at this size and
    /// incoming headers announcing more are rejected. Default: [`PAGE_SIZE`].
    pub max_payload: usize,
}

impl MuxConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.max_payload == 0 || self.max_payload > u32::MAX as usize {
            return Err(MuxError::InvalidConfig(format!(
                "max_payload must be in 1..={}, got {}",
                u32::MAX,
                self.max_payload
            )));
        }
        if self.name.is_empty() {
            return Err(MuxError::InvalidConfig("name must not be empty".to_string()));
        }
        Ok(())
    }
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            name: "multio".to_string(),
            max_payload: PAGE_SIZE,
        }
    }
}
