//! Generation parameters

use serde::{Deserialize, Serialize};

use crate::{KilnError, Result};

/// Parameters controlling a single generation.
///
/// Defaults match the fixed values the gateway historically used for
/// every request (256 tokens at temperature 0.7); `/chat` callers may
/// override them per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Maximum number of tokens to generate
    pub max_tokens: usize,
    /// Temperature for randomness (0.0 = deterministic)
    pub temperature: f32,
    /// Stop sequences that end generation early
    pub stop_sequences: Vec<String>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 256,
            temperature: 0.7,
            stop_sequences: vec![],
        }
    }
}

impl GenerationParams {
    /// Greedy parameters (deterministic)
    pub fn greedy() -> Self {
        Self {
            temperature: 0.0,
            ..Default::default()
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_stop_sequences(mut self, stop: Vec<String>) -> Self {
        self.stop_sequences = stop;
        self
    }

    /// Validate parameter ranges
    pub fn validate(&self) -> Result<()> {
        if self.max_tokens == 0 {
            return Err(KilnError::invalid_request(
                "max_tokens must be greater than 0",
            ));
        }
        if self.temperature < 0.0 || self.temperature > 2.0 {
            return Err(KilnError::invalid_request(
                "temperature must be between 0.0 and 2.0",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(GenerationParams::default().validate().is_ok());
        assert!(GenerationParams::greedy().validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range() {
        let params = GenerationParams::default().with_max_tokens(0);
        assert!(params.validate().is_err());

        let params = GenerationParams::default().with_temperature(3.0);
        assert!(params.validate().is_err());

        let params = GenerationParams::default().with_temperature(-0.1);
        assert!(params.validate().is_err());
    }
}
