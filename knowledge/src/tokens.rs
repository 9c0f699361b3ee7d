use thiserror::Error;
use tiktoken_rs::cl100k_base;

#[derive(Debug, Error)]
#[error("Failed to initialize tokenizer: {0}")]
pub struct TokenizerError(String);

pub struct TokenCounter {
    bpe: tiktoken_rs::CoreBPE,
}

impl TokenCounter {
    pub fn new() -> Result<Self, TokenizerError> {
        let bpe = cl100k_base().map_err(|e| TokenizerError(e.to_string()))?;
        Ok(Self { bpe })
    }

    pub fn count(&self, text: &str) -> u64 {
        self.bpe.encode_with_special_tokens(text).len() as u64
    }
}
