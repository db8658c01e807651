// Deterministic stand-ins for the embedding backend

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::embeddings::Embedder;
use crate::{RagError, Result};

pub(crate) const TEST_DIMENSION: usize = 64;

/// Bag-of-words embedder: texts sharing words land close together
#[derive(Debug, Default)]
pub(crate) struct KeywordEmbedder {
    calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn fnv1a(word: &str) -> u64 {
    word.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

pub(crate) fn keyword_vector(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0_f32; TEST_DIMENSION];
    vector[0] = 0.01;

    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let slot = (fnv1a(&word.to_lowercase()) % TEST_DIMENSION as u64) as usize;
        vector[slot] += 1.0;
    }

    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    vector.iter().map(|v| v / norm).collect()
}

impl Embedder for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword-test"
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(keyword_vector(text))
    }
}

/// Embedder whose backend is always down
#[derive(Debug, Default)]
pub(crate) struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    fn model_name(&self) -> &str {
        "offline"
    }

    fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(RagError::Embedding("connection refused".to_string()))
    }
}
