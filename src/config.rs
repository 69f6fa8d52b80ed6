// Wipe parameters: block size, fill byte, and the buffers/patterns derived
// from them. Built once before any pass and immutable afterwards; the random
// buffer for the first sub-pass of a two-pass wipe is a transient value, not
// a mutation of the config.

use crate::{WipeError, WipeResult};
use rand::RngCore;

pub const MIN_BLOCK_SIZE: u32 = 512;
pub const MAX_BLOCK_SIZE: u32 = 32768;
pub const DEFAULT_BLOCK_SIZE: u32 = 4096;

#[derive(Debug, Clone)]
pub struct WipeConfig {
    block_size: u32,
    fill_byte: u8,
    /// The fill byte replicated across a machine word, for comparing
    /// `block_size / 8` words at a time instead of byte by byte.
    fill_word: u64,
    /// Pre-filled write buffer of `block_size` bytes.
    fill_buffer: Vec<u8>,
}

impl WipeConfig {
    /// Validates the block size and derives the fill word and write buffer.
    pub fn new(block_size: u32, fill_byte: u8) -> WipeResult<Self> {
        if !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&block_size)
            || block_size % MIN_BLOCK_SIZE != 0
        {
            return Err(WipeError::InvalidBlockSize(block_size));
        }
        Ok(Self {
            block_size,
            fill_byte,
            fill_word: u64::from_ne_bytes([fill_byte; 8]),
            fill_buffer: vec![fill_byte; block_size as usize],
        })
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn fill_byte(&self) -> u8 {
        self.fill_byte
    }

    pub fn fill_word(&self) -> u64 {
        self.fill_word
    }

    pub fn fill_buffer(&self) -> &[u8] {
        &self.fill_buffer
    }

    /// Number of 64-bit words compared per full block.
    pub fn words_per_block(&self) -> usize {
        self.block_size as usize / 8
    }

    /// Fresh block of non-deterministic bytes for the first sub-pass of a
    /// two-pass wipe. Best-effort anti-forensics, not cryptographic.
    pub fn random_buffer(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.block_size as usize];
        rand::thread_rng().fill_bytes(&mut buf);
        buf
    }

    /// Word-wise check that a full block consists entirely of the fill
    /// byte. `block` must be a whole number of words long.
    pub fn block_matches(&self, block: &[u8]) -> bool {
        let word = self.fill_word.to_ne_bytes();
        block.chunks_exact(8).all(|chunk| chunk == word)
    }

    /// Byte-wise check for the trailing partial block.
    pub fn bytes_match(&self, bytes: &[u8]) -> bool {
        bytes.iter().all(|&b| b == self.fill_byte)
    }
}
