//! Utility functions and helpers
//!
//! Checksums for TON address/BOC envelopes, timestamps, and the retry
//! backoff used by the mining loop.

use std::time::{SystemTime, UNIX_EPOCH};

/// Get current timestamp in seconds since Unix epoch
pub fn current_timestamp_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// CRC-16/XMODEM over the given bytes.
///
/// Used by the user-friendly (base64) TON address form as its integrity
/// check.
pub fn crc16_xmodem(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

/// CRC-32C (Castagnoli, reflected) over the given bytes.
///
/// The BOC envelope stores this checksum little-endian after the cell data.
pub fn crc32c(data: &[u8]) -> u32 {
    let mut crc: u32 = 0xffff_ffff;
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0x82f6_3b78;
            } else {
                crc >>= 1;
            }
        }
    }
    !crc
}

/// Exponential backoff calculator
pub struct ExponentialBackoff {
    initial_delay_ms: u64,
    max_delay_ms: u64,
    multiplier: f64,
    current_attempt: u32,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff calculator
    pub fn new(initial_delay_ms: u64, max_delay_ms: u64, multiplier: f64) -> Self {
        Self {
            initial_delay_ms,
            max_delay_ms,
            multiplier,
            current_attempt: 0,
        }
    }

    /// Get the next delay in milliseconds
    pub fn next_delay(&mut self) -> u64 {
        let delay = if self.current_attempt == 0 {
            self.initial_delay_ms
        } else {
            let exponential_delay = (self.initial_delay_ms as f64
                * self.multiplier.powi(self.current_attempt as i32))
                as u64;
            std::cmp::min(exponential_delay, self.max_delay_ms)
        };

        self.current_attempt += 1;
        delay
    }

    /// Reset the backoff state
    pub fn reset(&mut self) {
        self.current_attempt = 0;
    }

    /// Get current attempt number
    pub fn attempt(&self) -> u32 {
        self.current_attempt
    }
}
