//! Frame assembler for byte-at-a-time stream input.
//!
//! Bytes arrive one per work item. The assembler keeps them in a
//! [`FrameState`] until a message is complete:
//!
//! - Delimited mode ([`FrameAssembler::feed`]): a varint length prefix, then
//!   exactly that many message bytes. States `AwaitingLength` ->
//!   `CollectingMessage` -> back to `Idle` once the frame is handed out.
//! - Raw mode ([`FrameAssembler::feed_raw`]): every byte is appended and
//!   re-arms a single inactivity deadline. When the deadline passes,
//!   [`FrameAssembler::expire`] yields everything collected as one frame.
//!
//! # Example
//!
//! ```
//! use protowire::protocol::FrameAssembler;
//!
//! let mut assembler = FrameAssembler::new();
//!
//! // prefix 2, then two message bytes
//! let frames = assembler.push(&[0x02, 0x08, 0x01]).unwrap();
//!
//! assert_eq!(frames.len(), 1);
//! assert_eq!(frames[0].message(), &[0x08, 0x01]);
//! ```

use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::time::Instant;

use super::frame::CompleteFrame;
use crate::codec::{decode_varint, MAX_VARINT_LEN};
use crate::error::ProtocolError;

/// Default maximum message size (1 GiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024 * 1024;

/// Default raw-mode inactivity timeout.
pub const DEFAULT_STREAM_TIMEOUT: Duration = Duration::from_millis(100);

/// Largest buffer reserved up front for an announced message.
const MAX_PREALLOCATION: usize = 64 * 1024;

/// Observable assembler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblerState {
    /// Nothing buffered.
    Idle,
    /// Reading the varint length prefix.
    AwaitingLength,
    /// Prefix decoded, collecting message bytes.
    CollectingMessage,
    /// Raw mode: bytes buffered, inactivity deadline armed.
    AwaitingTimeout,
}

/// Partial frame data owned by one assembler.
///
/// `expected_length` is `None` while the prefix is being read. Once set it is
/// positive and `message_bytes.len()` never exceeds it.
#[derive(Debug, Default)]
struct FrameState {
    length_bytes: BytesMut,
    message_bytes: BytesMut,
    expected_length: Option<usize>,
    /// Pending raw-mode inactivity deadline.
    deadline: Option<Instant>,
}

impl FrameState {
    fn reset(&mut self) {
        self.length_bytes.clear();
        self.message_bytes.clear();
        self.expected_length = None;
        self.deadline = None;
    }
}

/// Reassembles messages from a byte stream.
#[derive(Debug)]
pub struct FrameAssembler {
    state: FrameState,
    /// Raw-mode inactivity timeout.
    timeout: Duration,
    /// Maximum announced message length.
    max_message_size: usize,
}

impl FrameAssembler {
    /// Create an assembler with default settings.
    ///
    /// Default timeout: 100ms, max message size: 1GB.
    pub fn new() -> Self {
        Self {
            state: FrameState::default(),
            timeout: DEFAULT_STREAM_TIMEOUT,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    /// Set the raw-mode inactivity timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the maximum accepted message length.
    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    /// Feed one byte of a length-delimited stream.
    ///
    /// Returns the frame when this byte completes a message. A prefix that
    /// decodes to zero resets the assembler and produces nothing.
    ///
    /// # Errors
    ///
    /// A prefix running past 10 bytes or announcing more than the maximum
    /// message size. The assembler resets before returning the error.
    pub fn feed(&mut self, byte: u8) -> Result<Option<CompleteFrame>, ProtocolError> {
        self.state.deadline = None;

        let Some(expected) = self.state.expected_length else {
            self.state.length_bytes.put_u8(byte);
            if byte & 0x80 != 0 {
                let bytes = self.state.length_bytes.len();
                if bytes >= MAX_VARINT_LEN {
                    self.state.reset();
                    return Err(ProtocolError::VarintOverflow { bytes });
                }
                return Ok(None);
            }
            return self.start_message();
        };

        self.state.message_bytes.put_u8(byte);
        if self.state.message_bytes.len() < expected {
            return Ok(None);
        }

        let frame = CompleteFrame::new(
            self.state.length_bytes.split().freeze(),
            self.state.message_bytes.split().freeze(),
        );
        self.state.reset();
        Ok(Some(frame))
    }

    /// Prefix complete: decode it and switch to collecting.
    fn start_message(&mut self) -> Result<Option<CompleteFrame>, ProtocolError> {
        let bytes = self.state.length_bytes.len();
        let (length, _) = decode_varint(&self.state.length_bytes).map_err(|_| {
            self.state.reset();
            ProtocolError::VarintOverflow { bytes }
        })?;

        if length == 0 {
            self.state.reset();
            return Ok(None);
        }
        if length > self.max_message_size as u64 {
            self.state.reset();
            return Err(ProtocolError::Oversize {
                length,
                max: self.max_message_size,
            });
        }

        let length = length as usize;
        self.state.message_bytes.reserve(length.min(MAX_PREALLOCATION));
        self.state.expected_length = Some(length);
        Ok(None)
    }

    /// Feed a whole buffer of a length-delimited stream.
    ///
    /// Returns every frame completed by `data`, in order. Partial data stays
    /// buffered for the next call.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<CompleteFrame>, ProtocolError> {
        let mut frames = Vec::new();
        for &byte in data {
            if let Some(frame) = self.feed(byte)? {
                frames.push(frame);
            }
        }
        Ok(frames)
    }

    /// Feed one byte of a raw stream and re-arm the deadline at `now + timeout`.
    pub fn feed_raw(&mut self, byte: u8, now: Instant) {
        self.state.message_bytes.put_u8(byte);
        self.state.deadline = Some(now + self.timeout);
    }

    /// Pending inactivity deadline, if any.
    #[inline]
    pub fn deadline(&self) -> Option<Instant> {
        self.state.deadline
    }

    /// Whether the raw-mode deadline has passed at `now`.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.state.deadline.is_some_and(|deadline| now >= deadline)
    }

    /// Take the raw-mode bytes as one frame and reset.
    ///
    /// Returns `None` when nothing is buffered.
    pub fn expire(&mut self) -> Option<CompleteFrame> {
        self.state.deadline = None;
        if self.state.message_bytes.is_empty() {
            return None;
        }
        let message: Bytes = self.state.message_bytes.split().freeze();
        self.state.reset();
        Some(CompleteFrame::unprefixed(message))
    }

    /// Cancel the deadline and discard buffered bytes.
    pub fn clear(&mut self) {
        self.state.reset();
    }

    /// Current state.
    pub fn state(&self) -> AssemblerState {
        if self.state.deadline.is_some() {
            AssemblerState::AwaitingTimeout
        } else if self.state.expected_length.is_some() {
            AssemblerState::CollectingMessage
        } else if !self.state.length_bytes.is_empty() {
            AssemblerState::AwaitingLength
        } else {
            AssemblerState::Idle
        }
    }

    /// Message bytes collected so far.
    #[inline]
    pub fn buffered_len(&self) -> usize {
        self.state.message_bytes.len()
    }

    /// Announced length of the message being collected.
    #[inline]
    pub fn expected_length(&self) -> Option<usize> {
        self.state.expected_length
    }

    #[inline]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[inline]
    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}
