//! Reassembly of notification chunks into complete frames.
//!
//! The link delivers at most `MTU - 3` bytes per notification, so a response
//! arrives as several chunks. Byte 2 of every frame announces its total length
//! (`len + 4`), which is all that is needed to know when a frame is complete.

use crate::protocol::{frame_len, START_MARKER};
use bytes::{Buf, Bytes, BytesMut};
use std::time::Duration;
use tokio::{
    sync::{mpsc, Notify},
    time::{timeout_at, Instant},
};
use tracing::debug;

/// Why a wait for the next frame ended without one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
    /// No chunk arrived within the wait window
    TimedOut,
    /// The wait was interrupted from outside
    Interrupted,
    /// The notification channel was closed
    Closed,
}

/// Length-driven accumulation of inbound bytes
#[derive(Debug, Default)]
pub struct FrameAssembler {
    buffer: BytesMut,
}

impl FrameAssembler {
    /// Create an empty assembler
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
        self.resync();
    }

    /// Total frame size, once the length byte has arrived
    #[must_use]
    pub fn expected_len(&self) -> Option<usize> {
        frame_len(&self.buffer)
    }

    /// Bytes currently buffered
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Whether nothing is buffered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Remove and return a complete frame, if one is buffered
    pub fn take_frame(&mut self) -> Option<Bytes> {
        let len = self.expected_len()?;
        if self.buffer.len() < len {
            return None;
        }
        let frame = self.buffer.split_to(len).freeze();
        self.resync();
        Some(frame)
    }

    /// Discard everything buffered, returning the number of bytes dropped
    pub fn reset(&mut self) -> usize {
        let dropped = self.buffer.len();
        self.buffer.clear();
        dropped
    }

    /// A frame always starts with the start marker; drop anything before it
    fn resync(&mut self) {
        match self.buffer.iter().position(|&b| b == START_MARKER) {
            Some(0) => {}
            Some(skip) => {
                debug!("Skipping {skip} bytes before start marker");
                self.buffer.advance(skip);
            }
            None if !self.buffer.is_empty() => {
                debug!("Dropping {} bytes without start marker", self.buffer.len());
                self.buffer.clear();
            }
            None => {}
        }
    }
}

/// Consumer side of the notification channel for one session
#[derive(Debug)]
pub struct Reassembler {
    inbound: mpsc::UnboundedReceiver<Bytes>,
    assembler: FrameAssembler,
}

impl Reassembler {
    /// Wrap the receiving end of a transport subscription
    #[must_use]
    pub fn new(inbound: mpsc::UnboundedReceiver<Bytes>) -> Self {
        Self {
            inbound,
            assembler: FrameAssembler::new(),
        }
    }

    /// Throw away buffered bytes and every chunk already queued
    ///
    /// Called before each request so bytes belonging to an abandoned exchange
    /// are never attributed to the next one.
    pub fn drain_stale(&mut self) -> usize {
        let mut dropped = self.assembler.reset();
        while let Ok(chunk) = self.inbound.try_recv() {
            dropped += chunk.len();
        }
        if dropped > 0 {
            debug!("Discarded {dropped} stale bytes");
        }
        dropped
    }

    /// Wait for the next complete frame
    ///
    /// `first` bounds the wait for the first chunk of the frame, measured from
    /// the call; chunks discarded for lacking a start marker do not extend it.
    /// `continuation` bounds the wait for each further chunk needed to reach
    /// the announced length.
    ///
    /// # Errors
    ///
    /// Returns a [`WaitError`] on timeout, interruption or a closed channel.
    pub async fn next_frame(
        &mut self,
        first: Duration,
        continuation: Duration,
        interrupt: &Notify,
    ) -> std::result::Result<Bytes, WaitError> {
        let first_deadline = Instant::now() + first;

        loop {
            if let Some(frame) = self.assembler.take_frame() {
                return Ok(frame);
            }

            let deadline = if self.assembler.is_empty() {
                first_deadline
            } else {
                Instant::now() + continuation
            };

            let chunk = tokio::select! {
                biased;
                () = interrupt.notified() => return Err(WaitError::Interrupted),
                received = timeout_at(deadline, self.inbound.recv()) => match received {
                    Err(_) => return Err(WaitError::TimedOut),
                    Ok(None) => return Err(WaitError::Closed),
                    Ok(Some(chunk)) => chunk,
                },
            };

            debug!("Received: {:02x?}", chunk.as_ref());
            self.assembler.push(&chunk);
        }
    }
}
