//! Encrypted record transport for an established HAP session
//!
//! After Pair-Verify, every byte on the socket travels inside
//! ChaCha20-Poly1305 records:
//!
//! ```text
//! record := length_le:u16 | ciphertext:length bytes | tag:16 bytes
//! ```
//!
//! The two length bytes are the additional authenticated data for their
//! record. Each direction counts records independently from zero; the
//! counter forms the nonce, so reordering or replay fails authentication
//! and the failure is terminal for the session.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use byteorder::{ByteOrder, LittleEndian};
use bytes::{Buf, BytesMut};
use chacha20poly1305::{AeadInPlace, ChaCha20Poly1305, Key, KeyInit, Nonce, Tag};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::protocol::pairing::SessionKeys;

/// Maximum plaintext bytes per record; longer writes fragment
pub const MAX_PLAINTEXT_RECORD: usize = 1024;

const TAG_LEN: usize = 16;

/// Why a session became permanently unusable
///
/// Attached as the payload of the `io::Error` every subsequent read or
/// write returns, so upper layers can map it to a session-terminated error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionFatal {
    /// A record failed authentication
    Decrypt,
    /// The peer closed mid-record
    Truncated,
    /// A record declared more plaintext than the protocol allows
    Oversize,
}

impl fmt::Display for SessionFatal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decrypt => write!(f, "record failed authentication"),
            Self::Truncated => write!(f, "stream closed mid-record"),
            Self::Oversize => write!(f, "record exceeds maximum plaintext length"),
        }
    }
}

impl std::error::Error for SessionFatal {}

fn fatal_error(kind: SessionFatal) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, kind)
}

/// A byte stream wrapped in per-record AEAD
///
/// Owns the underlying socket and both direction counters. Implements the
/// tokio I/O traits so the HTTP engine runs over it unchanged.
pub struct SecureStream<S> {
    inner: S,
    seal_cipher: ChaCha20Poly1305,
    open_cipher: ChaCha20Poly1305,
    send_count: u64,
    recv_count: u64,

    // Inbound record assembly
    header: [u8; 2],
    header_filled: usize,
    record: Vec<u8>,
    record_filled: usize,
    /// Decrypted bytes not yet consumed by the reader
    plaintext: BytesMut,

    // Outbound record in flight
    outbox: Vec<u8>,
    outbox_pos: usize,
    outbox_claim: usize,

    fatal: Option<SessionFatal>,
}

impl<S> SecureStream<S> {
    /// Wrap a stream with freshly derived session keys
    #[must_use]
    pub fn new(inner: S, keys: &SessionKeys) -> Self {
        Self {
            inner,
            seal_cipher: ChaCha20Poly1305::new(Key::from_slice(&keys.write_key)),
            open_cipher: ChaCha20Poly1305::new(Key::from_slice(&keys.read_key)),
            send_count: 0,
            recv_count: 0,
            header: [0u8; 2],
            header_filled: 0,
            record: Vec::new(),
            record_filled: 0,
            plaintext: BytesMut::new(),
            outbox: Vec::with_capacity(2 + MAX_PLAINTEXT_RECORD + TAG_LEN),
            outbox_pos: 0,
            outbox_claim: 0,
            fatal: None,
        }
    }

    /// Whether a fatal record failure has latched
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.fatal.is_some()
    }

    /// Records sent so far
    #[must_use]
    pub fn records_sent(&self) -> u64 {
        self.send_count
    }

    /// Records received so far
    #[must_use]
    pub fn records_received(&self) -> u64 {
        self.recv_count
    }

    #[cfg(test)]
    pub(crate) fn skip_inbound_record(&mut self) {
        self.recv_count += 1;
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for SecureStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        loop {
            if !this.plaintext.is_empty() {
                let n = this.plaintext.len().min(buf.remaining());
                buf.put_slice(&this.plaintext[..n]);
                this.plaintext.advance(n);
                return Poll::Ready(Ok(()));
            }

            if let Some(kind) = this.fatal {
                return Poll::Ready(Err(fatal_error(kind)));
            }

            // Record length prefix
            while this.header_filled < 2 {
                let mut read_buf = ReadBuf::new(&mut this.header[this.header_filled..]);
                ready!(Pin::new(&mut this.inner).poll_read(cx, &mut read_buf))?;
                let n = read_buf.filled().len();
                if n == 0 {
                    if this.header_filled == 0 {
                        // Clean close on a record boundary
                        return Poll::Ready(Ok(()));
                    }
                    this.fatal = Some(SessionFatal::Truncated);
                    return Poll::Ready(Err(fatal_error(SessionFatal::Truncated)));
                }
                this.header_filled += n;
            }

            let ciphertext_len = LittleEndian::read_u16(&this.header) as usize;
            if ciphertext_len > MAX_PLAINTEXT_RECORD {
                this.fatal = Some(SessionFatal::Oversize);
                return Poll::Ready(Err(fatal_error(SessionFatal::Oversize)));
            }

            // Ciphertext plus detached tag
            let total = ciphertext_len + TAG_LEN;
            if this.record.len() != total {
                this.record.resize(total, 0);
            }
            while this.record_filled < total {
                let mut read_buf = ReadBuf::new(&mut this.record[this.record_filled..]);
                ready!(Pin::new(&mut this.inner).poll_read(cx, &mut read_buf))?;
                let n = read_buf.filled().len();
                if n == 0 {
                    this.fatal = Some(SessionFatal::Truncated);
                    return Poll::Ready(Err(fatal_error(SessionFatal::Truncated)));
                }
                this.record_filled += n;
            }

            let mut nonce_bytes = [0u8; 12];
            LittleEndian::write_u64(&mut nonce_bytes[4..], this.recv_count);
            let nonce = Nonce::from_slice(&nonce_bytes);

            let (ciphertext, tag) = this.record.split_at_mut(ciphertext_len);
            let result = this.open_cipher.decrypt_in_place_detached(
                nonce,
                &this.header,
                ciphertext,
                Tag::from_slice(tag),
            );

            if result.is_err() {
                this.fatal = Some(SessionFatal::Decrypt);
                return Poll::Ready(Err(fatal_error(SessionFatal::Decrypt)));
            }

            this.recv_count += 1;
            this.plaintext.extend_from_slice(ciphertext);
            this.header_filled = 0;
            this.record_filled = 0;
            this.record.clear();
        }
    }
}

impl<S: AsyncWrite + Unpin> SecureStream<S> {
    /// Drive the in-flight record out to the socket
    fn poll_flush_outbox(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        while self.outbox_pos < self.outbox.len() {
            let n = ready!(
                Pin::new(&mut self.inner).poll_write(cx, &self.outbox[self.outbox_pos..])
            )?;
            if n == 0 {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "socket accepted no bytes",
                )));
            }
            self.outbox_pos += n;
        }
        self.outbox.clear();
        self.outbox_pos = 0;
        Poll::Ready(Ok(()))
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for SecureStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();

        if let Some(kind) = this.fatal {
            return Poll::Ready(Err(fatal_error(kind)));
        }

        // A record already claimed plaintext: finish it before taking more.
        if this.outbox_claim > 0 {
            ready!(this.poll_flush_outbox(cx))?;
            let claimed = this.outbox_claim;
            this.outbox_claim = 0;
            return Poll::Ready(Ok(claimed));
        }

        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }

        let claim = buf.len().min(MAX_PLAINTEXT_RECORD);

        let mut length_bytes = [0u8; 2];
        #[allow(clippy::cast_possible_truncation)]
        LittleEndian::write_u16(&mut length_bytes, claim as u16);

        let mut nonce_bytes = [0u8; 12];
        LittleEndian::write_u64(&mut nonce_bytes[4..], this.send_count);
        let nonce = Nonce::from_slice(&nonce_bytes);

        this.outbox.clear();
        this.outbox.extend_from_slice(&length_bytes);
        this.outbox.extend_from_slice(&buf[..claim]);

        let tag = this
            .seal_cipher
            .encrypt_in_place_detached(nonce, &length_bytes, &mut this.outbox[2..])
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "record seal failed"))?;
        this.outbox.extend_from_slice(tag.as_slice());

        this.send_count += 1;
        this.outbox_claim = claim;

        ready!(this.poll_flush_outbox(cx))?;
        let claimed = this.outbox_claim;
        this.outbox_claim = 0;
        Poll::Ready(Ok(claimed))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        // Note: a pending record's claim is left in place so the next
        // poll_write reports it.
        if this.outbox_pos < this.outbox.len() {
            ready!(this.poll_flush_outbox(cx))?;
        }
        Pin::new(&mut this.inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.outbox_pos < this.outbox.len() {
            ready!(this.poll_flush_outbox(cx))?;
        }
        Pin::new(&mut this.inner).poll_shutdown(cx)
    }
}
