//! Primitives to frame, seal and open the binary packets
//! exchanged over an [`AsyncBufRead`](futures::AsyncBufRead) + [`AsyncWrite`](futures::AsyncWrite) pipe.

use std::{collections::VecDeque, io};

use futures::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt};
use futures_time::{future::FutureExt, time::Duration};

use ssh_packet::userauth::Banner;

use crate::{
    trans::{self, Disconnect, Unimplemented},
    Encode, Error, MessageType, Packet, Pipe, Result, Role, Stage,
};

mod counter;
use counter::IoCounter;

mod transport;
pub use transport::{Transport, TransportPair};

mod keys;
pub use keys::Keys;

/// Re-key after 1GiB of exchanged data as recommended per the RFC.
const REKEY_BYTES_THRESHOLD: usize = 0x40000000;

/// The maximum size of a received record, excluding the length field and the MAC.
pub const MAX_PACKET_SIZE: usize = 256 * 1024;

/// The minimal length field of a valid record.
const MIN_PACKET_LENGTH: u32 = 12;

/// The maximum consecutive no-op messages tolerated before the session is established.
pub const MAX_NOOPS: usize = 5;

/// The maximum size of a raw-text diagnostic kept from the peer.
const MAX_DIAGNOSTIC_SIZE: usize = 256;

/// The maximum count of packets held back while waiting for the peer's `SSH_MSG_KEXINIT`.
pub const MAX_DEFERRED: usize = 1024;

/// A wrapper around [`AsyncBufRead`](futures::AsyncBufRead) + [`AsyncWrite`](futures::AsyncWrite)
/// to interface with to the SSH binary protocol.
pub struct Stream<S> {
    inner: IoCounter<S>,
    timeout: Duration,

    /// The role of the peer, for diagnostics.
    peer: Role,

    /// The pair of transport algorithms and keys computed from the key exchange.
    transport: TransportPair,

    /// The session identifier derived from the first key exchange.
    session: Option<Vec<u8>>,

    /// Sequence number for the `tx` side.
    txseq: u32,

    /// Sequence number for the `rx` side.
    rxseq: u32,

    /// Sealed records awaiting a flush.
    outbound: Vec<u8>,

    stage: Stage,

    /// Consecutive no-op messages received before establishment.
    noops: usize,

    /// Packets received during a re-key, before the peer's `SSH_MSG_KEXINIT`.
    deferred: VecDeque<Packet>,
}

impl<S: Pipe> Stream<S> {
    pub(crate) fn new(stream: S, timeout: Duration, peer: Role) -> Self {
        Self {
            inner: IoCounter::new(stream),
            timeout,
            peer,
            transport: Default::default(),
            session: None,
            txseq: 0,
            rxseq: 0,
            outbound: Vec::new(),
            stage: Stage::VersionExchange,
            noops: 0,
            deferred: VecDeque::new(),
        }
    }

    /// Access the underlying pipe.
    pub(crate) fn get_mut(&mut self) -> &mut IoCounter<S> {
        &mut self.inner
    }

    /// The session identifier, the first exchange hash.
    pub fn session_id(&self) -> Option<&[u8]> {
        self.session.as_deref()
    }

    pub(crate) fn with_session(&mut self, session: &[u8]) -> &[u8] {
        self.session.get_or_insert_with(|| session.to_vec())
    }

    pub(crate) fn with_tx(&mut self, transport: Transport) {
        tracing::debug!("Sealing with {:?}", transport);

        self.transport.tx = transport;
        self.inner.reset();
    }

    pub(crate) fn with_rx(&mut self, transport: Transport) {
        tracing::debug!("Opening with {:?}", transport);

        self.transport.rx = transport;
        self.inner.reset();
    }

    /// The current stage of the session.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub(crate) fn set_stage(&mut self, stage: Stage) {
        if self.stage != stage {
            tracing::debug!("Stage {:?} -> {:?}", self.stage, stage);

            self.stage = stage;
        }
    }

    /// The sequence numbers of the next received and sent packets.
    pub fn seqs(&self) -> (u32, u32) {
        (self.rxseq, self.txseq)
    }

    /// The role of the peer.
    pub fn peer(&self) -> Role {
        self.peer
    }

    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        timed(self.inner.read_exact(buf).timeout(self.timeout).await)
    }

    /// Wait for the start of a packet, erroring when the peer closed the pipe.
    async fn ready(&mut self) -> Result<()> {
        let timeout = self.timeout;
        let inner = &mut self.inner;

        let eof = if self.stage == Stage::Established {
            // Idle sessions are allowed to stay silent.
            inner.fill_buf().await.map(<[u8]>::is_empty)?
        } else {
            timed(
                async move { inner.fill_buf().await.map(<[u8]>::is_empty) }
                    .timeout(timeout)
                    .await,
            )?
        };

        if eof {
            Err(Error::Disconnected)
        } else {
            Ok(())
        }
    }

    /// Collect the rest of a raw-text line sent instead of a packet.
    async fn diagnostic(&mut self, mut line: Vec<u8>) -> Error {
        let mut byte = [0u8];

        while line.len() < MAX_DIAGNOSTIC_SIZE && !line.contains(&b'\n') {
            match self.read_exact(&mut byte).await {
                Ok(()) => line.push(byte[0]),
                Err(_) => break,
            }
        }

        if let Some(end) = line.iter().position(|byte| *byte == b'\n') {
            line.truncate(end);
        }

        Error::PeerDiagnostic {
            role: self.peer,
            text: String::from_utf8_lossy(&line).trim_end().to_string(),
        }
    }

    /// Read, decrypt and verify a single record.
    async fn packet(&mut self) -> Result<Packet> {
        self.ready().await?;

        let role = self.peer;
        let block = self.transport.rx.block_size();
        let etm = self.transport.rx.hmac.etm();
        let mac_size = self.transport.rx.hmac.size();

        let mut buf = vec![0u8; if etm { 4 } else { block }];
        self.read_exact(&mut buf).await?;

        if !etm {
            self.transport.rx.apply(&mut buf)?;
        }

        let length = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);

        if !self.transport.rx.is_encrypted()
            && buf[..4]
                .iter()
                .all(|byte| byte.is_ascii_graphic() || *byte == b' ')
        {
            return Err(self.diagnostic(buf).await);
        }

        let aligned = if etm {
            length as usize
        } else {
            4 + length as usize
        };
        if length < MIN_PACKET_LENGTH || aligned % block != 0 || length as usize > MAX_PACKET_SIZE {
            return Err(Error::BadLength {
                role,
                length,
                block,
                max: MAX_PACKET_SIZE,
            });
        }

        let offset = buf.len();
        buf.resize(4 + length as usize, 0);
        self.read_exact(&mut buf[offset..]).await?;

        let mut mac = vec![0u8; mac_size];
        self.read_exact(&mut mac).await?;

        let seq = self.rxseq;
        let integrity = if etm {
            // The ciphertext is authenticated before being decrypted.
            if !self.transport.rx.verify(seq, &[&buf], &mac) {
                return Err(Error::Integrity { role });
            }
            self.transport.rx.apply(&mut buf[4..])?;

            true
        } else {
            self.transport.rx.apply(&mut buf[offset..])?;

            self.transport.rx.verify(seq, &[&buf], &mac)
        };

        // Both checks are evaluated before failing, padding first.
        let padding = buf[4];
        if padding < 4 || u32::from(padding) > length - 2 {
            return Err(Error::BadPadding {
                role,
                padding,
                length,
            });
        }
        if !integrity {
            return Err(Error::Integrity { role });
        }

        self.rxseq = self.rxseq.wrapping_add(1);

        buf.truncate(4 + length as usize - padding as usize);
        buf.drain(..5);

        Ok(Packet::new(buf, seq, role))
    }

    /// Receive a _packet_ from the peer, skipping the transport-level chatter.
    pub async fn recv(&mut self) -> Result<Packet> {
        loop {
            let packet = self.packet().await?;

            tracing::trace!("<-({}) {:?}", packet.seq(), packet.kind());

            match packet.kind() {
                MessageType::DISCONNECT => {
                    let Disconnect {
                        reason,
                        description,
                        ..
                    } = packet.to()?;

                    tracing::warn!("Peer disconnected with `{reason:?}`: {}", &*description);

                    return Err(Error::PeerDisconnected {
                        reason,
                        description: description.to_string(),
                    });
                }
                MessageType::UNIMPLEMENTED => {
                    if let Ok(Unimplemented { seq }) = packet.to() {
                        tracing::warn!("Peer didn't implement our packet {seq}");
                    }
                }
                kind if kind.is_noop() => {
                    if self.stage != Stage::Established {
                        self.noops += 1;

                        if self.noops > MAX_NOOPS {
                            return Err(Error::Overflow {
                                what: "consecutive no-op messages",
                                limit: MAX_NOOPS,
                            });
                        }
                    }

                    match kind {
                        MessageType::DEBUG => {
                            if let Ok(trans::Debug { message, .. }) = packet.to() {
                                tracing::debug!("Peer debug message: {}", &*message);
                            }
                        }
                        MessageType::USERAUTH_BANNER => {
                            if let Ok(Banner { message, .. }) = packet.to() {
                                tracing::debug!("Peer banner: {}", message.trim_end());
                            }
                        }
                        _ => tracing::debug!("Skipped {kind:?} from the peer"),
                    }
                }
                _ => {
                    self.noops = 0;

                    return Ok(packet);
                }
            }
        }
    }

    /// Hold back a packet received while waiting for the peer's `SSH_MSG_KEXINIT`.
    pub(crate) fn defer(&mut self, packet: Packet) -> Result<()> {
        if self.deferred.len() >= MAX_DEFERRED {
            return Err(Error::Overflow {
                what: "packets received during the re-key",
                limit: MAX_DEFERRED,
            });
        }

        tracing::trace!("Deferring {:?} after the re-key", packet.kind());

        self.deferred.push_back(packet);

        Ok(())
    }

    /// Take back the oldest packet held during the last re-key.
    pub(crate) fn undefer(&mut self) -> Option<Packet> {
        self.deferred.pop_front()
    }

    /// Seal the `message` in the outbound buffer, to be sent on the next [`Stream::flush`].
    pub fn feed<M: Encode>(&mut self, message: &M) -> Result<()> {
        self.feed_payload(&message.to_payload()?)
    }

    /// Seal a raw payload in the outbound buffer, starting with its message number.
    pub fn feed_payload(&mut self, payload: &[u8]) -> Result<()> {
        let kind = MessageType(payload.first().copied().unwrap_or_default());
        let quantise = kind == MessageType::USERAUTH_REQUEST;

        let record = self.transport.tx.seal(payload, self.txseq, quantise)?;
        self.outbound.extend_from_slice(&record);

        tracing::trace!("({})-> {kind:?}", self.txseq);

        self.txseq = self.txseq.wrapping_add(1);

        Ok(())
    }

    /// Write the outbound buffer to the peer.
    pub async fn flush(&mut self) -> Result<()> {
        let outbound = std::mem::take(&mut self.outbound);
        let inner = &mut self.inner;

        timed(
            async move {
                inner.write_all(&outbound).await?;
                inner.flush().await
            }
            .timeout(self.timeout)
            .await,
        )
    }

    /// Send a _packet_ to the peer, by serializing and encrypting the `message`.
    pub async fn send<M: Encode>(&mut self, message: &M) -> Result<()> {
        self.feed(message)?;
        self.flush().await
    }

    /// Returns whether the stream should be re-keyed.
    pub(crate) fn is_rekeyable(&self) -> bool {
        self.inner.count() > REKEY_BYTES_THRESHOLD
    }
}

/// Flatten the result of a timed I/O operation, mapping a premature end of stream to [`Error::Timeout`].
fn timed<T>(result: io::Result<io::Result<T>>) -> Result<T> {
    match result.and_then(|result| result) {
        Ok(value) => Ok(value),
        Err(err)
            if err.kind() == io::ErrorKind::TimedOut
                || err.kind() == io::ErrorKind::UnexpectedEof =>
        {
            Err(Error::Timeout)
        }
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use futures::io::Cursor;
    use rstest::rstest;

    use super::*;
    use crate::{
        algorithm::{kex::KexMeta, Cipher, Compress, Hmac},
        trans::{Ignore, ServiceRequest},
    };

    const TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

    fn meta(cipher: Cipher, hmac: Hmac) -> (KexMeta, impl Fn() -> Keys) {
        (
            KexMeta {
                cipher,
                hmac,
                compress: Compress::None,
            },
            move || {
                Keys::as_client::<sha2::Sha256>(&[0, 0, 0, 1, 42], b"hash", b"id", &cipher, &hmac)
            },
        )
    }

    fn writer(cipher: Cipher, hmac: Hmac) -> Stream<Cursor<Vec<u8>>> {
        let (meta, keys) = meta(cipher, hmac);

        let mut stream = Stream::new(Cursor::new(Vec::new()), TIMEOUT.into(), Role::Server);
        stream.with_tx(meta.seal(keys()).expect("valid keys"));

        stream
    }

    fn reader(cipher: Cipher, hmac: Hmac, bytes: Vec<u8>) -> Stream<Cursor<Vec<u8>>> {
        let (meta, keys) = meta(cipher, hmac);

        let mut stream = Stream::new(Cursor::new(bytes), TIMEOUT.into(), Role::Client);
        stream.with_rx(meta.open(keys()).expect("valid keys"));

        stream
    }

    fn written(stream: &Stream<Cursor<Vec<u8>>>) -> Vec<u8> {
        stream.inner.get_ref().get_ref().clone()
    }

    #[rstest]
    #[case(Cipher::None, Hmac::None)]
    #[case(Cipher::Aes256Ctr, Hmac::HmacSha512ETM)]
    #[case(Cipher::Aes192Ctr, Hmac::HmacSha256)]
    #[case(Cipher::Aes128Ctr, Hmac::HmacSha1ETM)]
    #[case(Cipher::Aes256Cbc, Hmac::HmacSha512)]
    #[case(Cipher::Aes192Cbc, Hmac::HmacSha256ETM)]
    #[case(Cipher::Aes128Cbc, Hmac::HmacMd5)]
    #[case(Cipher::TDesCbc, Hmac::HmacMd5ETM)]
    #[case(Cipher::TDesCbc, Hmac::HmacSha1)]
    #[async_std::test]
    async fn loopback(#[case] cipher: Cipher, #[case] hmac: Hmac) {
        let payloads = [
            vec![MessageType::NEWKEYS.0],
            ServiceRequest {
                service_name: ssh_packet::arch::ascii!("ssh-userauth"),
            }
            .to_payload()
            .expect("serialized"),
            [vec![MessageType::USERAUTH_REQUEST.0], vec![0x55; 300]].concat(),
            [vec![MessageType::CHANNEL_DATA.0], vec![0xaa; 32768]].concat(),
        ];

        let mut tx = writer(cipher, hmac);
        for payload in &payloads {
            tx.feed_payload(payload).expect("sealed");
        }
        tx.flush().await.expect("written");

        let mut rx = reader(cipher, hmac, written(&tx));
        for payload in &payloads {
            let packet = rx.recv().await.expect("valid packet");

            assert_eq!(packet.payload(), payload.as_slice());
        }

        assert_eq!(rx.seqs().0, tx.seqs().1);
        assert!(matches!(rx.recv().await, Err(Error::Disconnected)));
    }

    #[rstest]
    #[case(Cipher::Aes128Ctr, Hmac::HmacSha256)]
    #[case(Cipher::Aes128Cbc, Hmac::HmacSha1)]
    #[case(Cipher::Aes256Ctr, Hmac::HmacSha256ETM)]
    #[async_std::test]
    async fn flipped_bytes(#[case] cipher: Cipher, #[case] hmac: Hmac) {
        let mut tx = writer(cipher, hmac);
        tx.send(&Ignore {
            data: b"some data to be protected".as_slice().into(),
        })
        .await
        .expect("written");
        let record = written(&tx);

        for index in 0..record.len() {
            let mut tampered = record.clone();
            tampered[index] ^= 0x01;

            let result = reader(cipher, hmac, tampered).recv().await;
            assert!(result.is_err(), "flipped byte {index} went unnoticed");

            if index >= cipher.block_size() {
                assert!(
                    matches!(result, Err(Error::Integrity { .. })),
                    "flipped byte {index} gave {result:?}"
                );
            }
        }
    }

    #[async_std::test]
    async fn padding_before_integrity() {
        let mut tx = writer(Cipher::Aes128Ctr, Hmac::HmacSha256);
        tx.send(&Ignore {
            data: b"".as_slice().into(),
        })
        .await
        .expect("written");

        // CTR is malleable, so this pushes the padding length past the record.
        let mut tampered = written(&tx);
        tampered[4] ^= 0xf0;

        assert!(matches!(
            reader(Cipher::Aes128Ctr, Hmac::HmacSha256, tampered)
                .recv()
                .await,
            Err(Error::BadPadding { .. })
        ));
    }

    #[async_std::test]
    async fn cleartext_bad_padding() {
        let record = vec![0, 0, 0, 12, 2, MessageType::IGNORE.0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];

        assert!(matches!(
            reader(Cipher::None, Hmac::None, record).recv().await,
            Err(Error::BadPadding {
                padding: 2,
                length: 12,
                ..
            })
        ));
    }

    #[rstest]
    #[case(vec![0, 0, 0, 4, 4, 0, 0, 0])]
    #[case(vec![0, 0, 0, 13, 4, 0, 0, 0])]
    #[case(vec![0, 0x10, 0, 4, 4, 0, 0, 0])]
    #[async_std::test]
    async fn bad_lengths(#[case] record: Vec<u8>) {
        assert!(matches!(
            reader(Cipher::None, Hmac::None, record).recv().await,
            Err(Error::BadLength { block: 8, .. })
        ));
    }

    #[async_std::test]
    async fn truncated_record() {
        let mut tx = writer(Cipher::None, Hmac::None);
        tx.send(&Ignore {
            data: vec![0; 64].into(),
        })
        .await
        .expect("written");

        let mut record = written(&tx);
        record.truncate(record.len() - 1);

        assert!(matches!(
            reader(Cipher::None, Hmac::None, record).recv().await,
            Err(Error::Timeout)
        ));
    }

    #[async_std::test]
    async fn raw_text_diagnostic() {
        let text = b"Too many authentication failures\r\nanything".to_vec();

        match reader(Cipher::None, Hmac::None, text).recv().await {
            Err(Error::PeerDiagnostic { role, text }) => {
                assert_eq!(role, Role::Client);
                assert_eq!(text, "Too many authentication failures");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[rstest]
    #[case(Stage::KeyExchange, 5, true)]
    #[case(Stage::KeyExchange, 6, false)]
    #[case(Stage::Established, 64, true)]
    #[async_std::test]
    async fn noop_tolerance(#[case] stage: Stage, #[case] count: usize, #[case] ok: bool) {
        let mut tx = writer(Cipher::Aes128Ctr, Hmac::HmacSha256ETM);
        for _ in 0..count {
            tx.feed(&Ignore {
                data: b"noise".as_slice().into(),
            })
            .expect("sealed");
        }
        tx.feed(&crate::trans::NewKeys).expect("sealed");
        tx.flush().await.expect("written");

        let mut rx = reader(Cipher::Aes128Ctr, Hmac::HmacSha256ETM, written(&tx));
        rx.set_stage(stage);

        match rx.recv().await {
            Ok(packet) => {
                assert!(ok);
                assert_eq!(packet.kind(), MessageType::NEWKEYS);
            }
            Err(err) => {
                assert!(!ok);
                assert!(matches!(err, Error::Overflow { limit: 5, .. }));
            }
        }
    }

    #[async_std::test]
    async fn peer_disconnect() {
        let mut tx = writer(Cipher::None, Hmac::None);
        tx.send(&Disconnect {
            reason: crate::trans::DisconnectReason::ByApplication,
            description: "bye".into(),
            language: Default::default(),
        })
        .await
        .expect("written");

        assert!(matches!(
            reader(Cipher::None, Hmac::None, written(&tx)).recv().await,
            Err(Error::PeerDisconnected { description, .. }) if description == "bye"
        ));
    }
}
