use rand::RngCore;
use secrecy::ExposeSecret;

use crate::{
    algorithm::{Cipher, CipherState, Compress, Hmac},
    Result,
};

use super::Keys;

/// The minimal alignment of the records, whatever the cipher.
const MIN_ALIGN: usize = 8;

/// The minimal size of a whole record, excluding the MAC.
const MIN_RECORD_SIZE: usize = 16;

/// The minimal padding length.
const MIN_PADDING: usize = 4;

/// The boundary the user-authentication records are padded to.
const QUANTUM: usize = 256;

/// Both directions of the transport.
#[derive(Debug, Default)]
pub struct TransportPair {
    /// The opening transport, for received packets.
    pub rx: Transport,

    /// The sealing transport, for sent packets.
    pub tx: Transport,
}

/// One direction of the transport, its algorithms and keys.
#[derive(Debug, Default)]
pub struct Transport {
    pub(crate) chain: Keys,
    pub(crate) state: Option<CipherState>,

    /// The cipher algorithm.
    pub cipher: Cipher,

    /// The MAC algorithm.
    pub hmac: Hmac,

    /// The compression algorithm.
    pub compress: Compress,
}

impl Transport {
    /// The alignment of the records.
    pub fn block_size(&self) -> usize {
        self.cipher.block_size().max(MIN_ALIGN)
    }

    /// Whether a cipher has been keyed for this direction.
    pub fn is_encrypted(&self) -> bool {
        self.state.is_some()
    }

    /// Compute the padding length for a payload of `len` bytes.
    ///
    /// When `quantise` is set, the encrypted span is padded up to the next
    /// multiple of 256 bytes, unless it would need more than 255 bytes of padding.
    pub fn padding(&self, len: usize, quantise: bool) -> u8 {
        let block = self.block_size();

        // The length field stays in clear in EtM mode, excluded from the alignment.
        let fixed = if self.hmac.etm() { 1 + len } else { 4 + 1 + len };
        let lenfield = if self.hmac.etm() { 4 } else { 0 };

        let mut padding = block - fixed % block;
        if padding < MIN_PADDING {
            padding += block;
        }
        while lenfield + fixed + padding < MIN_RECORD_SIZE {
            padding += block;
        }

        if quantise {
            let span = fixed + padding;
            let quantised = padding + (span.next_multiple_of(QUANTUM) - span);

            if quantised <= u8::MAX as usize {
                padding = quantised;
            }
        }

        // The minimal padding is below 2 blocks, which always fit in a byte.
        padding as u8
    }

    /// Frame, pad, MAC and encrypt the `payload` into a record.
    pub fn seal(&mut self, payload: &[u8], seq: u32, quantise: bool) -> Result<Vec<u8>> {
        let padding = self.padding(payload.len(), quantise);
        let length = 1 + payload.len() + padding as usize;

        let mut buf = Vec::with_capacity(4 + length + self.hmac.size());
        buf.extend_from_slice(&(length as u32).to_be_bytes());
        buf.push(padding);
        buf.extend_from_slice(payload);

        let offset = buf.len();
        buf.resize(offset + padding as usize, 0);
        if self.is_encrypted() {
            rand::thread_rng().fill_bytes(&mut buf[offset..]);
        }

        let mac = if self.hmac.etm() {
            self.apply(&mut buf[4..])?;

            self.hmac.sign(seq, &buf, self.chain.hmac.expose_secret())?
        } else {
            let mac = self.hmac.sign(seq, &buf, self.chain.hmac.expose_secret())?;
            self.apply(&mut buf)?;

            mac
        };
        buf.extend_from_slice(&mac);

        Ok(buf)
    }

    /// Apply the cipher in-place, if any.
    pub(crate) fn apply(&mut self, buf: &mut [u8]) -> Result<()> {
        match &mut self.state {
            Some(state) => state.apply(buf),
            None => Ok(()),
        }
    }

    /// Verify the MAC of the record parts, in constant time.
    pub(crate) fn verify(&self, seq: u32, parts: &[&[u8]], mac: &[u8]) -> bool {
        self.hmac
            .verify(seq, parts, self.chain.hmac.expose_secret(), mac)
    }
}
