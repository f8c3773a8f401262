use cipher::{
    generic_array::GenericArray, BlockDecryptMut, BlockEncryptMut, KeyIvInit, StreamCipher,
};
use ssh_packet::arch::NameList;
use strum::{AsRefStr, EnumString};

use crate::{
    side::{client::Client, server::Server},
    trans::KexInit,
    CryptoStatus, Error, Result,
};

use super::Negociate;

impl Negociate<Client> for Cipher {
    const WHAT: &'static str = "encryption";

    fn field<'f>(kex: &'f KexInit) -> &'f NameList<'f> {
        &kex.encryption_algorithms_client_to_server
    }
}

impl Negociate<Server> for Cipher {
    const WHAT: &'static str = "encryption";

    fn field<'f>(kex: &'f KexInit) -> &'f NameList<'f> {
        &kex.encryption_algorithms_server_to_client
    }
}

/// SSH cipher algorithms.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, EnumString, AsRefStr)]
pub enum Cipher {
    /// AES-256 in counter (CTR) mode.
    #[strum(serialize = "aes256-ctr")]
    Aes256Ctr,

    /// AES-192 in counter (CTR) mode.
    #[strum(serialize = "aes192-ctr")]
    Aes192Ctr,

    /// AES-128 in counter (CTR) mode.
    #[strum(serialize = "aes128-ctr")]
    Aes128Ctr,

    /// AES-256 in cipher block chaining (CBC) mode.
    #[strum(serialize = "aes256-cbc")]
    Aes256Cbc,

    /// AES-192 in cipher block chaining (CBC) mode.
    #[strum(serialize = "aes192-cbc")]
    Aes192Cbc,

    /// AES-128 in cipher block chaining (CBC) mode.
    #[strum(serialize = "aes128-cbc")]
    Aes128Cbc,

    /// TripleDES in cipher block chaining (CBC) mode.
    #[strum(serialize = "3des-cbc")]
    TDesCbc,

    /// No cipher algorithm.
    #[default]
    #[strum(serialize = "none")]
    None,
}

impl Cipher {
    /// The block size of the cipher, `8` being the minimal alignment of the packets.
    pub fn block_size(&self) -> usize {
        match self {
            Self::None | Self::TDesCbc => 8,
            Self::Aes128Cbc
            | Self::Aes192Cbc
            | Self::Aes256Cbc
            | Self::Aes128Ctr
            | Self::Aes192Ctr
            | Self::Aes256Ctr => 16,
        }
    }

    /// The size of the key of the cipher.
    pub fn key_size(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Aes128Cbc | Self::Aes128Ctr => 16,
            Self::TDesCbc | Self::Aes192Cbc | Self::Aes192Ctr => 24,
            Self::Aes256Cbc | Self::Aes256Ctr => 32,
        }
    }

    /// The size of the initialization vector of the cipher.
    pub fn iv_size(&self) -> usize {
        match self {
            Self::None => 0,
            Self::TDesCbc => 8,
            Self::Aes128Cbc
            | Self::Aes192Cbc
            | Self::Aes256Cbc
            | Self::Aes128Ctr
            | Self::Aes192Ctr
            | Self::Aes256Ctr => 16,
        }
    }

    /// Instantiate the sealing state of the cipher from its key and IV.
    pub(crate) fn encryptor(&self, key: &[u8], iv: &[u8]) -> Result<Option<CipherState>> {
        Ok(Some(match self {
            Self::Aes256Ctr => CipherState::Aes256Ctr(init(key, iv)?),
            Self::Aes192Ctr => CipherState::Aes192Ctr(init(key, iv)?),
            Self::Aes128Ctr => CipherState::Aes128Ctr(init(key, iv)?),
            Self::Aes256Cbc => CipherState::Aes256CbcEnc(init(key, iv)?),
            Self::Aes192Cbc => CipherState::Aes192CbcEnc(init(key, iv)?),
            Self::Aes128Cbc => CipherState::Aes128CbcEnc(init(key, iv)?),
            Self::TDesCbc => CipherState::TDesCbcEnc(init(key, iv)?),
            Self::None => return Ok(None),
        }))
    }

    /// Instantiate the opening state of the cipher from its key and IV.
    pub(crate) fn decryptor(&self, key: &[u8], iv: &[u8]) -> Result<Option<CipherState>> {
        Ok(Some(match self {
            // In CTR mode, encryption and decryption are the same
            Self::Aes256Ctr | Self::Aes192Ctr | Self::Aes128Ctr => {
                return self.encryptor(key, iv)
            }
            Self::Aes256Cbc => CipherState::Aes256CbcDec(init(key, iv)?),
            Self::Aes192Cbc => CipherState::Aes192CbcDec(init(key, iv)?),
            Self::Aes128Cbc => CipherState::Aes128CbcDec(init(key, iv)?),
            Self::TDesCbc => CipherState::TDesCbcDec(init(key, iv)?),
            Self::None => return Ok(None),
        }))
    }
}

fn init<C: KeyIvInit>(key: &[u8], iv: &[u8]) -> Result<Box<C>> {
    C::new_from_slices(key, iv)
        .map(Box::new)
        .map_err(|_| Error::Crypto(CryptoStatus::WrongKey))
}

/// The running state of a cipher, in one direction.
pub(crate) enum CipherState {
    Aes256Ctr(Box<ctr::Ctr128BE<aes::Aes256>>),
    Aes192Ctr(Box<ctr::Ctr128BE<aes::Aes192>>),
    Aes128Ctr(Box<ctr::Ctr128BE<aes::Aes128>>),
    Aes256CbcEnc(Box<cbc::Encryptor<aes::Aes256>>),
    Aes192CbcEnc(Box<cbc::Encryptor<aes::Aes192>>),
    Aes128CbcEnc(Box<cbc::Encryptor<aes::Aes128>>),
    TDesCbcEnc(Box<cbc::Encryptor<des::TdesEde3>>),
    Aes256CbcDec(Box<cbc::Decryptor<aes::Aes256>>),
    Aes192CbcDec(Box<cbc::Decryptor<aes::Aes192>>),
    Aes128CbcDec(Box<cbc::Decryptor<aes::Aes128>>),
    TDesCbcDec(Box<cbc::Decryptor<des::TdesEde3>>),
}

impl CipherState {
    /// Apply the cipher in-place on `buffer`, which must be block-aligned for CBC modes.
    pub(crate) fn apply(&mut self, buffer: &mut [u8]) -> Result<()> {
        fn ctr<C: StreamCipher>(cipher: &mut C, buffer: &mut [u8]) -> Result<()> {
            cipher
                .try_apply_keystream(buffer)
                .map_err(|_| Error::Crypto(CryptoStatus::Overflow))
        }

        fn encrypt<C: BlockEncryptMut>(cipher: &mut C, buffer: &mut [u8]) -> Result<()> {
            let size = C::block_size();
            if buffer.len() % size != 0 {
                return Err(Error::Crypto(CryptoStatus::BadData));
            }

            for block in buffer.chunks_exact_mut(size) {
                cipher.encrypt_block_mut(GenericArray::from_mut_slice(block));
            }

            Ok(())
        }

        fn decrypt<C: BlockDecryptMut>(cipher: &mut C, buffer: &mut [u8]) -> Result<()> {
            let size = C::block_size();
            if buffer.len() % size != 0 {
                return Err(Error::Crypto(CryptoStatus::BadData));
            }

            for block in buffer.chunks_exact_mut(size) {
                cipher.decrypt_block_mut(GenericArray::from_mut_slice(block));
            }

            Ok(())
        }

        match self {
            Self::Aes256Ctr(state) => ctr(state.as_mut(), buffer),
            Self::Aes192Ctr(state) => ctr(state.as_mut(), buffer),
            Self::Aes128Ctr(state) => ctr(state.as_mut(), buffer),
            Self::Aes256CbcEnc(state) => encrypt(state.as_mut(), buffer),
            Self::Aes192CbcEnc(state) => encrypt(state.as_mut(), buffer),
            Self::Aes128CbcEnc(state) => encrypt(state.as_mut(), buffer),
            Self::TDesCbcEnc(state) => encrypt(state.as_mut(), buffer),
            Self::Aes256CbcDec(state) => decrypt(state.as_mut(), buffer),
            Self::Aes192CbcDec(state) => decrypt(state.as_mut(), buffer),
            Self::Aes128CbcDec(state) => decrypt(state.as_mut(), buffer),
            Self::TDesCbcDec(state) => decrypt(state.as_mut(), buffer),
        }
    }
}

impl std::fmt::Debug for CipherState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CipherState(..)")
    }
}
