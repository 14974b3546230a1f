//! Per-file AES-128-CTR decryption.
//!
//! Every audio file is encrypted with its own 16-byte key under a fixed IV,
//! using a 128-bit big-endian block counter. Seeking never decrypts the
//! skipped range: the counter for block `offset / 16` is computed directly
//! and only the `offset % 16` leading keystream bytes of that block are
//! discarded through a scratch decrypt.

use crate::FILE_KEY_SIZE;
use aes::Aes128;
use ctr::Ctr128BE;
use ctr::cipher::{KeyIvInit, StreamCipher};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Fixed IV used for all audio files.
pub const AUDIO_IV: [u8; 16] = [
    0x72, 0xe0, 0x67, 0xfb, 0xdd, 0xcb, 0xcf, 0x77, 0xeb, 0xe8, 0xbc, 0x64, 0x3f, 0x63, 0x0d, 0x93,
];

/// AES block size.
pub const BLOCK_SIZE: usize = 16;

/// Seekable CTR-mode decryptor for one file.
#[derive(ZeroizeOnDrop)]
pub struct FileCipher {
    key: [u8; FILE_KEY_SIZE],
    #[zeroize(skip)]
    cipher: Ctr128BE<Aes128>,
    #[zeroize(skip)]
    position: u64,
}

impl FileCipher {
    /// Create a decryptor positioned at the start of the file.
    #[must_use]
    pub fn new(key: [u8; FILE_KEY_SIZE]) -> Self {
        Self {
            cipher: Self::cipher_at_block(&key, 0),
            key,
            position: 0,
        }
    }

    fn cipher_at_block(key: &[u8; FILE_KEY_SIZE], block: u64) -> Ctr128BE<Aes128> {
        let counter = u128::from_be_bytes(AUDIO_IV).wrapping_add(u128::from(block));
        Ctr128BE::<Aes128>::new(&(*key).into(), &counter.to_be_bytes().into())
    }

    /// Reposition the keystream at byte `offset` of the file.
    pub fn seek(&mut self, offset: u64) {
        self.cipher = Self::cipher_at_block(&self.key, offset / BLOCK_SIZE as u64);

        let remainder = (offset % BLOCK_SIZE as u64) as usize;
        if remainder != 0 {
            let mut scratch = [0u8; BLOCK_SIZE];
            self.cipher.apply_keystream(&mut scratch[..remainder]);
            scratch.zeroize();
        }
        self.position = offset;
    }

    /// Decrypt in place at the current position.
    pub fn decrypt(&mut self, buf: &mut [u8]) {
        self.cipher.apply_keystream(buf);
        self.position += buf.len() as u64;
    }

    /// Current byte offset into the file.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctr::cipher::StreamCipherSeek;

    const KEY: [u8; 16] = [
        0x0f, 0x1e, 0x2d, 0x3c, 0x4b, 0x5a, 0x69, 0x78, 0x87, 0x96, 0xa5, 0xb4, 0xc3, 0xd2, 0xe1,
        0xf0,
    ];

    fn ciphertext(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    #[test]
    fn test_sequential_matches_one_shot() {
        let data = ciphertext(4096);

        let mut one_shot = data.clone();
        FileCipher::new(KEY).decrypt(&mut one_shot);

        let mut pieces = data.clone();
        let mut cipher = FileCipher::new(KEY);
        for chunk in pieces.chunks_mut(333) {
            cipher.decrypt(chunk);
        }

        assert_eq!(one_shot, pieces);
        assert_eq!(cipher.position(), 4096);
    }

    #[test]
    fn test_seek_consistency() {
        let data = ciphertext(8192);
        let mut full = data.clone();
        FileCipher::new(KEY).decrypt(&mut full);

        for offset in [0usize, 16, 160, 167, 1000, 4095, 4096, 8191] {
            let mut cipher = FileCipher::new(KEY);
            cipher.seek(offset as u64);
            let mut tail = data[offset..].to_vec();
            cipher.decrypt(&mut tail);
            assert_eq!(tail, full[offset..], "mismatch at offset {offset}");
        }
    }

    #[test]
    fn test_seek_backwards() {
        let data = ciphertext(2048);
        let mut full = data.clone();
        FileCipher::new(KEY).decrypt(&mut full);

        let mut cipher = FileCipher::new(KEY);
        let mut scratch = data[..1500].to_vec();
        cipher.decrypt(&mut scratch);

        cipher.seek(37);
        let mut tail = data[37..].to_vec();
        cipher.decrypt(&mut tail);
        assert_eq!(tail, full[37..]);
    }

    #[test]
    fn test_agrees_with_library_seek() {
        let data = ciphertext(1024);
        let mut reference = Ctr128BE::<Aes128>::new(&KEY.into(), &AUDIO_IV.into());
        reference.seek(519u64);
        let mut expected = data[519..].to_vec();
        reference.apply_keystream(&mut expected);

        let mut cipher = FileCipher::new(KEY);
        cipher.seek(519);
        let mut actual = data[519..].to_vec();
        cipher.decrypt(&mut actual);

        assert_eq!(actual, expected);
    }
}
