//! Shannon stream cipher and the packet cipher built on it.
//!
//! Shannon is a word-oriented stream cipher with an integrated MAC: the same
//! 16-word nonlinear feedback register produces keystream and absorbs the
//! plaintext, while a parallel 16-word CRC register accumulates it. Both are
//! folded together when the MAC is finalized, so keystream generation and MAC
//! accumulation are one state machine and cannot be driven separately.
//!
//! On the wire every post-handshake packet is
//!
//! ```text
//! [u8 cmd][u16 BE payload length][payload][4-byte MAC]
//! ```
//!
//! where everything except the MAC is encrypted. Each direction keeps its own
//! key and a 32-bit packet counter used as the big-endian nonce.

use crate::{CryptoError, MAC_SIZE, SHANNON_KEY_SIZE};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Register size in words
const N: usize = 16;

/// Diffusion rounds
const FOLD: usize = N;

/// Initial value of the nonlinear constant
const INITKONST: u32 = 0x6996_c53a;

/// Register word that absorbs key and MAC input
const KEYP: usize = 13;

/// Encrypted packet header: command byte plus big-endian payload length
pub const HEADER_SIZE: usize = 3;

#[inline]
fn sbox1(mut w: u32) -> u32 {
    w ^= w.rotate_left(5) | w.rotate_left(7);
    w ^= w.rotate_left(19) | w.rotate_left(22);
    w
}

#[inline]
fn sbox2(mut w: u32) -> u32 {
    w ^= w.rotate_left(7) | w.rotate_left(22);
    w ^= w.rotate_left(5) | w.rotate_left(19);
    w
}

#[inline]
fn word_le(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Raw Shannon cipher state.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Shannon {
    r: [u32; N],
    crc: [u32; N],
    init_r: [u32; N],
    konst: u32,
    sbuf: u32,
    mbuf: u32,
    /// Bits of `sbuf` not yet consumed by a partial word
    nbuf: u32,
}

impl Shannon {
    /// Key a new cipher.
    #[must_use]
    pub fn new(key: &[u8]) -> Self {
        let mut c = Self {
            r: [0; N],
            crc: [0; N],
            init_r: [0; N],
            konst: INITKONST,
            sbuf: 0,
            mbuf: 0,
            nbuf: 0,
        };

        // Fibonacci initial register
        c.r[0] = 1;
        c.r[1] = 1;
        for i in 2..N {
            c.r[i] = c.r[i - 1].wrapping_add(c.r[i - 2]);
        }

        c.load_key(key);
        c.konst = c.r[0];
        c.init_r = c.r;
        c
    }

    /// Reset to the keyed state and load a nonce.
    pub fn nonce(&mut self, nonce: &[u8]) {
        self.r = self.init_r;
        self.konst = INITKONST;
        self.load_key(nonce);
        self.konst = self.r[0];
        self.nbuf = 0;
    }

    fn cycle(&mut self) {
        let mut t = self.r[12] ^ self.r[13] ^ self.konst;
        t = sbox1(t) ^ self.r[0].rotate_left(1);
        self.r.copy_within(1.., 0);
        self.r[N - 1] = t;
        t = sbox2(self.r[2] ^ self.r[15]);
        self.r[0] ^= t;
        self.sbuf = t ^ self.r[8] ^ self.r[12];
    }

    fn crc_func(&mut self, i: u32) {
        let t = self.crc[0] ^ self.crc[2] ^ self.crc[15] ^ i;
        self.crc.copy_within(1.., 0);
        self.crc[N - 1] = t;
    }

    fn mac_func(&mut self, i: u32) {
        self.crc_func(i);
        self.r[KEYP] ^= i;
    }

    fn diffuse(&mut self) {
        for _ in 0..FOLD {
            self.cycle();
        }
    }

    fn load_key(&mut self, key: &[u8]) {
        let mut words = key.chunks_exact(4);
        for word in &mut words {
            self.r[KEYP] ^= word_le(word);
            self.cycle();
        }

        let rest = words.remainder();
        if !rest.is_empty() {
            let mut extra = [0u8; 4];
            extra[..rest.len()].copy_from_slice(rest);
            self.r[KEYP] ^= u32::from_le_bytes(extra);
            self.cycle();
        }

        self.r[KEYP] ^= key.len() as u32;
        self.cycle();

        // CRC register doubles as scratch; xoring the copy back makes
        // key loading irreversible
        self.crc = self.r;
        self.diffuse();
        for i in 0..N {
            self.r[i] ^= self.crc[i];
        }
    }

    /// Encrypt in place, absorbing the plaintext into the MAC.
    pub fn encrypt(&mut self, buf: &mut [u8]) {
        self.process(buf, true);
    }

    /// Decrypt in place, absorbing the recovered plaintext into the MAC.
    pub fn decrypt(&mut self, buf: &mut [u8]) {
        self.process(buf, false);
    }

    fn process(&mut self, buf: &mut [u8], encrypting: bool) {
        let len = buf.len();
        let mut i = 0;

        if self.nbuf != 0 {
            i = self.process_partial(buf, encrypting);
            if self.nbuf != 0 {
                return;
            }
            // register already cycled for this word
            self.mac_func(self.mbuf);
        }

        let whole_end = i + ((len - i) & !0x03);
        while i < whole_end {
            self.cycle();
            let word = word_le(&buf[i..]);
            let out = if encrypting {
                self.mac_func(word);
                word ^ self.sbuf
            } else {
                let plain = word ^ self.sbuf;
                self.mac_func(plain);
                plain
            };
            buf[i..i + 4].copy_from_slice(&out.to_le_bytes());
            i += 4;
        }

        if i < len {
            self.cycle();
            self.mbuf = 0;
            self.nbuf = 32;
            self.process_partial(&mut buf[i..], encrypting);
        }
    }

    /// Consume bytes of a partially used keystream word. Returns bytes consumed.
    fn process_partial(&mut self, buf: &mut [u8], encrypting: bool) -> usize {
        let mut i = 0;
        while self.nbuf != 0 && i < buf.len() {
            let shift = 32 - self.nbuf;
            if encrypting {
                self.mbuf ^= u32::from(buf[i]) << shift;
                buf[i] ^= (self.sbuf >> shift) as u8;
            } else {
                buf[i] ^= (self.sbuf >> shift) as u8;
                self.mbuf ^= u32::from(buf[i]) << shift;
            }
            i += 1;
            self.nbuf -= 8;
        }
        i
    }

    /// Finalize the MAC into `mac`. The cipher must be re-nonced afterwards.
    pub fn finish(&mut self, mac: &mut [u8]) {
        if self.nbuf != 0 {
            self.mac_func(self.mbuf);
        }

        // Perturb only the stream register to mark end of input
        self.cycle();
        self.r[KEYP] ^= INITKONST ^ (self.nbuf << 3);
        self.nbuf = 0;

        for i in 0..N {
            self.r[i] ^= self.crc[i];
        }
        self.diffuse();

        for chunk in mac.chunks_mut(4) {
            self.cycle();
            let word = self.sbuf.to_le_bytes();
            chunk.copy_from_slice(&word[..chunk.len()]);
        }
    }
}

/// Outbound half of the transport: seals packets under the send key.
#[derive(ZeroizeOnDrop)]
pub struct ShannonSend {
    cipher: Shannon,
    #[zeroize(skip)]
    nonce: u32,
}

impl ShannonSend {
    /// Create a sealer from the derived send key.
    #[must_use]
    pub fn new(key: &[u8; SHANNON_KEY_SIZE]) -> Self {
        Self {
            cipher: Shannon::new(key),
            nonce: 0,
        }
    }

    /// Encrypt one packet and append its MAC.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::PayloadTooLarge`] if the payload length does not
    /// fit the 16-bit length field.
    pub fn seal(&mut self, cmd: u8, payload: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let len = u16::try_from(payload.len())
            .map_err(|_| CryptoError::PayloadTooLarge(payload.len()))?;

        let mut packet = Vec::with_capacity(HEADER_SIZE + payload.len() + MAC_SIZE);
        packet.push(cmd);
        packet.extend_from_slice(&len.to_be_bytes());
        packet.extend_from_slice(payload);

        self.cipher.nonce(&self.nonce.to_be_bytes());
        self.cipher.encrypt(&mut packet);

        let mut mac = [0u8; MAC_SIZE];
        self.cipher.finish(&mut mac);
        packet.extend_from_slice(&mac);

        self.nonce = self.nonce.wrapping_add(1);
        Ok(packet)
    }

    /// Packets sealed so far.
    #[must_use]
    pub fn nonce(&self) -> u32 {
        self.nonce
    }
}

/// A packet recovered by [`ShannonRecv::open`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedPacket {
    /// Command byte
    pub cmd: u8,
    /// Decrypted payload
    pub payload: Vec<u8>,
    /// Bytes of the input buffer this packet occupied
    pub consumed: usize,
}

/// Inbound half of the transport: opens packets from an accumulating buffer.
#[derive(ZeroizeOnDrop)]
pub struct ShannonRecv {
    cipher: Shannon,
    #[zeroize(skip)]
    nonce: u32,
    /// Header of the packet in progress, decrypted once per packet
    #[zeroize(skip)]
    header: Option<(u8, u16)>,
}

impl ShannonRecv {
    /// Create an opener from the derived receive key.
    #[must_use]
    pub fn new(key: &[u8; SHANNON_KEY_SIZE]) -> Self {
        Self {
            cipher: Shannon::new(key),
            nonce: 0,
            header: None,
        }
    }

    /// Try to open the packet at the start of `buf`.
    ///
    /// Returns `Ok(None)` while fewer bytes than a full packet are buffered.
    /// The header is decrypted only once per packet and cached, so `buf` may
    /// grow between calls but its already-seen prefix must not change.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::MacMismatch`] if the packet fails authentication.
    /// The nonce is not advanced in that case.
    pub fn open(&mut self, buf: &[u8]) -> Result<Option<OpenedPacket>, CryptoError> {
        let (cmd, len) = match self.header {
            Some(header) => header,
            None => {
                if buf.len() < HEADER_SIZE {
                    return Ok(None);
                }
                let mut header = [0u8; HEADER_SIZE];
                header.copy_from_slice(&buf[..HEADER_SIZE]);
                self.cipher.nonce(&self.nonce.to_be_bytes());
                self.cipher.decrypt(&mut header);
                let parsed = (header[0], u16::from_be_bytes([header[1], header[2]]));
                self.header = Some(parsed);
                parsed
            }
        };

        let payload_end = HEADER_SIZE + usize::from(len);
        let total = payload_end + MAC_SIZE;
        if buf.len() < total {
            return Ok(None);
        }

        let mut payload = buf[HEADER_SIZE..payload_end].to_vec();
        self.cipher.decrypt(&mut payload);

        let mut expected = [0u8; MAC_SIZE];
        self.cipher.finish(&mut expected);

        if !bool::from(expected[..].ct_eq(&buf[payload_end..total])) {
            return Err(CryptoError::MacMismatch);
        }

        self.header = None;
        self.nonce = self.nonce.wrapping_add(1);
        Ok(Some(OpenedPacket {
            cmd,
            payload,
            consumed: total,
        }))
    }

    /// Packets opened so far.
    #[must_use]
    pub fn nonce(&self) -> u32 {
        self.nonce
    }
}
