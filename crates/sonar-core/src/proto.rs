//! Protobuf messages exchanged with the access point.
//!
//! Only the fields this client reads or writes are declared; unknown fields
//! are skipped on decode. Field numbers follow the server's proto2 schema.

#![allow(missing_docs)]

use prost::Message;

// ============================================================================
// Handshake
// ============================================================================

/// Product identifier sent in `BuildInfo`
pub const PRODUCT_CLIENT: i32 = 0;
/// No product flags
pub const PRODUCT_FLAG_NONE: i32 = 0;
/// `PLATFORM_LINUX_X86_64`
pub const PLATFORM_LINUX_X86_64: i32 = 8;
/// Build version advertised to the server
pub const BUILD_VERSION: u64 = 0x0108_0000_0000;
/// `CRYPTO_SUITE_SHANNON`
pub const CRYPTO_SUITE_SHANNON: i32 = 0;
/// `POW_HASH_CASH`
pub const POW_HASH_CASH: i32 = 0;

#[derive(Clone, PartialEq, Message)]
pub struct BuildInfo {
    #[prost(int32, required, tag = "10")]
    pub product: i32,
    #[prost(int32, repeated, packed = "false", tag = "20")]
    pub product_flags: Vec<i32>,
    #[prost(int32, required, tag = "30")]
    pub platform: i32,
    #[prost(uint64, required, tag = "40")]
    pub version: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct LoginCryptoDiffieHellmanHello {
    #[prost(bytes = "vec", required, tag = "10")]
    pub gc: Vec<u8>,
    #[prost(uint32, required, tag = "20")]
    pub server_keys_known: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct LoginCryptoHelloUnion {
    #[prost(message, optional, tag = "10")]
    pub diffie_hellman: Option<LoginCryptoDiffieHellmanHello>,
}

#[derive(Clone, PartialEq, Message)]
pub struct FeatureSet {
    #[prost(bool, optional, tag = "1")]
    pub autoupdate2: Option<bool>,
    #[prost(bool, optional, tag = "2")]
    pub current_location: Option<bool>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ClientHello {
    #[prost(message, optional, tag = "10")]
    pub build_info: Option<BuildInfo>,
    #[prost(int32, repeated, packed = "false", tag = "20")]
    pub fingerprints_supported: Vec<i32>,
    #[prost(int32, repeated, packed = "false", tag = "30")]
    pub cryptosuites_supported: Vec<i32>,
    #[prost(int32, repeated, packed = "false", tag = "40")]
    pub powschemes_supported: Vec<i32>,
    #[prost(message, optional, tag = "50")]
    pub login_crypto_hello: Option<LoginCryptoHelloUnion>,
    #[prost(bytes = "vec", required, tag = "60")]
    pub client_nonce: Vec<u8>,
    #[prost(bytes = "vec", optional, tag = "70")]
    pub padding: Option<Vec<u8>>,
    #[prost(message, optional, tag = "80")]
    pub feature_set: Option<FeatureSet>,
}

#[derive(Clone, PartialEq, Message)]
pub struct LoginCryptoDiffieHellmanChallenge {
    #[prost(bytes = "vec", required, tag = "10")]
    pub gs: Vec<u8>,
    #[prost(int32, optional, tag = "20")]
    pub server_signature_key: Option<i32>,
    #[prost(bytes = "vec", optional, tag = "30")]
    pub gs_signature: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, Message)]
pub struct LoginCryptoChallengeUnion {
    #[prost(message, optional, tag = "10")]
    pub diffie_hellman: Option<LoginCryptoDiffieHellmanChallenge>,
}

#[derive(Clone, PartialEq, Message)]
pub struct PoWHashCashChallenge {
    #[prost(bytes = "vec", optional, tag = "10")]
    pub prefix: Option<Vec<u8>>,
    #[prost(int32, optional, tag = "20")]
    pub length: Option<i32>,
    #[prost(int32, optional, tag = "30")]
    pub target: Option<i32>,
}

#[derive(Clone, PartialEq, Message)]
pub struct PoWChallengeUnion {
    #[prost(message, optional, tag = "10")]
    pub hash_cash: Option<PoWHashCashChallenge>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ApChallenge {
    #[prost(message, optional, tag = "10")]
    pub login_crypto_challenge: Option<LoginCryptoChallengeUnion>,
    #[prost(message, optional, tag = "30")]
    pub pow_challenge: Option<PoWChallengeUnion>,
    #[prost(bytes = "vec", optional, tag = "50")]
    pub server_nonce: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "60")]
    pub padding: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ApLoginFailed {
    #[prost(int32, required, tag = "10")]
    pub error_code: i32,
    #[prost(int32, optional, tag = "20")]
    pub retry_delay: Option<i32>,
    #[prost(int32, optional, tag = "30")]
    pub expiry: Option<i32>,
    #[prost(string, optional, tag = "40")]
    pub error_description: Option<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ApResponseMessage {
    #[prost(message, optional, tag = "10")]
    pub challenge: Option<ApChallenge>,
    #[prost(message, optional, tag = "30")]
    pub login_failed: Option<ApLoginFailed>,
}

#[derive(Clone, PartialEq, Message)]
pub struct LoginCryptoDiffieHellmanResponse {
    #[prost(bytes = "vec", required, tag = "10")]
    pub hmac: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct LoginCryptoResponseUnion {
    #[prost(message, optional, tag = "10")]
    pub diffie_hellman: Option<LoginCryptoDiffieHellmanResponse>,
}

#[derive(Clone, PartialEq, Message)]
pub struct PoWHashCashResponse {
    #[prost(bytes = "vec", required, tag = "10")]
    pub hash_suffix: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct PoWResponseUnion {
    #[prost(message, optional, tag = "10")]
    pub hash_cash: Option<PoWHashCashResponse>,
}

#[derive(Clone, PartialEq, Message)]
pub struct CryptoResponseUnion {}

#[derive(Clone, PartialEq, Message)]
pub struct ClientResponsePlaintext {
    #[prost(message, optional, tag = "10")]
    pub login_crypto_response: Option<LoginCryptoResponseUnion>,
    #[prost(message, optional, tag = "20")]
    pub pow_response: Option<PoWResponseUnion>,
    #[prost(message, optional, tag = "30")]
    pub crypto_response: Option<CryptoResponseUnion>,
}

// ============================================================================
// Authentication
// ============================================================================

/// `AUTHENTICATION_USER_PASS`
pub const AUTH_USER_PASS: i32 = 0;
/// `AUTHENTICATION_STORED_SPOTIFY_CREDENTIALS`
pub const AUTH_STORED: i32 = 1;
/// `AUTHENTICATION_SPOTIFY_TOKEN`
pub const AUTH_TOKEN: i32 = 3;
/// `CPU_X86_64`
pub const CPU_X86_64: i32 = 2;
/// `OS_LINUX`
pub const OS_LINUX: i32 = 5;

#[derive(Clone, PartialEq, Message)]
pub struct LoginCredentials {
    #[prost(string, optional, tag = "10")]
    pub username: Option<String>,
    #[prost(int32, required, tag = "20")]
    pub typ: i32,
    #[prost(bytes = "vec", optional, tag = "30")]
    pub auth_data: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, Message)]
pub struct SystemInfo {
    #[prost(int32, required, tag = "10")]
    pub cpu_family: i32,
    #[prost(int32, required, tag = "60")]
    pub os: i32,
    #[prost(string, optional, tag = "90")]
    pub system_information_string: Option<String>,
    #[prost(string, optional, tag = "100")]
    pub device_id: Option<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ClientResponseEncrypted {
    #[prost(message, optional, tag = "10")]
    pub login_credentials: Option<LoginCredentials>,
    #[prost(message, optional, tag = "50")]
    pub system_info: Option<SystemInfo>,
    #[prost(string, optional, tag = "70")]
    pub version_string: Option<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ApWelcome {
    #[prost(string, required, tag = "10")]
    pub canonical_username: String,
    #[prost(int32, optional, tag = "20")]
    pub account_type_logged_in: Option<i32>,
    #[prost(int32, optional, tag = "25")]
    pub credentials_type_logged_in: Option<i32>,
    #[prost(int32, optional, tag = "30")]
    pub reusable_auth_credentials_type: Option<i32>,
    #[prost(bytes = "vec", optional, tag = "40")]
    pub reusable_auth_credentials: Option<Vec<u8>>,
}

// ============================================================================
// Mercury
// ============================================================================

#[derive(Clone, PartialEq, Message)]
pub struct MercuryHeader {
    #[prost(string, optional, tag = "1")]
    pub uri: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub content_type: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub method: Option<String>,
    #[prost(sint32, optional, tag = "4")]
    pub status_code: Option<i32>,
}

// ============================================================================
// Metadata
// ============================================================================

/// Audio file formats listed in track metadata.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum AudioFormat {
    OggVorbis96 = 0,
    OggVorbis160 = 1,
    OggVorbis320 = 2,
    Mp3_256 = 3,
    Mp3_320 = 4,
    Mp3_160 = 5,
    Mp3_96 = 6,
    Mp3_160Enc = 7,
    Aac24 = 8,
    Aac48 = 9,
}

#[derive(Clone, PartialEq, Message)]
pub struct AudioFile {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub file_id: Option<Vec<u8>>,
    #[prost(enumeration = "AudioFormat", optional, tag = "2")]
    pub format: Option<i32>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Track {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub gid: Option<Vec<u8>>,
    #[prost(string, optional, tag = "2")]
    pub name: Option<String>,
    #[prost(sint32, optional, tag = "7")]
    pub duration: Option<i32>,
    #[prost(message, repeated, tag = "12")]
    pub file: Vec<AudioFile>,
    #[prost(message, repeated, tag = "13")]
    pub alternative: Vec<Track>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Episode {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub gid: Option<Vec<u8>>,
    #[prost(string, optional, tag = "2")]
    pub name: Option<String>,
    #[prost(sint32, optional, tag = "7")]
    pub duration: Option<i32>,
    #[prost(message, repeated, tag = "12")]
    pub audio: Vec<AudioFile>,
}

/// Encode a message into a fresh buffer.
pub fn encode<M: Message>(message: &M) -> Vec<u8> {
    message.encode_to_vec()
}
