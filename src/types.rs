/// Message property under which the serialized envelope travels.
pub const ENCRYPTION_HEADER_DATA_KEY: &str = "encryptiondata";

/// Envelope protocol version written on encrypt and required on decrypt.
pub const PROTOCOL_VERSION: &str = "1.0";

/// AES key length in bytes (256 bits).
pub const AES_KEY_LENGTH: usize = 32;

/// AES-CBC IV length in bytes (one block).
pub const AES_CBC_IV_LENGTH: usize = 16;

/// AES block size in bytes.
pub const AES_BLOCK_SIZE: usize = 16;

/// JWA name of AES-256 key wrap (RFC 3394).
pub const A256KW: &str = "A256KW";
