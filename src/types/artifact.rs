//! Protocol artifacts.
//!
//! An artifact is a small reference a relying party receives in place of a
//! message; it identifies the issuer either by a 20-byte source ID or, for
//! the SAML 1 type 0x0002 format, by the issuer's resolution service URL.

use crate::{HeimdallError, Result};

/// Length of an artifact source ID (a SHA-1 digest).
pub const SOURCE_ID_LEN: usize = 20;

const HANDLE_LEN: usize = 20;

/// The issuer reference carried by an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Artifact {
    /// Issuer identified by source ID (SAML 2 type 0x0004, SAML 1 type 0x0001).
    SourceId(Vec<u8>),
    /// Issuer identified by its artifact resolution location (SAML 1 type 0x0002).
    SourceLocation(String),
}

impl Artifact {
    /// Decode an artifact from its raw (already base64-decoded) bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let (type_code, rest) = bytes
            .split_first_chunk::<2>()
            .ok_or_else(|| HeimdallError::InvalidInput("artifact shorter than type code".into()))?;

        match u16::from_be_bytes(*type_code) {
            // SAML 2: endpoint index, source ID, message handle
            0x0004 => {
                if rest.len() != 2 + SOURCE_ID_LEN + HANDLE_LEN {
                    return Err(invalid_length(0x0004, bytes.len()));
                }
                Ok(Self::SourceId(rest[2..2 + SOURCE_ID_LEN].to_vec()))
            }
            // SAML 1: source ID, assertion handle
            0x0001 => {
                if rest.len() != SOURCE_ID_LEN + HANDLE_LEN {
                    return Err(invalid_length(0x0001, bytes.len()));
                }
                Ok(Self::SourceId(rest[..SOURCE_ID_LEN].to_vec()))
            }
            // SAML 1: assertion handle, source location
            0x0002 => {
                if rest.len() <= HANDLE_LEN {
                    return Err(invalid_length(0x0002, bytes.len()));
                }
                let location = std::str::from_utf8(&rest[HANDLE_LEN..])
                    .map_err(|e| HeimdallError::InvalidInput(format!("artifact source location: {e}")))?;
                Ok(Self::SourceLocation(location.to_string()))
            }
            other => Err(HeimdallError::InvalidInput(format!(
                "unsupported artifact type code 0x{other:04x}"
            ))),
        }
    }
}

fn invalid_length(type_code: u16, len: usize) -> HeimdallError {
    HeimdallError::InvalidInput(format!(
        "artifact type 0x{type_code:04x} has invalid length {len}"
    ))
}
