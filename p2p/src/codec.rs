//! Request/response chunk framing.
//!
//! Each chunk is `[response code (responses only)] [context bytes (forked
//! response types only)] [LEB128 length of the uncompressed payload]
//! [framed snappy payload]`. The declared length is checked against the
//! configured maximum before any decompression happens, so a malicious
//! length cannot make the reader allocate.

use std::io::{Read as _, Write as _};

use types::phase0::primitives::ForkDigest;

use crate::error::Error;

/// `/eth2/beacon_chain/req/<name>/<version>/ssz_snappy`
#[must_use]
pub fn request_protocol_id(name: &str, version: u64) -> String {
    format!("/eth2/beacon_chain/req/{name}/{version}/ssz_snappy")
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum ResponseCode {
    Success = 0,
    InvalidRequest = 1,
    ServerError = 2,
    ResourceUnavailable = 3,
}

impl TryFrom<u8> for ResponseCode {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Success),
            1 => Ok(Self::InvalidRequest),
            2 => Ok(Self::ServerError),
            3 => Ok(Self::ResourceUnavailable),
            _ => Err(Error::InvalidResponseCode { code }),
        }
    }
}

#[derive(PartialEq, Eq, Debug)]
pub struct ResponseChunk {
    pub code: ResponseCode,
    pub context: Option<ForkDigest>,
    pub payload: Vec<u8>,
}

pub fn encode_request(ssz_payload: &[u8]) -> Result<Vec<u8>, Error> {
    let mut encoded = vec![];
    append_length_prefix(&mut encoded, ssz_payload.len() as u64);
    encoded.extend_from_slice(&compress_framed(ssz_payload)?);
    Ok(encoded)
}

pub fn decode_request(bytes: &[u8], max_chunk_size: u64) -> Result<Vec<u8>, Error> {
    let (length, remainder) = read_length_prefix(bytes, max_chunk_size)?;
    let payload = decompress_framed(remainder, length)?;
    Ok(payload)
}

pub fn encode_response_chunk(
    code: ResponseCode,
    context: Option<ForkDigest>,
    ssz_payload: &[u8],
) -> Result<Vec<u8>, Error> {
    let mut encoded = vec![code as u8];

    if let Some(digest) = context {
        encoded.extend_from_slice(digest.as_bytes());
    }

    append_length_prefix(&mut encoded, ssz_payload.len() as u64);
    encoded.extend_from_slice(&compress_framed(ssz_payload)?);

    Ok(encoded)
}

/// Decodes one response chunk. The buffer must contain exactly one chunk;
/// stream readers deliver chunks one at a time.
///
/// `expect_context` is decided by the protocol and, for error responses, is
/// always false: error payloads are plain strings regardless of fork.
pub fn decode_response_chunk(
    bytes: &[u8],
    expect_context: bool,
    max_chunk_size: u64,
) -> Result<ResponseChunk, Error> {
    let (&code_byte, mut remainder) = bytes.split_first().ok_or(Error::UnexpectedEof)?;
    let code = ResponseCode::try_from(code_byte)?;

    let context = if expect_context && code == ResponseCode::Success {
        let digest_length = ForkDigest::len_bytes();

        if remainder.len() < digest_length {
            return Err(Error::UnexpectedEof);
        }

        let digest = ForkDigest::from_slice(&remainder[..digest_length]);
        remainder = &remainder[digest_length..];
        Some(digest)
    } else {
        None
    };

    let (length, compressed) = read_length_prefix(remainder, max_chunk_size)?;
    let payload = decompress_framed(compressed, length)?;

    if code != ResponseCode::Success {
        let message = String::from_utf8_lossy(&payload).into_owned();
        return Err(Error::ReceivedErrorResponse { code, message });
    }

    Ok(ResponseChunk {
        code,
        context,
        payload,
    })
}

fn append_length_prefix(buffer: &mut Vec<u8>, length: u64) {
    let mut varint_buffer = unsigned_varint::encode::u64_buffer();
    buffer.extend_from_slice(unsigned_varint::encode::u64(length, &mut varint_buffer));
}

fn read_length_prefix(bytes: &[u8], max_chunk_size: u64) -> Result<(u64, &[u8]), Error> {
    let (length, remainder) =
        unsigned_varint::decode::u64(bytes).map_err(|_| Error::UnexpectedEof)?;

    if length == 0 {
        return Err(Error::ZeroSizePrefix);
    }

    if length > max_chunk_size {
        return Err(Error::SizePrefixOverflow {
            length,
            maximum: max_chunk_size,
        });
    }

    Ok((length, remainder))
}

fn compress_framed(data: &[u8]) -> Result<Vec<u8>, Error> {
    let mut encoder = snap::write::FrameEncoder::new(vec![]);
    encoder
        .write_all(data)
        .map_err(|_| Error::InvalidSnappyBytes)?;
    encoder
        .into_inner()
        .map_err(|_| Error::InvalidSnappyBytes)
}

fn decompress_framed(data: &[u8], expected_length: u64) -> Result<Vec<u8>, Error> {
    let mut decoded = vec![];

    snap::read::FrameDecoder::new(data)
        .take(expected_length)
        .read_to_end(&mut decoded)
        .map_err(|_| Error::InvalidSnappyBytes)?;

    if decoded.len() as u64 != expected_length {
        return Err(Error::InvalidSnappyBytes);
    }

    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    const MAX_CHUNK_SIZE: u64 = 10_485_760;

    #[test]
    fn requests_roundtrip() {
        let payload = b"beacon_blocks_by_range_request".to_vec();

        let encoded = encode_request(&payload).expect("encoding succeeds");
        let decoded = decode_request(&encoded, MAX_CHUNK_SIZE).expect("decoding succeeds");

        assert_eq!(decoded, payload);
    }

    #[test_case(None; "without context bytes")]
    #[test_case(Some(ForkDigest::repeat_byte(7)); "with context bytes")]
    fn response_chunks_roundtrip(context: Option<ForkDigest>) {
        let payload = b"signed_beacon_block".to_vec();

        let encoded = encode_response_chunk(ResponseCode::Success, context, &payload)
            .expect("encoding succeeds");
        let decoded = decode_response_chunk(&encoded, context.is_some(), MAX_CHUNK_SIZE)
            .expect("decoding succeeds");

        assert_eq!(decoded.code, ResponseCode::Success);
        assert_eq!(decoded.context, context);
        assert_eq!(decoded.payload, payload);
    }

    #[test]
    fn error_responses_carry_their_message() {
        let encoded =
            encode_response_chunk(ResponseCode::ResourceUnavailable, None, b"pruned")
                .expect("encoding succeeds");

        let error = decode_response_chunk(&encoded, false, MAX_CHUNK_SIZE)
            .expect_err("error codes decode to errors");

        assert!(matches!(
            error,
            Error::ReceivedErrorResponse {
                code: ResponseCode::ResourceUnavailable,
                message,
            } if message == "pruned"
        ));
    }

    #[test]
    fn declared_lengths_are_checked_before_decompression() {
        let huge = encode_request(&vec![0; 1024]).expect("encoding succeeds");

        let error = decode_request(&huge, 16).expect_err("the length exceeds the maximum");

        assert!(matches!(error, Error::SizePrefixOverflow { length: 1024, maximum: 16 }));
    }

    #[test]
    fn zero_length_prefixes_are_rejected() {
        // A zero varint followed by an empty snappy stream.
        let encoded = encode_response_chunk(ResponseCode::Success, None, &[])
            .expect("encoding succeeds");

        let error = decode_response_chunk(&encoded, false, MAX_CHUNK_SIZE)
            .expect_err("empty payloads are rejected");

        assert!(matches!(error, Error::ZeroSizePrefix));
    }

    #[test]
    fn unknown_response_codes_are_rejected() {
        let mut encoded = encode_response_chunk(ResponseCode::Success, None, b"x")
            .expect("encoding succeeds");
        encoded[0] = 250;

        let error = decode_response_chunk(&encoded, false, MAX_CHUNK_SIZE)
            .expect_err("code 250 is not assigned");

        assert!(matches!(error, Error::InvalidResponseCode { code: 250 }));
    }

    #[test]
    fn corrupted_snappy_payloads_are_rejected() {
        let mut encoded = encode_request(b"payload").expect("encoding succeeds");
        let last = encoded.len() - 1;
        encoded[last] ^= 0xff;

        let error = decode_request(&encoded, MAX_CHUNK_SIZE)
            .expect_err("the checksum no longer matches");

        assert!(matches!(error, Error::InvalidSnappyBytes));
    }
}
