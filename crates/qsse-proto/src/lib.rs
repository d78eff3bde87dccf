//! Qsse Proto - the `qlik.sse` gRPC contract
//!
//! Generated message types and the `Connector` client/server bindings live in
//! [`proto`] (regenerate with `RUSTFLAGS="--cfg gen_proto" cargo build -p qsse-proto`).
//! This crate also owns the binary metadata headers the host attaches to data calls.

pub mod proto;

use prost::Message;
use thiserror::Error;
use tonic::metadata::{MetadataMap, MetadataValue};

pub use proto::qlik::sse::*;

/// Metadata key carrying a [`FunctionRequestHeader`] on `ExecuteFunction`.
pub const FUNCTION_REQUEST_HEADER_KEY: &str = "qlik-functionrequestheader-bin";
/// Metadata key carrying a [`ScriptRequestHeader`] on `EvaluateScript`.
pub const SCRIPT_REQUEST_HEADER_KEY: &str = "qlik-scriptrequestheader-bin";
/// Metadata key carrying a [`CommonRequestHeader`] on every data call.
pub const COMMON_REQUEST_HEADER_KEY: &str = "qlik-commonrequestheader-bin";

#[derive(Debug, Error)]
pub enum HeaderError {
    #[error("missing request header '{0}'")]
    Missing(&'static str),

    #[error("request header '{key}' is not valid base64: {reason}")]
    Encoding { key: &'static str, reason: String },

    #[error("request header '{key}' is not a valid protobuf message: {source}")]
    Decode {
        key: &'static str,
        #[source]
        source: prost::DecodeError,
    },
}

/// Parse a protobuf header out of a binary (`-bin`) metadata entry.
pub fn parse_bin_header<T>(metadata: &MetadataMap, key: &'static str) -> Result<T, HeaderError>
where
    T: Message + Default,
{
    let value = metadata.get_bin(key).ok_or(HeaderError::Missing(key))?;
    let bytes = value.to_bytes().map_err(|e| HeaderError::Encoding {
        key,
        reason: e.to_string(),
    })?;
    T::decode(bytes).map_err(|source| HeaderError::Decode { key, source })
}

/// Attach a protobuf header as a binary metadata entry. Used by clients and tests.
pub fn insert_bin_header<T: Message>(metadata: &mut MetadataMap, key: &'static str, header: &T) {
    metadata.insert_bin(key, MetadataValue::from_bytes(&header.encode_to_vec()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_header_roundtrip_through_metadata() {
        let mut metadata = MetadataMap::new();
        let header = FunctionRequestHeader {
            function_id: 7,
            version: "1".to_string(),
        };
        insert_bin_header(&mut metadata, FUNCTION_REQUEST_HEADER_KEY, &header);

        let parsed: FunctionRequestHeader =
            parse_bin_header(&metadata, FUNCTION_REQUEST_HEADER_KEY).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn missing_header_is_reported_by_key() {
        let metadata = MetadataMap::new();
        let err = parse_bin_header::<ScriptRequestHeader>(&metadata, SCRIPT_REQUEST_HEADER_KEY)
            .unwrap_err();
        assert!(matches!(err, HeaderError::Missing(SCRIPT_REQUEST_HEADER_KEY)));
        assert!(err.to_string().contains("qlik-scriptrequestheader-bin"));
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let mut metadata = MetadataMap::new();
        // Field 1 declared as length-delimited with a length running past the end.
        metadata.insert_bin(
            FUNCTION_REQUEST_HEADER_KEY,
            MetadataValue::from_bytes(&[0x0a, 0xff, 0x01]),
        );
        let err = parse_bin_header::<FunctionRequestHeader>(&metadata, FUNCTION_REQUEST_HEADER_KEY)
            .unwrap_err();
        assert!(matches!(err, HeaderError::Decode { .. }));
    }

    #[test]
    fn enum_names_match_wire_contract() {
        assert_eq!(FunctionType::Tensor.as_str_name(), "TENSOR");
        assert_eq!(DataType::from_str_name("DUAL"), Some(DataType::Dual));
        assert_eq!(FunctionType::try_from(1).unwrap(), FunctionType::Aggregation);
        assert!(FunctionType::try_from(9).is_err());
    }
}
