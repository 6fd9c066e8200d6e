use crate::serialize::{MAX_PAYLOAD_BYTES, SerializeError};
use serde::{Serialize, de::DeserializeOwned};
use serde_cbor::{from_slice, to_vec};
use std::panic::{AssertUnwindSafe, catch_unwind};

pub(super) fn serialize<T>(t: &T) -> Result<Vec<u8>, SerializeError>
where
    T: Serialize,
{
    let bytes = to_vec(t).map_err(|e| SerializeError::Serialize(e.to_string()))?;
    check_len(bytes.len())?;

    Ok(bytes)
}

// Rows and structure elements share one bound in both directions.
fn check_len(len: usize) -> Result<(), SerializeError> {
    if len > MAX_PAYLOAD_BYTES {
        return Err(SerializeError::TooLarge {
            len,
            max: MAX_PAYLOAD_BYTES,
        });
    }

    Ok(())
}

/// Deserialize CBOR bytes into a value.
///
/// Input size is bounded before decode, and a panic inside the decoder is
/// reported as a deserialize error instead of unwinding into the caller.
pub(super) fn deserialize<T>(bytes: &[u8]) -> Result<T, SerializeError>
where
    T: DeserializeOwned,
{
    check_len(bytes.len())?;

    catch_unwind(AssertUnwindSafe(|| from_slice(bytes)))
        .map_err(|_| SerializeError::Deserialize("decoder panicked".into()))?
        .map_err(|err| SerializeError::Deserialize(err.to_string()))
}
