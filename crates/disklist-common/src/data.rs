use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::borrow::{Borrow, Cow};
use std::fmt;

/// The payload stored in one list node.
///
/// Equality and hashing follow the byte content, so two `Data` built from the
/// same bytes index to the same node.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Hash, Default)]
pub struct Data {
    value: Vec<u8>,
}

impl Data {
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self {
            value: value.into(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.value
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Text view of the payload, replacing invalid UTF-8.
    pub fn to_key(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.value)
    }

    /// Serializes a structured value into a payload (Postcard).
    pub fn encode<T: Serialize>(value: &T) -> Result<Self, postcard::Error> {
        postcard::to_allocvec(value).map(Self::new)
    }

    /// Deserializes a payload written by [`Data::encode`].
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, postcard::Error> {
        postcard::from_bytes(&self.value)
    }
}

impl Borrow<[u8]> for Data {
    fn borrow(&self) -> &[u8] {
        &self.value
    }
}

impl AsRef<[u8]> for Data {
    fn as_ref(&self) -> &[u8] {
        &self.value
    }
}

impl From<&str> for Data {
    fn from(value: &str) -> Self {
        Self::new(value.as_bytes())
    }
}

impl From<String> for Data {
    fn from(value: String) -> Self {
        Self::new(value.into_bytes())
    }
}

impl From<Vec<u8>> for Data {
    fn from(value: Vec<u8>) -> Self {
        Self::new(value)
    }
}

impl From<&[u8]> for Data {
    fn from(value: &[u8]) -> Self {
        Self::new(value)
    }
}

impl fmt::Debug for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Data({:?})", self.to_key())
    }
}

impl fmt::Display for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_key())
    }
}
