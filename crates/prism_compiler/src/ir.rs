//! Opaque intermediate-representation handle.

use std::fmt;
use std::sync::Arc;

use xxhash_rust::xxh3::xxh3_128;

/// Target-independent IR produced by the front-end.
///
/// The compiler never looks inside; it only hands the bytes to the backend
/// and uses the content hash to share main parts between selectors.
#[derive(Clone)]
pub struct IrHandle {
    bytes: Arc<[u8]>,
    hash: u128,
}

impl IrHandle {
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        let bytes = bytes.into();
        let hash = xxh3_128(&bytes);
        Self { bytes, hash }
    }

    #[inline]
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// xxh3-128 of the IR bytes.
    #[inline]
    #[must_use]
    pub fn content_hash(&self) -> u128 {
        self.hash
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for IrHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IrHandle")
            .field("len", &self.bytes.len())
            .field("hash", &format_args!("{:032x}", self.hash))
            .finish()
    }
}

impl PartialEq for IrHandle {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.bytes == other.bytes
    }
}

impl Eq for IrHandle {}
