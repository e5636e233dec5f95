// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use bytes::Bytes;

/// Content of the packets sent by an echo client
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub enum Fill {
    #[default]
    Zeros,
    /// a string, repeated
    Text(String),
    /// a single byte, repeated
    Byte(u8),
    /// a byte pattern, repeated
    Pattern(Vec<u8>),
}

impl Fill {
    /// Build a payload of exactly `size` bytes
    #[must_use]
    pub fn payload(&self, size: usize) -> Bytes {
        let pattern: &[u8] = match self {
            Fill::Zeros => &[],
            Fill::Text(text) => text.as_bytes(),
            Fill::Byte(byte) => return Bytes::from(vec![*byte; size]),
            Fill::Pattern(pattern) => pattern,
        };
        if pattern.is_empty() {
            return Bytes::from(vec![0; size]);
        }
        pattern.iter().copied().cycle().take(size).collect()
    }
}

#[cfg(test)]
mod test {
    use super::Fill;

    #[test]
    fn sizes_are_exact() {
        assert_eq!(Fill::Zeros.payload(4).as_ref(), &[0, 0, 0, 0]);
        assert_eq!(Fill::Byte(7).payload(3).as_ref(), &[7, 7, 7]);
        assert_eq!(Fill::Text("hello".into()).payload(7).as_ref(), b"hellohe");
        assert_eq!(Fill::Text("hello".into()).payload(2).as_ref(), b"he");
        assert_eq!(Fill::Pattern(vec![]).payload(2).as_ref(), &[0, 0]);
        assert!(Fill::Pattern(vec![1, 2]).payload(0).is_empty());
    }
}
