//! RecordIO framing: `<decimal length>\n<payload>` repeated.

use bytes::{Buf, Bytes, BytesMut};

use crate::MesosError;

/// Longest length prefix accepted before giving up on the stream.
const MAX_PREFIX_LEN: usize = 20;

/// Largest record accepted; anything above is a corrupt prefix.
pub const MAX_RECORD_LEN: usize = 64 * 1024 * 1024;

/// Incremental decoder; feed chunks with [`push`](Self::push) and drain
/// complete records with [`next_record`](Self::next_record).
#[derive(Debug, Default)]
pub struct RecordIoDecoder {
    buf: BytesMut,
    pending: Option<usize>,
}

impl RecordIoDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Bytes received but not yet returned as a record.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Next complete record, `Ok(None)` if more input is needed.
    ///
    /// A malformed length prefix is unrecoverable; the stream must be
    /// dropped after an error.
    pub fn next_record(&mut self) -> Result<Option<Bytes>, MesosError> {
        let len = match self.pending {
            Some(len) => len,
            None => {
                let Some(nl) = self.buf.iter().position(|b| *b == b'\n') else {
                    if self.buf.len() > MAX_PREFIX_LEN {
                        return Err(MesosError::Protocol("record length prefix too long".into()));
                    }
                    return Ok(None);
                };
                let prefix = &self.buf[..nl];
                let text = std::str::from_utf8(prefix)
                    .map_err(|_| MesosError::Protocol("non-utf8 record length".into()))?;
                let len = text.trim().parse::<usize>().map_err(|_| {
                    MesosError::Protocol(format!("invalid record length {text:?}"))
                })?;
                if len > MAX_RECORD_LEN {
                    return Err(MesosError::Protocol(format!(
                        "record length {len} exceeds {MAX_RECORD_LEN}"
                    )));
                }
                self.buf.advance(nl + 1);
                self.pending = Some(len);
                len
            }
        };

        if self.buf.len() < len {
            return Ok(None);
        }
        self.pending = None;
        Ok(Some(self.buf.split_to(len).freeze()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_records_across_chunks() {
        let mut d = RecordIoDecoder::new();
        d.push(b"5\nhel");
        assert!(d.next_record().unwrap().is_none());

        d.push(b"lo3\nabc1");
        assert_eq!(d.next_record().unwrap().unwrap(), Bytes::from_static(b"hello"));
        assert_eq!(d.next_record().unwrap().unwrap(), Bytes::from_static(b"abc"));
        assert!(d.next_record().unwrap().is_none());

        d.push(b"\nx");
        assert_eq!(d.next_record().unwrap().unwrap(), Bytes::from_static(b"x"));
        assert_eq!(d.buffered(), 0);
    }

    #[test]
    fn zero_length_record() {
        let mut d = RecordIoDecoder::new();
        d.push(b"0\n2\n{}");
        assert_eq!(d.next_record().unwrap().unwrap().len(), 0);
        assert_eq!(d.next_record().unwrap().unwrap(), Bytes::from_static(b"{}"));
    }

    #[test]
    fn garbage_prefix_is_error() {
        let mut d = RecordIoDecoder::new();
        d.push(b"abc\n{}");
        assert!(matches!(d.next_record(), Err(MesosError::Protocol(_))));
    }

    #[test]
    fn oversized_record_is_error() {
        let mut d = RecordIoDecoder::new();
        d.push(b"99999999999\n{}");
        assert!(matches!(d.next_record(), Err(MesosError::Protocol(_))));

        let mut d = RecordIoDecoder::new();
        d.push(format!("{MAX_RECORD_LEN}\n").as_bytes());
        assert!(d.next_record().unwrap().is_none());
    }

    #[test]
    fn runaway_prefix_is_error() {
        let mut d = RecordIoDecoder::new();
        d.push(&[b'1'; 32]);
        assert!(d.next_record().is_err());
    }
}
