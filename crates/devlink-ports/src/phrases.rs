/*!
 * Phrase framing.
 *
 * Device protocols usually terminate each response with a fixed delimiter
 * (`\r\n`, `?:`, ...). [`PhraseFramer`] reassembles arbitrarily chunked
 * byte streams into complete delimiter-terminated phrases, independent of
 * where chunk boundaries fall.
 */
use bytes::{BufMut, Bytes, BytesMut};
use futures::stream::{self, BoxStream, Stream, StreamExt};

use crate::port::{Port, PortError, Result};

/// Incremental splitter of a byte stream into delimiter-terminated phrases.
///
/// Matching uses a Knuth-Morris-Pratt failure function, so delimiters with
/// repeating internal structure (e.g. `AAB`) are found at the earliest
/// valid position even when the stream contains overlapping near-matches.
pub struct PhraseFramer {
    delimiter: Vec<u8>,
    failure: Vec<usize>,
    buffer: BytesMut,
    matched: usize,
}

impl PhraseFramer {
    /// Create a framer for the given delimiter. Empty delimiters are rejected.
    pub fn new(delimiter: impl Into<Vec<u8>>) -> Result<Self> {
        let delimiter = delimiter.into();
        if delimiter.is_empty() {
            return Err(PortError::Configuration(
                "phrase delimiter must not be empty".to_string(),
            ));
        }
        let failure = failure_function(&delimiter);
        Ok(Self {
            delimiter,
            failure,
            buffer: BytesMut::new(),
            matched: 0,
        })
    }

    /// Consume one chunk and return every phrase completed by it.
    ///
    /// Each returned phrase includes its terminating delimiter. Bytes after
    /// the last delimiter stay buffered for the next chunk.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        let mut phrases = Vec::new();
        for &byte in chunk {
            self.buffer.put_u8(byte);
            while self.matched > 0 && byte != self.delimiter[self.matched] {
                self.matched = self.failure[self.matched - 1];
            }
            if byte == self.delimiter[self.matched] {
                self.matched += 1;
            }
            if self.matched == self.delimiter.len() {
                phrases.push(self.buffer.split().freeze());
                self.matched = 0;
            }
        }
        phrases
    }

    /// Bytes buffered since the last completed phrase
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }
}

/// KMP failure function: `failure[i]` is the length of the longest proper
/// prefix of `pattern[..=i]` that is also a suffix of it.
fn failure_function(pattern: &[u8]) -> Vec<usize> {
    let mut failure = vec![0; pattern.len()];
    let mut k = 0;
    for i in 1..pattern.len() {
        while k > 0 && pattern[i] != pattern[k] {
            k = failure[k - 1];
        }
        if pattern[i] == pattern[k] {
            k += 1;
        }
        failure[i] = k;
    }
    failure
}

/// Transform a stream of byte chunks into a stream of complete phrases.
///
/// A partial phrase left when the upstream ends is discarded.
pub fn with_delimiter<S>(chunks: S, delimiter: impl Into<Vec<u8>>) -> Result<BoxStream<'static, Bytes>>
where
    S: Stream<Item = Bytes> + Send + 'static,
{
    let mut framer = PhraseFramer::new(delimiter)?;
    Ok(chunks
        .flat_map(move |chunk| stream::iter(framer.push(&chunk)))
        .boxed())
}

/// Transform a stream of byte chunks into UTF-8 phrases (lossy)
pub fn with_string_delimiter<S>(chunks: S, delimiter: &str) -> Result<BoxStream<'static, String>>
where
    S: Stream<Item = Bytes> + Send + 'static,
{
    Ok(with_delimiter(chunks, delimiter.as_bytes().to_vec())?
        .map(|phrase| String::from_utf8_lossy(&phrase).into_owned())
        .boxed())
}

/// The port's incoming stream, framed into delimited phrases
pub fn delimited_incoming(port: &dyn Port, delimiter: impl Into<Vec<u8>>) -> Result<BoxStream<'static, Bytes>> {
    with_delimiter(port.receiving(), delimiter)
}

/// The port's incoming stream, framed into UTF-8 phrases
pub fn strings_delimited_incoming(port: &dyn Port, delimiter: &str) -> Result<BoxStream<'static, String>> {
    with_string_delimiter(port.receiving(), delimiter)
}
