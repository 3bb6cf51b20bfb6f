//! Chunk codec and on-disk framing.
//!
//! A chunk is one compacted batch of log entries. Each entry is rendered as
//! `[timestamp] [level] [server] message\n`, the lines are concatenated and
//! compressed as a single LZ4 frame. Hourly log files are a plain sequence of
//!
//! ```text
//! ===CHUNK_<unix-seconds>===\n<lz4 frame>
//! ```
//!
//! The separator is text embedded in a binary stream. `split_chunks` only
//! honours a separator whose header is complete and well formed, so a stray
//! `===CHUNK_` run inside compressed bytes stays part of the block it belongs to.

use lz4_flex::frame::{FrameDecoder, FrameEncoder};
use minilog_shared::LogEntry;
use std::io::{Read, Write};
use thiserror::Error;

/// Literal prefix of every chunk header
pub const SEPARATOR_PREFIX: &[u8] = b"===CHUNK_";
const SEPARATOR_SUFFIX: &[u8] = b"===\n";

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("lz4 frame error: {0}")]
    Frame(#[from] lz4_flex::frame::Error),

    #[error("chunk i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Output of `encode`: the compressed block plus the sizes needed for stats.
#[derive(Debug, Clone)]
pub struct EncodedChunk {
    pub compressed: Vec<u8>,
    /// Length of the plaintext before compression
    pub plain_len: usize,
    pub entries: usize,
}

impl EncodedChunk {
    /// Plaintext bytes per compressed byte
    pub fn ratio(&self) -> f64 {
        if self.compressed.is_empty() {
            return 0.0;
        }
        self.plain_len as f64 / self.compressed.len() as f64
    }
}

/// Serialize and compress a batch of entries into one block.
pub fn encode(entries: &[LogEntry]) -> Result<EncodedChunk, CodecError> {
    let mut plain = String::new();
    for entry in entries {
        plain.push_str(&entry.to_line());
        plain.push('\n');
    }

    let mut encoder = FrameEncoder::new(Vec::with_capacity(plain.len() / 2));
    encoder.write_all(plain.as_bytes())?;
    let compressed = encoder.finish()?;

    Ok(EncodedChunk {
        compressed,
        plain_len: plain.len(),
        entries: entries.len(),
    })
}

/// Decompress a block into its text payload.
pub fn decompress(block: &[u8]) -> Result<String, CodecError> {
    let mut decoder = FrameDecoder::new(block);
    let mut plain = Vec::new();
    decoder.read_to_end(&mut plain)?;
    Ok(String::from_utf8_lossy(&plain).into_owned())
}

/// Decompress a block and rebuild its entries in write order.
///
/// A block that fails to decompress yields no entries; callers skip it.
pub fn decode(block: &[u8]) -> Vec<LogEntry> {
    match decompress(block) {
        Ok(plain) => plain
            .split('\n')
            .filter(|line| !line.is_empty())
            .map(parse_line)
            .collect(),
        Err(e) => {
            tracing::debug!("Skipping undecodable chunk ({} bytes): {}", block.len(), e);
            Vec::new()
        }
    }
}

/// Rebuild an entry from a `[timestamp] [level] [server] message` line.
///
/// Fields are taken positionally from the first three bracket pairs; whatever
/// follows the third pair (minus one separating space) is the message, kept
/// verbatim. A line with fewer than three bracket pairs keeps the fields it
/// has and uses the whole line as its message.
pub fn parse_line(line: &str) -> LogEntry {
    let mut fields = [""; 3];
    let mut found = 0;
    let mut rest = line;

    while found < fields.len() {
        let Some(open) = rest.find('[') else { break };
        let after_open = &rest[open + 1..];
        let Some(close) = after_open.find(']') else { break };
        fields[found] = &after_open[..close];
        rest = &after_open[close + 1..];
        found += 1;
    }

    let message = if found == fields.len() {
        rest.strip_prefix(' ').unwrap_or(rest)
    } else {
        line
    };

    LogEntry::new(fields[0], fields[1], fields[2], message)
}

/// Header written in front of every block
pub fn separator(unix_secs: i64) -> String {
    format!("===CHUNK_{}===\n", unix_secs)
}

/// Split an hourly file into its compressed blocks, in file order.
///
/// Bytes before the first valid header are ignored.
pub fn split_chunks(data: &[u8]) -> Vec<&[u8]> {
    // (header start, payload start)
    let mut headers = Vec::new();
    let mut pos = 0;

    while let Some(offset) = find(&data[pos..], SEPARATOR_PREFIX) {
        let start = pos + offset;
        match header_len(&data[start..]) {
            Some(len) => {
                headers.push((start, start + len));
                pos = start + len;
            }
            None => pos = start + SEPARATOR_PREFIX.len(),
        }
    }

    headers
        .iter()
        .enumerate()
        .map(|(i, &(_, payload))| {
            let end = headers.get(i + 1).map_or(data.len(), |&(next, _)| next);
            &data[payload..end]
        })
        .collect()
}

/// Length of a well-formed header at the start of `data`.
fn header_len(data: &[u8]) -> Option<usize> {
    let rest = data.strip_prefix(SEPARATOR_PREFIX)?;
    let digits = rest.iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 || !rest[digits..].starts_with(SEPARATOR_SUFFIX) {
        return None;
    }
    Some(SEPARATOR_PREFIX.len() + digits + SEPARATOR_SUFFIX.len())
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
