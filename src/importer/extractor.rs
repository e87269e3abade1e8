use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::str::FromStr;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};

use crate::domain::RawFeature;

pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

const FEATURES_OPEN: &[&[u8]] = &[b"\"features\"", b":", b"["];
const FEATURE_TYPE: &[&[u8]] = &[b"\"type\"", b":", b"\"Feature\""];
const FEATURE_START: &[&[u8]] = &[b"{", b"\"type\"", b":", b"\"Feature\""];

/// How the input stream is cut into candidate Feature records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// One Feature per line inside a pretty-printed `"features": [` array.
    #[default]
    Lines,
    /// Brace-balanced `{"type": "Feature", ...}` objects anywhere in the
    /// stream, independent of line breaks.
    Braces,
}

impl FromStr for Framing {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "lines" | "line" => Ok(Framing::Lines),
            "braces" | "brace" | "chunked" => Ok(Framing::Braces),
            _ => Err(format!("invalid framing: {value} (expected lines or braces)")),
        }
    }
}

impl fmt::Display for Framing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Framing::Lines => f.write_str("lines"),
            Framing::Braces => f.write_str("braces"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractStats {
    pub lines_read: u64,
    pub bytes_read: u64,
    pub features_parsed: u64,
    pub parse_errors: u64,
}

#[derive(Debug, PartialEq, Eq)]
enum Probe {
    Match,
    Mismatch,
    NeedMore,
}

// Matches `tokens` at the start of `input`, allowing whitespace between them.
fn probe_tokens(input: &[u8], tokens: &[&[u8]]) -> Probe {
    let mut pos = 0;

    for (i, token) in tokens.iter().enumerate() {
        if i > 0 {
            while input.get(pos).is_some_and(u8::is_ascii_whitespace) {
                pos += 1;
            }
        }
        for &expected in token.iter() {
            match input.get(pos) {
                None => return Probe::NeedMore,
                Some(&actual) if actual == expected => pos += 1,
                Some(_) => return Probe::Mismatch,
            }
        }
    }

    Probe::Match
}

fn contains_tokens(haystack: &[u8], tokens: &[&[u8]]) -> bool {
    let first = tokens[0][0];
    haystack
        .iter()
        .enumerate()
        .any(|(i, &b)| b == first && probe_tokens(&haystack[i..], tokens) == Probe::Match)
}

#[derive(Debug, Default)]
struct LineFramer {
    in_features: bool,
}

impl LineFramer {
    fn frame<'a>(&mut self, line: &'a [u8]) -> Option<&'a [u8]> {
        if !self.in_features {
            self.in_features = contains_tokens(line, FEATURES_OPEN);
            return None;
        }
        if !contains_tokens(line, FEATURE_TYPE) {
            return None;
        }

        let trimmed = line.trim_ascii();
        Some(trimmed.strip_suffix(b",").unwrap_or(trimmed))
    }
}

/// Cuts Feature objects out of arbitrarily split chunks by brace depth.
///
/// Only the unconsumed tail of the stream is buffered: at most one partial
/// object plus the latest chunk.
#[derive(Debug, Default)]
struct BraceFramer {
    buffer: Vec<u8>,
    scan: usize,
    start: Option<usize>,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl BraceFramer {
    fn push(&mut self, chunk: &[u8], out: &mut VecDeque<Vec<u8>>) {
        self.buffer.extend_from_slice(chunk);

        loop {
            match self.start {
                None => {
                    let Some(offset) = self.buffer[self.scan..].iter().position(|&b| b == b'{')
                    else {
                        self.scan = self.buffer.len();
                        break;
                    };
                    let pos = self.scan + offset;

                    match probe_tokens(&self.buffer[pos..], FEATURE_START) {
                        Probe::Match => {
                            self.start = Some(pos);
                            self.scan = pos;
                            self.depth = 0;
                            self.in_string = false;
                            self.escaped = false;
                        }
                        Probe::Mismatch => self.scan = pos + 1,
                        Probe::NeedMore => {
                            self.scan = pos;
                            break;
                        }
                    }
                }
                Some(start) => match self.scan_object() {
                    Some(end) => {
                        out.push_back(self.buffer[start..=end].to_vec());
                        self.start = None;
                    }
                    None => break,
                },
            }
        }

        self.compact();
    }

    // Advances `scan` until the open object closes, returning the index of
    // its closing brace.
    fn scan_object(&mut self) -> Option<usize> {
        while self.scan < self.buffer.len() {
            let i = self.scan;
            let b = self.buffer[i];
            self.scan += 1;

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if b == b'\\' {
                    self.escaped = true;
                } else if b == b'"' {
                    self.in_string = false;
                }
                continue;
            }

            match b {
                b'"' => self.in_string = true,
                b'{' => self.depth += 1,
                b'}' => {
                    self.depth = self.depth.saturating_sub(1);
                    if self.depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
        }

        None
    }

    fn compact(&mut self) {
        let keep_from = self.start.unwrap_or(self.scan);
        if keep_from == 0 {
            return;
        }
        self.buffer.drain(..keep_from);
        self.scan -= keep_from;
        if let Some(start) = self.start.as_mut() {
            *start -= keep_from;
        }
    }

    /// Returns true if the stream ended inside an object.
    fn finish(&mut self) -> bool {
        let unterminated = self.start.is_some();
        self.buffer.clear();
        self.scan = 0;
        self.start = None;
        unterminated
    }
}

/// Outcome of one [`FeatureExtractor::advance`] step.
#[derive(Debug)]
pub enum Extracted {
    Feature(RawFeature),
    /// Input was consumed without yielding a Feature.
    Pending,
    End,
}

enum Step {
    Candidate(Vec<u8>),
    Consumed,
    End,
}

enum FramingState {
    Lines(LineFramer),
    Braces(BraceFramer),
}

/// Lazily pulls parsed Features out of a GeoJSON byte stream.
///
/// Nothing is read ahead of the caller: each call to
/// [`FeatureExtractor::next_feature`] reads only as much input as it needs to
/// produce the next record. Malformed records are counted and skipped.
pub struct FeatureExtractor<R> {
    reader: BufReader<R>,
    framing: FramingState,
    line: Vec<u8>,
    chunk: Vec<u8>,
    ready: VecDeque<Vec<u8>>,
    exhausted: bool,
    stats: ExtractStats,
}

impl<R: AsyncRead + Unpin> FeatureExtractor<R> {
    pub fn new(reader: R, framing: Framing) -> Self {
        let framing = match framing {
            Framing::Lines => FramingState::Lines(LineFramer::default()),
            Framing::Braces => FramingState::Braces(BraceFramer::default()),
        };

        Self {
            reader: BufReader::new(reader),
            framing,
            line: Vec::new(),
            chunk: vec![0; DEFAULT_CHUNK_SIZE],
            ready: VecDeque::new(),
            exhausted: false,
            stats: ExtractStats::default(),
        }
    }

    /// Read size used by brace framing.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk = vec![0; chunk_size.max(1)];
        self
    }

    pub fn stats(&self) -> ExtractStats {
        self.stats
    }

    /// The next well-formed Feature, or `None` at end of input.
    ///
    /// Only I/O failures are returned as errors.
    pub async fn next_feature(&mut self) -> io::Result<Option<RawFeature>> {
        loop {
            match self.advance().await? {
                Extracted::Feature(feature) => return Ok(Some(feature)),
                Extracted::Pending => {}
                Extracted::End => return Ok(None),
            }
        }
    }

    /// Consume one line (or one chunk with brace framing) or one buffered
    /// candidate, whichever comes first.
    pub async fn advance(&mut self) -> io::Result<Extracted> {
        let candidate = match self.next_step().await? {
            Step::Candidate(candidate) => candidate,
            Step::Consumed => return Ok(Extracted::Pending),
            Step::End => return Ok(Extracted::End),
        };

        match serde_json::from_slice::<RawFeature>(&candidate) {
            Ok(feature) => {
                self.stats.features_parsed += 1;
                Ok(Extracted::Feature(feature))
            }
            Err(e) => {
                self.stats.parse_errors += 1;
                tracing::debug!(
                    "Skipping malformed feature near line {}: {}",
                    self.stats.lines_read,
                    e
                );
                Ok(Extracted::Pending)
            }
        }
    }

    async fn next_step(&mut self) -> io::Result<Step> {
        match &mut self.framing {
            FramingState::Lines(framer) => {
                self.line.clear();
                let n = self.reader.read_until(b'\n', &mut self.line).await?;
                if n == 0 {
                    return Ok(Step::End);
                }
                self.stats.lines_read += 1;
                self.stats.bytes_read += n as u64;

                Ok(match framer.frame(&self.line) {
                    Some(candidate) => Step::Candidate(candidate.to_vec()),
                    None => Step::Consumed,
                })
            }
            FramingState::Braces(framer) => {
                if let Some(candidate) = self.ready.pop_front() {
                    return Ok(Step::Candidate(candidate));
                }
                if self.exhausted {
                    return Ok(Step::End);
                }

                let n = self.reader.read(&mut self.chunk).await?;
                if n == 0 {
                    self.exhausted = true;
                    if framer.finish() {
                        self.stats.parse_errors += 1;
                        tracing::debug!("Input ended inside an unterminated feature");
                    }
                    return Ok(Step::Consumed);
                }

                let chunk = &self.chunk[..n];
                self.stats.bytes_read += n as u64;
                self.stats.lines_read += chunk.iter().filter(|&&b| b == b'\n').count() as u64;
                framer.push(chunk, &mut self.ready);
                Ok(Step::Consumed)
            }
        }
    }
}
