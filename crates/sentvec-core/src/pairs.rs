//! Reader for `sentence1<TAB>sentence2` input files.
//!
//! Empty lines and lines without a tab are skipped, never fatal. Columns after
//! the second are ignored so scored datasets can be fed directly.
use std::io::BufRead;

use crate::types::SentencePair;

/// One physical input line after parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairLine {
    Record(SentencePair),
    Skipped { line: usize },
}

pub fn parse_pair_line(line: &str) -> Option<SentencePair> {
    if line.trim_end_matches('\r').is_empty() { return None; }
    let mut fields = line.split('\t');
    let first = fields.next()?;
    let second = fields.next()?;
    Some(SentencePair { sentence1: first.trim().to_string(), sentence2: second.trim().to_string() })
}

/// Iterates the lines of a reader as [`PairLine`]s. I/O and UTF-8 errors end
/// the iteration with an `Err`.
pub struct PairReader<R> {
    lines: std::io::Lines<R>,
    line_no: usize,
}

impl<R: BufRead> PairReader<R> {
    pub fn new(reader: R) -> Self { Self { lines: reader.lines(), line_no: 0 } }
}

impl<R: BufRead> Iterator for PairReader<R> {
    type Item = std::io::Result<PairLine>;

    fn next(&mut self) -> Option<Self::Item> {
        let line = match self.lines.next()? {
            Ok(line) => line,
            Err(e) => return Some(Err(e)),
        };
        self.line_no += 1;
        Some(Ok(match parse_pair_line(&line) {
            Some(pair) => PairLine::Record(pair),
            None => PairLine::Skipped { line: self.line_no },
        }))
    }
}
