//! Output encodings: the streaming `v1<TAB>v2` text lines and the bulk JSON
//! document keyed by sentence text.
use std::collections::HashMap;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::error::Error;

pub const BULK_FILE_NAME: &str = "embeddings.json";

/// Comma-joined shortest round-trip decimal form of every component.
pub fn format_vector(vector: &[f32]) -> String {
    let mut out = String::with_capacity(vector.len() * 12);
    for (i, x) in vector.iter().enumerate() {
        if i > 0 { out.push(','); }
        out.push_str(&x.to_string());
    }
    out
}

pub fn format_vector_line(vector1: &[f32], vector2: &[f32]) -> String {
    format!("{}\t{}", format_vector(vector1), format_vector(vector2))
}

/// Sentence → vector mapping for the bulk format.
///
/// Keys keep the position of their first insertion. Inserting a key again
/// replaces its vector (last write wins) and bumps [`BulkDocument::overwritten`].
#[derive(Debug, Default)]
pub struct BulkDocument {
    entries: Vec<(String, Vec<f32>)>,
    positions: HashMap<String, usize>,
    overwritten: usize,
}

impl BulkDocument {
    pub fn new() -> Self { Self::default() }

    pub fn insert(&mut self, sentence: &str, vector: Vec<f32>) {
        if let Some(&pos) = self.positions.get(sentence) {
            self.entries[pos].1 = vector;
            self.overwritten += 1;
            return;
        }
        self.positions.insert(sentence.to_string(), self.entries.len());
        self.entries.push((sentence.to_string(), vector));
    }

    pub fn get(&self, sentence: &str) -> Option<&[f32]> {
        self.positions.get(sentence).map(|&pos| self.entries[pos].1.as_slice())
    }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn overwritten(&self) -> usize { self.overwritten }

    pub fn keys(&self) -> impl Iterator<Item = &str> { self.entries.iter().map(|(k, _)| k.as_str()) }

    pub fn write_json<W: Write>(&self, writer: W) -> Result<()> {
        let mut ser = serde_json::Serializer::with_formatter(writer, IndentFormatter::new());
        self.serialize(&mut ser).context("failed to serialize bulk document")?;
        Ok(())
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        let file = fs::File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        self.write_json(&mut writer)?;
        writer.flush().with_context(|| format!("failed to flush {}", path.display()))?;
        Ok(())
    }
}

impl Serialize for BulkDocument {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (sentence, vector) in &self.entries {
            map.serialize_entry(sentence, vector)?;
        }
        map.end()
    }
}

/// `output_root/<dataset without dots>/vectors_<model>`
pub fn bulk_output_dir(output_root: &Path, dataset: &str, model: &str) -> PathBuf {
    output_root.join(dataset.replace('.', "")).join(format!("vectors_{model}"))
}

/// Creates the bulk output directory (and its parents). An already existing
/// leaf is an error so earlier results are never mixed with new ones.
pub fn create_bulk_output_dir(output_root: &Path, dataset: &str, model: &str) -> Result<PathBuf> {
    let dir = bulk_output_dir(output_root, dataset, model);
    if let Some(parent) = dir.parent() {
        fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;
    }
    match fs::create_dir(&dir) {
        Ok(()) => Ok(dir),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(Error::OutputExists(dir).into()),
        Err(e) => Err(e).with_context(|| format!("failed to create {}", dir.display())),
    }
}

/// JSON layout of the bulk files: 4-space indent, `"key":value` with no space
/// after the colon, non-ASCII escaped as `\uXXXX`, no trailing newline.
#[derive(Debug, Default)]
pub struct IndentFormatter {
    current_indent: usize,
    has_value: bool,
}

impl IndentFormatter {
    const INDENT: &'static [u8] = b"    ";

    pub fn new() -> Self { Self::default() }

    fn indent<W: ?Sized + Write>(&self, writer: &mut W) -> io::Result<()> {
        for _ in 0..self.current_indent {
            writer.write_all(Self::INDENT)?;
        }
        Ok(())
    }
}

impl serde_json::ser::Formatter for IndentFormatter {
    fn begin_array<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.current_indent += 1;
        self.has_value = false;
        writer.write_all(b"[")
    }

    fn end_array<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.current_indent -= 1;
        if self.has_value {
            writer.write_all(b"\n")?;
            self.indent(writer)?;
        }
        writer.write_all(b"]")
    }

    fn begin_array_value<W: ?Sized + Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        writer.write_all(if first { b"\n" } else { b",\n" })?;
        self.indent(writer)
    }

    fn end_array_value<W: ?Sized + Write>(&mut self, _writer: &mut W) -> io::Result<()> {
        self.has_value = true;
        Ok(())
    }

    fn begin_object<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.current_indent += 1;
        self.has_value = false;
        writer.write_all(b"{")
    }

    fn end_object<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.current_indent -= 1;
        if self.has_value {
            writer.write_all(b"\n")?;
            self.indent(writer)?;
        }
        writer.write_all(b"}")
    }

    fn begin_object_key<W: ?Sized + Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        writer.write_all(if first { b"\n" } else { b",\n" })?;
        self.indent(writer)
    }

    fn begin_object_value<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b":")
    }

    fn end_object_value<W: ?Sized + Write>(&mut self, _writer: &mut W) -> io::Result<()> {
        self.has_value = true;
        Ok(())
    }

    fn write_string_fragment<W: ?Sized + Write>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()> {
        let mut start = 0;
        for (i, ch) in fragment.char_indices() {
            if ch.is_ascii() { continue; }
            writer.write_all(fragment[start..i].as_bytes())?;
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                write!(writer, "\\u{unit:04x}")?;
            }
            start = i + ch.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }
}
