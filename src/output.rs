//! Output Writers
//!
//! A [`RelationWriter`] receives a finished relation as a forward iteration
//! over its tuples. Writers never see the relation itself, so a failed write
//! cannot disturb in-memory state.
//!
//! ## File format
//!
//! [`CsvWriter`] writes `<dir>/<relation>.csv`, one tuple per line, columns
//! separated by the configured delimiter (tab by default), in index order:
//!
//! ```text
//! 1	2
//! 1	3
//! 2	3
//! ```

use crate::tuple::Word;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Sink for finished relations.
pub trait RelationWriter: Send {
    fn write_relation(
        &mut self,
        name: &str,
        arity: usize,
        tuples: &mut dyn Iterator<Item = &[Word]>,
    ) -> io::Result<()>;
}

/// Options for delimited output
#[derive(Debug, Clone)]
pub struct CsvOptions {
    /// Field delimiter (default: tab)
    pub delimiter: char,
    /// File extension without the dot (default: "csv")
    pub extension: String,
    /// Write a `v0<delim>v1..` header line first (default: false)
    pub header: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        CsvOptions {
            delimiter: '\t',
            extension: "csv".to_string(),
            header: false,
        }
    }
}

/// Writes each relation to its own delimited file.
#[derive(Debug, Clone)]
pub struct CsvWriter {
    directory: PathBuf,
    options: CsvOptions,
}

impl CsvWriter {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self::with_options(directory, CsvOptions::default())
    }

    pub fn with_options(directory: impl Into<PathBuf>, options: CsvOptions) -> Self {
        CsvWriter {
            directory: directory.into(),
            options,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// File a relation named `name` is written to.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.directory
            .join(format!("{name}.{}", self.options.extension))
    }
}

impl RelationWriter for CsvWriter {
    fn write_relation(
        &mut self,
        name: &str,
        arity: usize,
        tuples: &mut dyn Iterator<Item = &[Word]>,
    ) -> io::Result<()> {
        fs::create_dir_all(&self.directory)?;
        let mut out = BufWriter::new(File::create(self.path_for(name))?);
        let delimiter = self.options.delimiter;
        if self.options.header {
            let names: Vec<String> = (0..arity).map(|i| format!("v{i}")).collect();
            writeln!(out, "{}", names.join(&delimiter.to_string()))?;
        }
        for tuple in tuples {
            write_row(&mut out, tuple, delimiter)?;
        }
        out.flush()
    }
}

fn write_row(out: &mut impl Write, tuple: &[Word], delimiter: char) -> io::Result<()> {
    for (i, value) in tuple.iter().enumerate() {
        if i > 0 {
            write!(out, "{delimiter}")?;
        }
        write!(out, "{value}")?;
    }
    writeln!(out)
}

/// Writes every relation to one stream, each preceded by its name.
pub struct StreamWriter<W: Write + Send> {
    out: W,
}

impl<W: Write + Send> StreamWriter<W> {
    pub fn new(out: W) -> Self {
        StreamWriter { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> RelationWriter for StreamWriter<W> {
    fn write_relation(
        &mut self,
        name: &str,
        _arity: usize,
        tuples: &mut dyn Iterator<Item = &[Word]>,
    ) -> io::Result<()> {
        writeln!(self.out, "---------------\n{name}\n===============")?;
        for tuple in tuples {
            write_row(&mut self.out, tuple, '\t')?;
        }
        writeln!(self.out, "===============")?;
        self.out.flush()
    }
}

/// Keeps written relations in memory, shared with any clone.
#[derive(Debug, Clone, Default)]
pub struct CollectingWriter {
    written: Arc<Mutex<HashMap<String, Vec<Vec<Word>>>>>,
}

impl CollectingWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tuples last written for `name`.
    pub fn get(&self, name: &str) -> Option<Vec<Vec<Word>>> {
        self.written.lock().get(name).cloned()
    }

    /// Names written so far, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.written.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

impl RelationWriter for CollectingWriter {
    fn write_relation(
        &mut self,
        name: &str,
        _arity: usize,
        tuples: &mut dyn Iterator<Item = &[Word]>,
    ) -> io::Result<()> {
        let rows = tuples.map(<[Word]>::to_vec).collect();
        self.written.lock().insert(name.to_string(), rows);
        Ok(())
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullWriter;

impl RelationWriter for NullWriter {
    fn write_relation(
        &mut self,
        _name: &str,
        _arity: usize,
        _tuples: &mut dyn Iterator<Item = &[Word]>,
    ) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<Vec<Word>> {
        vec![vec![1, 2], vec![1, 3], vec![-2, 3]]
    }

    fn write(writer: &mut dyn RelationWriter, name: &str) -> io::Result<()> {
        let rows = rows();
        let mut iter = rows.iter().map(Vec::as_slice);
        writer.write_relation(name, 2, &mut iter)
    }

    #[test]
    fn test_csv_writer_tab_separated() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = CsvWriter::new(dir.path());
        write(&mut writer, "path").unwrap();
        let text = std::fs::read_to_string(dir.path().join("path.csv")).unwrap();
        assert_eq!(text, "1\t2\n1\t3\n-2\t3\n");
    }

    #[test]
    fn test_csv_writer_options() {
        let dir = tempfile::tempdir().unwrap();
        let options = CsvOptions {
            delimiter: ',',
            extension: "facts".to_string(),
            header: true,
        };
        let mut writer = CsvWriter::with_options(dir.path().join("nested"), options);
        write(&mut writer, "edge").unwrap();
        let text = std::fs::read_to_string(writer.path_for("edge")).unwrap();
        assert_eq!(text, "v0,v1\n1,2\n1,3\n-2,3\n");
    }

    #[test]
    fn test_csv_writer_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let mut writer = CsvWriter::new(blocker.join("sub"));
        assert!(write(&mut writer, "path").is_err());
    }

    #[test]
    fn test_stream_writer() {
        let mut writer = StreamWriter::new(Vec::new());
        write(&mut writer, "path").unwrap();
        let text = String::from_utf8(writer.into_inner()).unwrap();
        assert!(text.starts_with("---------------\npath\n"));
        assert!(text.contains("1\t3\n"));
    }

    #[test]
    fn test_collecting_writer_shares_state() {
        let collector = CollectingWriter::new();
        let mut handle = collector.clone();
        write(&mut handle, "path").unwrap();
        assert_eq!(collector.get("path"), Some(rows()));
        assert_eq!(collector.names(), vec!["path".to_string()]);
        assert!(collector.get("edge").is_none());
    }
}
