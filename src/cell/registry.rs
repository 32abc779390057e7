use super::converter::{BytesConverter, BYTES_CONVERTER};
use super::identity::{Identity, IDENTITY};
use super::reader::{FileReader, McastReader, FILE_READER, MCAST_READER};
use super::runtime::{CellConfig, StopSignal};
use super::vbv::{VbvCell, VBV};
use super::writer::{FileWriter, FILE_WRITER};
use super::{Cell, CellCtor};
use crate::config::Config;
use crate::error::{PipeError, Result};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CellCategory {
    Source,
    Transform,
    Sink,
    Analysis,
}

impl CellCategory {
    pub const ALL: [CellCategory; 4] = [
        CellCategory::Source,
        CellCategory::Transform,
        CellCategory::Sink,
        CellCategory::Analysis,
    ];
}

impl fmt::Display for CellCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CellCategory::Source => "Source",
            CellCategory::Transform => "Transform",
            CellCategory::Sink => "Sink",
            CellCategory::Analysis => "Analysis",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy)]
struct Entry {
    name: &'static str,
    category: CellCategory,
    create: CellCtor,
    short_help: fn() -> String,
    help: fn() -> String,
}

/// Builds cells by name. Registration order is kept for listings.
pub struct Registry {
    config: Config,
    entries: Vec<Entry>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("config", &self.config)
            .field("cells", &self.names())
            .finish()
    }
}

impl Registry {
    /// Registry with every built-in cell.
    pub fn new(config: Config) -> Self {
        let mut registry = Self::empty(config);
        registry.register(
            FILE_READER,
            CellCategory::Source,
            FileReader::create,
            FileReader::short_help,
            FileReader::help,
        );
        registry.register(
            MCAST_READER,
            CellCategory::Source,
            McastReader::create,
            McastReader::short_help,
            McastReader::help,
        );
        registry.register(
            BYTES_CONVERTER,
            CellCategory::Transform,
            BytesConverter::create,
            BytesConverter::short_help,
            BytesConverter::help,
        );
        registry.register(
            IDENTITY,
            CellCategory::Transform,
            Identity::create,
            Identity::short_help,
            Identity::help,
        );
        registry.register(
            FILE_WRITER,
            CellCategory::Sink,
            FileWriter::create,
            FileWriter::short_help,
            FileWriter::help,
        );
        registry.register(
            VBV,
            CellCategory::Analysis,
            VbvCell::create,
            VbvCell::short_help,
            VbvCell::help,
        );
        registry
    }

    pub fn empty(config: Config) -> Self {
        Self {
            config,
            entries: Vec::new(),
        }
    }

    /// Adds a cell kind; a later registration under the same name replaces it.
    pub fn register(
        &mut self,
        name: &'static str,
        category: CellCategory,
        create: CellCtor,
        short_help: fn() -> String,
        help: fn() -> String,
    ) {
        self.entries.retain(|e| e.name != name);
        self.entries.push(Entry {
            name,
            category,
            create,
            short_help,
            help,
        });
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn entry(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entry(name).is_some()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.name).collect()
    }

    pub fn category(&self, name: &str) -> Option<CellCategory> {
        self.entry(name).map(|e| e.category)
    }

    /// Instantiates `name` with its properties.
    ///
    /// Invalid properties print the cell's help to stderr before failing.
    pub fn create(&self, name: &str, signal: StopSignal, config: &CellConfig) -> Result<Cell> {
        let entry = self
            .entry(name)
            .ok_or_else(|| PipeError::CellNotSupported(name.to_string()))?;
        match (entry.create)(signal, config, &self.config) {
            Err(e @ PipeError::InvalidCellConfig(_)) => {
                eprintln!("{}", (entry.help)());
                Err(e)
            }
            result => result,
        }
    }

    /// Full help text of one cell.
    pub fn help(&self, name: &str) -> Option<String> {
        self.entry(name).map(|e| (e.help)())
    }

    /// One line per cell, grouped by category.
    pub fn list(&self) -> String {
        self.render(|e| (e.short_help)())
    }

    /// Full help of every cell, grouped by category.
    pub fn full_help(&self) -> String {
        self.render(|e| (e.help)())
    }

    fn render(&self, text: impl Fn(&Entry) -> String) -> String {
        let mut out = String::new();
        for category in CellCategory::ALL {
            let entries: Vec<&Entry> = self
                .entries
                .iter()
                .filter(|e| e.category == category)
                .collect();
            if entries.is_empty() {
                continue;
            }
            out.push_str(&format!("{}:\n", category));
            for entry in entries {
                for line in text(entry).lines() {
                    out.push_str(&format!("  {}\n", line));
                }
            }
        }
        out
    }
}
