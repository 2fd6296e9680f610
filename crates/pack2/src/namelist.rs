//! Hash to name side-table
//!
//! A namelist maps name hashes back to the names they were computed from.
//! Collisions resolve first-writer-wins: appending a name whose hash is
//! already present is silently ignored.
//!
//! Text form is one name per line. Loading accepts LF or CRLF and skips blank
//! lines; saving writes names sorted lexicographically, each terminated by LF.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::io::{BufRead, Write};

use crate::error::{Pack2Error, Pack2Result};
use crate::hash::hash_name;

/// Mapping from name hash to name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Namelist {
    names: HashMap<u64, String>,
}

impl Namelist {
    /// Create an empty namelist
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse newline-separated names
    pub fn load(text: &str) -> Self {
        let mut namelist = Self::new();
        namelist.append_text(text);
        namelist
    }

    /// Parse newline-separated names from a reader
    pub fn load_reader<R: BufRead>(reader: R) -> Pack2Result<Self> {
        let mut namelist = Self::new();
        for line in reader.lines() {
            namelist.append_line(&line?);
        }
        Ok(namelist)
    }

    /// Parse the payload of an embedded namelist asset
    pub fn from_bytes(data: &[u8]) -> Pack2Result<Self> {
        let text =
            std::str::from_utf8(data).map_err(|e| Pack2Error::InvalidNamelist(e.to_string()))?;
        Ok(Self::load(text))
    }

    /// Look up the name for a hash
    pub fn try_get(&self, hash: u64) -> Option<&str> {
        self.names.get(&hash).map(String::as_str)
    }

    /// Record `name` under `hash` unless the hash is already present
    ///
    /// Returns whether the name was inserted.
    pub fn append(&mut self, hash: u64, name: impl Into<String>) -> bool {
        match self.names.entry(hash) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(name.into());
                true
            }
        }
    }

    /// Hash `name` and record it
    pub fn append_name(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        self.append(hash_name(&name), name)
    }

    /// Merge another namelist; existing hashes keep their names
    pub fn append_namelist(&mut self, other: &Self) {
        for (&hash, name) in &other.names {
            self.append(hash, name.as_str());
        }
    }

    /// Add every non-blank line of `text`
    pub fn append_text(&mut self, text: &str) {
        for line in text.split('\n') {
            self.append_line(line);
        }
    }

    fn append_line(&mut self, line: &str) {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if !line.trim().is_empty() {
            self.append_name(line);
        }
    }

    /// Names in canonical (sorted) order
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.names.values().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Write the canonical text form
    pub fn save<W: Write>(&self, mut writer: W) -> Pack2Result<()> {
        for name in self.names() {
            writer.write_all(name.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Canonical text form as a string
    pub fn to_text(&self) -> String {
        self.names().iter().fold(String::new(), |mut text, name| {
            text.push_str(name);
            text.push('\n');
            text
        })
    }

    /// Iterate over `(hash, name)` pairs in no particular order
    pub fn iter(&self) -> impl Iterator<Item = (u64, &str)> {
        self.names.iter().map(|(&hash, name)| (hash, name.as_str()))
    }

    /// Number of names
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Check if the namelist is empty
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl<S: Into<String>> Extend<S> for Namelist {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        for name in iter {
            self.append_name(name);
        }
    }
}

impl<S: Into<String>> FromIterator<S> for Namelist {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut namelist = Self::new();
        namelist.extend(iter);
        namelist
    }
}
