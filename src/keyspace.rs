use std::collections::HashMap;

use crate::bitset::Bitset;

//-------------------------------------

/// What a key holds.  `Raw` stands in for the host's other value types;
/// bitset commands against it fail with a type error.
pub enum Entry {
    Bits(Bitset),
    Raw(Vec<u8>),
}

/// The key exists but does not hold a bitset.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WrongType;

/// An in-process stand-in for the hosting server's keyspace.  All bitset
/// commands are driven against this; reads treat an absent key as an
/// empty set.
#[derive(Default)]
pub struct KeySpace {
    entries: HashMap<String, Entry>,
}

impl KeySpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flush(&mut self) {
        self.entries.clear();
    }

    pub fn delete(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn set_raw(&mut self, key: &str, bytes: Vec<u8>) {
        self.entries.insert(key.to_string(), Entry::Raw(bytes));
    }

    pub fn entry(&self, key: &str) -> Option<&Entry> {
        self.entries.get(key)
    }

    pub fn put_bits(&mut self, key: &str, bits: Bitset) {
        self.entries.insert(key.to_string(), Entry::Bits(bits));
    }

    /// Read access; absent keys read as `None`.
    pub fn bits(&self, key: &str) -> Result<Option<&Bitset>, WrongType> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(Entry::Bits(b)) => Ok(Some(b)),
            Some(Entry::Raw(_)) => Err(WrongType),
        }
    }

    /// Write access to an existing entry only.
    pub fn bits_mut(&mut self, key: &str) -> Result<Option<&mut Bitset>, WrongType> {
        match self.entries.get_mut(key) {
            None => Ok(None),
            Some(Entry::Bits(b)) => Ok(Some(b)),
            Some(Entry::Raw(_)) => Err(WrongType),
        }
    }

    /// Write access, creating an empty bitset for an absent key.
    pub fn bits_entry(&mut self, key: &str) -> Result<&mut Bitset, WrongType> {
        match self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::Bits(Bitset::new()))
        {
            Entry::Bits(b) => Ok(b),
            Entry::Raw(_) => Err(WrongType),
        }
    }
}

//-------------------------------------


//-------------------------------------
