use std::collections::HashMap;
use std::collections::hash_map::Entry;

use crate::error::{KsymtabError, Result};

/// Default capacity hint, large enough for the export table of a full vmlinux.
pub const KSYMTAB_SIZE: usize = 8192;

/// One exported (or candidate) symbol.
///
/// The value is the position of the symbol in `__ksymtab_strings` when the record comes from
/// [`crate::parse_ksymtab_strings`], but callers are free to store addresses instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ksym {
    name: String,
    value: u64,
    marked: bool,
    link: Option<String>,
}

impl Ksym {
    fn new(name: &str, value: u64) -> Self {
        Ksym {
            name: name.to_owned(),
            value,
            marked: false,
            link: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn is_marked(&self) -> bool {
        self.marked
    }

    pub fn link(&self) -> Option<&str> {
        self.link.as_deref()
    }
}

/// Registry of symbols keyed by name.
///
/// Records are only mutated through the registry so that the mark count is kept in sync with
/// the mark flags of the records: `mark_count() == iter().filter(|k| k.is_marked()).count()`.
#[derive(Debug)]
pub struct Ksymtab {
    symbols: HashMap<String, Ksym>,
    mark_count: usize,
}

impl Ksymtab {
    pub fn new() -> Self {
        Self::with_capacity(KSYMTAB_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Ksymtab {
            symbols: HashMap::with_capacity(capacity),
            mark_count: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.symbols.capacity()
    }

    /// Adds a new unmarked symbol without a link.
    /// Names must be unique and non-empty; a duplicate leaves the existing record untouched.
    pub fn insert(&mut self, name: &str, value: u64) -> Result<&Ksym> {
        self.insert_record(Ksym::new(name, value))
    }

    /// Adds a copy of `ksym` (possibly owned by another registry). Name, value and link are
    /// copied, the mark is not.
    pub fn insert_copy(&mut self, ksym: &Ksym) -> Result<&Ksym> {
        self.insert_record(Ksym {
            name: ksym.name.clone(),
            value: ksym.value,
            marked: false,
            link: ksym.link.clone(),
        })
    }

    fn insert_record(&mut self, ksym: Ksym) -> Result<&Ksym> {
        if ksym.name.is_empty() {
            return Err(KsymtabError::EmptySymbolName);
        }
        match self.symbols.entry(ksym.name.clone()) {
            Entry::Occupied(entry) => Err(KsymtabError::DuplicateSymbol(entry.key().clone())),
            Entry::Vacant(entry) => Ok(&*entry.insert(ksym)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Ksym> {
        if name.is_empty() {
            return None;
        }
        self.symbols.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Marks the symbol `name`. Returns false if there is no such symbol.
    pub fn mark(&mut self, name: &str) -> bool {
        match self.symbols.get_mut(name) {
            Some(ksym) => {
                if !ksym.marked {
                    ksym.marked = true;
                    self.mark_count += 1;
                }
                true
            }
            None => false,
        }
    }

    /// Replaces the link of the symbol `name`, `None` clears it.
    /// Returns false if there is no such symbol.
    pub fn set_link(&mut self, name: &str, link: Option<&str>) -> bool {
        match self.symbols.get_mut(name) {
            Some(ksym) => {
                ksym.link = link.map(str::to_owned);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Ksym> {
        let ksym = self.symbols.remove(name)?;
        if ksym.marked {
            self.mark_count -= 1;
        }
        Some(ksym)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn mark_count(&self) -> usize {
        self.mark_count
    }

    /// Iterates over all symbols in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Ksym> + '_ {
        self.symbols.values()
    }

    pub fn for_each<F>(&self, mut visitor: F)
    where
        F: FnMut(&Ksym),
    {
        self.iter().for_each(|ksym| visitor(ksym));
    }

    /// Iterates over the symbols which were never marked, as `(name, index)` pairs.
    pub fn unmarked(&self) -> impl Iterator<Item = (&str, usize)> + '_ {
        self.iter()
            .filter(|ksym| !ksym.marked)
            .map(|ksym| (ksym.name(), ksym.value as usize))
    }

    pub fn for_each_unmarked<F>(&self, mut visitor: F)
    where
        F: FnMut(&str, usize),
    {
        self.unmarked().for_each(|(name, index)| visitor(name, index));
    }

    /// All symbols ordered by value, ties broken by name.
    pub fn sorted_by_value(&self) -> Vec<&Ksym> {
        let mut symbols: Vec<&Ksym> = self.iter().collect();
        symbols.sort_by(|a, b| a.value.cmp(&b.value).then_with(|| a.name.cmp(&b.name)));
        symbols
    }
}

impl Default for Ksymtab {
    fn default() -> Self {
        Self::new()
    }
}
