//! Scriptable symbol index.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracebox_runtime::{Error, Result, SymbolIndex};

/// Handle: the resolved type name plus a version, so tests can make the
/// "same" symbol come back as a different handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FakeHandle {
    pub name: String,
    pub version: u32,
}

/// Target: where a handle plus line number points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeTarget {
    pub name: String,
    pub version: u32,
    pub line: u32,
}

#[derive(Default)]
pub struct FakeSymbolIndex {
    symbols: Mutex<HashMap<String, u32>>,
    failing: Mutex<HashSet<String>>,
    panicking: Mutex<HashSet<String>>,
    resolve_calls: AtomicUsize,
    location_calls: AtomicUsize,
}

impl FakeSymbolIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_symbols<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let index = Self::new();
        for name in names {
            index.insert(name);
        }
        index
    }

    /// Add a symbol, or bump its version if present.
    pub fn insert(&self, name: &str) {
        *self.symbols.lock().entry(name.to_string()).or_insert(0) += 1;
    }

    pub fn remove(&self, name: &str) {
        self.symbols.lock().remove(name);
    }

    /// Make lookups of `name` return an error.
    pub fn fail_on(&self, name: &str) {
        self.failing.lock().insert(name.to_string());
    }

    /// Make lookups of `name` panic.
    pub fn panic_on(&self, name: &str) {
        self.panicking.lock().insert(name.to_string());
    }

    pub fn heal(&self, name: &str) {
        self.failing.lock().remove(name);
        self.panicking.lock().remove(name);
    }

    pub fn resolve_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }

    pub fn location_calls(&self) -> usize {
        self.location_calls.load(Ordering::SeqCst)
    }

    fn lookup(&self, name: &str) -> Result<Option<FakeHandle>> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        if self.panicking.lock().contains(name) {
            panic!("injected panic resolving {name}");
        }
        if self.failing.lock().contains(name) {
            return Err(Error::Index(format!("injected failure resolving {name}")));
        }
        Ok(self.symbols.lock().get(name).map(|version| FakeHandle {
            name: name.to_string(),
            version: *version,
        }))
    }
}

impl SymbolIndex for FakeSymbolIndex {
    type Handle = FakeHandle;
    type Target = FakeTarget;

    fn resolve(&self, qualified_name: &str) -> Result<Option<FakeHandle>> {
        self.lookup(qualified_name)
    }

    fn resolve_enclosing_type(&self, qualified_name: &str) -> Result<Option<FakeHandle>> {
        self.lookup(qualified_name)
    }

    fn location_of(&self, handle: &FakeHandle, line_number: Option<u32>) -> Result<Option<FakeTarget>> {
        self.location_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(FakeTarget {
            name: handle.name.clone(),
            version: handle.version,
            line: line_number.unwrap_or(1),
        }))
    }
}
