use arc_swap::ArcSwap;
use notify::{Event, EventKind, PollWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::channel;
use std::thread::JoinHandle;
use std::time::Duration;
use walkdir::WalkDir;

use crate::gate::ReadinessGate;
use crate::navigation::SymbolIndex;
use crate::{Error, Result};

const SOURCE_EXTENSIONS: &[&str] = &["java", "kt", "scala", "groovy"];

/// A type found in a source tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceSymbol {
    pub qualified_name: String,
    pub path: PathBuf,
}

/// Place to jump to: a file and a 1-based line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceLocation {
    pub path: PathBuf,
    pub line: u32,
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.path.display(), self.line)
    }
}

/// Symbol index over JVM source directories, keyed by path-derived names.
///
/// `src/main/java/com/foo/Bar.java` under root `src/main/java` becomes
/// `com.foo.Bar`. Kotlin files also register their file facade class
/// (`main.kt` -> `MainKt`).
pub struct SourceTreeIndex {
    roots: Vec<PathBuf>,
    symbols: ArcSwap<HashMap<String, PathBuf>>,
    gate: Arc<ReadinessGate>,
}

/// Keeps a source index fresh while alive.
pub struct SourceWatch {
    _watcher: PollWatcher,
    _handle: JoinHandle<()>,
}

impl SourceTreeIndex {
    /// Create an empty index. Call [`rescan`](Self::rescan) to populate it.
    pub fn new(roots: Vec<PathBuf>, gate: Arc<ReadinessGate>) -> Self {
        Self {
            roots,
            symbols: ArcSwap::from_pointee(HashMap::new()),
            gate,
        }
    }

    pub fn gate(&self) -> &Arc<ReadinessGate> {
        &self.gate
    }

    pub fn len(&self) -> usize {
        self.symbols.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.load().is_empty()
    }

    /// Rebuild the symbol map. The gate is unavailable while this runs.
    pub fn rescan(&self) -> usize {
        self.gate.mark_unavailable();

        let mut symbols = HashMap::new();
        for root in &self.roots {
            if !root.is_dir() {
                tracing::warn!(root = %root.display(), "Source root is not a directory");
                continue;
            }
            for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
                let path = entry.path();
                if !entry.file_type().is_file() || !is_source_file(path) {
                    continue;
                }
                for name in qualified_names(root, path) {
                    symbols.entry(name).or_insert_with(|| path.to_path_buf());
                }
            }
        }

        let count = symbols.len();
        self.symbols.store(Arc::new(symbols));
        self.gate.mark_ready();
        tracing::info!(symbols = count, roots = self.roots.len(), "Source index rebuilt");
        count
    }

    /// Rescan whenever source files appear or disappear under the roots.
    pub fn watch(self: &Arc<Self>, poll_interval: Duration) -> Result<SourceWatch> {
        let (tx, rx) = channel();
        let config = notify::Config::default().with_poll_interval(poll_interval);

        let mut watcher = PollWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    let _ = tx.send(event);
                }
            },
            config,
        )?;

        for root in &self.roots {
            if root.exists() {
                watcher.watch(root, RecursiveMode::Recursive)?;
            }
        }

        let index = Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name("source-index-watch".to_string())
            .spawn(move || {
                // Ends when the watcher, and with it the sender, is dropped.
                while let Ok(event) = rx.recv() {
                    let mut relevant = affects_sources(&event);
                    while let Ok(event) = rx.try_recv() {
                        relevant |= affects_sources(&event);
                    }
                    if relevant {
                        index.rescan();
                    }
                }
            })
            .map_err(Error::Io)?;

        Ok(SourceWatch {
            _watcher: watcher,
            _handle: handle,
        })
    }

    fn lookup(&self, qualified_name: &str) -> Option<SourceSymbol> {
        let symbols = self.symbols.load();
        let found = symbols.get_key_value(qualified_name).or_else(|| {
            // Nested classes live in their outer class's file.
            let (outer, _) = qualified_name.split_once('$')?;
            symbols.get_key_value(outer)
        });
        found.map(|(name, path)| SourceSymbol {
            qualified_name: name.clone(),
            path: path.clone(),
        })
    }
}

impl SymbolIndex for SourceTreeIndex {
    type Handle = SourceSymbol;
    type Target = SourceLocation;

    fn resolve(&self, qualified_name: &str) -> Result<Option<SourceSymbol>> {
        Ok(self.lookup(qualified_name))
    }

    fn resolve_enclosing_type(&self, qualified_name: &str) -> Result<Option<SourceSymbol>> {
        Ok(self.lookup(qualified_name))
    }

    fn location_of(
        &self,
        handle: &SourceSymbol,
        line_number: Option<u32>,
    ) -> Result<Option<SourceLocation>> {
        if !handle.path.is_file() {
            return Ok(None);
        }
        let line = match line_number {
            Some(line) if line >= 1 => {
                let content = std::fs::read_to_string(&handle.path)?;
                if line as usize <= content.lines().count() { line } else { 1 }
            }
            _ => 1,
        };
        Ok(Some(SourceLocation {
            path: handle.path.clone(),
            line,
        }))
    }
}

fn is_source_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
}

fn affects_sources(event: &Event) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Remove(_))
        && event.paths.iter().any(|path| is_source_file(path))
}

fn qualified_names(root: &Path, path: &Path) -> Vec<String> {
    let Ok(relative) = path.strip_prefix(root) else {
        return Vec::new();
    };
    let Some(stem) = relative.file_stem().and_then(|s| s.to_str()) else {
        return Vec::new();
    };
    let package: Vec<&str> = relative
        .parent()
        .into_iter()
        .flat_map(|parent| parent.iter())
        .filter_map(|part| part.to_str())
        .collect();

    let qualify = |simple: &str| {
        let mut parts = package.clone();
        parts.push(simple);
        parts.join(".")
    };

    let mut names = vec![qualify(stem)];
    if relative.extension().is_some_and(|ext| ext == "kt") {
        let mut chars = stem.chars();
        if let Some(first) = chars.next() {
            let facade = format!("{}{}Kt", first.to_uppercase(), chars.as_str());
            names.push(qualify(&facade));
        }
    }
    names
}
