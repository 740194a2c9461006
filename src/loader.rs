/// Module loading with cycle detection and per-URI memoization
///
/// Each distinct absolute URI is fetched and executed at most once per loader. A URI that is
/// requested again while it is still loading is a cycle and fails immediately.
use std::cell::RefCell;
use std::collections::HashMap;
use url::Url;

use crate::context::LoadContext;
use crate::error::{Error, Result};
use crate::fetch::SourceFetcher;

/// Script execution capability
///
/// Runs source text as the module identified by `uri` and returns its globals. Implementations
/// route nested load requests back into the same `ModuleLoader` with `uri` as the base.
pub trait Execute {
    type Globals: Clone;

    fn execute(&self, uri: &Url, source: &str) -> Result<Self::Globals>;
}

/// Load state of one module
#[derive(Debug, Clone)]
pub enum LoadState<G> {
    Pending,
    Ready(G),
    Failed(Error),
}

#[derive(Debug, Clone)]
pub struct LoadEntry<G> {
    pub uri: Url,
    pub state: LoadState<G>,
}

/// URI → load entry, owned by one loader
#[derive(Debug)]
pub struct LoadGraph<G> {
    entries: HashMap<String, LoadEntry<G>>,
}

impl<G> Default for LoadGraph<G> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<G: Clone> LoadGraph<G> {
    pub fn get(&self, uri: &Url) -> Option<&LoadEntry<G>> {
        self.entries.get(uri.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert a `Pending` marker for `uri`
    fn begin(&mut self, uri: &Url) {
        self.entries.insert(
            uri.to_string(),
            LoadEntry {
                uri: uri.clone(),
                state: LoadState::Pending,
            },
        );
    }

    /// Replace the `Pending` marker with the outcome
    fn settle(&mut self, uri: &Url, result: &Result<G>) {
        let state = match result {
            Ok(globals) => LoadState::Ready(globals.clone()),
            Err(err) => LoadState::Failed(err.clone()),
        };
        self.entries.insert(
            uri.to_string(),
            LoadEntry {
                uri: uri.clone(),
                state,
            },
        );
    }
}

/// Resolves, fetches and executes modules
///
/// Single-threaded: the graph sits in a `RefCell` and is never borrowed across a fetch or an
/// execution, so nested loads issued by a running script can update it.
pub struct ModuleLoader<G> {
    fetcher: Box<dyn SourceFetcher>,
    graph: RefCell<LoadGraph<G>>,
    ctx: LoadContext,
}

impl<G: Clone> ModuleLoader<G> {
    pub fn new(fetcher: Box<dyn SourceFetcher>, ctx: LoadContext) -> Self {
        Self {
            fetcher,
            graph: RefCell::new(LoadGraph::default()),
            ctx,
        }
    }

    pub fn context(&self) -> &LoadContext {
        &self.ctx
    }

    /// Resolve `module_ref` against the loading module's URI
    pub fn resolve(module_ref: &str, loading: &Url) -> Result<Url> {
        let mut uri = loading.join(module_ref).map_err(|e| Error::Reference {
            reference: module_ref.to_string(),
            reason: format!("cannot resolve against {loading}: {e}"),
        })?;
        uri.set_fragment(None);
        Ok(uri)
    }

    /// Load `module_ref` on behalf of the module at `loading`
    pub fn load<X>(&self, exec: &X, module_ref: &str, loading: &Url) -> Result<G>
    where
        X: Execute<Globals = G>,
    {
        let uri = Self::resolve(module_ref, loading)?;

        {
            let mut graph = self.graph.borrow_mut();
            let state = graph.get(&uri).map(|entry| entry.state.clone());
            match state {
                Some(LoadState::Pending) => {
                    tracing::debug!(operation = "load", status = "cycle", uri = %uri, "cycle in load graph");
                    return Err(Error::Cycle {
                        uri: uri.to_string(),
                    });
                }
                Some(LoadState::Ready(globals)) => {
                    tracing::debug!(operation = "load", status = "hit", uri = %uri, "module already loaded");
                    return Ok(globals);
                }
                Some(LoadState::Failed(err)) => {
                    tracing::debug!(operation = "load", status = "hit", uri = %uri, "module previously failed");
                    return Err(err);
                }
                None => graph.begin(&uri),
            }
        }

        tracing::debug!(operation = "load", status = "miss", uri = %uri, "loading module");

        let result = self
            .ctx
            .check(uri.as_str())
            .and_then(|()| self.fetcher.fetch_source(&uri, &self.ctx))
            .and_then(|source| exec.execute(&uri, &source));

        if let Err(err) = &result {
            tracing::debug!(operation = "load", status = "error", uri = %uri, "{}", err);
        }

        self.graph.borrow_mut().settle(&uri, &result);
        result
    }

    /// Current state of `uri`, if it was ever requested
    pub fn state(&self, uri: &Url) -> Option<LoadState<G>> {
        self.graph
            .borrow()
            .get(uri)
            .map(|entry| entry.state.clone())
    }

    /// Number of distinct modules requested so far
    pub fn module_count(&self) -> usize {
        self.graph.borrow().len()
    }
}
