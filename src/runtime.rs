/// Runtime environment for one `yas` invocation
///
/// Resolves configuration, owns the persistent HTTP cache store and the load context, and wires
/// fetcher, loader and engine together for a run or a REPL session.
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufRead, Write};
use std::sync::Arc;
use url::Url;

use crate::config::{Overrides, RuntimeConfig};
use crate::context::LoadContext;
use crate::engine::{Predeclared, QuickJsEngine};
use crate::fetch::{CachingTransport, ContentFetcher, HttpTransport, ReqwestTransport};
use crate::home;
use crate::reference::{self, REPL};
use crate::storage::{CacheStore, RocksStore};

pub struct RuntimeEnvironment {
    config: RuntimeConfig,
    tool_ref: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    store: Option<Arc<RocksStore>>,
    ctx: LoadContext,
}

impl RuntimeEnvironment {
    /// Resolve configuration, create the home directory and open the cache store
    ///
    /// Fails when the store cannot be created or opened (e.g. held by another process).
    pub fn new<I>(tool_ref: &str, args: Vec<String>, env: I, overrides: &Overrides) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let env: BTreeMap<String, String> = env.into_iter().collect();
        let config = RuntimeConfig::resolve(&env, overrides)?;

        fs::create_dir_all(&config.home).with_context(|| {
            format!("Failed to create home directory: {}", config.home.display())
        })?;

        let store = if config.cache {
            let path = home::db_path(&config.home);
            let store = RocksStore::open(&path)
                .with_context(|| format!("Failed to open HTTP cache at {}", path.display()))?;
            Some(Arc::new(store))
        } else {
            None
        };

        let ctx = match config.deadline {
            Some(deadline) => LoadContext::with_timeout(deadline),
            None => LoadContext::new(),
        };

        tracing::debug!(
            home = %config.home.display(),
            default_host = %config.default_host,
            cache = config.cache,
            "runtime environment ready"
        );

        Ok(Self {
            config,
            tool_ref: tool_ref.to_string(),
            args,
            env,
            store,
            ctx,
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Load context shared by every fetch and load of this environment
    pub fn context(&self) -> &LoadContext {
        &self.ctx
    }

    /// Whether the tool reference selects the interactive mode
    pub fn is_repl(&self) -> bool {
        self.tool_ref == REPL
    }

    /// Canonical tool URI and fragment
    pub fn resolve_tool(&self) -> Result<(Url, String)> {
        let (uri, fragment) = reference::normalize(&self.tool_ref, &self.config.default_host)?;
        Ok((reference::to_url(&uri)?, fragment))
    }

    /// Globals exposed to scripts
    pub fn predeclared(&self, tool: &Url, fragment: &str) -> Predeclared {
        Predeclared {
            args: self.args.clone(),
            env: self.env.clone(),
            tool: tool.to_string(),
            frag: fragment.to_string(),
        }
    }

    fn fetcher(&self) -> Result<ContentFetcher> {
        let transport = ReqwestTransport::new(&self.config.user_agent, self.config.http_timeout)?;

        let http: Box<dyn HttpTransport> = match &self.store {
            Some(store) => {
                let store: Arc<dyn CacheStore> = store.clone();
                Box::new(CachingTransport::new(transport, store))
            }
            None => Box::new(transport),
        };

        Ok(ContentFetcher::new(http))
    }

    fn engine(&self) -> Result<QuickJsEngine> {
        QuickJsEngine::new(Box::new(self.fetcher()?), self.ctx.clone())
    }

    /// Fetch and execute the tool, then its fragment entry point
    pub fn run(&self) -> Result<()> {
        let (tool, fragment) = self.resolve_tool()?;
        let predeclared = self.predeclared(&tool, &fragment);

        tracing::info!(operation = "run", uri = %tool, fragment = %fragment, "running tool");

        let engine = self.engine()?;
        engine.run(&predeclared, &tool, &fragment)?;

        tracing::debug!(
            operation = "run",
            status = "success",
            uri = %tool,
            modules = engine.loader().module_count(),
            "tool finished"
        );

        Ok(())
    }

    /// Interactive session; relative loads resolve against the canonical URI of `repl`
    pub fn repl<R: BufRead, W: Write>(&self, input: R, output: W) -> Result<()> {
        let (base, _) = reference::normalize(REPL, &self.config.default_host)?;
        let base = reference::to_url(&base)?;
        let predeclared = self.predeclared(&base, "");

        let engine = self.engine()?;
        engine.repl(&predeclared, &base, input, output)
    }

    /// Release the cache store
    pub fn shutdown(self) {
        if let Some(store) = self.store {
            match Arc::try_unwrap(store) {
                Ok(store) => {
                    tracing::debug!(path = %store.path().display(), "closing HTTP cache");
                    drop(store);
                }
                Err(_) => tracing::warn!("HTTP cache still in use at shutdown"),
            }
        }
    }
}
