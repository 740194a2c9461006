// QuickJS backend
//
// Every module runs inside its own function scope with three local bindings:
// - `exports`: object whose final contents are the module's globals
// - `load(ref)`: loads `ref` relative to this module and returns its `exports`
// - `module`: `{ uri }`
// Shared globals: `args`, `env`, `tool`, `frag` and `print(...)`.

use anyhow::anyhow;
use rquickjs::{
    convert::Coerced, function::Rest, CatchResultExt, CaughtError, Context, Ctx, Exception,
    Function, Object, Persistent, Runtime, Value,
};
use std::cell::RefCell;
use std::io::{BufRead, Write};
use std::rc::{Rc, Weak};
use url::Url;

use super::Predeclared;
use crate::context::LoadContext;
use crate::error::{Error, Result};
use crate::fetch::SourceFetcher;
use crate::loader::{Execute, ModuleLoader};

/// A module's `exports`, kept alive outside of any context scope
pub type ModuleGlobals = Persistent<Object<'static>>;

pub type JsLoader = ModuleLoader<ModuleGlobals>;

/// QuickJS runtime with a single context shared by all modules of one run
///
/// Owns the module loader. Field order matters: the loader holds persistent JS values and
/// must be dropped while the runtime is still alive.
pub struct QuickJsEngine {
    loader: Rc<JsLoader>,
    context: Context,
    _runtime: Runtime,
}

impl QuickJsEngine {
    /// Create the runtime; scripts are interrupted once `ctx` is cancelled or expired
    pub fn new(fetcher: Box<dyn SourceFetcher>, ctx: LoadContext) -> anyhow::Result<Self> {
        let runtime =
            Runtime::new().map_err(|e| anyhow!("Failed to create QuickJS runtime: {}", e))?;

        let interrupt = ctx.clone();
        runtime.set_interrupt_handler(Some(Box::new(move || interrupt.is_done())));

        let context = Context::full(&runtime)
            .map_err(|e| anyhow!("Failed to create QuickJS context: {}", e))?;

        Ok(Self {
            loader: Rc::new(ModuleLoader::new(fetcher, ctx)),
            context,
            _runtime: runtime,
        })
    }

    pub fn loader(&self) -> &JsLoader {
        &self.loader
    }

    /// Load and execute the tool module, then invoke the `entry` export if it is a function
    pub fn run(&self, predeclared: &Predeclared, tool: &Url, entry: &str) -> Result<()> {
        let loader = &self.loader;
        self.context.with(|ctx| {
            install_globals(&ctx, predeclared)
                .catch(&ctx)
                .map_err(|e| Error::Execution {
                    uri: tool.to_string(),
                    message: e.to_string(),
                })?;

            let exec = JsExecutor::new(ctx.clone(), Rc::clone(loader));
            let exports = loader.load(&exec, tool.as_str(), tool)?;

            if !entry.is_empty() {
                exec.call_entry(exports, tool, entry)?;
            }

            Ok(())
        })
    }

    /// Interactive loop: evaluate each input line and print non-undefined results
    ///
    /// Relative `load()` calls resolve against `base`.
    pub fn repl<R: BufRead, W: Write>(
        &self,
        predeclared: &Predeclared,
        base: &Url,
        input: R,
        mut output: W,
    ) -> anyhow::Result<()> {
        self.context.with(|ctx| {
            install_globals(&ctx, predeclared).map_err(|e| anyhow!("{}", e))?;

            let exec = JsExecutor::new(ctx.clone(), Rc::clone(&self.loader));
            let load = exec.load_function(base).map_err(|e| anyhow!("{}", e))?;
            ctx.globals()
                .set("load", load)
                .map_err(|e| anyhow!("{}", e))?;

            write!(output, ">>> ")?;
            output.flush()?;

            for line in input.lines() {
                let line = line?;
                if !line.trim().is_empty() {
                    let result = ctx
                        .eval::<Value, _>(line)
                        .and_then(|value| display_value(&value))
                        .catch(&ctx);
                    match result {
                        Ok(Some(text)) => writeln!(output, "{}", text)?,
                        Ok(None) => {}
                        Err(e) => writeln!(output, "error: {}", e)?,
                    }
                }
                write!(output, ">>> ")?;
                output.flush()?;
            }
            writeln!(output)?;

            Ok(())
        })
    }
}

fn display_value(value: &Value<'_>) -> rquickjs::Result<Option<String>> {
    if value.is_undefined() {
        return Ok(None);
    }
    let text: Coerced<String> = value.get()?;
    Ok(Some(text.0))
}

fn install_globals<'js>(ctx: &Ctx<'js>, predeclared: &Predeclared) -> rquickjs::Result<()> {
    let globals = ctx.globals();

    globals.set("args", predeclared.args.clone())?;

    let env = Object::new(ctx.clone())?;
    for (name, value) in &predeclared.env {
        env.set(name.as_str(), value.as_str())?;
    }
    globals.set("env", env)?;

    globals.set("tool", predeclared.tool.as_str())?;
    globals.set("frag", predeclared.frag.as_str())?;
    globals.set("print", Function::new(ctx.clone(), print)?)?;

    Ok(())
}

/// `print(...)`: arguments joined by spaces on stdout; a failed write throws
fn print<'js>(ctx: Ctx<'js>, parts: Rest<Coerced<String>>) -> rquickjs::Result<()> {
    let parts: Vec<String> = parts.0.into_iter().map(|part| part.0).collect();
    write_line(std::io::stdout().lock(), &parts)
        .map_err(|e| Exception::throw_message(&ctx, &format!("print: {}", e)))
}

fn write_line<W: Write>(mut out: W, parts: &[String]) -> std::io::Result<()> {
    writeln!(out, "{}", parts.join(" "))?;
    out.flush()
}

/// Executes modules inside one context scope and routes `load()` back into the loader
struct JsExecutor<'js> {
    ctx: Ctx<'js>,
    loader: Rc<JsLoader>,
    /// Typed error of the last failed `load()`, so it surfaces unchanged through the importers
    failure: Rc<RefCell<Option<Error>>>,
}

impl<'js> JsExecutor<'js> {
    fn new(ctx: Ctx<'js>, loader: Rc<JsLoader>) -> Self {
        Self {
            ctx,
            loader,
            failure: Rc::new(RefCell::new(None)),
        }
    }

    /// `load(ref)` bound to the module at `base`
    fn load_function(&self, base: &Url) -> rquickjs::Result<Function<'js>> {
        let loader: Weak<JsLoader> = Rc::downgrade(&self.loader);
        let failure = Rc::clone(&self.failure);
        let base = base.clone();

        Function::new(
            self.ctx.clone(),
            move |ctx: Ctx<'js>, module_ref: String| -> rquickjs::Result<Object<'js>> {
                let loader = loader
                    .upgrade()
                    .ok_or_else(|| Exception::throw_message(&ctx, "module loader is gone"))?;
                let exec = JsExecutor {
                    ctx: ctx.clone(),
                    loader: Rc::clone(&loader),
                    failure: Rc::clone(&failure),
                };
                match loader.load(&exec, &module_ref, &base) {
                    Ok(globals) => globals.restore(&ctx),
                    Err(err) => {
                        let message = err.to_string();
                        *failure.borrow_mut() = Some(err);
                        Err(Exception::throw_message(&ctx, &message))
                    }
                }
            },
        )
    }

    fn run_module(&self, uri: &Url, source: &str) -> rquickjs::Result<Object<'js>> {
        let wrapped = format!("(function (exports, load, module) {{\n{}\n}})", source);
        let function: Function<'js> = self.ctx.eval(wrapped)?;

        let exports = Object::new(self.ctx.clone())?;
        let module = Object::new(self.ctx.clone())?;
        module.set("uri", uri.as_str())?;

        function.call::<_, ()>((exports.clone(), self.load_function(uri)?, module))?;

        Ok(exports)
    }

    /// Invoke `exports[entry]` when it is a function
    fn call_entry(&self, exports: ModuleGlobals, tool: &Url, entry: &str) -> Result<()> {
        let result = exports.restore(&self.ctx).and_then(|exports| {
            let value: Value<'js> = exports.get(entry)?;
            match value.as_function() {
                Some(function) => function.call::<_, ()>(()),
                None => {
                    tracing::debug!(uri = %tool, entry, "fragment is not an exported function");
                    Ok(())
                }
            }
        });

        result
            .catch(&self.ctx)
            .map_err(|caught| self.failure_for(tool, caught))
    }

    /// Map a caught JS error to the typed error it started as, when there is one
    fn failure_for(&self, uri: &Url, caught: CaughtError<'js>) -> Error {
        let message = caught.to_string();

        if let Some(err) = self.failure.borrow_mut().take() {
            let propagated = match &caught {
                CaughtError::Exception(exception) => {
                    exception.message().as_deref() == Some(err.to_string().as_str())
                }
                _ => false,
            };
            if propagated {
                return err;
            }
        }

        if let Err(err) = self.loader.context().check(uri.as_str()) {
            return err;
        }

        Error::Execution {
            uri: uri.to_string(),
            message,
        }
    }
}

impl<'js> Execute for JsExecutor<'js> {
    type Globals = ModuleGlobals;

    fn execute(&self, uri: &Url, source: &str) -> Result<ModuleGlobals> {
        match self.run_module(uri, source).catch(&self.ctx) {
            Ok(exports) => {
                self.failure.borrow_mut().take();
                Ok(Persistent::save(&self.ctx, exports))
            }
            Err(caught) => Err(self.failure_for(uri, caught)),
        }
    }
}
