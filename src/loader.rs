//! Engine instantiation.
//!
//! A load derives any missing asset locations from the primary code
//! location, resolves them through the asset resolver, instantiates the
//! engine module, and wires the notification callbacks. The first
//! successful load in the host's lifetime reports `first = true`; later
//! loads silently replace the stale instance and report `false`.

use log::info;

use crate::error::HostResult;
use crate::protocol::LoadConfig;
use crate::resolver::AssetKind;
use crate::router::HostContext;

/// Suffix of the engine's primary code file.
pub(crate) const CORE_SUFFIX: &str = ".js";
/// Suffix of the engine's binary payload.
pub(crate) const WASM_SUFFIX: &str = ".wasm";
/// Suffix of the engine's secondary-worker code.
pub(crate) const WORKER_SUFFIX: &str = ".worker.js";

/// Derives a sibling location by swapping the code suffix.
pub(crate) fn derive_location(core_url: &str, suffix: &str) -> String {
    match core_url.strip_suffix(CORE_SUFFIX) {
        Some(base) => format!("{base}{suffix}"),
        None => format!("{core_url}{suffix}"),
    }
}

fn resolve(
    ctx: &HostContext,
    url: &str,
    asset_kind: AssetKind,
) -> HostResult<String> {
    let notify = ctx.notify.clone();
    let resolved = ctx
        .resolver
        .resolve(url, asset_kind, &mut |progress| notify.download(progress))?;
    Ok(resolved)
}

/// Services one LOAD command. Returns whether this was the first successful
/// load in the host's lifetime.
pub(crate) fn load(ctx: &mut HostContext, config: LoadConfig) -> HostResult<bool> {
    let first = !ctx.is_loaded();

    let LoadConfig {
        core_url,
        wasm_url,
        worker_url,
        blob,
        thread,
    } = config;

    let wasm_url = wasm_url.unwrap_or_else(|| derive_location(&core_url, WASM_SUFFIX));
    let worker_url = worker_url.unwrap_or_else(|| derive_location(&core_url, WORKER_SUFFIX));

    let (core, wasm, worker) = if blob {
        let core = resolve(ctx, &core_url, AssetKind::CoreScript)?;
        let wasm = resolve(ctx, &wasm_url, AssetKind::BinaryPayload)?;
        // Without multi-threading the secondary worker is never loaded.
        let worker = if thread {
            resolve(ctx, &worker_url, AssetKind::WorkerScript)?
        } else {
            worker_url
        };
        (core, wasm, worker)
    } else {
        (core_url, wasm_url, worker_url)
    };

    // The engine's own bootstrapping asks for its assets by filename; answer
    // by suffix, falling back to the engine-supplied default resolution.
    let locate = |path: &str, prefix: &str| -> String {
        if path.ends_with(WASM_SUFFIX) {
            wasm.clone()
        } else if path.ends_with(WORKER_SUFFIX) {
            worker.clone()
        } else {
            format!("{prefix}{path}")
        }
    };

    let mut engine = ctx.module.instantiate(&core, &locate)?;

    let log_tx = ctx.notify.clone();
    engine.set_logger(Box::new(move |record| log_tx.log(record)));
    let progress_tx = ctx.notify.clone();
    engine.set_progress(Box::new(move |update| progress_tx.progress(update)));

    info!("engine instantiated from '{core}' (first: {first})");
    ctx.engine = Some(engine);
    Ok(first)
}
