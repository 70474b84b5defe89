use crate::{Error, frontend::run_tool};
use log::debug;
use std::{ffi::OsString, path::Path};

/// Symbols of the coroutine ABI emitted by the JIT, including the coroutine split helpers.
pub const COROUTINE_SYMBOLS: [&str; 6] = [
    "coroutine_begin",
    "coroutine_await",
    "coroutine_destroy",
    "coroutine_begin.resume",
    "coroutine_begin.destroy",
    "coroutine_begin.cleanup",
];

/// `objcopy` arguments prefixing every coroutine symbol in `object` with `<name>_`.
pub fn rename_args(name: &str, object: &Path) -> Vec<OsString> {
    let mut args = Vec::with_capacity(COROUTINE_SYMBOLS.len() * 2 + 1);
    for symbol in COROUTINE_SYMBOLS {
        args.push(OsString::from("--redefine-sym"));
        args.push(OsString::from(format!("{symbol}={name}_{symbol}")));
    }
    args.push(object.as_os_str().to_os_string());
    args
}

/// Renames the coroutine symbols of `object` in place so several programs can be linked together.
pub fn rename_symbols(objcopy: &Path, name: &str, object: &Path) -> Result<(), Error> {
    let output = run_tool(objcopy, &rename_args(name, object), &[])?;
    if !output.status.success() {
        return Err(Error::SymbolRename {
            tool: objcopy.display().to_string(),
            diagnostics: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    debug!("renamed coroutine symbols of {} to {}_*", object.display(), name);
    Ok(())
}
