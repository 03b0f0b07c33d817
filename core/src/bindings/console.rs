//! console.log / info / warn / error, routed to tracing

use std::collections::BTreeMap;

use tracing::{error, info, warn};

use crate::interpreter::{val_to_json, DefineError, Val, Vm};

const TARGET: &str = "jail::console";

#[derive(Clone, Copy)]
enum Level {
    Info,
    Warn,
    Error,
}

pub fn install(vm: &mut Vm) -> Result<(), DefineError> {
    let mut console = BTreeMap::new();
    for (name, level) in [
        ("log", Level::Info),
        ("info", Level::Info),
        ("warn", Level::Warn),
        ("error", Level::Error),
    ] {
        let func = vm.native(&format!("console.{}", name), move |vm, args| {
            let line = render(vm, &args);
            match level {
                Level::Info => info!(target: TARGET, "{}", line),
                Level::Warn => warn!(target: TARGET, "{}", line),
                Level::Error => error!(target: TARGET, "{}", line),
            }
            Ok(Val::Undefined)
        });
        console.insert(name.to_string(), func);
    }
    vm.define_global("console", Val::Obj(console))
}

/// Space-separated arguments; lists and objects print as JSON
pub(crate) fn render(vm: &Vm, args: &[Val]) -> String {
    args.iter()
        .map(|value| match value {
            Val::List(_) | Val::Obj(_) => val_to_json(value).to_string(),
            other => vm.describe(other),
        })
        .collect::<Vec<_>>()
        .join(" ")
}
