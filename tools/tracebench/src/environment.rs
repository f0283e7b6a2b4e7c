//! Environment shim: the `window` global and the `JSBNG__*` aliases.

use crate::errors::ReplayError;
use crate::heap::Heap;
use crate::host::{Clock, ClockSources, HostCapabilities, HostGlobal, HostGlobals};
use crate::stub::StubTable;
use crate::types::{ClockKind, HostKind};
use crate::value::{ObjectId, Value};
use std::sync::Arc;

pub const ALIAS_PREFIX: &str = "JSBNG__";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalShape {
    Callable,
    Object,
}

/// Browser globals recorded code reaches through a `JSBNG__` alias.
pub const ALIASED_GLOBALS: &[(&str, GlobalShape)] = &[
    ("Date", GlobalShape::Callable),
    ("document", GlobalShape::Object),
    ("setTimeout", GlobalShape::Callable),
    ("setInterval", GlobalShape::Callable),
    ("clearTimeout", GlobalShape::Callable),
    ("clearInterval", GlobalShape::Callable),
    ("requestAnimationFrame", GlobalShape::Callable),
    ("XMLHttpRequest", GlobalShape::Callable),
    ("Image", GlobalShape::Callable),
    ("addEventListener", GlobalShape::Callable),
    ("removeEventListener", GlobalShape::Callable),
    ("getComputedStyle", GlobalShape::Callable),
    ("location", GlobalShape::Object),
    ("navigator", GlobalShape::Object),
    ("screen", GlobalShape::Object),
    ("history", GlobalShape::Object),
    ("localStorage", GlobalShape::Object),
    ("sessionStorage", GlobalShape::Object),
    ("event", GlobalShape::Object),
];

pub fn alias_name(name: &str) -> String {
    format!("{ALIAS_PREFIX}{name}")
}

pub fn detect_host(caps: &HostCapabilities) -> HostKind {
    if caps.has_document {
        HostKind::Browser
    } else if caps.has_global {
        HostKind::Headless
    } else {
        HostKind::Bare
    }
}

/// Harness clock, then `performance.now`, then `preciseTime`, then `Date.now`.
pub fn select_clock(sources: &ClockSources) -> Result<(ClockKind, Arc<dyn Clock>), ReplayError> {
    sources.best().ok_or(ReplayError::NoClock)
}

/// Builds the global object for `kind` and returns its id.
///
/// A headless host's own global object becomes `window`; a browser host
/// keeps whatever globals it exposes; a bare engine gets a fresh object.
pub fn install_window(
    heap: &mut Heap,
    stubs: &mut StubTable,
    kind: HostKind,
    host_globals: Option<&HostGlobals>,
) -> ObjectId {
    let window = heap.alloc();

    if kind != HostKind::Bare {
        if let Some(globals) = host_globals {
            for (name, global) in globals {
                let value = match global {
                    HostGlobal::Callable => Value::Function(stubs.get_or_create(name)),
                    HostGlobal::Object => Value::Object(heap.alloc()),
                    HostGlobal::Number(n) => Value::Number(*n),
                    HostGlobal::String(s) => Value::String(s.clone()),
                };
                heap.set_data(window, name, value);
            }
        }
    }

    for name in ["window", "self", "top"] {
        heap.set_data(window, name, Value::Object(window));
    }

    install_aliases(heap, stubs, window);
    window
}

fn install_aliases(heap: &mut Heap, stubs: &mut StubTable, window: ObjectId) {
    for (name, shape) in ALIASED_GLOBALS {
        let alias = alias_name(name);
        let value = match heap.data_value(window, name) {
            Some(existing) => existing.clone(),
            None => match shape {
                GlobalShape::Callable => Value::Function(stubs.get_or_create(&alias)),
                GlobalShape::Object => Value::Object(heap.alloc()),
            },
        };
        heap.set_data(window, &alias, value);
    }
}
