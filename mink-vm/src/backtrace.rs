//! Backtrace assembly over the frame-walk API.

use std::fmt::Write as _;

use crate::call::CallState;
use crate::coroutine::Coroutine;

/// One frame as seen by a stack walker.
#[derive(Debug, Clone)]
pub struct FrameView {
    /// Whether the frame runs a native function.
    pub is_native: bool,
    /// Whether this is the outermost frame of its coroutine.
    pub is_main: bool,
    /// Function name, when one is known.
    pub name: Option<String>,
    /// Source description: the prototype's source file, or the native debug
    /// descriptor.
    pub source: Option<String>,
    /// Source line for the current program counter.
    pub line: Option<u32>,
    /// Program counter at capture time.
    pub pc: usize,
}

impl FrameView {
    pub(crate) fn capture(frame: &CallState, is_main: bool) -> FrameView {
        let closure = frame.closure();
        let pc = frame.pc();
        if closure.is_native() {
            let debug = frame.debug_info();
            FrameView {
                is_native: true,
                is_main,
                name: debug
                    .func_name
                    .or_else(|| Some(format!("0x{:x}", closure.addr()))),
                source: Some(match debug.source {
                    Some(source) => format!("[native {source}]"),
                    None => "[native]".to_string(),
                }),
                line: debug.line,
                pc,
            }
        } else {
            let (source, line) = match closure.prototype() {
                Some(prototype) => (
                    Some(prototype.source().to_str_lossy().into_owned()),
                    prototype.line_for(pc),
                ),
                None => (None, None),
            };
            FrameView {
                is_native: false,
                is_main,
                name: None,
                source,
                line,
                pc,
            }
        }
    }
}

/// Snapshot of the frame stack, innermost frame first.
pub fn capture(co: &Coroutine) -> Vec<FrameView> {
    let mut frames = Vec::new();
    co.walk_frames(true, |view| {
        frames.push(view.clone());
        true
    });
    frames
}

/// Human-readable traceback of the coroutine's frame stack.
pub fn render(co: &Coroutine) -> String {
    let mut out = String::from("stack traceback:");
    for view in capture(co) {
        let location = match (&view.source, view.line) {
            (Some(source), Some(line)) => format!("{source}:{line}"),
            (Some(source), None) => source.clone(),
            (None, _) => "?".to_string(),
        };
        let name = view.name.as_deref().unwrap_or("function");
        let _ = write!(out, "\n\t{location}: in {name}");
        if view.is_main {
            let _ = write!(out, " (main)");
        }
    }
    out
}
