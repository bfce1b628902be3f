use std::error::Error;
use std::io::{self, BufRead};
use std::mem;
use std::path::PathBuf;
use std::process;

use env_logger::Env;
use log::warn;
use prologue_patch::{code, PatchApplicator, PatchBuffer};

/// Demo library shipped in this workspace
const DEMO_LIBRARY: &str = "demo_target";
/// Export rewritten in the demo library
const DEMO_SYMBOL: &str = "demo_answer";
/// Value the export returns once patched
const PATCHED_VALUE: u32 = 0x57;

/// The demo library sits next to this executable in cargo's output directory
fn demo_library() -> Result<PathBuf, Box<dyn Error>> {
    let exe = std::env::current_exe()?;
    let dir = exe.parent().ok_or("executable has no parent directory")?;
    Ok(dir.join(libloading::library_filename(DEMO_LIBRARY)))
}

/// Patches the demo export and returns what it yields afterwards
fn run() -> Result<u32, Box<dyn Error>> {
    let library = demo_library()?;
    let module = library.to_str().ok_or("library path is not valid UTF-8")?;
    let patch = PatchBuffer::new(code::return_constant(PATCHED_VALUE))?;

    let applicator = PatchApplicator::system();
    // Safety: `demo_answer` is longer than the patch and nothing else in this process is calling it
    let report = unsafe { applicator.apply_patch(module, DEMO_SYMBOL, &patch)? };
    if let Some(warning) = &report.restore_warning {
        warn!("{warning}");
    }

    // Safety: the address is an `extern "C" fn() -> u32` export and now holds a complete function body
    let answer: extern "C" fn() -> u32 = unsafe { mem::transmute(report.address.as_ptr()) };
    Ok(answer())
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    match run() {
        Ok(value) => println!("Patch applied: {DEMO_SYMBOL}() now returns {value:#x}"),
        Err(e) => {
            eprintln!("error: {e}");
            let mut source = e.source();
            while let Some(cause) = source {
                eprintln!("  caused by: {cause}");
                source = cause.source();
            }
        }
    }

    let mut line = String::new();
    if let Err(e) = io::stdin().lock().read_line(&mut line) {
        warn!("unable to read from stdin: {e}");
    }
    process::exit(-1);
}
