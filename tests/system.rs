//! Drives the platform loader against the bundled `demo-target` library

#![cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]

use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
use std::fs;
use std::mem;
use std::path::PathBuf;

use prologue_patch::host::{ModuleLoader, SystemHost};
use prologue_patch::{code, PatchApplicator, PatchBuffer, PatchState};
use region::Protection;

/// Finds the `demo-target` shared library cargo built next to this test binary
fn demo_library() -> PathBuf {
    let exe = std::env::current_exe().unwrap();
    let prefix = format!("{DLL_PREFIX}demo_target");
    let dirs = exe.ancestors().skip(1).take(2);
    dirs.flat_map(|dir| fs::read_dir(dir).into_iter().flatten().flatten())
        .map(|entry| entry.path())
        .find(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map_or(false, |name| name.starts_with(&prefix) && name.ends_with(DLL_SUFFIX))
        })
        .expect("demo-target shared library was not built")
}

#[test]
/// Loads the real library, patches its export and calls the result
fn test_patch_demo_export() {
    let library = demo_library();
    let module = library.to_str().unwrap();

    // call the export unpatched through its own loader handle
    let host = SystemHost::new();
    let handle = host.load(module).unwrap();
    let address = host.resolve(handle, "demo_answer").unwrap();
    let demo_answer: extern "C" fn() -> u32 = unsafe { mem::transmute(address) };
    assert_eq!(demo_answer(), 42);
    let before = region::query(address).unwrap().protection();
    assert!(before.contains(Protection::EXECUTE));

    let applicator = PatchApplicator::system();
    let patch = PatchBuffer::new(code::return_constant(0x57)).unwrap();
    let report = unsafe { applicator.apply_patch(module, "demo_answer", &patch).unwrap() };

    // both loaders see the same mapping
    assert_eq!(report.address.as_ptr() as *const u8, address);
    assert_eq!(report.state, PatchState::ProtectionRestored);
    assert!(report.restore_warning.is_none());
    assert_eq!(
        unsafe { std::slice::from_raw_parts(address, patch.len()) },
        patch.as_bytes()
    );
    assert_eq!(region::query(address).unwrap().protection(), before);
    assert_eq!(demo_answer(), 0x57);
}

#[test]
/// A real library without the export fails symbol resolution
fn test_missing_export() {
    let library = demo_library();
    let applicator = PatchApplicator::system();
    let patch = PatchBuffer::from_static(&[0xc3]).unwrap();

    let result =
        unsafe { applicator.apply_patch(library.to_str().unwrap(), "not_exported_here", &patch) };

    assert_eq!(result.unwrap_err().failed_after(), PatchState::ModuleResolved);
}
