#![no_main]

use dexscope::{DexFile, DexOptions};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(mut dex) = DexFile::from_bytes_with(data, DexOptions::in_place()) {
        if dex.place().is_ok() {
            let _ = dex.encode();
        }
    }
});
