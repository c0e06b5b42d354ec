#![no_main]

use libfuzzer_sys::fuzz_target;
use lxsh_client::Operation;
use serde_json::Value;

fuzz_target!(|data: &[u8]| {
    let Ok(response) = serde_json::from_slice::<Value>(data) else {
        return;
    };

    match Operation::from_response("fuzz-op", &response) {
        Ok(operation) => {
            assert!(!operation.id.is_empty());
            if let Some(error) = &operation.error {
                assert!(!error.trim().is_empty());
            }
            let paths = operation.output_paths();
            for path in paths.stdout.iter().chain(paths.stderr.iter()) {
                assert!(!path.trim().is_empty());
            }
            let _ = operation.exit_code();
            let _ = operation.inline_output();
        }
        Err(detail) => assert!(!detail.is_empty()),
    }
});
