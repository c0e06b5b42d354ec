#![no_main]

use libfuzzer_sys::fuzz_target;
use lxsh_client::{operation_id_from_exec_response, LxdErrorKind};
use serde_json::Value;

fuzz_target!(|data: &[u8]| {
    let Ok(response) = serde_json::from_slice::<Value>(data) else {
        return;
    };

    match operation_id_from_exec_response(&response) {
        Ok(operation_id) => {
            assert_eq!(response["type"], "async");
            assert!(!operation_id.is_empty());
            assert_eq!(operation_id, operation_id.trim());
        }
        Err(error) => assert_eq!(error.kind(), LxdErrorKind::Execution),
    }
});
