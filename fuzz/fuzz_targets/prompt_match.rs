#![no_main]

use libfuzzer_sys::fuzz_target;
use lxsh_client::{match_prompt, PromptMatch, PromptPattern, GENERIC_PROMPT_MARKER};

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    let (pattern, prompt) = raw.split_once('\n').unwrap_or((raw.as_ref(), ""));

    let mut patterns = vec![PromptPattern::literal(pattern)];
    if let Ok(regex) = PromptPattern::regex(pattern) {
        patterns.push(regex);
    }

    match match_prompt(&patterns, prompt) {
        PromptMatch::Pattern(index) => {
            assert!(index < patterns.len());
            assert!(patterns[index].is_match(prompt));
        }
        PromptMatch::GenericMarker => assert!(prompt.contains(GENERIC_PROMPT_MARKER)),
        PromptMatch::Fallback => assert!(!prompt.contains(GENERIC_PROMPT_MARKER)),
    }
});
