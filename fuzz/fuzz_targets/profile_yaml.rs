#![no_main]

use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use netlog_pipeline::{FunctionRegistry, PatternCompiler, ProfileLoader};

fuzz_target!(|data: &[u8]| {
    let Ok(yaml_str) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(tree) = ProfileLoader::parse_yaml(yaml_str, "fuzz-input.yml") else {
        return;
    };
    // 검증을 통과한 프로파일은 컴파일도 패닉 없이 끝나야 함
    if let Ok(Some(profile)) = ProfileLoader::build_profile("fuzz", tree) {
        let compiler = PatternCompiler::new(Arc::new(FunctionRegistry::new()));
        let _ = compiler.compile("fuzz", &profile);
    }
});
