#![no_main]

use std::sync::{Arc, LazyLock};

use libfuzzer_sys::fuzz_target;
use netlog_pipeline::{
    DeviceWorker, Dispatcher, FanoutBus, FunctionRegistry, PatternCompiler, ProfileLoader,
};

const PROFILE: &str = r#"
prefixes:
  - time_format: '%b %d %H:%M:%S'
    values:
      date: '(\w+\s+\d+)'
      time: '(\d\d:\d\d:\d\d)'
      host: '([^ ]+)'
      processName: '/?(\w+)'
      processId: '\[?(\d+)?\]?'
      tag: '(\w+)'
    line: '{date} {time} {host} {processName}{processId}: {tag}: '
messages:
  - error: BGP_PREFIX_THRESH_EXCEEDED
    tag: BGP_PREFIX_THRESH_EXCEEDED
    values:
      peer: '(\d+\.\d+\.\d+\.\d+)'
      asn|int: '(\d+)'
    line: '{peer} (External AS {asn})'
    model: openconfig-bgp
    mapping:
      variables:
        bgp//neighbors//neighbor//{peer}//state//peer_as: asn
      static: {}
"#;

static WORKER: LazyLock<(Dispatcher, DeviceWorker)> = LazyLock::new(|| {
    let tree = ProfileLoader::parse_yaml(PROFILE, "init.yml").expect("fuzz profile parses");
    let profile = ProfileLoader::build_profile("junos", tree)
        .expect("fuzz profile is valid")
        .expect("fuzz profile is enabled");
    let compiler = PatternCompiler::new(Arc::new(FunctionRegistry::new()));
    let tables = Arc::new(compiler.compile("junos", &profile).expect("fuzz profile compiles"));
    (
        Dispatcher::new(vec![tables.clone()], FanoutBus::new(1)),
        DeviceWorker::new(tables, "//").forward_raw(true),
    )
});

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    let (dispatcher, worker) = &*WORKER;
    for header in dispatcher.identify(&text, "10.0.0.1") {
        if header.os.is_some() {
            let _ = worker.process(&header);
        }
    }
});
