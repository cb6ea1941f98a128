//! 식별 / 추출 벤치마크
//!
//! 저장소의 `profiles/` 를 컴파일해 헤더 식별과 본문 분류 처리량을 측정합니다.

use std::path::PathBuf;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use netlog_core::config::DEFAULT_DELIMITER;
use netlog_pipeline::{DeviceTables, DeviceWorker, Dispatcher, FanoutBus, FunctionRegistry, PatternCompiler, ProfileLoader};

const JUNOS_BGP: &str = "<149>Mar 30 12:45:19 re0.edge01.bjm01 rpd[2902]: BGP_PREFIX_THRESH_EXCEEDED: 172.17.17.1 (External AS 123456): Configured maximum prefix-limit threshold(160) exceeded for inet-unicast nlri: 181 (instance master)";
const NXOS_LOGIN: &str = "<189>sw01.bjm01: 2017 Jul 26 14:42:46 UTC: %AUTHPRIV-6-SYSTEM_MSG: pam_unix(dcos_sshd:session): session opened for user luke by (uid=0) - dcos_sshd[12977]";
const UNMATCHED: &str = "<13>this line does not belong to any configured device";

fn tables() -> Vec<Arc<DeviceTables>> {
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../profiles");
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime");
    let profiles = rt
        .block_on(ProfileLoader::new(dir).load())
        .expect("profiles");
    let registry = FunctionRegistry::with_builtins().expect("builtins");
    PatternCompiler::new(Arc::new(registry)).compile_all(&profiles)
}

fn bench_identify(c: &mut Criterion) {
    let dispatcher = Dispatcher::new(tables(), FanoutBus::new(16));

    let mut group = c.benchmark_group("identify");
    group.throughput(Throughput::Elements(1));
    for (name, line) in [("junos", JUNOS_BGP), ("nxos", NXOS_LOGIN), ("unmatched", UNMATCHED)] {
        group.bench_with_input(BenchmarkId::from_parameter(name), line, |b, line| {
            b.iter(|| dispatcher.identify(black_box(line), "10.0.0.1"))
        });
    }
    group.finish();
}

fn bench_classify(c: &mut Criterion) {
    let tables = tables();
    let dispatcher = Dispatcher::new(tables.clone(), FanoutBus::new(16));

    let mut group = c.benchmark_group("classify");
    group.throughput(Throughput::Elements(1));
    for (name, line) in [("junos_bgp", JUNOS_BGP), ("nxos_function", NXOS_LOGIN)] {
        let header = dispatcher.identify(line, "10.0.0.1").remove(0);
        let Some(table) = tables
            .iter()
            .find(|t| Some(t.os.as_str()) == header.os.as_deref())
        else {
            continue;
        };
        let worker = DeviceWorker::new(table.clone(), DEFAULT_DELIMITER);
        group.bench_function(name, |b| b.iter(|| worker.process(black_box(&header)).unwrap()));
    }
    group.finish();
}

criterion_group!(benches, bench_identify, bench_classify);
criterion_main!(benches);
