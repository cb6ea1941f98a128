#![no_main]

use std::sync::LazyLock;

use libfuzzer_sys::fuzz_target;
use netlog_auth::{Codec, KeyMaterial};

static KEYS: LazyLock<KeyMaterial> = LazyLock::new(KeyMaterial::generate);

fuzz_target!(|data: &[u8]| {
    // 서명 없는 입력은 항상 거부, 평문 디코드는 패닉 없이 끝나야 함
    assert!(KEYS.decryptor().open(data).is_err());
    let _ = Codec::Msgpack.decode(data);
    let _ = Codec::Json.decode(data);
});
