//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 序列化单元测试

use fleetcache::config::GlobalConfig;
use fleetcache::error::CacheError;
use fleetcache::serialization::{json::JsonSerializer, Serializer, SerializerEnum};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, PartialEq, Debug)]
struct TestStruct {
    id: u64,
    name: String,
    tags: Vec<String>,
}

fn sample() -> TestStruct {
    TestStruct {
        id: 1,
        name: "test".to_string(),
        tags: vec!["a".into(), "b".into()],
    }
}

/// 测试JSON序列化器的往返操作
#[test]
fn test_json_serializer_round_trip() {
    let serializer = JsonSerializer::new();
    let bytes = serializer.serialize(&sample()).unwrap();
    assert!(bytes.starts_with(b"{"));

    let deserialized: TestStruct = serializer.deserialize(&bytes).unwrap();
    assert_eq!(sample(), deserialized);
}

/// 测试压缩模式的往返操作
#[test]
fn test_compressed_serializer_round_trip() {
    let serializer = JsonSerializer::with_compression();
    assert!(serializer.is_compressed());

    let bytes = serializer.serialize(&sample()).unwrap();
    // gzip 魔数
    assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
    let deserialized: TestStruct = serializer.deserialize(&bytes).unwrap();
    assert_eq!(sample(), deserialized);
}

/// 损坏的数据返回序列化错误
#[test]
fn test_corrupted_payload_is_an_error() {
    let plain = JsonSerializer::new();
    let err = plain.deserialize::<TestStruct>(b"{\"id\":").unwrap_err();
    assert!(matches!(err, CacheError::Serialization(_)));

    let compressed = JsonSerializer::with_compression();
    let err = compressed.deserialize::<TestStruct>(b"not gzip").unwrap_err();
    assert!(matches!(err, CacheError::Serialization(_)));
}

/// 类型不匹配返回序列化错误
#[test]
fn test_type_mismatch_is_an_error() {
    let serializer = SerializerEnum::default();
    let bytes = serializer.serialize(&"just a string").unwrap();
    let err = serializer.deserialize::<TestStruct>(&bytes).unwrap_err();
    assert!(matches!(err, CacheError::Serialization(_)));
}

/// 按全局配置选择序列化器
#[test]
fn test_serializer_from_config() {
    let mut global = GlobalConfig::default();
    let SerializerEnum::Json(plain) = SerializerEnum::from_config(&global);
    assert!(!plain.is_compressed());

    global.compress = true;
    let SerializerEnum::Json(compressed) = SerializerEnum::from_config(&global);
    assert!(compressed.is_compressed());
}
