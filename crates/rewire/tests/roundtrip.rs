// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com
//
// Round-trip coverage: every supported value shape survives
// encode -> decode, including shared references and cyclic graphs
// (equality by shape, identity where tracking guarantees it).

use rewire::{
    Buffer, Engine, EnumValue, Mode, ObjectValue, ReadContext, Strategy, TypeDescriptor, Value,
    WireType, WriteContext,
};
use std::rc::Rc;
use std::sync::Arc;

fn point_type() -> TypeDescriptor {
    TypeDescriptor::object("rt.Point")
        .field("x", WireType::I32)
        .field("y", WireType::I32)
        .build()
}

fn node_type() -> TypeDescriptor {
    TypeDescriptor::object("rt.Node")
        .field("value", WireType::I64)
        .tracked("next", WireType::Object(Arc::from("rt.Node")))
        .build()
}

fn roundtrip(engine: &Engine, value: &Value) -> Value {
    let bytes = engine.serialize(value).expect("serialize");
    engine.deserialize(&bytes).expect("deserialize")
}

#[test]
fn test_scalar_shapes_roundtrip() {
    let engine = Engine::new();
    let shapes = [
        Value::Bool(true),
        Value::I8(-7),
        Value::I16(1234),
        Value::I32(-100_000),
        Value::I64(i64::MIN),
        Value::F32(2.5),
        Value::F64(-0.125),
        Value::String("héllo wire".into()),
        Value::Bytes(vec![0, 255, 128]),
        Value::Null,
    ];
    for shape in &shapes {
        assert_eq!(&roundtrip(&engine, shape), shape);
    }
}

#[test]
fn test_untyped_containers_roundtrip() {
    let engine = Engine::new();
    let value = Value::List(vec![
        Value::I32(1),
        Value::String("two".into()),
        Value::Null,
        Value::Map(vec![
            (Value::String("k".into()), Value::F64(0.5)),
            (Value::I64(9), Value::Bool(false)),
        ]),
    ]);
    assert_eq!(roundtrip(&engine, &value), value);
}

#[test]
fn test_object_roundtrip() {
    let engine = Engine::new();
    let point = engine.register(point_type()).expect("register");
    let value = ObjectValue::new(&point);
    value.borrow_mut().set("x", -3i32).expect("x");
    value.borrow_mut().set("y", 400i32).expect("y");
    let expected = Value::Object(value);
    assert_eq!(roundtrip(&engine, &expected), expected);
}

#[test]
fn test_typed_field_shapes_roundtrip() {
    let engine = Engine::new();
    let desc = engine
        .register(
            TypeDescriptor::object("rt.Mixed")
                .field("flag", WireType::Bool)
                .field("name", WireType::String)
                .nullable("note", WireType::String)
                .field("blob", WireType::Bytes)
                .field("samples", WireType::List(Box::new(WireType::F64)))
                .field(
                    "tags",
                    WireType::Map(Box::new(WireType::String), Box::new(WireType::I32)),
                )
                .build(),
        )
        .expect("register");

    let value = ObjectValue::new(&desc);
    {
        let mut v = value.borrow_mut();
        v.set("flag", true).expect("flag");
        v.set("name", "sensor-1").expect("name");
        // note stays null
        v.set("blob", vec![1u8, 2, 3]).expect("blob");
        v.set(
            "samples",
            Value::List(vec![Value::F64(1.0), Value::F64(2.5)]),
        )
        .expect("samples");
        v.set(
            "tags",
            Value::Map(vec![(Value::String("a".into()), Value::I32(1))]),
        )
        .expect("tags");
    }
    let expected = Value::Object(value);
    let back = roundtrip(&engine, &expected);
    assert_eq!(back, expected);
    let obj = back.as_object().expect("object");
    assert_eq!(obj.borrow().get("note").expect("note"), Value::Null);
}

#[test]
fn test_nested_objects_roundtrip() {
    let engine = Engine::new();
    let point = engine.register(point_type()).expect("point");
    let line = engine
        .register(
            TypeDescriptor::object("rt.Line")
                .nullable("from", WireType::Object(Arc::from("rt.Point")))
                .nullable("to", WireType::Object(Arc::from("rt.Point")))
                .build(),
        )
        .expect("line");

    let a = ObjectValue::new(&point);
    a.borrow_mut().set("x", 1i32).expect("x");
    let b = ObjectValue::new(&point);
    b.borrow_mut().set("x", 2i32).expect("x");
    let value = ObjectValue::new(&line);
    value.borrow_mut().set("from", a).expect("from");
    value.borrow_mut().set("to", b).expect("to");

    let expected = Value::Object(value);
    assert_eq!(roundtrip(&engine, &expected), expected);
}

#[test]
fn test_self_cycle_preserves_identity() {
    let engine = Engine::new();
    let node = engine.register(node_type()).expect("register");
    let a = ObjectValue::new(&node);
    a.borrow_mut().set("value", 7i64).expect("value");
    a.borrow_mut().set("next", a.clone()).expect("next");

    let back = roundtrip(&engine, &Value::Object(a));
    let root = back.as_object().expect("object").clone();
    let next = root.borrow().get("next").expect("next");
    let next = next.as_object().expect("next object").clone();
    assert!(Rc::ptr_eq(&root, &next));
    assert_eq!(root.borrow().get("value").expect("value"), Value::I64(7));
}

#[test]
fn test_mutual_cycle_preserves_identity() {
    let engine = Engine::new();
    let node = engine.register(node_type()).expect("register");
    let a = ObjectValue::new(&node);
    let b = ObjectValue::new(&node);
    a.borrow_mut().set("value", 1i64).expect("value");
    b.borrow_mut().set("value", 2i64).expect("value");
    a.borrow_mut().set("next", b.clone()).expect("a.next");
    b.borrow_mut().set("next", a.clone()).expect("b.next");

    let back = roundtrip(&engine, &Value::Object(a));
    let da = back.as_object().expect("a").clone();
    let db = da.borrow().get("next").expect("next").as_object().expect("b").clone();
    let da_again = db.borrow().get("next").expect("next").as_object().expect("a again").clone();
    assert!(Rc::ptr_eq(&da, &da_again));
    assert_eq!(db.borrow().get("value").expect("value"), Value::I64(2));
}

#[test]
fn test_shared_reference_decodes_to_one_instance() {
    let engine = Engine::new();
    engine.register(point_type()).expect("point");
    let pair = engine
        .register(
            TypeDescriptor::object("rt.Pair")
                .tracked("left", WireType::Object(Arc::from("rt.Point")))
                .tracked("right", WireType::Object(Arc::from("rt.Point")))
                .build(),
        )
        .expect("pair");

    let shared = ObjectValue::new(&engine.register(point_type()).expect("point again"));
    shared.borrow_mut().set("x", 9i32).expect("x");
    let value = ObjectValue::new(&pair);
    value.borrow_mut().set("left", shared.clone()).expect("left");
    value.borrow_mut().set("right", shared).expect("right");

    let back = roundtrip(&engine, &Value::Object(value));
    let obj = back.as_object().expect("pair").clone();
    let left = obj.borrow().get("left").expect("left").as_object().expect("left obj").clone();
    let right = obj.borrow().get("right").expect("right").as_object().expect("right obj").clone();
    assert!(Rc::ptr_eq(&left, &right));
}

#[test]
fn test_tracking_disabled_duplicates_shared_instances() {
    let engine = Engine::builder().ref_tracking(false).build();
    engine.register(point_type()).expect("point");
    let pair = engine
        .register(
            TypeDescriptor::object("rt.Pair")
                .tracked("left", WireType::Object(Arc::from("rt.Point")))
                .tracked("right", WireType::Object(Arc::from("rt.Point")))
                .build(),
        )
        .expect("pair");

    let shared = ObjectValue::new(&engine.register(point_type()).expect("point again"));
    let value = ObjectValue::new(&pair);
    value.borrow_mut().set("left", shared.clone()).expect("left");
    value.borrow_mut().set("right", shared).expect("right");

    let back = roundtrip(&engine, &Value::Object(value));
    let obj = back.as_object().expect("pair").clone();
    let left = obj.borrow().get("left").expect("left").as_object().expect("left obj").clone();
    let right = obj.borrow().get("right").expect("right").as_object().expect("right obj").clone();
    assert!(!Rc::ptr_eq(&left, &right));
}

#[test]
fn test_cycle_with_tracking_disabled_is_detected() {
    let engine = Engine::builder().ref_tracking(false).build();
    let node = engine.register(node_type()).expect("register");
    let a = ObjectValue::new(&node);
    a.borrow_mut().set("next", a.clone()).expect("next");

    match engine.serialize(&Value::Object(a)).unwrap_err() {
        rewire::Error::CycleDetected { .. } => {}
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_deterministic_output_across_fresh_sessions() {
    let engine = Engine::new();
    let desc = engine.register(point_type()).expect("register");
    let value = ObjectValue::new(&desc);
    value.borrow_mut().set("x", 11i32).expect("x");
    let value = Value::Object(value);

    let first = engine.serialize(&value).expect("first");
    let second = engine.serialize(&value).expect("second");
    assert_eq!(first, second);
}

#[test]
fn test_flat_strategy_swap_keeps_bytes_stable() {
    let engine = Engine::new();
    let desc = engine.register(point_type()).expect("register");
    let value = ObjectValue::new(&desc);
    value.borrow_mut().set("x", 5i32).expect("x");
    value.borrow_mut().set("y", -5i32).expect("y");
    let value = Value::Object(value);

    let reference = engine.serialize(&value).expect("reference");
    // Enough calls to cross the specialization threshold; output must not
    // change when the flat strategy swaps in.
    for _ in 0..64 {
        assert_eq!(engine.serialize(&value).expect("repeat"), reference);
    }
    assert_eq!(engine.deserialize(&reference).expect("decode"), value);
}

#[test]
fn test_enum_roundtrip() {
    let engine = Engine::new();
    let color = engine
        .register(TypeDescriptor::enum_type("rt.Color", ["RED", "GREEN", "BLUE"]))
        .expect("register");
    let value = Value::Enum(EnumValue::new(&color, 2));
    let back = roundtrip(&engine, &value);
    match back {
        Value::Enum(ev) => {
            assert_eq!(ev.ordinal, 2);
            assert_eq!(ev.variant_name(), Some("BLUE"));
        }
        other => panic!("expected enum, got {:?}", other),
    }
}

#[test]
fn test_uuid_shim_roundtrip() {
    let engine = Engine::new();
    let uuid = engine
        .register(TypeDescriptor::ext("rewire.uuid"))
        .expect("register");
    let id: Vec<u8> = (0u8..16).collect();
    let value = Value::Object(ObjectValue::with_payload(&uuid, id.clone()));

    let bytes = engine.serialize(&value).expect("serialize");
    let back = roundtrip(&engine, &value);
    let node = back.as_object().expect("object").clone();
    assert_eq!(node.borrow().payload(), &Value::Bytes(id));
    // The shim stores 16 raw bytes, not a schema-driven body.
    assert!(bytes.len() < 80);
}

#[test]
fn test_timestamp_shim_roundtrip() {
    let engine = Engine::new();
    let ts = engine
        .register(TypeDescriptor::ext("rewire.timestamp"))
        .expect("register");
    let value = Value::Object(ObjectValue::with_payload(&ts, 1_702_900_000_123i64));
    let back = roundtrip(&engine, &value);
    assert_eq!(
        back.as_object().expect("object").borrow().payload(),
        &Value::I64(1_702_900_000_123)
    );
}

/// Length-prefixed opaque payload, used to exercise the user-strategy hook.
struct BlobStrategy {
    descriptor: Arc<TypeDescriptor>,
}

impl Strategy for BlobStrategy {
    fn write(&self, buf: &mut Buffer, value: &Value, _ctx: &mut WriteContext<'_>) -> rewire::Result<()> {
        let obj = value.as_object().expect("blob object");
        let node = obj.borrow();
        match node.payload() {
            Value::Bytes(b) => {
                buf.write_varuint32(b.len() as u32);
                buf.write_bytes(b);
                Ok(())
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    fn read(&self, buf: &mut Buffer, ctx: &mut ReadContext<'_>) -> rewire::Result<Value> {
        let node = ObjectValue::new(&self.descriptor);
        ctx.adopt(&node);
        let len = buf.read_varuint32()? as usize;
        let bytes = buf.read_bytes(len)?.to_vec();
        node.borrow_mut().set_payload(bytes);
        Ok(Value::Object(node))
    }
}

#[test]
fn test_custom_strategy_roundtrip() {
    let engine = Engine::new();
    let blob = engine
        .register(TypeDescriptor::ext("rt.Blob"))
        .expect("register");
    engine
        .register_strategy("rt.Blob", Box::new(BlobStrategy { descriptor: blob.clone() }))
        .expect("strategy");

    let value = Value::Object(ObjectValue::with_payload(&blob, vec![9u8, 8, 7]));
    assert_eq!(roundtrip(&engine, &value), value);
}

#[test]
fn test_ext_type_without_strategy_is_rejected() {
    let engine = Engine::new();
    let orphan = engine
        .register(TypeDescriptor::ext("rt.Orphan"))
        .expect("register");
    let value = Value::Object(ObjectValue::new(&orphan));
    match engine.serialize(&value).unwrap_err() {
        rewire::Error::SerializerUnregistered(name) => assert_eq!(name, "rt.Orphan"),
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_strict_registration_rejects_unregistered_encode() {
    let engine = Engine::builder().strict_registration(true).build();
    let desc = Arc::new(point_type());
    let value = Value::Object(ObjectValue::new(&desc));
    match engine.serialize(&value).unwrap_err() {
        rewire::Error::ClassUnregistered(name) => assert_eq!(name, "rt.Point"),
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_cross_engine_roundtrip() {
    let producer = Engine::new();
    let consumer = Engine::new();
    producer.register(point_type()).expect("producer register");
    let consumer_desc = consumer.register(point_type()).expect("consumer register");

    let value = ObjectValue::new(&producer.register(point_type()).expect("again"));
    value.borrow_mut().set("x", 21i32).expect("x");
    let bytes = producer.serialize(&Value::Object(value)).expect("serialize");

    let back = consumer.deserialize(&bytes).expect("deserialize");
    let obj = back.as_object().expect("object").clone();
    assert!(Arc::ptr_eq(obj.borrow().descriptor(), &consumer_desc));
    assert_eq!(obj.borrow().get("x").expect("x"), Value::I32(21));
}

#[test]
fn test_partial_objects_attached_to_decode_failure() {
    let engine = Engine::new();
    let desc = engine
        .register(
            TypeDescriptor::object("rt.Payload")
                .field("body", WireType::String)
                .build(),
        )
        .expect("register");
    let value = ObjectValue::new(&desc);
    value
        .borrow_mut()
        .set("body", "a reasonably long body string")
        .expect("body");

    let bytes = engine.serialize(&Value::Object(value)).expect("serialize");
    let err = engine.deserialize(&bytes[..bytes.len() - 10]).unwrap_err();
    match err {
        rewire::Error::Deserialization { partial, .. } => {
            // The root object was allocated and registered before its
            // fields failed to decode.
            assert_eq!(partial.len(), 1);
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_strict_mode_roundtrip() {
    let engine = Engine::builder().mode(Mode::SchemaConsistent).build();
    let desc = engine.register(point_type()).expect("register");
    let value = ObjectValue::new(&desc);
    value.borrow_mut().set("y", 1000i32).expect("y");
    let expected = Value::Object(value);
    assert_eq!(roundtrip(&engine, &expected), expected);
}
