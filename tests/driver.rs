use std::sync::Arc;

use dccl_codec::{Cardinality, Driver, DynamicMessage, FieldDescriptor, FieldOptions, FieldType, MessageDescriptor, MessageOptions, Value};

fn field(name: &str, field_type: FieldType, cardinality: Cardinality, options: FieldOptions) -> FieldDescriptor {
    FieldDescriptor { name: name.into(), position: 0, field_type, cardinality, options, message_type: None, enum_values: vec![] }
}

fn bounded(min: f64, max: f64) -> FieldOptions {
    FieldOptions { min: Some(min), max: Some(max), resolution: Some(1.0), ..Default::default() }
}

fn nav_report() -> Arc<MessageDescriptor> {
    Arc::new(MessageDescriptor {
        full_name: "test.NavReport".into(),
        fields: vec![
            field("x", FieldType::Int32, Cardinality::Required, bounded(-180.0, 180.0)),
            field("y", FieldType::Int32, Cardinality::Optional, bounded(-90.0, 90.0)),
            field("moving", FieldType::Bool, Cardinality::Required, FieldOptions::default()),
        ],
        options: MessageOptions { id: Some(12), codec_version: Some(3), ..Default::default() },
    })
}

#[test]
fn round_trips_a_message_with_an_absent_optional_field() {
    let driver = Driver::new();
    let desc = nav_report();
    driver.load(desc.clone(), None).unwrap();

    let mut msg = DynamicMessage::new(desc.clone());
    msg.set("x", Value::Int32(42));
    msg.set("moving", Value::Bool(true));

    let bytes = driver.encode(&msg).unwrap();
    let mut out = DynamicMessage::new(desc);
    driver.decode(&bytes, &mut out, false).unwrap();

    assert_eq!(out.get("x"), Some(&Value::Int32(42)));
    assert_eq!(out.get("y"), None);
    assert_eq!(out.get("moving"), Some(&Value::Bool(true)));
}

#[test]
fn encoded_size_never_exceeds_max_size() {
    let driver = Driver::new();
    let desc = nav_report();
    driver.load(desc.clone(), None).unwrap();

    let mut msg = DynamicMessage::new(desc.clone());
    msg.set("x", Value::Int32(-180));
    msg.set("y", Value::Int32(90));
    msg.set("moving", Value::Bool(false));

    let bytes = driver.encode(&msg).unwrap();
    let bound = driver.max_size(12).unwrap();
    assert!(bytes.len() <= bound, "{} > {bound}", bytes.len());
}

#[test]
fn encoding_is_deterministic() {
    let driver = Driver::new();
    let desc = nav_report();
    driver.load(desc.clone(), None).unwrap();

    let mut msg = DynamicMessage::new(desc);
    msg.set("x", Value::Int32(7));
    msg.set("moving", Value::Bool(true));

    let first = driver.encode(&msg).unwrap();
    let second = driver.encode(&msg).unwrap();
    assert_eq!(first, second);
}

#[test]
fn leading_bytes_carry_the_message_id() {
    let driver = Driver::new();
    let desc = nav_report();
    driver.load(desc.clone(), None).unwrap();

    let mut msg = DynamicMessage::new(desc);
    msg.set("x", Value::Int32(1));
    msg.set("moving", Value::Bool(false));

    let bytes = driver.encode(&msg).unwrap();
    assert_eq!(driver.id(&bytes).unwrap(), 12);
}

#[test]
fn repeated_int32_round_trips_under_codec_version_three() {
    let desc = Arc::new(MessageDescriptor {
        full_name: "test.Readings".into(),
        fields: vec![field("samples", FieldType::Int32, Cardinality::Repeated, {
            let mut o = bounded(0.0, 100.0);
            o.min_repeat = Some(0);
            o.max_repeat = Some(8);
            o
        })],
        options: MessageOptions { id: Some(20), codec_version: Some(3), ..Default::default() },
    });

    let driver = Driver::new();
    driver.load(desc.clone(), None).unwrap();

    let mut msg = DynamicMessage::new(desc.clone());
    msg.set_repeated("samples", vec![Value::Int32(1), Value::Int32(50), Value::Int32(99)]);

    let bytes = driver.encode(&msg).unwrap();
    let mut out = DynamicMessage::new(desc);
    driver.decode(&bytes, &mut out, false).unwrap();
    assert_eq!(out.get_repeated("samples"), &[Value::Int32(1), Value::Int32(50), Value::Int32(99)]);
}

#[test]
fn dynamic_omit_drops_field_relative_to_static_encoding() {
    struct OmitY;
    impl dccl_codec::dynamic_conditions::PredicateEvaluator for OmitY {
        fn eval_bool(&self, expr: &str, _scope: &dccl_codec::dynamic_conditions::PredicateScope) -> bool {
            expr == "omit_y"
        }
        fn eval_double(&self, _expr: &str, _scope: &dccl_codec::dynamic_conditions::PredicateScope) -> f64 {
            f64::NAN
        }
    }

    let mut y_opts = bounded(-90.0, 90.0);
    y_opts.omit_if = Some("omit_y".into());
    let desc = Arc::new(MessageDescriptor {
        full_name: "test.Dynamic".into(),
        fields: vec![
            field("x", FieldType::Int32, Cardinality::Required, bounded(-180.0, 180.0)),
            field("y", FieldType::Int32, Cardinality::Optional, y_opts),
        ],
        options: MessageOptions { id: Some(21), codec_version: Some(3), ..Default::default() },
    });

    let dynamic = Driver::new()
        .with_dynamic_conditions(dccl_codec::dynamic_conditions::DynamicConditions::new(Arc::new(OmitY)));
    dynamic.load(desc.clone(), None).unwrap();

    let plain = Driver::new();
    plain.load(desc.clone(), None).unwrap();

    let mut msg = DynamicMessage::new(desc);
    msg.set("x", Value::Int32(5));
    msg.set("y", Value::Int32(5));

    let with_omit = dynamic.encode(&msg).unwrap();
    let without_omit = plain.encode(&msg).unwrap();
    assert!(with_omit.len() < without_omit.len());
}

#[test]
fn nested_message_field_round_trips() {
    let point = Arc::new(MessageDescriptor {
        full_name: "test.Point".into(),
        fields: vec![
            field("lat", FieldType::Int32, Cardinality::Required, bounded(-90.0, 90.0)),
            field("lon", FieldType::Int32, Cardinality::Required, bounded(-180.0, 180.0)),
        ],
        options: MessageOptions::default(),
    });
    let mut fix_field = field("fix", FieldType::Message, Cardinality::Required, FieldOptions::default());
    fix_field.message_type = Some(point.clone());
    let desc = Arc::new(MessageDescriptor {
        full_name: "test.Fix".into(),
        fields: vec![fix_field],
        options: MessageOptions { id: Some(22), codec_version: Some(3), ..Default::default() },
    });

    let driver = Driver::new();
    driver.load(desc.clone(), None).unwrap();

    let mut inner = DynamicMessage::new(point);
    inner.set("lat", Value::Int32(10));
    inner.set("lon", Value::Int32(-20));
    let mut msg = DynamicMessage::new(desc.clone());
    msg.set("fix", Value::Message(inner));

    let bytes = driver.encode(&msg).unwrap();
    let mut out = DynamicMessage::new(desc);
    driver.decode(&bytes, &mut out, false).unwrap();
    let nested = out.get("fix").unwrap().as_message().unwrap();
    assert_eq!(nested.get("lat"), Some(&Value::Int32(10)));
    assert_eq!(nested.get("lon"), Some(&Value::Int32(-20)));
}

#[test]
fn encrypted_wire_bytes_differ_from_plaintext_wire_bytes() {
    let desc = nav_report();
    let plain = Driver::new();
    plain.load(desc.clone(), None).unwrap();

    let mut encrypted = Driver::new();
    encrypted.set_crypto_passphrase("abyssal", Vec::<u32>::new());
    encrypted.load(desc.clone(), None).unwrap();

    let mut msg = DynamicMessage::new(desc.clone());
    msg.set("x", Value::Int32(3));
    msg.set("moving", Value::Bool(true));

    let plain_bytes = plain.encode(&msg).unwrap();
    let encrypted_bytes = encrypted.encode(&msg).unwrap();
    assert_ne!(plain_bytes, encrypted_bytes);

    let mut out = DynamicMessage::new(desc);
    encrypted.decode(&encrypted_bytes, &mut out, false).unwrap();
    assert_eq!(out.get("x"), Some(&Value::Int32(3)));
}

#[test]
fn oneof_case_round_trips_at_required_not_optional_width() {
    use dccl_codec::OneofInfo;

    // "x" pins the body to a byte boundary (5 bits) so the oneof member's
    // presence overhead (1 required bit vs. 2 optional bits) tips the total
    // across a byte: 5 + 2 (selector) + 1 (required bool) = 8 bits = 1 body
    // byte; were the selected case still encoded as optional it would cost
    // 5 + 2 + 2 = 9 bits, rounding up to 2 body bytes.
    let x = field("x", FieldType::Int32, Cardinality::Required, bounded(0.0, 31.0));
    let mut a = field("a", FieldType::Bool, Cardinality::Optional, FieldOptions::default());
    a.options.oneof = Some(OneofInfo { oneof_index: 0, case_count: 2 });
    let mut b = field("b", FieldType::Bool, Cardinality::Optional, FieldOptions::default());
    b.options.oneof = Some(OneofInfo { oneof_index: 0, case_count: 2 });
    let desc = Arc::new(MessageDescriptor {
        full_name: "test.Choice".into(),
        fields: vec![x, a, b],
        options: MessageOptions { id: Some(30), codec_version: Some(4), ..Default::default() },
    });

    let driver = Driver::new();
    driver.load(desc.clone(), None).unwrap();

    let mut msg = DynamicMessage::new(desc.clone());
    msg.set("x", Value::Int32(7));
    msg.set("b", Value::Bool(true));
    let bytes = driver.encode(&msg).unwrap();

    // 1 id byte + 0 head bytes + 1 body byte.
    assert_eq!(bytes.len(), 2, "oneof case encoded at optional width instead of required width");

    let mut out = DynamicMessage::new(desc);
    driver.decode(&bytes, &mut out, false).unwrap();
    assert_eq!(out.get("a"), None);
    assert_eq!(out.get("b"), Some(&Value::Bool(true)));
}

#[test]
fn arithmetic_codec_round_trips_repeated_samples() {
    use dccl_codec::arithmetic::ArithmeticModel;

    // Wire values this test actually encodes: i * 37 for i in 0..10.
    let wire_values: Vec<f64> = (0..10).map(|i| (i * 37) as f64).collect();
    let mut samples = field("samples", FieldType::Int32, Cardinality::Repeated, bounded(0.0, 1000.0));
    samples.options.codec = Some("dccl.arithmetic".into());
    samples.options.min_repeat = Some(0);
    samples.options.max_repeat = Some(16);
    samples.options.arithmetic_model = Some(ArithmeticModel {
        values: wire_values.clone(),
        frequencies: vec![1; wire_values.len()],
        eof_frequency: 1,
        out_of_range_frequency: 1,
        adaptive: false,
    });
    let desc = Arc::new(MessageDescriptor {
        full_name: "test.Arith".into(),
        fields: vec![samples],
        options: MessageOptions { id: Some(31), codec_version: Some(3), ..Default::default() },
    });

    let driver = Driver::new();
    driver.load(desc.clone(), None).unwrap();

    let mut msg = DynamicMessage::new(desc.clone());
    let values: Vec<Value> = wire_values.iter().map(|v| Value::Int32(*v as i32)).collect();
    msg.set_repeated("samples", values.clone());

    let bytes = driver.encode(&msg).unwrap();
    let mut out = DynamicMessage::new(desc);
    driver.decode(&bytes, &mut out, false).unwrap();
    assert_eq!(out.get_repeated("samples"), values.as_slice());
}

#[test]
fn header_only_decode_leaves_body_fields_untouched() {
    let mut y_opts = bounded(-90.0, 90.0);
    y_opts.in_head = Some(true);
    let desc = Arc::new(MessageDescriptor {
        full_name: "test.HeaderSplit".into(),
        fields: vec![
            field("y", FieldType::Int32, Cardinality::Required, y_opts),
            field("x", FieldType::Int32, Cardinality::Required, bounded(-180.0, 180.0)),
        ],
        options: MessageOptions { id: Some(23), codec_version: Some(3), ..Default::default() },
    });

    let driver = Driver::new();
    driver.load(desc.clone(), None).unwrap();

    let mut msg = DynamicMessage::new(desc.clone());
    msg.set("y", Value::Int32(9));
    msg.set("x", Value::Int32(11));
    let bytes = driver.encode(&msg).unwrap();

    let mut out = DynamicMessage::new(desc);
    driver.decode(&bytes, &mut out, true).unwrap();
    assert_eq!(out.get("y"), Some(&Value::Int32(9)));
    assert_eq!(out.get("x"), None);
}

#[test]
fn user_id_override_wins_over_the_schemas_own_id_option() {
    let desc = nav_report();
    assert_eq!(desc.options.id, Some(12));

    let driver = Driver::new();
    driver.load(desc.clone(), Some(99)).unwrap();

    let mut msg = DynamicMessage::new(desc.clone());
    msg.set("x", Value::Int32(1));
    msg.set("moving", Value::Bool(false));

    let bytes = driver.encode(&msg).unwrap();
    assert_eq!(driver.id(&bytes).unwrap(), 99);

    let mut out = DynamicMessage::new(desc);
    driver.decode(&bytes, &mut out, false).unwrap();
    assert_eq!(out.get("x"), Some(&Value::Int32(1)));

    // The schema's own id (12) was never registered.
    assert!(driver.max_size(12).is_err());
}
