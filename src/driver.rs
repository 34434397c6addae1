//! Public entry point (C8). A `Driver` owns a codec registry and the set of
//! schemas currently loaded, and exposes the encode/decode/size/info
//! surface a host calls against message ids. Mirrors the source engine's
//! `Codec` class: one long-lived instance per application, wrapped in a
//! coarse mutex since the registry and loaded-schema map are the only
//! shared mutable state (every other module here is pure data plus
//! per-call `TraversalContext`).

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::arithmetic::ArithmeticCodec;
use crate::bitvec::BitVec;
use crate::codec_trait::{ceil_log2, FieldCodec};
use crate::codecs::{BoolCodec, BytesCodec, EnumCodec, NumericCodec, StaticCodec, StringCodec, TimeCodec, TimeUnit, VarBytesCodec};
use crate::context::{Part, TraversalContext};
use crate::crypto;
use crate::dynamic_conditions::DynamicConditions;
use crate::id_codec::{DefaultIdCodec, IdCodec};
use crate::message_codec::MessageCodec;
use crate::registry::CodecRegistry;
use crate::result::{require, Error, Result};
use crate::schema::{FieldDescriptor, FieldType, MessageDescriptor};
use crate::value::{MessageView, MessageViewMut};

const NUMERIC_TYPES: &[FieldType] =
    &[FieldType::Int32, FieldType::Int64, FieldType::UInt32, FieldType::UInt64, FieldType::Float, FieldType::Double];

const STATIC_TYPES: &[FieldType] = &[
    FieldType::Bool,
    FieldType::Int32,
    FieldType::Int64,
    FieldType::UInt32,
    FieldType::UInt64,
    FieldType::Float,
    FieldType::Double,
    FieldType::String,
    FieldType::Enum,
];

fn register_defaults(registry: &mut CodecRegistry) {
    for version in [2u32, 3, 4] {
        let default = format!("dccl.default{version}");
        let presence = format!("dccl.presence{version}");
        let time = format!("dccl.time{version}");
        let statik = format!("dccl.static{version}");
        let var_bytes = format!("dccl.var_bytes{version}");

        registry.register(FieldType::Bool, &default, Arc::new(BoolCodec::new(&default)));
        registry.register(FieldType::Enum, &default, Arc::new(EnumCodec::new(&default)));
        registry.register(FieldType::String, &default, Arc::new(StringCodec::new(&default)));
        registry.register(FieldType::Bytes, &default, Arc::new(BytesCodec::new(&default)));
        for &t in NUMERIC_TYPES {
            registry.register(t, &default, Arc::new(NumericCodec::new(&default)));
            registry.register(t, &presence, Arc::new(NumericCodec::with_presence_bit(&presence)));
            registry.register(t, &time, Arc::new(TimeCodec::new(&time, TimeUnit::Seconds)));
        }
        registry.register(FieldType::Bytes, &var_bytes, Arc::new(VarBytesCodec::new(&var_bytes)));
        for &t in STATIC_TYPES {
            registry.register(t, &statik, Arc::new(StaticCodec::new(&statik)));
        }
    }
    for &t in NUMERIC_TYPES.iter().chain(std::iter::once(&FieldType::Enum)) {
        registry.register(t, "dccl.arithmetic", Arc::new(ArithmeticCodec::new("dccl.arithmetic")));
    }
}

/// A schema registered with [`Driver::load`], plus its folded hash.
struct LoadedSchema {
    descriptor: Arc<MessageDescriptor>,
    hash: u64,
}

struct State {
    registry: CodecRegistry,
    by_id: HashMap<u32, LoadedSchema>,
    /// Maps a loaded message's full name to the id it's keyed under in
    /// `by_id` — its own `id` option, or the `user_id` override bound at
    /// `load` time. Lets `encode` resolve the effective id from a
    /// `MessageView` whose descriptor may not carry the overriding id.
    id_by_name: HashMap<String, u32>,
}

pub struct Driver {
    state: Mutex<State>,
    dynamic_conditions: DynamicConditions,
    strict: bool,
    id_codec: Box<dyn IdCodec>,
    crypto_passphrase: Option<String>,
    crypto_skip_ids: HashSet<u32>,
}

impl Driver {
    pub fn new() -> Self {
        let mut registry = CodecRegistry::new();
        register_defaults(&mut registry);
        Self {
            state: Mutex::new(State { registry, by_id: HashMap::new(), id_by_name: HashMap::new() }),
            dynamic_conditions: DynamicConditions::noop(),
            strict: true,
            id_codec: Box::new(DefaultIdCodec),
            crypto_passphrase: None,
            crypto_skip_ids: HashSet::new(),
        }
    }

    pub fn with_dynamic_conditions(mut self, dynamic_conditions: DynamicConditions) -> Self {
        self.dynamic_conditions = dynamic_conditions;
        self
    }

    pub fn set_strict(&mut self, strict: bool) {
        self.strict = strict;
    }

    pub fn set_id_codec(&mut self, id_codec: Box<dyn IdCodec>) {
        self.id_codec = id_codec;
    }

    /// Enables body encryption under `passphrase`; ids in `skip_ids` are
    /// sent in the clear regardless (e.g. a plaintext discovery/ping
    /// message that must stay readable by any listener).
    pub fn set_crypto_passphrase(&mut self, passphrase: impl Into<String>, skip_ids: impl IntoIterator<Item = u32>) {
        self.crypto_passphrase = Some(passphrase.into());
        self.crypto_skip_ids = skip_ids.into_iter().collect();
    }

    pub fn clear_crypto_passphrase(&mut self) {
        self.crypto_passphrase = None;
        self.crypto_skip_ids.clear();
    }

    /// Registers an additional named codec, e.g. a host-specific codec
    /// group referenced by schema `codec`/`codec_group` options.
    pub fn register_codec(&self, field_type: FieldType, name: impl Into<String>, codec: Arc<dyn FieldCodec>) {
        let mut state = self.state.lock().expect("driver state poisoned");
        state.registry.register(field_type, name, codec);
    }

    /// Validates `descriptor`, resolves and validates a codec for every
    /// field (recursively into nested messages), folds all of that into a
    /// schema hash, and registers the message under its effective id:
    /// `user_id` when given, otherwise the message's own `id` option.
    /// Returns the hash so callers can detect two peers running mismatched
    /// schemas.
    pub fn load(&self, descriptor: Arc<MessageDescriptor>, user_id: Option<u32>) -> Result<u64> {
        descriptor.validate()?;
        let id = user_id.unwrap_or(descriptor.id()?);
        let mut state = self.state.lock().expect("driver state poisoned");
        let version = descriptor.codec_version();
        let mut hash: u64 = 0xcbf29ce484222325;
        hash_message(&state.registry, &descriptor, version, &mut hash)?;
        state.id_by_name.insert(descriptor.full_name.clone(), id);
        state.by_id.insert(id, LoadedSchema { descriptor: descriptor.clone(), hash });
        info!(message = %descriptor.full_name, id, hash, "loaded dccl schema");
        Ok(hash)
    }

    pub fn unload(&self, id: u32) {
        let mut state = self.state.lock().expect("driver state poisoned");
        if let Some(loaded) = state.by_id.remove(&id) {
            state.id_by_name.remove(&loaded.descriptor.full_name);
        }
    }

    pub fn unload_all(&self) {
        let mut state = self.state.lock().expect("driver state poisoned");
        state.by_id.clear();
        state.id_by_name.clear();
    }

    /// Resolves the effective id a loaded message of type `full_name` was
    /// registered under (its own `id` option, or a `user_id` override).
    fn id_for_name(&self, full_name: &str) -> Result<u32> {
        let state = self.state.lock().expect("driver state poisoned");
        state.id_by_name.get(full_name).copied().ok_or_else(|| Error::schema(format!("no schema loaded for message {full_name}")))
    }

    fn loaded(&self, id: u32) -> Result<(Arc<MessageDescriptor>, u64)> {
        let state = self.state.lock().expect("driver state poisoned");
        let loaded = state.by_id.get(&id).ok_or_else(|| Error::schema(format!("no schema loaded for id {id}")))?;
        Ok((loaded.descriptor.clone(), loaded.hash))
    }

    /// Reads just the leading id bytes of an already-encoded message,
    /// without needing the message loaded.
    pub fn id(&self, bytes: &[u8]) -> Result<u32> {
        self.id_codec.id_from_bytes(bytes)
    }

    pub fn encode(&self, msg: &dyn MessageView) -> Result<Vec<u8>> {
        let id = self.id_for_name(&msg.descriptor().full_name)?;
        let (desc, _hash) = self.loaded(id)?;
        require(desc.full_name == msg.descriptor().full_name, format!("message id {id} is loaded as a different type"))?;

        let mut ctx = TraversalContext::new(desc.clone(), self.strict, self.dynamic_conditions.clone());
        let registry_guard = self.state.lock().expect("driver state poisoned");
        let codec = MessageCodec::new(&registry_guard.registry);

        ctx.enter(desc.clone(), None, Part::Head);
        let mut head_bits = codec.encode_pass(&desc, msg, msg, &mut ctx, Part::Head, Part::Body)?;
        ctx.exit();
        pad_to_byte(&mut head_bits);

        ctx.enter(desc.clone(), None, Part::Body);
        let mut body_bits = codec.encode_pass(&desc, msg, msg, &mut ctx, Part::Body, Part::Body)?;
        ctx.exit();
        pad_to_byte(&mut body_bits);
        drop(registry_guard);

        let head_bytes = head_bits.to_byte_vec();
        let mut body_bytes = body_bits.to_byte_vec();
        if let Some(passphrase) = &self.crypto_passphrase {
            if !self.crypto_skip_ids.contains(&id) {
                body_bytes = crypto::apply_keystream(passphrase, &head_bytes, &body_bytes)?;
            }
        }

        let id_bytes = self.id_codec.encode(id)?.to_byte_vec();
        let mut out = Vec::with_capacity(id_bytes.len() + head_bytes.len() + body_bytes.len());
        out.extend_from_slice(&id_bytes);
        out.extend_from_slice(&head_bytes);
        out.extend_from_slice(&body_bytes);
        debug!(message = %desc.full_name, id, bytes = out.len(), "encoded dccl message");

        if let Some(max_bytes) = desc.options.max_bytes {
            require(out.len() <= max_bytes, format!("{}: encoded size {} exceeds max_bytes {max_bytes}", desc.full_name, out.len()))?;
        }
        Ok(out)
    }

    /// Decodes `bytes` into `msg`. When `header_only` is set, only head
    /// fields are populated and the body is left untouched — useful for a
    /// router that only needs to inspect head fields before dispatching.
    pub fn decode(&self, bytes: &[u8], msg: &mut dyn MessageViewMut, header_only: bool) -> Result<()> {
        let id = self.id_codec.id_from_bytes(bytes)?;
        let id_len = self.id_codec.encoded_len(id);
        require(bytes.len() >= id_len, "buffer shorter than id")?;
        let (desc, _hash) = self.loaded(id)?;
        require(desc.full_name == msg.descriptor().full_name, format!("message id {id} is loaded as a different type"))?;

        let remaining = &bytes[id_len..];
        let mut pool = BitVec::from_byte_slice(remaining);
        let before = pool.len();

        let mut ctx = TraversalContext::new(desc.clone(), self.strict, self.dynamic_conditions.clone());
        let registry_guard = self.state.lock().expect("driver state poisoned");
        let codec = MessageCodec::new(&registry_guard.registry);

        ctx.enter(desc.clone(), None, Part::Head);
        codec.decode_pass(&desc, &mut pool, msg, &mut ctx, Part::Head, Part::Body)?;
        ctx.exit();
        let head_bits_consumed = before - pool.len();
        let head_byte_len = head_bits_consumed.div_ceil(8);
        drop(registry_guard);

        if header_only {
            return Ok(());
        }

        require(remaining.len() >= head_byte_len, "buffer truncated before end of head")?;
        let head_bytes = &remaining[..head_byte_len];
        let body_bytes_raw = &remaining[head_byte_len..];
        let body_bytes = if let Some(passphrase) = &self.crypto_passphrase {
            if self.crypto_skip_ids.contains(&id) {
                body_bytes_raw.to_vec()
            } else {
                crypto::apply_keystream(passphrase, head_bytes, body_bytes_raw)?
            }
        } else {
            body_bytes_raw.to_vec()
        };

        let mut body_pool = BitVec::from_byte_slice(&body_bytes);
        let registry_guard = self.state.lock().expect("driver state poisoned");
        let codec = MessageCodec::new(&registry_guard.registry);
        ctx.enter(desc.clone(), None, Part::Body);
        codec.decode_pass(&desc, &mut body_pool, msg, &mut ctx, Part::Body, Part::Body)?;
        ctx.exit();
        debug!(message = %desc.full_name, id, "decoded dccl message");
        Ok(())
    }

    pub fn size(&self, msg: &dyn MessageView) -> Result<usize> {
        Ok(self.encode(msg)?.len())
    }

    pub fn max_size(&self, id: u32) -> Result<usize> {
        let (desc, _) = self.loaded(id)?;
        let state = self.state.lock().expect("driver state poisoned");
        let id_bits = if crate::id_codec::is_long_form(id) { 16 } else { 8 };
        let head = message_bound(&state.registry, &desc, Part::Head, Part::Body, true)?;
        let body = message_bound(&state.registry, &desc, Part::Body, Part::Body, true)?;
        Ok((id_bits + round_up8(head) + round_up8(body)) / 8)
    }

    pub fn min_size(&self, id: u32) -> Result<usize> {
        let (desc, _) = self.loaded(id)?;
        let state = self.state.lock().expect("driver state poisoned");
        let id_bits = 8;
        let head = message_bound(&state.registry, &desc, Part::Head, Part::Body, false)?;
        let body = message_bound(&state.registry, &desc, Part::Body, Part::Body, false)?;
        Ok((id_bits + round_up8(head) + round_up8(body)) / 8)
    }

    /// Writes a human-readable field-by-field description of the loaded
    /// schema `id`. `max_width` wraps long codec `info()` lines to that many
    /// columns; `None` leaves them unwrapped.
    pub fn info(&self, id: u32, sink: &mut dyn std::fmt::Write, max_width: Option<usize>) -> Result<()> {
        let (desc, hash) = self.loaded(id)?;
        let state = self.state.lock().expect("driver state poisoned");
        write_message_info(&state.registry, &desc, hash, sink, 0, max_width)
    }

    pub fn info_all(&self, sink: &mut dyn std::fmt::Write, max_width: Option<usize>) -> Result<()> {
        let state = self.state.lock().expect("driver state poisoned");
        let mut ids: Vec<u32> = state.by_id.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            let loaded = &state.by_id[&id];
            write_message_info(&state.registry, &loaded.descriptor, loaded.hash, sink, 0, max_width)
                .map_err(|e| Error::internal(e.to_string()))?;
        }
        Ok(())
    }
}

impl Default for Driver {
    fn default() -> Self {
        Self::new()
    }
}

fn pad_to_byte(bits: &mut BitVec) {
    let pad = (8 - bits.len() % 8) % 8;
    for _ in 0..pad {
        bits.push_back(false);
    }
}

fn round_up8(bits: usize) -> usize {
    bits.div_ceil(8) * 8
}

/// Wraps `text` at `max_width` columns, breaking on word boundaries; `None`
/// leaves the line unwrapped. Carried over from the source engine's
/// terminal-facing `info()` output.
fn wrap(text: &str, indent: &str, max_width: Option<usize>) -> String {
    let Some(max_width) = max_width else { return text.to_string() };
    let mut out = String::new();
    let mut line_len = 0;
    for word in text.split_whitespace() {
        if line_len > 0 && line_len + 1 + word.len() > max_width {
            out.push('\n');
            out.push_str(indent);
            line_len = 0;
        } else if line_len > 0 {
            out.push(' ');
            line_len += 1;
        }
        out.push_str(word);
        line_len += word.len();
    }
    out
}

fn write_message_info(
    registry: &CodecRegistry,
    desc: &MessageDescriptor,
    hash: u64,
    sink: &mut dyn std::fmt::Write,
    depth: usize,
    max_width: Option<usize>,
) -> Result<()> {
    let indent = "  ".repeat(depth);
    writeln!(sink, "{indent}message {} (id {}, hash {hash:#018x})", desc.full_name, desc.id().unwrap_or(0))
        .map_err(|e| Error::internal(e.to_string()))?;
    for field in &desc.fields {
        if field.field_type == FieldType::Message {
            let nested = field.message_type.as_ref().ok_or_else(|| Error::schema("message field missing message_type"))?;
            writeln!(sink, "{indent}  {}: message", field.name).map_err(|e| Error::internal(e.to_string()))?;
            write_message_info(registry, nested, 0, sink, depth + 2, max_width)?;
            continue;
        }
        let codec = registry.resolve(field, desc, desc.codec_version())?;
        let mut line = String::new();
        codec.info(field, &mut line)?;
        writeln!(sink, "{indent}  {}", wrap(&line, &format!("{indent}    "), max_width)).map_err(|e| Error::internal(e.to_string()))?;
    }
    Ok(())
}

fn hash_message(registry: &CodecRegistry, desc: &MessageDescriptor, version: u32, hash: &mut u64) -> Result<()> {
    mix(hash, desc.full_name.as_bytes());
    for field in &desc.fields {
        mix(hash, field.name.as_bytes());
        mix(hash, &[field.field_type as u8]);
        if field.field_type == FieldType::Message {
            let nested = field.message_type.as_ref().ok_or_else(|| Error::schema(format!("{}: missing message_type", field.name)))?;
            hash_message(registry, nested, nested.codec_version(), hash)?;
            continue;
        }
        let codec = registry.resolve(field, desc, version)?;
        codec.validate(field)?;
        mix(hash, &codec.hash(field).to_le_bytes());
    }
    Ok(())
}

fn mix(hash: &mut u64, bytes: &[u8]) {
    for b in bytes {
        *hash ^= *b as u64;
        *hash = hash.wrapping_mul(0x100000001b3);
    }
}

/// Static bit-count bound for one pass of `desc` (`exact_ceiling` picks
/// `max_size`/non-omittable worst case when true, `min_size` when false).
/// Used by [`Driver::max_size`]/[`Driver::min_size`]; dynamic conditions and
/// actual repeat counts are not evaluated here, so these are schema-level
/// bounds, not a specific message instance's exact size.
fn message_bound(
    registry: &CodecRegistry,
    desc: &MessageDescriptor,
    target: Part,
    default_part: Part,
    exact_ceiling: bool,
) -> Result<usize> {
    let version = desc.codec_version();
    let mut handled_oneofs = std::collections::HashSet::new();
    let mut bits = 0usize;
    for field in &desc.fields {
        if let Some(info) = field.options.oneof {
            if handled_oneofs.contains(&info.oneof_index) {
                continue;
            }
            handled_oneofs.insert(info.oneof_index);
            let members: Vec<&FieldDescriptor> =
                desc.fields.iter().filter(|f| f.options.oneof.map(|o| o.oneof_index) == Some(info.oneof_index)).collect();
            if members.first().map(|f| field_part(f, default_part)) != Some(target) {
                continue;
            }
            let case_count = members.len() as u64;
            bits += ceil_log2(case_count + 1) as usize;
            if exact_ceiling {
                bits += members
                    .iter()
                    .map(|f| field_bound(registry, f, desc, version, target, true))
                    .collect::<Result<Vec<_>>>()?
                    .into_iter()
                    .max()
                    .unwrap_or(0);
            }
            continue;
        }
        if field_part(field, default_part) != target || field.options.omit {
            continue;
        }
        bits += field_bound(registry, field, desc, version, target, exact_ceiling)?;
    }
    Ok(bits)
}

fn field_part(field: &FieldDescriptor, default_part: Part) -> Part {
    match field.options.in_head {
        Some(true) => Part::Head,
        Some(false) => Part::Body,
        None => default_part,
    }
}

fn field_bound(
    registry: &CodecRegistry,
    field: &FieldDescriptor,
    desc: &MessageDescriptor,
    version: u32,
    own_part: Part,
    ceiling: bool,
) -> Result<usize> {
    if field.field_type == FieldType::Message {
        let nested = field.message_type.as_ref().ok_or_else(|| Error::schema(format!("{}: missing message_type", field.name)))?;
        let presence = if field.is_optional() && version >= 3 { 1 } else { 0 };
        let per = message_bound(registry, nested, own_part, own_part, ceiling)?;
        return Ok(if field.is_repeated() {
            let max_repeat = field.options.max_repeat.unwrap_or(1);
            let min_repeat = field.options.min_repeat.unwrap_or(0);
            let count_bits = if version >= 3 { ceil_log2((max_repeat - min_repeat + 1) as u64) as usize } else { 0 };
            let reps = if ceiling { max_repeat } else { min_repeat };
            count_bits + reps * per
        } else {
            presence + per
        });
    }

    let codec = registry.resolve(field, desc, version)?;
    let per = if ceiling { codec.max_size(field)? } else { codec.min_size(field)? };
    if field.is_repeated() {
        let max_repeat = field.options.max_repeat.unwrap_or(1);
        let min_repeat = field.options.min_repeat.unwrap_or(0);
        let count_bits = if version >= 3 { ceil_log2((max_repeat - min_repeat + 1) as u64) as usize } else { 0 };
        let reps = if ceiling { max_repeat } else { min_repeat };
        Ok(count_bits + reps * per)
    } else {
        Ok(per)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Cardinality, FieldOptions};
    use crate::value::{DynamicMessage, Value};

    fn schema() -> Arc<MessageDescriptor> {
        Arc::new(
            MessageDescriptor {
                full_name: "test.Ping".into(),
                fields: vec![FieldDescriptor {
                    name: "seq".into(),
                    position: 0,
                    field_type: FieldType::Int32,
                    cardinality: Cardinality::Required,
                    options: FieldOptions { min: Some(0.0), max: Some(255.0), resolution: Some(1.0), ..Default::default() },
                    message_type: None,
                    enum_values: vec![],
                }],
                options: crate::schema::MessageOptions { id: Some(5), codec_version: Some(3), ..Default::default() },
            },
        )
    }

    #[test]
    fn round_trips_through_driver() {
        let driver = Driver::new();
        let desc = schema();
        driver.load(desc.clone(), None).unwrap();

        let mut msg = DynamicMessage::new(desc.clone());
        msg.set("seq", Value::Int32(42));

        let bytes = driver.encode(&msg).unwrap();
        assert_eq!(driver.id(&bytes).unwrap(), 5);

        let mut out = DynamicMessage::new(desc);
        driver.decode(&bytes, &mut out, false).unwrap();
        assert_eq!(out.get("seq"), Some(&Value::Int32(42)));
    }

    #[test]
    fn encrypted_round_trip() {
        let mut driver = Driver::new();
        driver.set_crypto_passphrase("hunter2", Vec::<u32>::new());
        let desc = schema();
        driver.load(desc.clone(), None).unwrap();

        let mut msg = DynamicMessage::new(desc.clone());
        msg.set("seq", Value::Int32(7));
        let bytes = driver.encode(&msg).unwrap();

        let mut out = DynamicMessage::new(desc);
        driver.decode(&bytes, &mut out, false).unwrap();
        assert_eq!(out.get("seq"), Some(&Value::Int32(7)));
    }

    #[test]
    fn max_size_is_at_least_actual_encoded_size() {
        let driver = Driver::new();
        let desc = schema();
        driver.load(desc.clone(), None).unwrap();
        let mut msg = DynamicMessage::new(desc);
        msg.set("seq", Value::Int32(200));
        let bytes = driver.encode(&msg).unwrap();
        assert!(driver.max_size(5).unwrap() >= bytes.len());
    }

    #[test]
    fn info_mentions_field_name_and_wraps_at_requested_width() {
        let driver = Driver::new();
        let desc = schema();
        driver.load(desc.clone(), None).unwrap();

        let mut unwrapped = String::new();
        driver.info(5, &mut unwrapped, None).unwrap();
        assert!(unwrapped.contains("seq"));

        let mut wrapped = String::new();
        driver.info(5, &mut wrapped, Some(10)).unwrap();
        assert!(wrapped.lines().all(|l| l.len() <= 10 || !l.trim().contains(' ')));
    }

    #[test]
    fn info_all_reports_every_loaded_schema() {
        let driver = Driver::new();
        driver.load(schema(), None).unwrap();
        let mut out = String::new();
        driver.info_all(&mut out, None).unwrap();
        assert!(out.contains("test.Ping"));
    }
}
