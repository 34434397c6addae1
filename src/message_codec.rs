//! Recursive message traversal (C7): walks a schema-described message in
//! declared field order, dispatching each field to its resolved codec and
//! composing the results into one `BitVec` per pass (head or body).
//! Spans codec versions 2, 3 and 4 (§9 keeps all three rather than
//! dropping version 2 as a legacy-compat surface).

use std::collections::HashSet;
use std::sync::Arc;

use crate::bitvec::BitVec;
use crate::codec_trait::{ceil_log2, FieldCodec};
use crate::context::{Part, TraversalContext};
use crate::dynamic_conditions::{DynamicOutcome, PredicateScope};
use crate::registry::CodecRegistry;
use crate::result::{Error, Result};
use crate::schema::{Cardinality, FieldDescriptor, FieldType, MessageDescriptor};
use crate::value::{DynamicMessage, FieldValue, MessageView, MessageViewMut, Value};

fn effective_part(field: &FieldDescriptor, default_part: Part) -> Part {
    match field.options.in_head {
        Some(true) => Part::Head,
        Some(false) => Part::Body,
        None => default_part,
    }
}

fn has_dynamic_conditions(field: &FieldDescriptor) -> bool {
    let o = &field.options;
    o.required_if.is_some() || o.omit_if.is_some() || o.only_if.is_some() || o.min_if.is_some() || o.max_if.is_some()
}

fn dynamic_outcome(field: &FieldDescriptor, msg: &dyn MessageView, root: &dyn MessageView, ctx: &TraversalContext) -> DynamicOutcome {
    let scope = PredicateScope { this: msg, root, this_index: None };
    ctx.dynamic_conditions.evaluate(
        field.options.required_if.as_deref(),
        field.options.omit_if.as_deref(),
        field.options.only_if.as_deref(),
        field.options.min_if.as_deref(),
        field.options.max_if.as_deref(),
        &scope,
    )
}

/// Clones `field` with `outcome`'s `min`/`max` overrides applied, so the
/// codec a field resolves to never needs to know dynamic conditions exist;
/// it only ever sees already-tightened static bounds (see
/// `codecs::numeric_bounds`).
fn tighten(field: &FieldDescriptor, outcome: &DynamicOutcome) -> FieldDescriptor {
    if outcome.min.is_none() && outcome.max.is_none() {
        return field.clone();
    }
    let mut f = field.clone();
    if let Some(min) = outcome.min {
        f.options.min = Some(min);
    }
    if let Some(max) = outcome.max {
        f.options.max = Some(max);
    }
    f
}

/// Position of `field` within the declared order of fields sharing its
/// `oneof_index`; used as the oneof's wire case index (1-based, 0 means
/// unset).
fn oneof_case_index(desc: &MessageDescriptor, field: &FieldDescriptor) -> usize {
    let Some(info) = field.options.oneof else { return 0 };
    desc.fields
        .iter()
        .filter(|f| f.options.oneof.map(|o| o.oneof_index) == Some(info.oneof_index))
        .position(|f| f.name == field.name)
        .map(|i| i + 1)
        .unwrap_or(0)
}

fn oneof_members<'a>(desc: &'a MessageDescriptor, oneof_index: u32) -> Vec<&'a FieldDescriptor> {
    desc.fields.iter().filter(|f| f.options.oneof.map(|o| o.oneof_index) == Some(oneof_index)).collect()
}

/// Clones `field` with `Cardinality::Required` so a codec's `is_optional()`
/// check skips the normal optional-field presence overhead; used for oneof
/// members, whose presence is already carried by the case selector.
fn as_required(field: &FieldDescriptor) -> FieldDescriptor {
    let mut required = field.clone();
    required.cardinality = Cardinality::Required;
    required
}

pub struct MessageCodec<'a> {
    pub registry: &'a CodecRegistry,
}

impl<'a> MessageCodec<'a> {
    pub fn new(registry: &'a CodecRegistry) -> Self {
        Self { registry }
    }

    /// Encodes one pass (`target`) of `msg` against `desc`, recursing into
    /// nested messages. `default_part` is the part fields without an
    /// `in_head` override fall back to — the enclosing field's own
    /// effective part, or `Part::Body` at the top level.
    pub fn encode_pass(
        &self,
        desc: &Arc<MessageDescriptor>,
        msg: &dyn MessageView,
        root: &dyn MessageView,
        ctx: &mut TraversalContext,
        target: Part,
        default_part: Part,
    ) -> Result<BitVec> {
        let version = desc.codec_version();
        let mut out = BitVec::new();
        let mut handled_oneofs: HashSet<u32> = HashSet::new();

        for field in &desc.fields {
            if let Some(info) = field.options.oneof {
                if handled_oneofs.contains(&info.oneof_index) {
                    continue;
                }
                handled_oneofs.insert(info.oneof_index);
                let members = oneof_members(desc, info.oneof_index);
                if members.first().map(|f| effective_part(f, default_part)) != Some(target) {
                    continue;
                }
                out.append(&self.encode_oneof(desc, &members, msg, root, ctx, version)?);
                continue;
            }

            if effective_part(field, default_part) != target {
                continue;
            }

            let outcome = if has_dynamic_conditions(field) { dynamic_outcome(field, msg, root, ctx) } else { DynamicOutcome::default() };
            if field.options.omit || outcome.effectively_omitted() {
                continue;
            }
            let effective = tighten(field, &outcome);
            if outcome.required && !msg.field_value(&field.name).is_set() {
                return Err(Error::schema(format!("{}: forced required by dynamic condition but unset", field.name)));
            }
            out.append(&self.encode_field(desc, &effective, msg, root, ctx, version)?);
        }
        Ok(out)
    }

    fn encode_oneof(
        &self,
        desc: &MessageDescriptor,
        members: &[&FieldDescriptor],
        msg: &dyn MessageView,
        root: &dyn MessageView,
        ctx: &mut TraversalContext,
        version: u32,
    ) -> Result<BitVec> {
        let case_count = members.len() as u64;
        let selected = members.iter().find(|f| msg.field_value(&f.name).is_set());
        let mut out = BitVec::from_unsigned(
            selected.map(|f| oneof_case_index(desc, f) as u64).unwrap_or(0),
            ceil_log2(case_count + 1) as usize,
        );
        if let Some(field) = selected {
            // The selector bits already carry presence; the selected case is
            // encoded as required so codecs don't also reserve presence space.
            let required = as_required(field);
            match msg.field_value(&field.name) {
                FieldValue::Single(v) => out.append(&self.encode_scalar(desc, &required, v, root, ctx, version)?),
                _ => return Err(Error::schema(format!("{}: oneof case must hold a single value", field.name))),
            }
        }
        Ok(out)
    }

    fn encode_field(
        &self,
        desc: &MessageDescriptor,
        field: &FieldDescriptor,
        msg: &dyn MessageView,
        root: &dyn MessageView,
        ctx: &mut TraversalContext,
        version: u32,
    ) -> Result<BitVec> {
        if field.is_repeated() {
            let values = match msg.field_value(&field.name) {
                FieldValue::Repeated(v) => v.clone(),
                FieldValue::Unset => Vec::new(),
                FieldValue::Single(_) => return Err(Error::internal(format!("{}: repeated field stored as single value", field.name))),
            };
            if field.field_type == FieldType::Message {
                return self.encode_repeated_messages(field, &values, root, ctx, version);
            }
            let codec = self.registry.resolve(field, desc, version)?;
            let wire = values.iter().map(|v| codec.pre_encode(v.clone(), field)).collect::<Result<Vec<_>>>()?;
            return codec.encode_repeated(&wire, field, ctx, version);
        }

        match msg.field_value(&field.name) {
            FieldValue::Single(v) => self.encode_scalar(desc, field, v, root, ctx, version),
            FieldValue::Unset => {
                if field.is_optional() {
                    self.encode_absent_scalar(desc, field, version)
                } else {
                    Err(Error::schema(format!("{}: required field is unset", field.name)))
                }
            }
            FieldValue::Repeated(_) => Err(Error::internal(format!("{}: singular field stored as repeated", field.name))),
        }
    }

    fn encode_scalar(
        &self,
        desc: &MessageDescriptor,
        field: &FieldDescriptor,
        value: &Value,
        root: &dyn MessageView,
        ctx: &mut TraversalContext,
        version: u32,
    ) -> Result<BitVec> {
        if field.field_type == FieldType::Message {
            let nested = value.as_message()?;
            let nested_desc = field
                .message_type
                .clone()
                .ok_or_else(|| Error::schema(format!("{}: message field missing message_type", field.name)))?;
            let mut out = BitVec::new();
            if field.is_optional() && version >= 3 {
                out.push_back(true);
            }
            let own_part = effective_part(field, ctx.part);
            ctx.enter(nested_desc.clone(), Some(field.clone()), own_part);
            out.append(&self.encode_pass(&nested_desc, nested, root, ctx, own_part, own_part)?);
            ctx.exit();
            return Ok(out);
        }

        let codec = self.registry.resolve(field, desc, version)?;
        let wire = codec.pre_encode(value.clone(), field)?;
        codec.encode(&wire, field, ctx)
    }

    fn encode_absent_scalar(&self, desc: &MessageDescriptor, field: &FieldDescriptor, version: u32) -> Result<BitVec> {
        if field.field_type == FieldType::Message {
            if version >= 3 {
                return Ok(BitVec::from_unsigned(0, 1));
            }
            return Err(Error::schema(format!("{}: optional sub-message requires codec version >= 3", field.name)));
        }
        let codec = self.registry.resolve(field, desc, version)?;
        codec.encode_absent(field)
    }

    fn encode_repeated_messages(
        &self,
        field: &FieldDescriptor,
        values: &[Value],
        root: &dyn MessageView,
        ctx: &mut TraversalContext,
        version: u32,
    ) -> Result<BitVec> {
        let max_repeat = field.options.max_repeat.unwrap_or(1);
        let min_repeat = field.options.min_repeat.unwrap_or(0);
        let desc = field
            .message_type
            .clone()
            .ok_or_else(|| Error::schema(format!("{}: repeated message field missing message_type", field.name)))?;
        if values.len() > max_repeat || values.len() < min_repeat {
            return Err(Error::out_of_range(format!("{}: repeat count {} outside bounds", field.name, values.len())));
        }
        let mut out = BitVec::new();
        if version >= 3 {
            let count_bits = ceil_log2((max_repeat - min_repeat + 1) as u64) as usize;
            out.append(&BitVec::from_unsigned((values.len() - min_repeat) as u64, count_bits));
        }
        let own_part = effective_part(field, ctx.part);
        for v in values {
            let nested = v.as_message()?;
            ctx.enter(desc.clone(), Some(field.clone()), own_part);
            out.append(&self.encode_pass(&desc, nested, root, ctx, own_part, own_part)?);
            ctx.exit();
        }
        Ok(out)
    }

    /// Decodes one pass, populating fields on `msg` (a `MessageViewMut`).
    pub fn decode_pass(
        &self,
        desc: &Arc<MessageDescriptor>,
        pool: &mut BitVec,
        msg: &mut dyn MessageViewMut,
        ctx: &mut TraversalContext,
        target: Part,
        default_part: Part,
    ) -> Result<()> {
        let version = desc.codec_version();
        let mut handled_oneofs: HashSet<u32> = HashSet::new();

        for field in desc.fields.clone().iter() {
            if let Some(info) = field.options.oneof {
                if handled_oneofs.contains(&info.oneof_index) {
                    continue;
                }
                handled_oneofs.insert(info.oneof_index);
                let members = oneof_members(desc, info.oneof_index);
                if members.first().map(|f| effective_part(f, default_part)) != Some(target) {
                    continue;
                }
                self.decode_oneof(desc, &members, pool, msg, ctx, version)?;
                continue;
            }

            if effective_part(field, default_part) != target {
                continue;
            }
            if field.options.omit {
                continue;
            }
            self.decode_field(desc, field, pool, msg, ctx, version)?;
        }
        Ok(())
    }

    fn decode_oneof(
        &self,
        desc: &MessageDescriptor,
        members: &[&FieldDescriptor],
        pool: &mut BitVec,
        msg: &mut dyn MessageViewMut,
        ctx: &mut TraversalContext,
        version: u32,
    ) -> Result<()> {
        let case_count = members.len() as u64;
        let selector = BitVec::pull_from(pool, ceil_log2(case_count + 1) as usize)?.to_unsigned()?;
        if selector == 0 {
            return Ok(());
        }
        let field = *members
            .iter()
            .find(|f| oneof_case_index(desc, f) as u64 == selector)
            .ok_or_else(|| Error::decode("oneof selector out of range"))?;
        let required = as_required(field);
        let value = self.decode_scalar(desc, &required, pool, ctx, version)?;
        msg.set_field(&field.name, FieldValue::Single(value));
        Ok(())
    }

    fn decode_field(
        &self,
        desc: &MessageDescriptor,
        field: &FieldDescriptor,
        pool: &mut BitVec,
        msg: &mut dyn MessageViewMut,
        ctx: &mut TraversalContext,
        version: u32,
    ) -> Result<()> {
        if field.is_repeated() {
            if field.field_type == FieldType::Message {
                let values = self.decode_repeated_messages(field, pool, ctx, version)?;
                msg.set_field(&field.name, FieldValue::Repeated(values));
                return Ok(());
            }
            let codec = self.registry.resolve(field, desc, version)?;
            let raw = codec.decode_repeated(pool, field, ctx, version)?;
            let values = raw.into_iter().map(|v| codec.post_decode(v, field)).collect::<Result<Vec<_>>>()?;
            msg.set_field(&field.name, FieldValue::Repeated(values));
            return Ok(());
        }

        match self.decode_scalar(desc, field, pool, ctx, version) {
            Ok(value) => {
                msg.set_field(&field.name, FieldValue::Single(value));
                Ok(())
            }
            Err(Error::NullValue) => {
                msg.clear_field(&field.name);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn decode_scalar(
        &self,
        desc: &MessageDescriptor,
        field: &FieldDescriptor,
        pool: &mut BitVec,
        ctx: &mut TraversalContext,
        version: u32,
    ) -> Result<Value> {
        if field.field_type == FieldType::Message {
            let nested_desc = field
                .message_type
                .clone()
                .ok_or_else(|| Error::schema(format!("{}: message field missing message_type", field.name)))?;
            if field.is_optional() && version >= 3 {
                let present = BitVec::pull_from(pool, 1)?.to_unsigned()? == 1;
                if !present {
                    return Err(Error::NullValue);
                }
            }
            let mut nested = DynamicMessage::new(nested_desc.clone());
            let own_part = effective_part(field, ctx.part);
            ctx.enter(nested_desc.clone(), Some(field.clone()), own_part);
            self.decode_pass(&nested_desc, pool, &mut nested, ctx, own_part, own_part)?;
            ctx.exit();
            return Ok(Value::Message(nested));
        }

        let codec = self.registry.resolve(field, desc, version)?;
        let wire = codec.decode(pool, field, ctx)?;
        codec.post_decode(wire, field)
    }

    fn decode_repeated_messages(
        &self,
        field: &FieldDescriptor,
        pool: &mut BitVec,
        ctx: &mut TraversalContext,
        version: u32,
    ) -> Result<Vec<Value>> {
        let max_repeat = field.options.max_repeat.unwrap_or(1);
        let min_repeat = field.options.min_repeat.unwrap_or(0);
        let desc = field
            .message_type
            .clone()
            .ok_or_else(|| Error::schema(format!("{}: repeated message field missing message_type", field.name)))?;
        let count = if version >= 3 {
            let count_bits = ceil_log2((max_repeat - min_repeat + 1) as u64) as usize;
            BitVec::pull_from(pool, count_bits)?.to_unsigned()? as usize + min_repeat
        } else {
            max_repeat
        };
        let own_part = effective_part(field, ctx.part);
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            let mut nested = DynamicMessage::new(desc.clone());
            ctx.enter(desc.clone(), Some(field.clone()), own_part);
            self.decode_pass(&desc, pool, &mut nested, ctx, own_part, own_part)?;
            ctx.exit();
            out.push(Value::Message(nested));
        }
        Ok(out)
    }
}
