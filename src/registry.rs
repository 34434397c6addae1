//! Name+type-keyed codec table and resolution rules (C4).

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::codec_trait::FieldCodec;
use crate::constants::default_codec_name;
use crate::result::{Error, Result};
use crate::schema::{FieldDescriptor, FieldType, MessageDescriptor};

/// Retired codec names mapped to their replacement, consulted with a
/// `tracing::warn!` when a deprecated name actually resolves to something.
const DEPRECATED_NAMES: &[(&str, &str)] = &[("dccl.default", "dccl.default2"), ("dccl.time", "dccl.time2")];

fn resolve_deprecated(name: &str) -> &str {
    for (old, new) in DEPRECATED_NAMES {
        if *old == name {
            warn!(deprecated = old, replacement = new, "resolved deprecated codec name");
            return new;
        }
    }
    name
}

#[derive(Default)]
pub struct CodecRegistry {
    codecs: HashMap<(FieldType, String), Arc<dyn FieldCodec>>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, field_type: FieldType, name: impl Into<String>, codec: Arc<dyn FieldCodec>) {
        self.codecs.insert((field_type, name.into()), codec);
    }

    fn lookup(&self, field_type: FieldType, name: &str) -> Option<Arc<dyn FieldCodec>> {
        self.codecs.get(&(field_type, name.to_string())).cloned()
    }

    /// Picks the codec name a field would use before any mangling/fallback:
    /// explicit field-level `codec`, then the embedded message's own
    /// `codec` option (for message-typed fields), then the field's
    /// `codec_group`, then the message's `codec_group`, then the version
    /// default.
    fn candidate_name(&self, field: &FieldDescriptor, message: &MessageDescriptor, codec_version: u32) -> String {
        if let Some(name) = &field.options.codec {
            return name.clone();
        }
        if field.field_type == FieldType::Message {
            if let Some(mt) = &field.message_type {
                if let Some(name) = &mt.options.codec {
                    return name.clone();
                }
            }
        }
        if let Some(group) = &field.options.codec_group {
            return group.clone();
        }
        if let Some(group) = &message.options.codec_group {
            return group.clone();
        }
        default_codec_name(codec_version)
    }

    /// Resolves the codec for `field` of `message`, trying, in order: the
    /// candidate name mangled with the embedded message's full type name
    /// (`name[pkg.Type]`), the candidate name with the codec version
    /// suffix appended (`name{V}`, only when `name` doesn't already end in
    /// a digit), then the bare candidate name. Each attempt also passes
    /// through the deprecated-name table.
    pub fn resolve(
        &self,
        field: &FieldDescriptor,
        message: &MessageDescriptor,
        codec_version: u32,
    ) -> Result<Arc<dyn FieldCodec>> {
        let base = self.candidate_name(field, message, codec_version);

        let mut attempts = Vec::new();
        if let Some(full_type) = field.full_type_name() {
            attempts.push(format!("{base}[{full_type}]"));
        }
        let ends_in_digit = base.chars().last().is_some_and(|c| c.is_ascii_digit());
        if !ends_in_digit {
            attempts.push(format!("{base}{codec_version}"));
        }
        attempts.push(base.clone());

        for name in &attempts {
            let resolved = resolve_deprecated(name);
            if let Some(codec) = self.lookup(field.field_type, resolved) {
                return Ok(codec);
            }
        }

        Err(Error::schema(format!(
            "{}.{}: no codec registered for any of {:?}",
            message.full_name, field.name, attempts
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitvec::BitVec;
    use crate::context::TraversalContext;
    use crate::dynamic_conditions::DynamicConditions;
    use crate::schema::{Cardinality, FieldOptions};
    use crate::value::Value;

    struct StubCodec(&'static str);
    impl FieldCodec for StubCodec {
        fn encode(&self, _v: &Value, _f: &FieldDescriptor, _c: &mut TraversalContext) -> Result<BitVec> {
            Ok(BitVec::new())
        }
        fn size(&self, _v: &Value, _f: &FieldDescriptor, _c: &TraversalContext) -> Result<usize> {
            Ok(0)
        }
        fn decode(&self, _p: &mut BitVec, _f: &FieldDescriptor, _c: &mut TraversalContext) -> Result<Value> {
            Ok(Value::Bool(true))
        }
        fn min_size(&self, _f: &FieldDescriptor) -> Result<usize> {
            Ok(0)
        }
        fn max_size(&self, _f: &FieldDescriptor) -> Result<usize> {
            Ok(0)
        }
        fn validate(&self, _f: &FieldDescriptor) -> Result<()> {
            Ok(())
        }
        fn name(&self) -> &str {
            self.0
        }
    }

    fn field() -> FieldDescriptor {
        FieldDescriptor {
            name: "flag".into(),
            position: 0,
            field_type: FieldType::Bool,
            cardinality: Cardinality::Required,
            options: FieldOptions::default(),
            message_type: None,
            enum_values: vec![],
        }
    }

    #[test]
    fn falls_back_to_version_default() {
        let mut reg = CodecRegistry::new();
        reg.register(FieldType::Bool, "dccl.default3", Arc::new(StubCodec("dccl.default3")));
        let msg = MessageDescriptor::new("test.Msg");
        let codec = reg.resolve(&field(), &msg, 3).unwrap();
        assert_eq!(codec.name(), "dccl.default3");
    }

    #[test]
    fn explicit_field_codec_wins() {
        let mut reg = CodecRegistry::new();
        reg.register(FieldType::Bool, "dccl.default3", Arc::new(StubCodec("default")));
        reg.register(FieldType::Bool, "custom3", Arc::new(StubCodec("custom")));
        let mut f = field();
        f.options.codec = Some("custom".into());
        let msg = MessageDescriptor::new("test.Msg");
        let codec = reg.resolve(&f, &msg, 3).unwrap();
        assert_eq!(codec.name(), "custom");
    }

    #[test]
    fn unresolved_codec_is_schema_error() {
        let reg = CodecRegistry::new();
        let msg = MessageDescriptor::new("test.Msg");
        assert!(reg.resolve(&field(), &msg, 3).is_err());
    }
}
