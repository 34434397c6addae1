//! Per-encode/decode traversal state (C5: `MessageStack` / `CodecData`).
//!
//! The original engine threaded this state through process-wide statics set
//! and torn down by RAII guards around each codec call. Per the explicit
//! redesign note in the source spec, this port replaces that with a single
//! `TraversalContext` value the driver owns for the duration of one public
//! call and passes down by reference; nothing here is global.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::dynamic_conditions::DynamicConditions;
use crate::schema::{FieldDescriptor, MessageDescriptor};

/// Which half of the wire message a field belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Part {
    Unknown,
    Head,
    Body,
}

/// One frame of the traversal stack, pushed when recursing into a nested
/// message field and popped on return.
#[derive(Debug, Clone)]
pub struct StackFrame {
    pub descriptor: Arc<MessageDescriptor>,
    pub field: Option<FieldDescriptor>,
    pub part: Part,
}

/// Parallel stack of descriptors/fields/parts mirrored by the traversal;
/// `current()` is always the innermost still-open frame.
#[derive(Debug, Clone, Default)]
pub struct MessageStack {
    frames: Vec<StackFrame>,
}

impl MessageStack {
    pub fn push(&mut self, frame: StackFrame) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> Option<StackFrame> {
        self.frames.pop()
    }

    pub fn current(&self) -> Option<&StackFrame> {
        self.frames.last()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

/// Per-call scratch state: current part, strictness, the root descriptor,
/// the traversal stack, the dynamic-conditions evaluator, and a codec-keyed
/// scratch map (e.g. the arithmetic coder's live frequency tables).
///
/// One `TraversalContext` is constructed fresh at the top of every public
/// `Driver` entry point and dropped at the end of it; nothing survives
/// between calls except what the registry and loaded-schema map hold.
pub struct TraversalContext {
    pub part: Part,
    pub strict: bool,
    pub root: Arc<MessageDescriptor>,
    pub stack: MessageStack,
    pub dynamic_conditions: DynamicConditions,
    scratch: HashMap<String, Box<dyn Any + Send>>,
}

impl TraversalContext {
    pub fn new(root: Arc<MessageDescriptor>, strict: bool, dynamic_conditions: DynamicConditions) -> Self {
        Self {
            part: Part::Unknown,
            strict,
            root,
            stack: MessageStack::default(),
            dynamic_conditions,
            scratch: HashMap::new(),
        }
    }

    /// Scratch slot for a codec keyed by an arbitrary stable key (e.g. the
    /// full field path); the arithmetic codec uses this to keep its live
    /// per-field frequency table between repeated-element encode/decode
    /// calls within the same traversal.
    pub fn scratch_entry<T: Any + Send + Default>(&mut self, key: &str) -> &mut T {
        self.scratch
            .entry(key.to_string())
            .or_insert_with(|| Box::new(T::default()))
            .downcast_mut::<T>()
            .expect("scratch slot type mismatch for key")
    }

    pub fn enter(&mut self, descriptor: Arc<MessageDescriptor>, field: Option<FieldDescriptor>, part: Part) {
        self.stack.push(StackFrame { descriptor, field, part });
        self.part = part;
    }

    pub fn exit(&mut self) {
        self.stack.pop();
        self.part = self.stack.current().map(|f| f.part).unwrap_or(Part::Unknown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::MessageDescriptor;

    #[test]
    fn scratch_entry_persists_across_calls() {
        let root = Arc::new(MessageDescriptor::new("test.Root"));
        let mut ctx = TraversalContext::new(root, true, DynamicConditions::noop());
        {
            let counter: &mut u32 = ctx.scratch_entry("field.x");
            *counter += 1;
        }
        {
            let counter: &mut u32 = ctx.scratch_entry("field.x");
            assert_eq!(*counter, 1);
            *counter += 1;
        }
        let counter: &mut u32 = ctx.scratch_entry("field.x");
        assert_eq!(*counter, 2);
    }

    #[test]
    fn enter_exit_tracks_part() {
        let root = Arc::new(MessageDescriptor::new("test.Root"));
        let mut ctx = TraversalContext::new(root.clone(), true, DynamicConditions::noop());
        assert_eq!(ctx.part, Part::Unknown);
        ctx.enter(root, None, Part::Head);
        assert_eq!(ctx.part, Part::Head);
        ctx.exit();
        assert_eq!(ctx.part, Part::Unknown);
    }
}
