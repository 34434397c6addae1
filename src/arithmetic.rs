//! Adaptive arithmetic coder (C9): a Witten/Neal/Cleary-style range coder
//! for repeated numeric/enum fields carrying a skewed value distribution,
//! where a fixed bit width per element would waste bits. Loaded as an
//! ordinary [`crate::codec_trait::FieldCodec`] under the name
//! `dccl.arithmetic`; unlike the other built-ins it overrides
//! `encode_repeated`/`decode_repeated` directly since every element of a
//! repeated field shares one coded bitstream with no length prefix (the
//! stream is self-terminating via an EOF symbol).

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::bitvec::BitVec;
use crate::codec_trait::FieldCodec;
use crate::context::TraversalContext;
use crate::result::{require, Error, Result};
use crate::schema::FieldDescriptor;
use crate::value::Value;

pub const CODE_BITS: u32 = crate::constants::ARITHMETIC_CODE_BITS;
const TOP_VALUE: u64 = (1u64 << CODE_BITS) - 1;
const FIRST_QTR: u64 = TOP_VALUE / 4 + 1;
const HALF: u64 = 2 * FIRST_QTR;
const THIRD_QTR: u64 = 3 * FIRST_QTR;
/// Max total frequency: `2^(CODE_BITS-2) - 1`, so `range * total` never
/// overflows the interval arithmetic below.
const MAX_TOTAL_FREQUENCY: u64 = (1u64 << (CODE_BITS - 2)) - 1;

/// A frequency table over `K` ordinary symbols plus a reserved
/// out-of-range symbol and a reserved EOF symbol, declaratively specified
/// (mirrors the source's `protobuf`-configured model: a plain bag of
/// fields a host loads from schema options).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArithmeticModel {
    /// Monotonically increasing representative wire values, one per
    /// ordinary symbol.
    pub values: Vec<f64>,
    /// Per-symbol frequency, parallel to `values`.
    pub frequencies: Vec<u32>,
    pub eof_frequency: u32,
    pub out_of_range_frequency: u32,
    /// When true, frequencies are incremented after every encode/decode
    /// and both sides must call the same sequence of updates to stay in
    /// sync.
    pub adaptive: bool,
}

impl ArithmeticModel {
    const fn eof_symbol_offset() -> usize {
        1
    }

    fn num_ordinary(&self) -> usize {
        self.values.len()
    }

    fn out_of_range_symbol(&self) -> usize {
        self.num_ordinary()
    }

    fn eof_symbol(&self) -> usize {
        self.num_ordinary() + Self::eof_symbol_offset()
    }

    fn freq(&self, symbol: usize) -> u32 {
        if symbol < self.num_ordinary() {
            self.frequencies[symbol]
        } else if symbol == self.out_of_range_symbol() {
            self.out_of_range_frequency
        } else {
            self.eof_frequency
        }
    }

    fn total(&self) -> u64 {
        self.frequencies.iter().map(|f| *f as u64).sum::<u64>()
            + self.out_of_range_frequency as u64
            + self.eof_frequency as u64
    }

    /// Cumulative frequency window `[lo, hi)` for `symbol`, in a fixed
    /// traversal order: ordinary symbols first (in declaration order),
    /// then the out-of-range symbol, then EOF.
    fn cumulative(&self, symbol: usize) -> (u64, u64) {
        let mut lo = 0u64;
        for s in 0..symbol {
            lo += self.freq(s) as u64;
        }
        (lo, lo + self.freq(symbol) as u64)
    }

    fn symbol_for_cumulative(&self, target: u64) -> usize {
        let mut lo = 0u64;
        let total_symbols = self.eof_symbol() + 1;
        for s in 0..total_symbols {
            let hi = lo + self.freq(s) as u64;
            if target < hi {
                return s;
            }
            lo = hi;
        }
        self.eof_symbol()
    }

    /// Maps a wire value to its nearest symbol by absolute distance,
    /// breaking ties toward the larger index; falls back to the
    /// out-of-range symbol (or EOF if that has zero frequency) when no
    /// symbol is within range of the values table at all (empty table).
    fn value_to_symbol(&self, value: f64) -> usize {
        if self.values.is_empty() {
            return if self.out_of_range_frequency > 0 { self.out_of_range_symbol() } else { self.eof_symbol() };
        }
        let mut best = 0usize;
        let mut best_dist = f64::INFINITY;
        for (i, v) in self.values.iter().enumerate() {
            let dist = (v - value).abs();
            if dist <= best_dist {
                best = i;
                best_dist = dist;
            }
        }
        best
    }

    fn bump(&mut self, symbol: usize) {
        if !self.adaptive {
            return;
        }
        if symbol < self.num_ordinary() {
            self.frequencies[symbol] = self.frequencies[symbol].saturating_add(1);
        } else if symbol == self.out_of_range_symbol() {
            self.out_of_range_frequency = self.out_of_range_frequency.saturating_add(1);
        } else {
            self.eof_frequency = self.eof_frequency.saturating_add(1);
        }
    }

    fn validate(&self) -> Result<()> {
        require(self.values.len() == self.frequencies.len(), "arithmetic model values/frequencies length mismatch")?;
        require(
            self.values.windows(2).all(|w| w[0] < w[1]),
            "arithmetic model values must be strictly increasing",
        )?;
        require(self.total() <= MAX_TOTAL_FREQUENCY, "arithmetic model total frequency too large")?;
        require(self.total() > 0, "arithmetic model has zero total frequency")?;
        Ok(())
    }
}

/// Encoder half of the range coder: tracks `[low, high]` over
/// `[0, 2^CODE_BITS)` with a bit-deferral counter for values straddling
/// the midpoint.
struct Encoder {
    low: u64,
    high: u64,
    pending: u64,
    out: BitVec,
}

impl Encoder {
    fn new() -> Self {
        Self { low: 0, high: TOP_VALUE, pending: 0, out: BitVec::new() }
    }

    fn emit(&mut self, bit: bool) {
        self.out.push_back(bit);
        for _ in 0..self.pending {
            self.out.push_back(!bit);
        }
        self.pending = 0;
    }

    fn encode_symbol(&mut self, cum_lo: u64, cum_hi: u64, total: u64) {
        let range = self.high - self.low + 1;
        self.high = self.low + (range * cum_hi) / total - 1;
        self.low += (range * cum_lo) / total;
        loop {
            if self.high < HALF {
                self.emit(false);
            } else if self.low >= HALF {
                self.emit(true);
                self.low -= HALF;
                self.high -= HALF;
            } else if self.low >= FIRST_QTR && self.high < THIRD_QTR {
                self.pending += 1;
                self.low -= FIRST_QTR;
                self.high -= FIRST_QTR;
            } else {
                break;
            }
            self.low *= 2;
            self.high = self.high * 2 + 1;
        }
    }

    fn finish(mut self) -> BitVec {
        self.pending += 1;
        if self.low < FIRST_QTR {
            self.emit(false);
        } else {
            self.emit(true);
        }
        self.out
    }
}

/// Decoder half: mirrors `Encoder`'s interval tracking, consuming one bit
/// at a time from `pool` as the interval renormalizes.
struct Decoder<'a> {
    low: u64,
    high: u64,
    value: u64,
    pool: &'a mut BitVec,
}

impl<'a> Decoder<'a> {
    fn new(pool: &'a mut BitVec) -> Result<Self> {
        let mut value = 0u64;
        for _ in 0..CODE_BITS {
            value = (value << 1) | pool.pop_front().map(|b| b as u64).unwrap_or(0);
        }
        Ok(Self { low: 0, high: TOP_VALUE, value, pool })
    }

    fn next_bit(&mut self) -> u64 {
        self.pool.pop_front().map(|b| b as u64).unwrap_or(0)
    }

    fn target_cum_freq(&self, total: u64) -> u64 {
        let range = self.high - self.low + 1;
        (((self.value - self.low + 1) * total - 1) / range).min(total - 1)
    }

    fn update(&mut self, cum_lo: u64, cum_hi: u64, total: u64) {
        let range = self.high - self.low + 1;
        self.high = self.low + (range * cum_hi) / total - 1;
        self.low += (range * cum_lo) / total;
        loop {
            if self.high < HALF {
            } else if self.low >= HALF {
                self.low -= HALF;
                self.high -= HALF;
                self.value -= HALF;
            } else if self.low >= FIRST_QTR && self.high < THIRD_QTR {
                self.low -= FIRST_QTR;
                self.high -= FIRST_QTR;
                self.value -= FIRST_QTR;
            } else {
                break;
            }
            self.low *= 2;
            self.high = self.high * 2 + 1;
            self.value = self.value * 2 + self.next_bit();
        }
    }
}

/// Encodes `values` against `model`, mutating it in place if adaptive, and
/// returns the coded bitstream (already EOF-terminated).
pub fn arithmetic_encode(values: &[f64], model: &mut ArithmeticModel) -> Result<BitVec> {
    model.validate()?;
    let mut enc = Encoder::new();
    for &v in values {
        let symbol = model.value_to_symbol(v);
        let total = model.total();
        let (lo, hi) = model.cumulative(symbol);
        enc.encode_symbol(lo, hi, total);
        model.bump(symbol);
    }
    let eof = model.eof_symbol();
    let total = model.total();
    let (lo, hi) = model.cumulative(eof);
    enc.encode_symbol(lo, hi, total);
    model.bump(eof);
    Ok(enc.finish())
}

/// Decodes a sequence of values from `pool` against `model` until EOF is
/// read, mutating `model` in place if adaptive. `max_count` bounds runaway
/// decoding against corrupt input (wired to a field's `max_repeat`).
pub fn arithmetic_decode(pool: &mut BitVec, model: &mut ArithmeticModel, max_count: usize) -> Result<Vec<f64>> {
    model.validate()?;
    let mut dec = Decoder::new(pool)?;
    let mut out = Vec::new();
    loop {
        let total_freq = model.total();
        let target = dec.target_cum_freq(total_freq);
        let symbol = model.symbol_for_cumulative(target);
        let (lo, hi) = model.cumulative(symbol);
        dec.update(lo, hi, total_freq);
        model.bump(symbol);
        if symbol == model.eof_symbol() {
            break;
        }
        if symbol == model.out_of_range_symbol() {
            return Err(Error::decode("arithmetic coder decoded out-of-range symbol"));
        }
        out.push(model.values[symbol]);
        if out.len() > max_count {
            return Err(Error::decode("arithmetic coder exceeded max_repeat without EOF"));
        }
    }
    Ok(out)
}

/// [`FieldCodec`] wrapper exposing the range coder under the ordinary
/// registry interface. Single-element `encode`/`decode` delegate to the
/// repeated form with a length-1/length-whatever sequence since the coder
/// has no meaningful notion of "one value, no EOF".
///
/// The live, possibly-adaptive model for each field is owned by this codec
/// instance (shared across every encode/decode call on the `Driver` it was
/// loaded into, per the lifecycle in §3), keyed by a path built from the
/// enclosing message's name and the field's own name, and seeded from
/// `field.options.arithmetic_model` the first time a field is touched.
pub struct ArithmeticCodec {
    name: String,
    models: Mutex<HashMap<String, ArithmeticModel>>,
}

impl ArithmeticCodec {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), models: Mutex::new(HashMap::new()) }
    }

    fn model_key(field: &FieldDescriptor, ctx: &TraversalContext) -> String {
        let scope = ctx.stack.current().map(|f| f.descriptor.full_name.clone()).unwrap_or_default();
        format!("{scope}.{}", field.name)
    }

    fn with_model<T>(
        &self,
        field: &FieldDescriptor,
        ctx: &TraversalContext,
        f: impl FnOnce(&mut ArithmeticModel) -> Result<T>,
    ) -> Result<T> {
        let key = Self::model_key(field, ctx);
        let mut models = self.models.lock().expect("arithmetic model map poisoned");
        let model = models.entry(key).or_insert_with(|| field.options.arithmetic_model.clone().unwrap_or_default());
        if model.values.is_empty() && model.frequencies.is_empty() {
            return Err(Error::schema(format!("{}: no arithmetic model configured", field.name)));
        }
        f(model)
    }
}

impl FieldCodec for ArithmeticCodec {
    fn encode(&self, value: &Value, field: &FieldDescriptor, ctx: &mut TraversalContext) -> Result<BitVec> {
        self.encode_repeated(std::slice::from_ref(value), field, ctx, 4)
    }

    fn size(&self, value: &Value, field: &FieldDescriptor, ctx: &TraversalContext) -> Result<usize> {
        let _ = (value, field, ctx);
        self.max_size(field)
    }

    fn decode(&self, pool: &mut BitVec, field: &FieldDescriptor, ctx: &mut TraversalContext) -> Result<Value> {
        let values = self.decode_repeated(pool, field, ctx, 4)?;
        values.into_iter().next().ok_or(Error::NullValue)
    }

    fn encode_repeated(
        &self,
        values: &[Value],
        field: &FieldDescriptor,
        ctx: &mut TraversalContext,
        _codec_version: u32,
    ) -> Result<BitVec> {
        let raw: Vec<f64> = values.iter().map(|v| v.as_f64()).collect::<Result<_>>()?;
        self.with_model(field, ctx, |model| arithmetic_encode(&raw, model))
    }

    fn decode_repeated(
        &self,
        pool: &mut BitVec,
        field: &FieldDescriptor,
        ctx: &mut TraversalContext,
        _codec_version: u32,
    ) -> Result<Vec<Value>> {
        let max_repeat = field.options.max_repeat.unwrap_or(usize::MAX);
        let raw = self.with_model(field, ctx, |model| arithmetic_decode(pool, model, max_repeat))?;
        raw.into_iter().map(|v| Value::from_f64(field.field_type, v)).collect()
    }

    /// `min(EOF-only encoding, max_repeat elements at the cheapest
    /// per-symbol cost)`, or 0 for an adaptive model whose frequencies (and
    /// so its bit cost) can't be predicted ahead of encoding.
    fn min_size(&self, field: &FieldDescriptor) -> Result<usize> {
        let Some(model) = field.options.arithmetic_model.as_ref().filter(|m| !m.frequencies.is_empty()) else {
            return Ok(0);
        };
        if model.adaptive {
            return Ok(0);
        }
        let total = model.total() as f64;
        if total <= 0.0 {
            return Ok(0);
        }
        let max_freq = model.frequencies.iter().copied().max().unwrap_or(1).max(1) as f64;
        let eof_freq = (model.eof_frequency as f64).max(1.0);
        let max_repeat = field.options.max_repeat.unwrap_or(1) as f64;
        let eof_only = (total / eof_freq).log2().max(0.0);
        let all_cheapest = max_repeat * (total / max_freq).log2().max(0.0);
        Ok(eof_only.min(all_cheapest) as usize)
    }

    /// `ceil(max_repeat * log2(total / min_freq)) + 1`, the cost of
    /// `max_repeat` copies of the rarest (most expensive) symbol plus one
    /// bit of flush overhead.
    fn max_size(&self, field: &FieldDescriptor) -> Result<usize> {
        let max_repeat = field.options.max_repeat.unwrap_or(1) as f64;
        let Some(model) = field.options.arithmetic_model.as_ref().filter(|m| !m.frequencies.is_empty()) else {
            // Conservative bound absent a concrete model: CODE_BITS per element plus flush overhead.
            return Ok((max_repeat as usize) * CODE_BITS as usize + 2);
        };
        let total = model.total() as f64;
        if total <= 0.0 {
            return Ok((max_repeat as usize) * CODE_BITS as usize + 2);
        }
        let min_freq = model.frequencies.iter().copied().min().unwrap_or(1).max(1) as f64;
        Ok((max_repeat * (total / min_freq).log2().max(0.0)).ceil() as usize + 1)
    }

    fn validate(&self, field: &FieldDescriptor) -> Result<()> {
        let model = field
            .options
            .arithmetic_model
            .as_ref()
            .ok_or_else(|| Error::schema(format!("{}: dccl.arithmetic field requires an `arithmetic_model`", field.name)))?;
        model.validate()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Default for ArithmeticModel {
    fn default() -> Self {
        Self { values: Vec::new(), frequencies: Vec::new(), eof_frequency: 1, out_of_range_frequency: 0, adaptive: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn howard_vitter_model() -> ArithmeticModel {
        ArithmeticModel {
            values: vec![0.0, 1.0],
            frequencies: vec![4, 5],
            eof_frequency: 1,
            out_of_range_frequency: 0,
            adaptive: false,
        }
    }

    #[test]
    fn round_trips_howard_vitter_sequence() {
        let mut enc_model = howard_vitter_model();
        let sequence = vec![1.0, 1.0, 1.0];
        let bits = arithmetic_encode(&sequence, &mut enc_model).unwrap();

        let mut dec_model = howard_vitter_model();
        let mut pool = bits;
        let decoded = arithmetic_decode(&mut pool, &mut dec_model, 10).unwrap();
        assert_eq!(decoded, sequence);
    }

    #[test]
    fn adaptive_model_updates_identically_on_both_sides() {
        let base = ArithmeticModel {
            values: vec![0.0, 1.0, 2.0],
            frequencies: vec![1, 1, 1],
            eof_frequency: 1,
            out_of_range_frequency: 0,
            adaptive: true,
        };
        let sequence = vec![0.0, 0.0, 2.0, 1.0, 0.0];

        let mut enc_model = base.clone();
        let bits = arithmetic_encode(&sequence, &mut enc_model).unwrap();

        let mut dec_model = base;
        let mut pool = bits;
        let decoded = arithmetic_decode(&mut pool, &mut dec_model, 10).unwrap();

        assert_eq!(decoded, sequence);
        assert_eq!(enc_model.frequencies, dec_model.frequencies);
        assert_eq!(enc_model.eof_frequency, dec_model.eof_frequency);
    }

    #[test]
    fn empty_sequence_still_round_trips_via_eof() {
        let mut enc_model = howard_vitter_model();
        let bits = arithmetic_encode(&[], &mut enc_model).unwrap();
        let mut dec_model = howard_vitter_model();
        let mut pool = bits;
        let decoded = arithmetic_decode(&mut pool, &mut dec_model, 10).unwrap();
        assert!(decoded.is_empty());
    }

    fn field_with_model(model: Option<ArithmeticModel>) -> FieldDescriptor {
        FieldDescriptor {
            name: "samples".into(),
            position: 0,
            field_type: crate::schema::FieldType::Int32,
            cardinality: crate::schema::Cardinality::Repeated,
            options: crate::schema::FieldOptions { arithmetic_model: model, max_repeat: Some(4), min_repeat: Some(0), ..Default::default() },
            message_type: None,
            enum_values: vec![],
        }
    }

    #[test]
    fn validate_rejects_a_field_with_no_arithmetic_model() {
        let codec = ArithmeticCodec::new("dccl.arithmetic");
        let field = field_with_model(None);
        assert!(codec.validate(&field).is_err());
    }

    #[test]
    fn validate_accepts_a_well_formed_model() {
        let codec = ArithmeticCodec::new("dccl.arithmetic");
        let field = field_with_model(Some(howard_vitter_model()));
        assert!(codec.validate(&field).is_ok());
    }

    #[test]
    fn max_size_uses_the_configured_model_instead_of_the_conservative_fallback() {
        let codec = ArithmeticCodec::new("dccl.arithmetic");
        let modeled = codec.max_size(&field_with_model(Some(howard_vitter_model()))).unwrap();
        let fallback = codec.max_size(&field_with_model(None)).unwrap();
        assert!(modeled < fallback, "modeled bound {modeled} should be tighter than the fallback {fallback}");
    }

    #[test]
    fn min_size_is_zero_for_an_adaptive_model_and_nonzero_otherwise() {
        let codec = ArithmeticCodec::new("dccl.arithmetic");
        let mut adaptive = howard_vitter_model();
        adaptive.adaptive = true;
        assert_eq!(codec.min_size(&field_with_model(Some(adaptive))).unwrap(), 0);
        assert!(codec.min_size(&field_with_model(Some(howard_vitter_model()))).unwrap() > 0);
    }
}
