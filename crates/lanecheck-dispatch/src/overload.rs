//! Overload sets and runtime dispatch.
//!
//! Every overload is stored under its [`DispatchKey`]: the ordered list of
//! its declared slots, each either a precision policy (compared by value)
//! or an interned value type (compared by identity). A call builds the
//! same key from its actual arguments and looks it up. There is no
//! conversion, promotion or partial matching: a key either hits or the
//! call fails with the full list of registered signatures.

use crate::decl::{LaneSlot, OverloadDecl, SlotMeta};
use crate::native::{EntryPoint, NativeReturn};
use crate::{CallError, CallResult, DeclResult, DeclarationError};
use lanecheck_precise::PrecisionPolicy;
use lanecheck_value::{TypedValue, ValueError, ValueType};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

/// One slot of a dispatch key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeySlot {
    /// A precision policy, matched by value.
    Precision(PrecisionPolicy),
    /// A value type, matched by identity.
    Value(ValueType),
}

impl fmt::Display for KeySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Precision(p) => write!(f, "{p}"),
            Self::Value(ty) => write!(f, "{ty}"),
        }
    }
}

/// Ordered argument shape used to select an overload.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct DispatchKey(SmallVec<[KeySlot; 4]>);

impl DispatchKey {
    /// Key of an actual argument list.
    #[must_use]
    pub fn of_args(args: &[Arg<'_>]) -> Self {
        args.iter().map(Arg::key_slot).collect()
    }

    /// Slots in order.
    #[must_use]
    pub fn slots(&self) -> &[KeySlot] {
        &self.0
    }

    /// Render as a call: `Name( a, b )`.
    #[must_use]
    pub fn call_string(&self, name: &str) -> String {
        if self.0.is_empty() {
            return format!("{name}()");
        }
        let slots: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        format!("{name}( {} )", slots.join(", "))
    }
}

impl FromIterator<KeySlot> for DispatchKey {
    fn from_iter<I: IntoIterator<Item = KeySlot>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One argument of a call.
#[derive(Clone, Copy, Debug)]
pub enum Arg<'a> {
    /// Selects the compiled precision profile; never passed as data.
    Precision(PrecisionPolicy),
    /// A data argument, passed as its bytes.
    Value(&'a TypedValue),
}

impl Arg<'_> {
    fn key_slot(&self) -> KeySlot {
        match self {
            Self::Precision(p) => KeySlot::Precision(*p),
            Self::Value(v) => KeySlot::Value(v.value_type()),
        }
    }
}

impl From<PrecisionPolicy> for Arg<'_> {
    fn from(p: PrecisionPolicy) -> Self {
        Self::Precision(p)
    }
}

impl<'a> From<&'a TypedValue> for Arg<'a> {
    fn from(v: &'a TypedValue) -> Self {
        Self::Value(v)
    }
}

/// A registered native variant.
pub struct Overload {
    symbol: String,
    entry: Arc<dyn EntryPoint>,
    key: DispatchKey,
    params: SmallVec<[LaneSlot; 4]>,
    ret: Option<LaneSlot>,
    precision: Option<PrecisionPolicy>,
}

impl Overload {
    /// Exported symbol of the entry point.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Dispatch key this overload is stored under.
    #[must_use]
    pub fn key(&self) -> &DispatchKey {
        &self.key
    }

    /// Data parameters in declared order.
    #[must_use]
    pub fn params(&self) -> &[LaneSlot] {
        &self.params
    }

    /// Declared return, if any.
    #[must_use]
    pub fn ret(&self) -> Option<LaneSlot> {
        self.ret
    }

    /// Precision profile the entry point was compiled for.
    #[must_use]
    pub fn precision(&self) -> Option<PrecisionPolicy> {
        self.precision
    }

    /// `Vec(float32_t) Sin( Precise(kLowAccuracy), Vec(float32_t) )`.
    #[must_use]
    pub fn signature(&self, name: &str) -> String {
        let ret = self.ret.map_or("void", |r| r.ty.name());
        format!("{ret} {}", self.key.call_string(name))
    }
}

impl fmt::Debug for Overload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Overload")
            .field("symbol", &self.symbol)
            .field("key", &self.key)
            .field("ret", &self.ret)
            .finish_non_exhaustive()
    }
}

/// All overloads of one logical intrinsic.
///
/// Registration happens during setup; afterwards the set is only read, so
/// a shared reference can serve concurrent calls.
#[derive(Debug)]
pub struct OverloadSet {
    name: String,
    overloads: Vec<Overload>,
    index: FxHashMap<DispatchKey, usize>,
}

impl OverloadSet {
    /// An empty set for the intrinsic `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            overloads: Vec::new(),
            index: FxHashMap::default(),
        }
    }

    /// Intrinsic name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of registered overloads.
    #[must_use]
    pub fn len(&self) -> usize {
        self.overloads.len()
    }

    /// Check if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.overloads.is_empty()
    }

    /// Overloads in registration order.
    pub fn overloads(&self) -> impl Iterator<Item = &Overload> {
        self.overloads.iter()
    }

    /// Signature strings in registration order.
    #[must_use]
    pub fn signatures(&self) -> Vec<String> {
        self.overloads
            .iter()
            .map(|o| o.signature(&self.name))
            .collect()
    }

    /// Register a native entry point under its declared slots.
    ///
    /// Slots are partitioned into at most one precision profile, at most
    /// one return, and the data parameters. The precision profile and the
    /// data parameters form the dispatch key, in declared order.
    ///
    /// # Errors
    ///
    /// Returns a [`DeclarationError`] if a slot cannot be resolved, the
    /// precision profile conflicts with itself, a precision or return slot
    /// is repeated, or the key is already taken.
    pub fn register(&mut self, decl: &OverloadDecl, entry: Arc<dyn EntryPoint>) -> DeclResult<()> {
        let mut key = DispatchKey::default();
        let mut params = SmallVec::new();
        let mut ret = None;
        let mut precision = None;

        for slot in &decl.slots {
            match slot {
                SlotMeta::Precision(policy) => {
                    if precision.is_some() {
                        return Err(DeclarationError::DuplicatePrecision {
                            intrinsic: self.name.clone(),
                            symbol: decl.symbol.clone(),
                        });
                    }
                    policy.validate().map_err(|source| DeclarationError::Policy {
                        intrinsic: self.name.clone(),
                        symbol: decl.symbol.clone(),
                        source,
                    })?;
                    precision = Some(*policy);
                    key.0.push(KeySlot::Precision(*policy));
                }
                SlotMeta::Return(meta) => {
                    if ret.is_some() {
                        return Err(DeclarationError::DuplicateReturn {
                            intrinsic: self.name.clone(),
                            symbol: decl.symbol.clone(),
                        });
                    }
                    ret = Some(meta.resolve(&self.name)?);
                }
                SlotMeta::Param(meta) => {
                    let slot = meta.resolve(&self.name)?;
                    key.0.push(KeySlot::Value(slot.ty));
                    params.push(slot);
                }
            }
        }

        let overload = Overload {
            symbol: decl.symbol.clone(),
            entry,
            key,
            params,
            ret,
            precision,
        };
        let signature = overload.signature(&self.name);
        if self.index.contains_key(&overload.key) {
            return Err(DeclarationError::Duplicate {
                intrinsic: self.name.clone(),
                symbol: decl.symbol.clone(),
                signature,
            });
        }

        tracing::debug!(
            intrinsic = %self.name,
            symbol = %overload.symbol,
            %signature,
            "registered overload"
        );
        self.index.insert(overload.key.clone(), self.overloads.len());
        self.overloads.push(overload);
        Ok(())
    }

    /// Select the overload matching the actual arguments.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::Dispatch`] listing every registered signature
    /// if no overload matches.
    pub fn resolve(&self, args: &[Arg<'_>]) -> CallResult<&Overload> {
        let key = DispatchKey::of_args(args);
        match self.index.get(&key) {
            Some(&i) => Ok(&self.overloads[i]),
            None => Err(CallError::Dispatch {
                call: key.call_string(&self.name),
                available: self.signatures().join("\n"),
            }),
        }
    }

    /// Call the overload matching `args`.
    ///
    /// Every data argument carries a whole, positive number of batches of
    /// its declared lanes, and all carry the same number. The result holds
    /// that many batches of the declared return. A scalar return over more
    /// than one batch comes back as a vector.
    ///
    /// # Errors
    ///
    /// - [`CallError::Dispatch`] if no overload matches.
    /// - [`CallError::Value`] with a layout error if an argument is not a
    ///   whole number of batches, or the batch counts differ.
    /// - [`CallError::Contract`] if the kernel returns a different shape
    ///   than declared.
    ///
    /// # Panics
    ///
    /// Panics if the kernel reports a native fault. A fault means the
    /// declared and actual ABI disagree, which no caller can recover from.
    pub fn call(&self, args: &[Arg<'_>]) -> CallResult<Option<TypedValue>> {
        let overload = self.resolve(args)?;
        let values: SmallVec<[&TypedValue; 4]> = args
            .iter()
            .filter_map(|a| match a {
                Arg::Value(v) => Some(*v),
                Arg::Precision(_) => None,
            })
            .collect();

        let batches = batch_count(&values, &overload.params)?;
        let ret_len = overload.ret.map_or(0, |r| r.batch_bytes() * batches);
        let buffers: SmallVec<[&[u8]; 4]> = values.iter().map(|v| v.as_bytes()).collect();

        tracing::debug!(
            intrinsic = %self.name,
            symbol = %overload.symbol,
            batches,
            "dispatch"
        );

        let contract = |reason: String| CallError::Contract {
            intrinsic: self.name.clone(),
            symbol: overload.symbol.clone(),
            reason,
        };

        match (overload.entry.invoke(&buffers, ret_len), overload.ret) {
            (NativeReturn::Fault(code), _) => panic!(
                "native fault in `{}` ({}): status {code}",
                overload.symbol, self.name
            ),
            (NativeReturn::Overflow(n), _) => Err(contract(format!(
                "reported {n} bytes written into a {ret_len} byte buffer"
            ))),
            (NativeReturn::Empty, None) => Ok(None),
            (NativeReturn::Bytes(bytes), None) if bytes.is_empty() => Ok(None),
            (NativeReturn::Bytes(bytes), None) => Err(contract(format!(
                "returned {} bytes from a void signature",
                bytes.len()
            ))),
            (NativeReturn::Empty, Some(r)) => Err(contract(format!(
                "returned nothing, expected {ret_len} bytes of {}",
                r.ty
            ))),
            (NativeReturn::Bytes(bytes), Some(r)) => {
                if bytes.len() != ret_len {
                    return Err(contract(format!(
                        "returned {} bytes, expected {ret_len} bytes of {}",
                        bytes.len(),
                        r.ty
                    )));
                }
                let ty = if batches > 1 {
                    ValueType::vector(r.ty.element())
                } else {
                    r.ty
                };
                Ok(Some(TypedValue::from_bytes(ty, bytes)?))
            }
        }
    }
}

/// Number of batches carried by the data arguments.
fn batch_count(values: &[&TypedValue], params: &[LaneSlot]) -> Result<usize, ValueError> {
    let mut batches = None;
    for (value, slot) in values.iter().zip(params) {
        let len = value.as_bytes().len();
        let per_batch = slot.batch_bytes();
        if len == 0 || len % per_batch != 0 {
            return Err(ValueError::Layout {
                ty: slot.ty,
                len,
                reason: "argument is not a whole number of declared lane batches",
            });
        }
        let n = len / per_batch;
        match batches {
            None => batches = Some(n),
            Some(b) if b != n => {
                return Err(ValueError::Layout {
                    ty: slot.ty,
                    len,
                    reason: "arguments carry different numbers of lane batches",
                });
            }
            Some(_) => {}
        }
    }
    Ok(batches.unwrap_or(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lanecheck_value::ElementKind;

    fn echo() -> Arc<dyn EntryPoint> {
        Arc::new(|args: &[&[u8]]| NativeReturn::Bytes(args[0].to_vec()))
    }

    #[test]
    fn test_key_orders_precision_with_params() {
        let mut set = OverloadSet::new("Sin");
        let decl = OverloadDecl::new("sin_low")
            .ret(ElementKind::Float32, 4)
            .precision(PrecisionPolicy::new().with_low_accuracy())
            .param(ElementKind::Float32, 4);
        set.register(&decl, echo()).unwrap();

        let o = set.overloads().next().unwrap();
        assert_eq!(
            o.key().slots(),
            &[
                KeySlot::Precision(PrecisionPolicy::new().with_low_accuracy()),
                KeySlot::Value(ValueType::vector(ElementKind::Float32)),
            ]
        );
        assert_eq!(
            o.signature("Sin"),
            "Vec(float32_t) Sin( Precise(kLowAccuracy), Vec(float32_t) )"
        );
    }

    #[test]
    fn test_void_signature() {
        let mut set = OverloadSet::new("Store");
        let decl = OverloadDecl::new("store").param(ElementKind::Int32, 1);
        set.register(&decl, Arc::new(|_: &[&[u8]]| NativeReturn::Empty)).unwrap();
        assert_eq!(set.signatures(), vec!["void Store( int32_t )"]);

        let v = TypedValue::from_native(5i32);
        assert_eq!(set.call(&[Arg::from(&v)]).unwrap(), None);
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let mut set = OverloadSet::new("Abs");
        let decl = OverloadDecl::new("abs_a")
            .ret(ElementKind::Int16, 1)
            .param(ElementKind::Int16, 1);
        set.register(&decl, echo()).unwrap();

        let again = OverloadDecl { symbol: "abs_b".into(), ..decl };
        let err = set.register(&again, echo()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Abs: `abs_b` duplicates signature `int16_t Abs( int16_t )`"
        );
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_conflicting_policy_rejected() {
        let policy: PrecisionPolicy =
            serde_json::from_str(r#"{"kIEEE754": true, "kFTZ": true}"#).unwrap();
        let decl = OverloadDecl::new("cos_bad")
            .precision(policy)
            .param(ElementKind::Float64, 2);
        let err = OverloadSet::new("Cos").register(&decl, echo()).unwrap_err();
        assert!(matches!(err, DeclarationError::Policy { .. }));
    }

    #[test]
    fn test_repeated_markers_rejected() {
        let decl = OverloadDecl::new("twice")
            .ret(ElementKind::Float32, 1)
            .ret(ElementKind::Float32, 1);
        assert!(matches!(
            OverloadSet::new("X").register(&decl, echo()),
            Err(DeclarationError::DuplicateReturn { .. })
        ));

        let decl = OverloadDecl::new("twice")
            .precision(PrecisionPolicy::new())
            .precision(PrecisionPolicy::new());
        assert!(matches!(
            OverloadSet::new("X").register(&decl, echo()),
            Err(DeclarationError::DuplicatePrecision { .. })
        ));
    }

    #[test]
    fn test_batches() {
        let mut set = OverloadSet::new("Neg");
        let decl = OverloadDecl::new("neg")
            .ret(ElementKind::Int32, 2)
            .param(ElementKind::Int32, 2);
        set.register(&decl, echo()).unwrap();

        let v = TypedValue::from_slice(&[1i32, 2, 3, 4, 5, 6]);
        let out = set.call(&[Arg::from(&v)]).unwrap().unwrap();
        assert_eq!(out, v);

        let ragged = TypedValue::from_slice(&[1i32, 2, 3]);
        let err = set.call(&[Arg::from(&ragged)]).unwrap_err();
        assert!(matches!(err, CallError::Value(ValueError::Layout { len: 12, .. })));

        let empty = TypedValue::from_slice::<i32>(&[]);
        assert!(set.call(&[Arg::from(&empty)]).is_err());
    }

    #[test]
    fn test_batch_counts_must_agree() {
        let mut set = OverloadSet::new("Add");
        let decl = OverloadDecl::new("add")
            .ret(ElementKind::Float64, 2)
            .param(ElementKind::Float64, 2)
            .param(ElementKind::Float64, 2);
        set.register(&decl, echo()).unwrap();

        let a = TypedValue::from_slice(&[1.0f64, 2.0, 3.0, 4.0]);
        let b = TypedValue::from_slice(&[1.0f64, 2.0]);
        let err = set.call(&[Arg::from(&a), Arg::from(&b)]).unwrap_err();
        assert!(err.to_string().contains("different numbers of lane batches"));
    }

    #[test]
    fn test_scalar_return_over_batches_widens() {
        let mut set = OverloadSet::new("ReduceSum");
        let decl = OverloadDecl::new("reduce_sum")
            .ret(ElementKind::Uint32, 1)
            .param(ElementKind::Uint32, 2);
        let sum = |args: &[&[u8]]| {
            let out = args[0]
                .chunks_exact(8)
                .flat_map(|pair| {
                    let a = u32::from_ne_bytes([pair[0], pair[1], pair[2], pair[3]]);
                    let b = u32::from_ne_bytes([pair[4], pair[5], pair[6], pair[7]]);
                    (a + b).to_ne_bytes()
                })
                .collect();
            NativeReturn::Bytes(out)
        };
        set.register(&decl, Arc::new(sum)).unwrap();

        let one = TypedValue::from_slice(&[1u32, 2]);
        let r = set.call(&[Arg::from(&one)]).unwrap().unwrap();
        assert_eq!(r, TypedValue::from_native(3u32));

        let two = TypedValue::from_slice(&[1u32, 2, 10, 20]);
        let r = set.call(&[Arg::from(&two)]).unwrap().unwrap();
        assert_eq!(r, TypedValue::from_slice(&[3u32, 30]));
    }

    #[test]
    fn test_contract_violations() {
        let mut set = OverloadSet::new("Sqrt");
        let decl = OverloadDecl::new("sqrt_short")
            .ret(ElementKind::Float32, 1)
            .param(ElementKind::Float32, 1);
        set.register(&decl, Arc::new(|_: &[&[u8]]| NativeReturn::Bytes(vec![0; 2])))
            .unwrap();
        let x = TypedValue::from_native(4.0f32);
        let err = set.call(&[Arg::from(&x)]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "`sqrt_short` (Sqrt) broke its return contract: returned 2 bytes, expected 4 bytes of float32_t"
        );

        let mut set = OverloadSet::new("Sqrt");
        set.register(&decl, Arc::new(|_: &[&[u8]]| NativeReturn::Empty)).unwrap();
        assert!(matches!(set.call(&[Arg::from(&x)]), Err(CallError::Contract { .. })));

        let mut set = OverloadSet::new("Sqrt");
        set.register(&decl, Arc::new(|_: &[&[u8]]| NativeReturn::Overflow(64))).unwrap();
        assert!(matches!(set.call(&[Arg::from(&x)]), Err(CallError::Contract { .. })));
    }

    #[test]
    fn test_void_kernel_returning_data_breaks_contract() {
        let mut set = OverloadSet::new("Touch");
        let decl = OverloadDecl::new("touch").param(ElementKind::Uint16, 1);
        set.register(&decl, echo()).unwrap();
        let x = TypedValue::from_native(1u16);
        assert!(matches!(set.call(&[Arg::from(&x)]), Err(CallError::Contract { .. })));
    }

    #[test]
    #[should_panic(expected = "native fault in `boom` (Boom): status -3")]
    fn test_native_fault_is_fatal() {
        let mut set = OverloadSet::new("Boom");
        let decl = OverloadDecl::new("boom").param(ElementKind::Int64, 1);
        set.register(&decl, Arc::new(|_: &[&[u8]]| NativeReturn::Fault(-3))).unwrap();
        let x = TypedValue::from_native(0i64);
        let _ = set.call(&[Arg::from(&x)]);
    }
}
