//! Dispatch behavior over a small registry of `Add` kernels.

use lanecheck_dispatch::{Arg, CallError, EntryPoint, NativeReturn, OverloadDecl, OverloadSet};
use lanecheck_precise::PrecisionPolicy;
use lanecheck_value::{ElementKind, TypedValue, ValueType};
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Counts its calls and adds two buffers as `f32` or `f64` lanes.
struct CountingAdd {
    width: usize,
    calls: Arc<AtomicUsize>,
}

impl EntryPoint for CountingAdd {
    fn invoke(&self, args: &[&[u8]], _ret_len: usize) -> NativeReturn {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let out = args[0]
            .chunks_exact(self.width)
            .zip(args[1].chunks_exact(self.width))
            .flat_map(|(a, b)| match self.width {
                4 => {
                    let a = f32::from_ne_bytes(a.try_into().unwrap());
                    let b = f32::from_ne_bytes(b.try_into().unwrap());
                    (a + b).to_ne_bytes().to_vec()
                }
                _ => {
                    let a = f64::from_ne_bytes(a.try_into().unwrap());
                    let b = f64::from_ne_bytes(b.try_into().unwrap());
                    (a + b).to_ne_bytes().to_vec()
                }
            })
            .collect();
        NativeReturn::Bytes(out)
    }
}

struct Fixture {
    add: OverloadSet,
    f32_calls: Arc<AtomicUsize>,
    f64_calls: Arc<AtomicUsize>,
}

fn add_registry() -> Fixture {
    let f32_calls = Arc::new(AtomicUsize::new(0));
    let f64_calls = Arc::new(AtomicUsize::new(0));
    let mut add = OverloadSet::new("Add");
    add.register(
        &OverloadDecl::new("add_f32")
            .ret(ElementKind::Float32, 1)
            .param(ElementKind::Float32, 1)
            .param(ElementKind::Float32, 1),
        Arc::new(CountingAdd {
            width: 4,
            calls: Arc::clone(&f32_calls),
        }),
    )
    .unwrap();
    add.register(
        &OverloadDecl::new("add_f64")
            .ret(ElementKind::Float64, 1)
            .param(ElementKind::Float64, 1)
            .param(ElementKind::Float64, 1),
        Arc::new(CountingAdd {
            width: 8,
            calls: Arc::clone(&f64_calls),
        }),
    )
    .unwrap();
    Fixture {
        add,
        f32_calls,
        f64_calls,
    }
}

#[test]
fn test_float32_arguments_select_float32_kernel() {
    let f = add_registry();
    let a = TypedValue::scalar(ElementKind::Float32, 1.5).unwrap();
    let b = TypedValue::scalar(ElementKind::Float32, 2.25).unwrap();

    let r = f.add.call(&[Arg::from(&a), Arg::from(&b)]).unwrap().unwrap();

    assert_eq!(r.value_type(), ValueType::scalar(ElementKind::Float32));
    assert_eq!(r.to_vec::<f32>().unwrap(), vec![3.75]);
    assert_eq!(f.f32_calls.load(Ordering::SeqCst), 1);
    assert_eq!(f.f64_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_mixed_arguments_list_both_signatures() {
    let f = add_registry();
    let a = TypedValue::from_native(1.0f32);
    let b = TypedValue::from_native(1.0f64);

    let err = f.add.call(&[Arg::from(&a), Arg::from(&b)]).unwrap_err();
    let CallError::Dispatch { call, available } = &err else {
        panic!("expected a dispatch error, got {err:?}");
    };
    assert_eq!(call, "Add( float32_t, float64_t )");
    assert_eq!(
        available.lines().collect::<Vec<_>>(),
        vec![
            "float32_t Add( float32_t, float32_t )",
            "float64_t Add( float64_t, float64_t )",
        ]
    );
    assert!(err.is_dispatch());
    assert!(err.to_string().starts_with("no matching signature to call Add( float32_t, float64_t )"));
    assert_eq!(f.f32_calls.load(Ordering::SeqCst), 0);
    assert_eq!(f.f64_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_vector_arguments_do_not_match_scalar_overloads() {
    let f = add_registry();
    let a = TypedValue::from_slice(&[1.0f32]);
    let err = f.add.call(&[Arg::from(&a), Arg::from(&a)]).unwrap_err();
    assert!(err.to_string().contains("Add( Vec(float32_t), Vec(float32_t) )"));
}

#[test]
fn test_precision_argument_is_part_of_the_key() {
    let mut sin = OverloadSet::new("Sin");
    let fast = PrecisionPolicy::new().with_low_accuracy();
    let tag = |byte: u8| move |_: &[&[u8]]| NativeReturn::Bytes(vec![byte; 16]);
    for (symbol, policy, byte) in [("sin_hi", PrecisionPolicy::new(), 1u8), ("sin_lo", fast, 2)] {
        sin.register(
            &OverloadDecl::new(symbol)
                .ret(ElementKind::Float32, 4)
                .precision(policy)
                .param(ElementKind::Float32, 4),
            Arc::new(tag(byte)),
        )
        .unwrap();
    }

    let x = TypedValue::from_slice(&[0.0f32; 4]);
    let hi = sin.call(&[PrecisionPolicy::new().into(), Arg::from(&x)]).unwrap().unwrap();
    let lo = sin.call(&[fast.into(), Arg::from(&x)]).unwrap().unwrap();
    assert_eq!(hi.as_bytes(), &[1u8; 16]);
    assert_eq!(lo.as_bytes(), &[2u8; 16]);

    // Without a policy there is no matching key.
    let err = sin.call(&[Arg::from(&x)]).unwrap_err();
    assert!(err.to_string().contains("Vec(float32_t) Sin( Precise(kLowAccuracy), Vec(float32_t) )"));
    assert!(err.to_string().contains("Vec(float32_t) Sin( Precise(), Vec(float32_t) )"));
}

fn arg_kind() -> impl Strategy<Value = ElementKind> {
    prop_oneof![Just(ElementKind::Float32), Just(ElementKind::Float64)]
}

proptest! {
    #[test]
    fn dispatch_is_deterministic(a_kind in arg_kind(), b_kind in arg_kind(), repeats in 1usize..8) {
        let f = add_registry();
        let a = TypedValue::scalar(a_kind, 1.0).unwrap();
        let b = TypedValue::scalar(b_kind, 2.0).unwrap();
        let args = [Arg::from(&a), Arg::from(&b)];

        let first = f.add.resolve(&args).map(|o| o.symbol().to_string()).ok();
        for _ in 0..repeats {
            let again = f.add.resolve(&args).map(|o| o.symbol().to_string()).ok();
            prop_assert_eq!(&again, &first);
        }
        match (a_kind, b_kind) {
            (ElementKind::Float32, ElementKind::Float32) => {
                prop_assert_eq!(first.as_deref(), Some("add_f32"));
            }
            (ElementKind::Float64, ElementKind::Float64) => {
                prop_assert_eq!(first.as_deref(), Some("add_f64"));
            }
            _ => prop_assert!(first.is_none()),
        }
    }

    #[test]
    fn dispatch_error_names_every_signature(extra in 0usize..6) {
        let mut set = OverloadSet::new("Id");
        let kinds = [
            ElementKind::Uint16,
            ElementKind::Int16,
            ElementKind::Uint32,
            ElementKind::Int32,
            ElementKind::Uint64,
            ElementKind::Int64,
        ];
        for kind in &kinds[..=extra] {
            set.register(
                &OverloadDecl::new(format!("id_{kind}")).ret(*kind, 1).param(*kind, 1),
                Arc::new(|args: &[&[u8]]| NativeReturn::Bytes(args[0].to_vec())),
            ).unwrap();
        }
        let x = TypedValue::from_native(1.0f32);
        let err = set.call(&[Arg::from(&x)]).unwrap_err().to_string();
        for signature in set.signatures() {
            prop_assert!(err.contains(&signature));
        }
    }
}
