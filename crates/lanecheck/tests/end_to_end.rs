//! A full harness run: config file, manifest file, C entry points, every
//! target, and the oracle.

use camino::Utf8PathBuf;
use lanecheck::dispatch::CEntryPoint;
use lanecheck::prelude::*;
use std::slice;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// `out[i] = a[i] + b[i]` over `uint32_t` lanes, wrapping.
unsafe extern "C" fn add_u32(
    args: *const *const u8,
    lens: *const usize,
    nargs: usize,
    out: *mut u8,
    out_cap: usize,
    out_len: *mut usize,
) -> i32 {
    if nargs != 2 {
        return 22;
    }
    // Safety: the caller passes `nargs` live buffers and `out_cap` writable
    // bytes at `out`.
    let (a, b, out) = unsafe {
        (
            slice::from_raw_parts(*args, *lens),
            slice::from_raw_parts(*args.add(1), *lens.add(1)),
            slice::from_raw_parts_mut(out, out_cap),
        )
    };
    let lanes = a.chunks_exact(4).zip(b.chunks_exact(4));
    for (dst, (x, y)) in out.chunks_exact_mut(4).zip(lanes) {
        let x = u32::from_ne_bytes([x[0], x[1], x[2], x[3]]);
        let y = u32::from_ne_bytes([y[0], y[1], y[2], y[3]]);
        dst.copy_from_slice(&x.wrapping_add(y).to_ne_bytes());
    }
    // Safety: `out_len` is a valid out-pointer for the call.
    unsafe { *out_len = a.len() };
    0
}

/// Always reports a fault.
unsafe extern "C" fn trap(
    _args: *const *const u8,
    _lens: *const usize,
    _nargs: usize,
    _out: *mut u8,
    _out_cap: usize,
    _out_len: *mut usize,
) -> i32 {
    7
}

/// Square root over `float32_t` lanes, one ulp high on the fast path.
fn sqrt_f32(skew: u32) -> impl Fn(&[&[u8]]) -> NativeReturn + Send + Sync {
    move |args: &[&[u8]]| {
        let out = args[0]
            .chunks_exact(4)
            .flat_map(|b| {
                let x = f32::from_ne_bytes([b[0], b[1], b[2], b[3]]);
                f32::from_bits(x.sqrt().to_bits() + skew).to_ne_bytes()
            })
            .collect();
        NativeReturn::Bytes(out)
    }
}

fn symbols() -> SymbolTable {
    // Safety: both functions follow the kernel ABI.
    let (add, trap) = unsafe { (CEntryPoint::new(add_u32), CEntryPoint::new(trap)) };
    SymbolTable::new()
        .with("npsr_add_u32", add)
        .with("npsr_trap_u32", trap)
        .with("npsr_sqrt_f32", sqrt_f32(0))
        .with("npsr_sqrt_f32_fast", sqrt_f32(1))
}

const U32: &str = r#"{"kTypeSize": 4, "kIsFloat": 0, "kIsUnsigned": 1, "kLanes": 4}"#;
const U32_RET: &str = r#"{"kIsRet": 1, "kTypeSize": 4, "kIsFloat": 0, "kIsUnsigned": 1, "kLanes": 4}"#;
const F32: &str = r#"{"kTypeSize": 4, "kIsFloat": 1, "kIsUnsigned": 0, "kLanes": 4}"#;
const F32_RET: &str = r#"{"kIsRet": 1, "kTypeSize": 4, "kIsFloat": 1, "kIsUnsigned": 0, "kLanes": 4}"#;

fn manifest_json() -> String {
    let intrinsics = format!(
        r#"{{
            "Add": [{{"symbol": "npsr_add_u32", "slots": [{U32_RET}, {U32}, {U32}]}}],
            "Trap": [{{"symbol": "npsr_trap_u32", "slots": [{U32_RET}, {U32}]}}],
            "Sqrt": [
                {{"symbol": "npsr_sqrt_f32", "slots": [{F32_RET}, {{"kIsPrecise": 1}}, {F32}]}},
                {{"symbol": "npsr_sqrt_f32_fast",
                  "slots": [{F32_RET}, {{"kIsPrecise": 1, "kLowAccuracy": 1}}, {F32}]}}
            ]
        }}"#
    );
    format!(
        r#"{{"targets": [
            {{"name": "SSE4", "register_width": 16, "intrinsics": {intrinsics}}},
            {{"name": "NEON", "register_width": 16, "have_float64": false, "intrinsics": {intrinsics}}}
        ]}}"#
    )
}

/// Write the manifest and a config naming it, then load both back.
fn load(dir: &tempfile::TempDir, config_extra: &str) -> (HarnessConfig, TargetSet) {
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    let manifest_path = root.join("kernels.json");
    std::fs::write(&manifest_path, manifest_json()).unwrap();
    let config_path = root.join("lanecheck.toml");
    std::fs::write(
        &config_path,
        format!("manifest = \"{manifest_path}\"\n{config_extra}"),
    )
    .unwrap();

    let config = HarnessConfig::load(&config_path).unwrap();
    let manifest = Manifest::load(config.manifest_path().unwrap()).unwrap();
    let set = TargetSet::from_manifest(&manifest, &symbols(), &config).unwrap();
    (config, set)
}

#[test]
fn test_integer_add_is_exact_on_every_target() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let (_, set) = load(&dir, "");
    assert_eq!(set.names().collect::<Vec<_>>(), vec!["NEON", "SSE4"]);

    for target in &set {
        let a = TypedValue::vector(ElementKind::Uint32, [1u32, 2, u32::MAX, 40]).unwrap();
        let b = target.broadcast(ElementKind::Uint32, 2u32).unwrap();
        let sum = target
            .call("Add", &[Arg::from(&a), Arg::from(&b)])
            .unwrap()
            .unwrap();
        let want = TypedValue::vector(ElementKind::Uint32, [3u32, 4, 1, 42]).unwrap();
        target.assert_ulp(&sum, &want, &a, 0).unwrap();
    }
}

#[test]
fn test_sqrt_profiles_against_config_tolerance() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let (config, set) = load(&dir, "targets = [\"SSE4\"]\nlow_accuracy_max_ulp = 1\n");
    assert_eq!(set.len(), 1);
    let sse4 = set.get("SSE4").unwrap();

    let x = TypedValue::vector(ElementKind::Float32, [0.25f32, 2.0, 9.0, 1e-6]).unwrap();
    let want = TypedValue::vector(
        ElementKind::Float32,
        x.to_vec::<f32>().unwrap().into_iter().map(f32::sqrt),
    )
    .unwrap();

    for policy in [PrecisionPolicy::new(), PrecisionPolicy::new().with_low_accuracy()] {
        let got = sse4
            .call("Sqrt", &[policy.into(), Arg::from(&x)])
            .unwrap()
            .unwrap();
        sse4.assert_ulp(&got, &want, &x, config.max_ulp_for(&policy))
            .unwrap();
    }

    // The fast path is one ulp off in every lane.
    let fast = PrecisionPolicy::new().with_low_accuracy();
    let got = sse4.call("Sqrt", &[fast.into(), Arg::from(&x)]).unwrap().unwrap();
    assert_eq!(ulp_distance(&got, &want).unwrap(), vec![1; 4]);
    let Err(Error::Accuracy(err)) = sse4.assert_ulp(&got, &want, &x, 0) else {
        panic!("a one ulp error must fail a zero ulp tolerance");
    };
    assert_eq!(err.lanes.len(), 4);
}

#[test]
fn test_call_errors_reach_the_caller() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let (_, set) = load(&dir, "");
    let neon = set.get("NEON").unwrap();
    assert!(!neon.have_float64());

    let x = TypedValue::vector(ElementKind::Float64, [1.0, 2.0]).unwrap();
    let err = neon
        .call("Sqrt", &[PrecisionPolicy::new().into(), Arg::from(&x)])
        .unwrap_err();
    assert!(err.is_dispatch());
    let text = err.to_string();
    assert!(text.contains("Sqrt( Precise(), Vec(float64_t) )"));
    assert!(text.contains("Vec(float32_t) Sqrt( Precise(kLowAccuracy), Vec(float32_t) )"));

    let err = neon.call("Cbrt", &[Arg::from(&x)]).unwrap_err();
    assert!(err.to_string().contains("Add, Sqrt, Trap"));

    let odd = TypedValue::vector(ElementKind::Uint32, [1u32, 2, 3]).unwrap();
    let err = neon.call("Add", &[Arg::from(&odd), Arg::from(&odd)]).unwrap_err();
    assert!(matches!(err, CallError::Value(_)));
}

#[test]
#[should_panic(expected = "npsr_trap_u32")]
fn test_native_fault_panics() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let (_, set) = load(&dir, "");
    let x = TypedValue::vector(ElementKind::Uint32, [0u32; 4]).unwrap();
    let _ = set.get("SSE4").unwrap().call("Trap", &[Arg::from(&x)]);
}

#[test]
fn test_environment_overrides_config_file() {
    init_tracing();
    let config = HarnessConfig::from_toml_str("targets = [\"SSE4\"]\nmax_ulp = 3\n")
        .unwrap()
        .with_vars(|var| match var {
            "LANECHECK_TARGETS" => Some("NEON".to_string()),
            "LANECHECK_LIBRARY" => Some("/nonexistent/libnpsr.so".to_string()),
            _ => None,
        })
        .unwrap();
    assert!(config.selects("NEON"));
    assert!(!config.selects("SSE4"));
    assert_eq!(config.max_ulp, 3);

    // Still no manifest, so loading stops before touching the library.
    let err = TargetSet::load(&config).unwrap_err();
    assert!(err.to_string().contains("no manifest configured"));
}
