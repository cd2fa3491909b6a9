// Property-based tests for engine invariants.
//
// Three categories:
// 1. IS_PWR_OF_2 agrees with a bit-count oracle over the whole i64 range
// 2. Every shipped descriptor instantiates with its defaults
// 3. A rejected set never mutates the store or reaches the sink
//
// Uses proptest with explicit configuration to prevent CI flakiness.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use nocs::eval::is_power_of_two;
use nocs::{BlockInstance, BlockSchema, Descriptor, NullLog, RecordingSink, Value};
use proptest::prelude::*;

// ── Test helpers ────────────────────────────────────────────────────────────

fn project_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .to_path_buf()
}

fn shipped_descriptors() -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(project_root().join("blocks"))
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();
    paths
}

fn schema(path: &Path) -> Arc<BlockSchema> {
    let descriptor = Descriptor::from_path(path)
        .unwrap_or_else(|e| panic!("failed to read {}: {}", path.display(), e));
    Arc::new(
        BlockSchema::from_descriptor(&descriptor)
            .unwrap_or_else(|e| panic!("{}: {}", path.display(), e)),
    )
}

fn fft() -> BlockInstance {
    let path = project_root().join("blocks/fft.json");
    BlockInstance::new(schema(&path), "0/FFT#0", Box::new(RecordingSink::new()), Arc::new(NullLog))
        .unwrap()
}

// ── 1. Power of two ─────────────────────────────────────────────────────────

#[test]
fn power_of_two_boundaries() {
    for x in [16, 256, 4096] {
        assert!(is_power_of_two(x), "{x}");
    }
    for x in [15, 17, 4097, 0] {
        assert!(!is_power_of_two(x), "{x}");
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    #[test]
    fn power_of_two_matches_popcount(x in any::<i64>()) {
        prop_assert_eq!(is_power_of_two(x), x > 0 && x.count_ones() == 1);
    }

    #[test]
    fn shifted_one_is_power_of_two(shift in 0u32..63) {
        prop_assert!(is_power_of_two(1i64 << shift));
    }
}

// ── 2. Defaults self-validate ───────────────────────────────────────────────

#[test]
fn shipped_descriptors_instantiate_with_defaults() {
    let paths = shipped_descriptors();
    assert!(!paths.is_empty(), "no descriptors under blocks/");
    for path in paths {
        let schema = schema(&path);
        let block = BlockInstance::new(
            Arc::clone(&schema),
            schema.instance_id(0, 0),
            Box::new(RecordingSink::new()),
            Arc::new(NullLog),
        )
        .unwrap_or_else(|e| panic!("{}: {}", path.display(), e));
        for arg in schema.args() {
            assert_eq!(block.get_arg(&arg.name).as_ref(), Some(&arg.default));
        }
        block
            .ports()
            .unwrap_or_else(|e| panic!("{}: {}", path.display(), e));
    }
}

// ── 3. Rejected sets never mutate ───────────────────────────────────────────

fn arb_bad_spp() -> impl Strategy<Value = i64> {
    prop_oneof![
        i64::MIN..16,
        4097i64..i64::MAX,
        (16i64..=4096).prop_filter("not a power of two", |x| !is_power_of_two(*x)),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn rejected_spp_leaves_block_untouched(bad in arb_bad_spp()) {
        let sink = RecordingSink::new();
        let journal = sink.journal();
        let path = project_root().join("blocks/fft.json");
        let block = BlockInstance::new(schema(&path), "0/FFT#0", Box::new(sink), Arc::new(NullLog))
            .unwrap();
        journal.take();
        let before = block.args();

        let err = block.set_arg("spp", Value::Int(bad)).unwrap_err();
        prop_assert!(err.store_unchanged());
        prop_assert_eq!(block.args(), before);
        prop_assert!(journal.is_empty());
    }

    #[test]
    fn rejected_magnitude_mode_leaves_block_untouched(mode in "[A-Z_]{1,20}") {
        prop_assume!(!["COMPLEX", "MAGNITUDE", "MAGNITUDE_SQUARED"].contains(&mode.as_str()));
        let block = fft();
        let before = block.args();
        prop_assert!(block.set_arg("magnitude_out", Value::Str(mode)).is_err());
        prop_assert_eq!(block.args(), before);
    }

    #[test]
    fn accepted_spp_writes_its_log2(shift in 4u32..=12) {
        let block = fft();
        let report = block.set_arg("spp", Value::Int(1i64 << shift)).unwrap();
        prop_assert_eq!(report.writes[0].value, shift);
        prop_assert_eq!(report.writes[1].value, 873472 + shift);
    }
}
