// Concurrent set requests on one shared instance.
//
// Each set holds the instance lock from check to last write, so the writes of
// different requests never interleave in the sink and readers never see a
// value whose action has not run.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use nocs::{BlockInstance, BlockSchema, Descriptor, NullLog, RecordingSink, Value};

fn fft_schema() -> Arc<BlockSchema> {
    let root: PathBuf = Path::new(env!("CARGO_MANIFEST_DIR")).parent().unwrap().to_path_buf();
    let descriptor = Descriptor::from_path(&root.join("blocks/fft.json")).unwrap();
    Arc::new(BlockSchema::from_descriptor(&descriptor).unwrap())
}

#[test]
fn set_sequences_never_interleave() {
    let sink = RecordingSink::new();
    let journal = sink.journal();
    let block = Arc::new(
        BlockInstance::new(fft_schema(), "0/FFT#0", Box::new(sink), Arc::new(NullLog)).unwrap(),
    );
    journal.take();

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let block = Arc::clone(&block);
            thread::spawn(move || {
                for i in 0..50 {
                    if (t + i) % 2 == 0 {
                        block.set_arg("reset", Value::Int(1)).unwrap();
                    } else {
                        let spp = 16i64 << ((t + i) % 8);
                        block.set_arg("spp", Value::Int(spp)).unwrap();
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let writes = journal.take();
    assert_eq!(writes.len(), 8 * 50 * 2);
    for pair in writes.chunks(2) {
        let names = (pair[0].register.as_str(), pair[1].register.as_str());
        match names {
            ("FFT_RESET", "FFT_RESET") => {
                assert_eq!((pair[0].value, pair[1].value), (1, 0));
            }
            ("FFT_SIZE_LOG2", "AXIS_CONFIG_BUS") => {
                assert_eq!(pair[1].value, 873472 + pair[0].value);
            }
            other => panic!("interleaved writes: {:?}", other),
        }
    }
}

#[test]
fn instances_share_only_the_schema() {
    let schema = fft_schema();
    let a = BlockInstance::new(
        Arc::clone(&schema),
        "0/FFT#0",
        Box::new(RecordingSink::new()),
        Arc::new(NullLog),
    )
    .unwrap();
    let b = BlockInstance::new(
        Arc::clone(&schema),
        "0/FFT#1",
        Box::new(RecordingSink::new()),
        Arc::new(NullLog),
    )
    .unwrap();
    a.set_arg("spp", Value::Int(1024)).unwrap();
    assert_eq!(a.get_arg("spp"), Some(Value::Int(1024)));
    assert_eq!(b.get_arg("spp"), Some(Value::Int(256)));
    assert!(Arc::ptr_eq(a.schema(), b.schema()));
}

#[test]
fn readers_see_consistent_ports() {
    let block = Arc::new(
        BlockInstance::new(
            fft_schema(),
            "0/FFT#0",
            Box::new(RecordingSink::new()),
            Arc::new(NullLog),
        )
        .unwrap(),
    );
    let writer = {
        let block = Arc::clone(&block);
        thread::spawn(move || {
            for i in 0..200 {
                let spp = if i % 2 == 0 { 512 } else { 64 };
                block.set_arg("spp", Value::Int(spp)).unwrap();
            }
        })
    };
    for _ in 0..200 {
        let port = block.port("in").unwrap();
        assert!(port.vlen == 256 || port.vlen == 512 || port.vlen == 64);
        assert_eq!(port.pkt_size, port.vlen);
    }
    writer.join().unwrap();
}
