use std::sync::atomic::{AtomicUsize, Ordering};

use log::{LevelFilter, Log, Metadata, Record};
use segheap::SegAlloc;

#[global_allocator]
static GLOBAL: SegAlloc = SegAlloc;

/// Logger that formats every record onto the heap it is logging about.
struct Formatting;

static FORMATTED: AtomicUsize = AtomicUsize::new(0);
static LOGGER: Formatting = Formatting;

impl Log for Formatting {
    fn enabled(&self, _: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        let line = format!("[{}] {}", record.level(), record.args());
        FORMATTED.fetch_add(line.len(), Ordering::Relaxed);
    }

    fn flush(&self) {}
}

#[test]
fn allocating_logger_at_trace_level() {
    log::set_logger(&LOGGER).unwrap();
    log::set_max_level(LevelFilter::Trace);

    let boxed = Box::new([7u8; 100]);
    let mut grown = Vec::new();
    for i in 0..2000u32 {
        grown.push(i);
    }
    let text = format!("{:?}", &boxed[..4]);
    grown.truncate(10);
    grown.shrink_to_fit();

    log::info!("boxed {text}, kept {}", grown.len());
    assert!(FORMATTED.load(Ordering::Relaxed) > 0);
    assert_eq!(boxed.iter().map(|&b| b as usize).sum::<usize>(), 700);
}
