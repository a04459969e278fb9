#![no_main]

use std::path::Path;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use litterbox_scanners::command::{Placeholders, render};

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    template: String,
    tool_path: String,
    target_path: Option<String>,
    pid: Option<u32>,
    extra_args: Vec<String>,
}

fuzz_target!(|input: FuzzInput| {
    let values = Placeholders {
        tool_path: &input.tool_path,
        target_path: input.target_path.as_deref().map(Path::new),
        pid: input.pid,
        extra_args: &input.extra_args,
        ..Placeholders::default()
    };
    if let Ok(line) = render(&input.template, &values) {
        assert!(!line.program.is_empty());
    }
});
