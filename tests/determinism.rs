//! Release-mode images strip positions and symbols and the compiler makes
//! no randomized or time-based choices, so compiling the same source twice
//! must produce byte-identical output.

use std::io::Write;
use std::path::PathBuf;

use rtmc::driver::{compile, CompilerConfig};
use rtmc_image::Mode;

fn write_temp(name: &str, contents: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("rtmc-determinism-test-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    path
}

fn compile_bytes(input: &PathBuf, mode: Mode) -> Vec<u8> {
    let mut config = CompilerConfig::new(input.clone(), input.with_extension("vmb"));
    config.mode = mode;
    compile(&config).expect("compile").bytes
}

#[test]
fn release_mode_output_is_byte_identical_across_runs() {
    let src = "\
        struct Point { int x; int y; };\
        int origin_x = 0;\
        int add(int a, int b) { return a + b; }\
        void f() {\
            struct Point p;\
            p.x = add(origin_x, 1);\
            p.y = p.x * 2;\
        }";
    let input = write_temp("release_determinism.rtmc", src);
    let first = compile_bytes(&input, Mode::Release);
    let second = compile_bytes(&input, Mode::Release);
    assert_eq!(first, second);
}

#[test]
fn debug_mode_output_is_also_deterministic() {
    let src = "void f() { int i = 0; while (i < 3) { i = i + 1; } }";
    let input = write_temp("debug_determinism.rtmc", src);
    let first = compile_bytes(&input, Mode::Debug);
    let second = compile_bytes(&input, Mode::Debug);
    assert_eq!(first, second);
}

#[test]
fn optimize_flag_is_itself_deterministic() {
    let src = "void f() { int x = 2 + 2; }";
    let input = write_temp("optimize_determinism.rtmc", src);
    let mut config = CompilerConfig::new(input.clone(), input.with_extension("vmb"));
    config.mode = Mode::Release;
    config.optimize = true;
    let first = compile(&config).expect("compile").bytes;
    let second = compile(&config).expect("compile").bytes;
    assert_eq!(first, second);
}
