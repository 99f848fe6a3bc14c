//! Full-pipeline scenarios: source on disk in, a `.vmb` image out, by way
//! of `rtmc::driver::compile`. Each test writes its own temp file so the
//! preprocessor (which always reads from disk) has something to open.

use std::io::Write;
use std::path::PathBuf;

use rtmc::driver::{compile, CompilerConfig};
use rtmc_asm::Opcode;
use rtmc_image::{Mode, ProgramImage};

fn write_temp(name: &str, contents: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("rtmc-scenarios-test-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    path
}

fn compiled(name: &str, src: &str, mode: Mode) -> ProgramImage {
    let input = write_temp(name, src);
    let output = input.with_extension("vmb");
    let mut config = CompilerConfig::new(input, output);
    config.mode = mode;
    let out = compile(&config).expect("compile");
    let (image, parsed_mode) = ProgramImage::deserialize(&out.bytes).expect("deserialize");
    assert_eq!(parsed_mode, mode);
    image
}

fn opcodes(image: &ProgramImage) -> Vec<Opcode> {
    image.instructions.iter().map(|i| i.opcode).collect()
}

#[test]
fn functions_and_control_flow_round_trip() {
    let src = "\
        int max(int a, int b) {\
            if (a > b) { return a; } else { return b; }\
        }\
        void f() {\
            int i = 0;\
            while (i < 10) { i = i + 1; }\
        }";
    let image = compiled("control_flow.rtmc", src, Mode::Debug);
    assert_eq!(image.functions.len(), 2);
    let ops = opcodes(&image);
    assert!(ops.contains(&Opcode::JumpIfFalse) || ops.contains(&Opcode::Jump));
    assert_eq!(ops.last(), Some(&Opcode::Halt));
}

#[test]
fn struct_bitfield_and_union_access_compiles() {
    let src = "\
        struct Reg { union { struct { int lo:16; int hi:16; }; int value; }; };\
        void f() {\
            struct Reg r;\
            r.lo = 1;\
            r.value = 0;\
        }";
    let image = compiled("struct_bitfield.rtmc", src, Mode::Release);
    assert!(!image.instructions.is_empty());
}

#[test]
fn arrays_and_pointers_compile() {
    let src = "\
        int table[4];\
        void f() {\
            int *p = &table[0];\
            *p = 7;\
            table[1] = table[0] + 1;\
        }";
    let image = compiled("arrays_pointers.rtmc", src, Mode::Release);
    assert!(!image.instructions.is_empty());
}

#[test]
fn global_variables_declare_their_initial_value_declaratively() {
    let src = "int counter = 42; void f() { counter = counter + 1; }";
    let image = compiled("globals.rtmc", src, Mode::Release);
    let decl = image.instructions.iter().find(|i| i.opcode == Opcode::GlobalVarDeclare).unwrap();
    let cid = decl.operands[1] as usize;
    assert_eq!(image.constants[cid], rtmc_image::ConstantValue::I32(42));
    assert_eq!(decl.operands[2], 0, "counter is not const");
}

#[test]
fn message_channel_send_and_recv_emit_msg_opcodes() {
    let src = "message<int> Q; void f() { Q.send(1); int x = Q.recv(timeout:10); }";
    let image = compiled("messages.rtmc", src, Mode::Debug);
    let ops = opcodes(&image);
    assert!(ops.contains(&Opcode::MsgSend));
    assert!(ops.contains(&Opcode::MsgRecv));
}

#[test]
fn rtos_intrinsic_call_compiles_without_a_user_declaration() {
    let src = "void f() { RTOS_DELAY_MS(100); }";
    let image = compiled("intrinsic.rtmc", src, Mode::Release);
    assert!(!image.instructions.is_empty());
}

#[test]
fn led_blink_scenario_emits_one_rtos_create_task_with_resolved_fn_address() {
    let src = "\
        void run(){ HW_GPIO_INIT(13,1); while(1){ HW_GPIO_SET(13,1); RTOS_DELAY_MS(500); HW_GPIO_SET(13,0); RTOS_DELAY_MS(500);} }\
        void main(){ StartTask(1024,0,2,1,run); }";
    let image = compiled("led_blink.rtmc", src, Mode::Debug);
    let tasks: Vec<_> = image.instructions.iter().filter(|i| i.opcode == Opcode::RtosCreateTask).collect();
    assert_eq!(tasks.len(), 1);
    let run_addr = image.functions.iter().find(|f| f.name == "run").unwrap().address;
    assert_eq!(tasks[0].operands, vec![1024, 0, 2, 1, run_addr as i64]);
}

#[test]
fn debug_mode_keeps_symbols_release_mode_strips_them() {
    let src = "int tally; void f() { tally = 1; }";
    let debug_image = compiled("debug_symbols.rtmc", src, Mode::Debug);
    let release_image = compiled("release_symbols.rtmc", src, Mode::Release);
    assert!(!debug_image.symbols.is_empty());
    assert!(release_image.symbols.is_empty());
    assert!(debug_image.instructions.iter().any(|i| i.pos.is_some()));
    assert!(release_image.instructions.iter().all(|i| i.pos.is_none()));
}
