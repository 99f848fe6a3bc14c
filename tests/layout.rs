//! End-to-end struct/union layout checks: source text in, resolved
//! `rtmc_types::StructLayout` out, through the real lexer/parser/analyzer.

use rtmc::lex::Lexer;
use rtmc::parse::Parser;
use rtmc::sema::analyze;

fn analysis(src: &str) -> rtmc::sema::Analysis {
    let tokens = Lexer::new(src).tokenize().expect("lex");
    let program = Parser::new(tokens).parse_program().expect("parse");
    analyze(&program).expect("analyze")
}

#[test]
fn plain_struct_fields_pack_without_padding() {
    let a = analysis("struct Point { int x; int y; } void f() { struct Point p; }");
    let layout = a.registry.layout("Point").unwrap();
    assert_eq!(layout.size, 8);
    assert_eq!(layout.field("x").unwrap().byte_offset, 0);
    assert_eq!(layout.field("y").unwrap().byte_offset, 4);
}

#[test]
fn trailing_char_after_int_pads_to_four_byte_alignment() {
    let a = analysis("struct Rec { int n; char tag; } void f() { struct Rec r; }");
    let layout = a.registry.layout("Rec").unwrap();
    assert_eq!(layout.field("n").unwrap().byte_offset, 0);
    assert_eq!(layout.field("tag").unwrap().byte_offset, 4);
    assert_eq!(layout.size, 8);
}

#[test]
fn adjacent_bit_fields_share_one_storage_unit() {
    let src = "struct Flags { int a:1; int b:1; int c:30; } void f() { struct Flags fl; }";
    let a = analysis(src);
    let layout = a.registry.layout("Flags").unwrap();
    assert_eq!(layout.size, 4);
    let (a_f, b_f, c_f) = (
        layout.field("a").unwrap(),
        layout.field("b").unwrap(),
        layout.field("c").unwrap(),
    );
    assert_eq!(a_f.bit_offset, Some(0));
    assert_eq!(b_f.bit_offset, Some(1));
    assert_eq!(c_f.bit_offset, Some(2));
    assert_eq!((a_f.byte_offset, b_f.byte_offset, c_f.byte_offset), (0, 0, 0));
}

#[test]
fn bit_field_overflowing_current_unit_opens_a_new_one() {
    let src = "struct Wide { int a:20; int b:20; } void f() { struct Wide w; }";
    let a = analysis(src);
    let layout = a.registry.layout("Wide").unwrap();
    assert_eq!(layout.field("a").unwrap().byte_offset, 0);
    assert_eq!(layout.field("b").unwrap().byte_offset, 4);
    assert_eq!(layout.size, 8);
}

#[test]
fn union_alternatives_all_start_at_offset_zero() {
    let src = "union Value { int i; char c; } void f() { union Value v; }";
    let a = analysis(src);
    let layout = a.registry.layout("Value").unwrap();
    assert_eq!(layout.size, 4);
    assert_eq!(layout.field("i").unwrap().byte_offset, 0);
    assert_eq!(layout.field("c").unwrap().byte_offset, 0);
}

#[test]
fn anonymous_union_inside_struct_overlays_a_bitfield_pair_with_a_plain_field() {
    let src = "struct Reg { union { struct { int lo:16; int hi:16; }; int value; }; } void f() { struct Reg r; }";
    let a = analysis(src);
    let layout = a.registry.layout("Reg").unwrap();
    assert_eq!(layout.size, 4);
    assert_eq!(layout.field("lo").unwrap().bit_offset, Some(0));
    assert_eq!(layout.field("hi").unwrap().bit_offset, Some(16));
    assert_eq!(layout.field("value").unwrap().byte_offset, 0);
}

#[test]
fn first_field_struct_inherits_base_members_through_resolve_member() {
    let src = "\
        struct Base { int id; int flags; } \
        struct Derived { struct Base base; int extra; } \
        void f() { struct Derived d; d.id = 1; d.extra = 2; }";
    let a = analysis(src);
    let fd = a.registry.resolve_member("Derived", "id").expect("inherited field");
    assert_eq!(fd.byte_offset, 0);
}

#[test]
fn pointer_sized_members_use_the_eight_byte_pointer_width() {
    let src = "struct Node { struct Node *next; int value; } void f() { struct Node n; }";
    let a = analysis(src);
    let layout = a.registry.layout("Node").unwrap();
    assert_eq!(layout.field("next").unwrap().byte_offset, 0);
    assert_eq!(layout.field("value").unwrap().byte_offset, 8);
}
