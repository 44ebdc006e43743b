//! Schema building: named-type expansion, offsets, path lookup and failure modes.

use s7db::{
    build_schema, load_schema, load_schema_with, parse, resolve_path, Error, LayoutOptions,
    PrimitiveKind, Schema, SchemaError,
};

fn schema(src: &str) -> Schema {
    load_schema(src).expect("schema")
}

fn at(s: &Schema, path: &str) -> (usize, u8) {
    let el = s.element(path).expect(path);
    (el.byte_offset, el.bit_offset)
}

fn schema_err(src: &str) -> SchemaError {
    match load_schema(src) {
        Err(Error::Schema(e)) => e,
        other => panic!("expected schema error, got {:?}", other),
    }
}

fn db(body: &str) -> String {
    format!(
        "DATA_BLOCK \"D\"\nVERSION : 0.1\nSTRUCT\n{}\nEND_STRUCT;\nBEGIN\nEND_DATA_BLOCK\n",
        body
    )
}

/// Offsets never go backwards; bytes never overlap; BOOL runs count bits up within one byte.
fn assert_monotonic(s: &Schema) {
    for pair in s.leaves().windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        assert!(a.byte_offset <= b.byte_offset, "{} then {}", a.path, b.path);
        let both_bool = a.kind == PrimitiveKind::Bool && b.kind == PrimitiveKind::Bool;
        if both_bool && a.byte_offset == b.byte_offset {
            assert!(a.bit_offset < b.bit_offset, "{} then {}", a.path, b.path);
        } else if !both_bool {
            assert!(
                a.byte_offset + a.byte_size() <= b.byte_offset,
                "{} overlaps {}",
                a.path,
                b.path
            );
        }
    }
}

#[test]
fn bools_pack_across_struct_boundary() {
    let s = schema(
        r#"TYPE "Pair" VERSION : 0.1 STRUCT a : Int; b : Bool; END_STRUCT; END_TYPE  DATA_BLOCK "D" VERSION : 0.1 STRUCT x : "Pair"; y : Bool; END_STRUCT; BEGIN END_DATA_BLOCK"#,
    );
    assert_eq!(at(&s, "x.a"), (0, 0));
    assert_eq!(s.element("x.a").expect("x.a").kind, PrimitiveKind::Int);
    assert_eq!(at(&s, "x.b"), (2, 0));
    assert_eq!(at(&s, "y"), (2, 1));
    assert_eq!(s.len(), 3);
    assert_eq!(s.size(), 3);
    assert_monotonic(&s);
}

#[test]
fn int_array_elements_are_two_bytes_apart() {
    let s = schema(&db("head : DInt;\narr : Array[1..3] of Int;"));
    assert_eq!(at(&s, "arr[1]"), (4, 0));
    assert_eq!(at(&s, "arr[2]"), (6, 0));
    assert_eq!(at(&s, "arr[3]"), (8, 0));
    assert!(s.element("arr[0]").is_err());
    assert_eq!(s.size(), 10);
}

#[test]
fn eight_bools_then_ninth_starts_new_byte() {
    let body: String = (0..9).map(|i| format!("b{} : Bool;\n", i)).collect();
    let s = schema(&db(&body));
    for i in 0..8 {
        assert_eq!(at(&s, &format!("b{}", i)), (0, i as u8));
    }
    assert_eq!(at(&s, "b8"), (1, 0));
    assert_monotonic(&s);
}

#[test]
fn odd_offsets_are_padded_for_wide_types() {
    let s = schema(&db("a : Byte;\nb : Real;\nc : Char;\nd : SInt;\ne : LReal;\nf : USInt;\ng : Time;"));
    assert_eq!(at(&s, "a"), (0, 0));
    assert_eq!(at(&s, "b"), (2, 0));
    assert_eq!(at(&s, "c"), (6, 0));
    assert_eq!(at(&s, "d"), (7, 0));
    assert_eq!(at(&s, "e"), (8, 0));
    assert_eq!(at(&s, "f"), (16, 0));
    assert_eq!(at(&s, "g"), (18, 0));
    assert_eq!(s.size(), 22);
    assert_monotonic(&s);
}

#[test]
fn strings_use_declared_length() {
    let s = schema(&db("a : Byte;\nname : String[10];\ncode : FString[3];\nn : Int;"));
    let name = s.element("name").expect("name");
    assert_eq!((name.byte_offset, name.declared_length), (2, Some(10)));
    assert_eq!(name.byte_size(), 12);
    assert_eq!(at(&s, "code"), (14, 0));
    assert_eq!(at(&s, "n"), (18, 0));
}

#[test]
fn nested_named_types_expand_with_dotted_paths() {
    let src = r#"
TYPE "Point"
VERSION : 0.1
   STRUCT
      x : Real;
      y : Real;
   END_STRUCT;
END_TYPE

TYPE "Segment"
VERSION : 0.1
   STRUCT
      valid : Bool;
      ends : Array[0..1] of "Point";
   END_STRUCT;
END_TYPE

DATA_BLOCK "Geometry"
VERSION : 0.1
   STRUCT
      count : Int;
      segs : Array[1..2] of "Segment";
   END_STRUCT;
BEGIN
END_DATA_BLOCK
"#;
    let s = schema(src);
    assert_eq!(s.name(), "Geometry");
    // Segment = valid(1) + pad(1) + 2 * Point(8) = 18 bytes.
    assert_eq!(at(&s, "segs[1].valid"), (2, 0));
    assert_eq!(at(&s, "segs[1].ends[0].x"), (4, 0));
    assert_eq!(at(&s, "segs[1].ends[1].y"), (16, 0));
    assert_eq!(at(&s, "segs[2].valid"), (20, 0));
    assert_eq!(at(&s, "segs[2].ends[1].y"), (34, 0));
    assert_eq!(s.size(), 38);
    assert_eq!(s.len(), 1 + 2 * 5);
    assert_monotonic(&s);
}

#[test]
fn type_order_in_source_does_not_matter() {
    let src = r#"
TYPE "Outer" VERSION : 0.1 STRUCT i : "Inner"; END_STRUCT; END_TYPE
TYPE "Inner" VERSION : 0.1 STRUCT v : DInt; END_STRUCT; END_TYPE
DATA_BLOCK "D" VERSION : 0.1 STRUCT o : "Outer"; END_STRUCT; BEGIN END_DATA_BLOCK
"#;
    let s = schema(src);
    assert_eq!(at(&s, "o.i.v"), (0, 0));
}

#[test]
fn instance_block_uses_type_fields_at_root() {
    let src = r#"
TYPE "Recipe" VERSION : 0.1 STRUCT qty : DInt; ok : Bool; END_STRUCT; END_TYPE
DATA_BLOCK "R" VERSION : 0.1 "Recipe" BEGIN END_DATA_BLOCK
"#;
    let s = schema(src);
    assert_eq!(at(&s, "qty"), (0, 0));
    assert_eq!(at(&s, "ok"), (4, 0));
    assert_eq!(s.size(), 5);
}

#[test]
fn leaves_keep_declaration_order() {
    let s = schema(&db("z : Int;\na : Struct\n  m : Bool;\n  b : Byte;\nEND_STRUCT;\nk : Word;"));
    let paths: Vec<&str> = s.leaves().iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, ["z", "a.m", "a.b", "k"]);
    assert_eq!(s.element("a.m").expect("a.m").name, "m");
}

#[test]
fn inline_struct_array_rounds_stride_to_even() {
    let s = schema(&db(
        "flag : Bool;\nslots : Array[1..3] of Struct\n   busy : Bool;\n   done : Bool;\n   err : Bool;\nEND_STRUCT;\ntail : Int;",
    ));
    assert_eq!(at(&s, "flag"), (0, 0));
    assert_eq!(at(&s, "slots[1].busy"), (2, 0));
    assert_eq!(at(&s, "slots[1].err"), (2, 2));
    assert_eq!(at(&s, "slots[2].busy"), (4, 0));
    assert_eq!(at(&s, "slots[3].done"), (6, 1));
    assert_eq!(at(&s, "tail"), (8, 0));
    assert_eq!(s.size(), 10);
    assert!(s.element("slots[0].busy").is_err());
    assert_eq!(s.element("slots[2].done").expect("done").name, "done");
    assert_monotonic(&s);
}

#[test]
fn inline_struct_array_with_negative_bounds() {
    let s = schema(&db(
        "pts : Array[-1..0] of Struct\n   x : Int;\n   ok : Bool;\nEND_STRUCT;",
    ));
    assert_eq!(at(&s, "pts[-1].x"), (0, 0));
    assert_eq!(at(&s, "pts[-1].ok"), (2, 0));
    assert_eq!(at(&s, "pts[0].x"), (4, 0));
    assert_eq!(at(&s, "pts[0].ok"), (6, 0));
    assert_eq!(s.size(), 8);
}

#[test]
fn array_item_names_carry_their_index() {
    let s = schema(&db("v : Array[2..3] of Word;"));
    assert_eq!(s.element("v[3]").expect("v[3]").name, "v[3]");
}

#[test]
fn dotted_quoted_name_is_kept_whole() {
    let s = schema(&db("pos : Struct\n   \"pos.x\" : Real;\nEND_STRUCT;"));
    let el = s.element("pos.pos.x").expect("pos.pos.x");
    assert_eq!(el.name, "pos.x");
    assert_eq!(el.kind, PrimitiveKind::Real);
}

// ==================== Failures ====================

#[test]
fn direct_cycle_is_rejected() {
    let src = r#"
TYPE "Node" VERSION : 0.1 STRUCT next : "Node"; END_STRUCT; END_TYPE
DATA_BLOCK "D" VERSION : 0.1 STRUCT n : "Node"; END_STRUCT; BEGIN END_DATA_BLOCK
"#;
    assert_eq!(
        schema_err(src),
        SchemaError::CyclicReference {
            chain: vec!["Node".to_string(), "Node".to_string()]
        }
    );
}

#[test]
fn transitive_cycle_is_rejected() {
    let src = r#"
TYPE "A" VERSION : 0.1 STRUCT b : Array[0..1] of "B"; END_STRUCT; END_TYPE
TYPE "B" VERSION : 0.1 STRUCT s : Struct c : "C"; END_STRUCT; END_STRUCT; END_TYPE
TYPE "C" VERSION : 0.1 STRUCT a : "A"; END_STRUCT; END_TYPE
DATA_BLOCK "D" VERSION : 0.1 STRUCT x : Int; END_STRUCT; BEGIN END_DATA_BLOCK
"#;
    match schema_err(src) {
        SchemaError::CyclicReference { chain } => assert_eq!(chain, ["A", "B", "C", "A"]),
        other => panic!("expected cycle, got {:?}", other),
    }
}

#[test]
fn unknown_type_is_named() {
    let err = schema_err(&db("m : \"Missing\";"));
    assert_eq!(
        err,
        SchemaError::UnknownType {
            name: "Missing".to_string(),
            referenced_by: "m".to_string()
        }
    );
    assert!(err.to_string().contains("Missing"));
}

#[test]
fn unknown_primitive_is_rejected() {
    assert!(matches!(
        schema_err(&db("m : Int16;")),
        SchemaError::UnsupportedType { name, .. } if name == "Int16"
    ));
}

#[test]
fn string_without_length_is_rejected_unless_configured() {
    let src = db("s : String;\nf : FString;");
    assert!(matches!(
        schema_err(&src),
        SchemaError::MissingLength { kind: PrimitiveKind::String, .. }
    ));
    // The default only applies to STRING.
    match load_schema_with(&src, &LayoutOptions::tia_defaults()) {
        Err(Error::Schema(SchemaError::MissingLength { path, kind })) => {
            assert_eq!((path.as_str(), kind), ("f", PrimitiveKind::FString));
        }
        other => panic!("expected missing length, got {:?}", other),
    }
}

#[test]
fn oversized_string_is_rejected() {
    assert!(matches!(
        schema_err(&db("s : String[255];")),
        SchemaError::InvalidLength { length: 255, .. }
    ));
}

#[test]
fn unknown_path_is_not_found() {
    let s = schema(&db("outer : Struct\n  v : Int;\nEND_STRUCT;"));
    assert_eq!(
        s.element("outer").unwrap_err(),
        SchemaError::PathNotFound("outer".to_string())
    );
    assert!(s.element("outer.w").is_err());
    assert_eq!(resolve_path(&s, "outer.v").expect("outer.v").kind, PrimitiveKind::Int);
}

#[test]
fn colliding_paths_are_rejected() {
    assert_eq!(
        schema_err(&db("a : Struct\n   b : Int;\nEND_STRUCT;\n\"a.b\" : Bool;")),
        SchemaError::AmbiguousPath("a.b".to_string())
    );
}

#[test]
fn huge_arrays_are_rejected_without_allocating() {
    assert_eq!(
        schema_err(&db("flags : Array[0..4000000000] of Bool;")),
        SchemaError::BlockTooLarge {
            path: "flags".to_string(),
            end: 500_000_001,
            max: s7db::schema::MAX_BLOCK_SIZE
        }
    );
    assert!(matches!(
        schema_err(&db("items : Array[0..1000000] of Struct\n   on : Bool;\nEND_STRUCT;")),
        SchemaError::BlockTooLarge { path, .. } if path == "items"
    ));
    assert!(matches!(
        schema_err(&db("a : Array[-9223372036854775808..9223372036854775807] of Int;")),
        SchemaError::ArrayTooLarge { .. }
    ));
}

#[test]
fn failed_build_produces_nothing_from_parse_tree() {
    let unit = parse(&db("a : Int;\nb : \"Nope\";")).expect("parse");
    assert!(build_schema(&unit).is_err());
}
