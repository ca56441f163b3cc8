use dne_loader::encoding::SourceEncoding;
use dne_loader::ingestion::{RowDecoder, RowError};
use dne_loader::layout::LayoutRegistry;
use dne_loader::store::Overrides;
use dne_loader::types::{Column, Delimiter, Layout, Value};

fn localidade() -> Layout {
    Layout::new(vec![
        Column::integer("LOC_NU"),
        Column::code("UFE_SG", 2),
        Column::text("LOC_NO"),
        Column::code("CEP", 8),
    ])
}

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

#[test]
fn well_formed_line_decodes_in_layout_order() {
    let layout = localidade();
    let decoder =
        RowDecoder::new(&layout, &Overrides::new(), Delimiter::SEMICOLON, SourceEncoding::LATIN1).unwrap();

    let row = decoder.decode_line("7;SP; Sao Paulo ;01000000").unwrap();
    assert_eq!(
        row.values,
        vec![Value::Int(7), text("SP"), text("Sao Paulo"), text("01000000")]
    );
}

#[test]
fn short_rows_are_padded_with_nulls() {
    let layout = localidade();
    let decoder =
        RowDecoder::new(&layout, &Overrides::new(), Delimiter::SEMICOLON, SourceEncoding::LATIN1).unwrap();

    let row = decoder.decode_line("7;SP").unwrap();
    assert_eq!(row.len(), layout.len());
    assert_eq!(row.values, vec![Value::Int(7), text("SP"), Value::Null, Value::Null]);
}

#[test]
fn extra_fields_are_ignored() {
    let layout = localidade();
    let decoder =
        RowDecoder::new(&layout, &Overrides::new(), Delimiter::SEMICOLON, SourceEncoding::LATIN1).unwrap();

    let row = decoder.decode_line("7;SP;Santos;11000000;extra;more").unwrap();
    assert_eq!(row.len(), 4);
    assert_eq!(row.get(3), Some(&text("11000000")));
}

#[test]
fn non_numeric_integers_become_null() {
    let layout = localidade();
    let decoder =
        RowDecoder::new(&layout, &Overrides::new(), Delimiter::SEMICOLON, SourceEncoding::LATIN1).unwrap();

    assert_eq!(decoder.decode_line("abc;SP;X;1").unwrap().get(0), Some(&Value::Null));
    assert_eq!(decoder.decode_line("NULL;SP;X;1").unwrap().get(0), Some(&Value::Null));
    assert_eq!(decoder.decode_line(";SP;X;1").unwrap().get(0), Some(&Value::Null));
}

#[test]
fn region_override_fills_column_not_present_in_file() {
    let registry = LayoutRegistry::dne();
    let street = registry.get("LOG_LOGRADOURO").unwrap();
    let mut overrides = Overrides::new();
    overrides.insert("UF".to_string(), "SP".to_string());

    let decoder =
        RowDecoder::new(street.layout(), &overrides, Delimiter::SEMICOLON, SourceEncoding::LATIN1).unwrap();
    assert_eq!(
        decoder.source_columns(),
        vec!["LOG_NU", "UFE_SG", "LOC_NU", "BAIRRO_NU_INI", "BAIRRO_NU_FIM", "LOG_NO", "CEP"]
    );

    let row = decoder.decode_line("10;SP;1;2;3;Rua Augusta;01305000").unwrap();
    assert_eq!(row.len(), 8);
    assert_eq!(row.get(5), Some(&text("Rua Augusta")));
    assert_eq!(row.get(7), Some(&text("SP")));

    // Short row: override still applied after padding.
    let row = decoder.decode_line("11;SP").unwrap();
    assert_eq!(row.get(6), Some(&Value::Null));
    assert_eq!(row.get(7), Some(&text("SP")));
}

#[test]
fn override_for_unknown_column_is_rejected() {
    let layout = localidade();
    let mut overrides = Overrides::new();
    overrides.insert("NOPE".to_string(), "x".to_string());

    let err = RowDecoder::new(&layout, &overrides, Delimiter::SEMICOLON, SourceEncoding::LATIN1).unwrap_err();
    assert_eq!(err.column, "NOPE");
}

#[test]
fn nul_byte_makes_the_line_corrupt() {
    let layout = localidade();
    let decoder =
        RowDecoder::new(&layout, &Overrides::new(), Delimiter::SEMICOLON, SourceEncoding::LATIN1).unwrap();

    let err = decoder.decode_raw(b"7;SP;Sao\0Paulo;01000000").unwrap_err();
    assert_eq!(err, RowError::ControlCharacter { position: 8, code: 0 });
}

#[test]
fn tab_inside_a_field_is_not_corruption() {
    let layout = localidade();
    let decoder =
        RowDecoder::new(&layout, &Overrides::new(), Delimiter::SEMICOLON, SourceEncoding::LATIN1).unwrap();

    let row = decoder.decode_line("7;SP;Sao\tPaulo;01000000").unwrap();
    assert_eq!(row.get(2), Some(&text("Sao\tPaulo")));
}

#[test]
fn invalid_bytes_for_the_encoding_are_rejected() {
    let layout = localidade();
    let decoder =
        RowDecoder::new(&layout, &Overrides::new(), Delimiter::SEMICOLON, SourceEncoding::UTF8).unwrap();

    let err = decoder.decode_raw(b"7;SP;S\xe3o Paulo;01000000").unwrap_err();
    assert!(matches!(err, RowError::Encoding { .. }));
}

#[test]
fn latin1_bytes_decode_and_trailing_cr_is_dropped() {
    let layout = localidade();
    let decoder =
        RowDecoder::new(&layout, &Overrides::new(), Delimiter::SEMICOLON, SourceEncoding::LATIN1).unwrap();

    let row = decoder.decode_raw(b"7;SP;S\xe3o Paulo;01000000\r").unwrap();
    assert_eq!(row.get(2), Some(&text("São Paulo")));
    assert_eq!(row.get(3), Some(&text("01000000")));
}

#[test]
fn shifted_field_that_overflows_a_code_column_is_rejected() {
    let layout = localidade();
    let decoder =
        RowDecoder::new(&layout, &Overrides::new(), Delimiter::SEMICOLON, SourceEncoding::LATIN1).unwrap();

    // A ';' inside the name pushes "Praia Grande" into CEP.
    let err = decoder.decode_line("2;SP;Santos;Praia Grande;11000000").unwrap_err();
    assert_eq!(
        err,
        RowError::CodeTooLong {
            column: "CEP".to_string(),
            width: 8,
            length: 12
        }
    );
}

#[test]
fn integers_outside_the_column_range_become_null() {
    let layout = localidade();
    let decoder =
        RowDecoder::new(&layout, &Overrides::new(), Delimiter::SEMICOLON, SourceEncoding::LATIN1).unwrap();

    let row = decoder.decode_line("99999999999;SP;X;1").unwrap();
    assert_eq!(row.get(0), Some(&Value::Null));
    let row = decoder.decode_line("-2147483648;SP;X;1").unwrap();
    assert_eq!(row.get(0), Some(&Value::Int(-2_147_483_648)));
}

#[test]
fn override_literal_wider_than_its_column_is_rejected() {
    let registry = LayoutRegistry::dne();
    let street = registry.get("LOG_LOGRADOURO").unwrap();
    let mut overrides = Overrides::new();
    overrides.insert("UF".to_string(), "SPX".to_string());

    let err = RowDecoder::new(street.layout(), &overrides, Delimiter::SEMICOLON, SourceEncoding::LATIN1)
        .unwrap_err();
    assert_eq!(err.column, "UF");
}
