use crate::value::{Value, date_timestamp, text_token};
use proptest::prelude::*;
use time::macros::date;

#[test]
fn null_is_not_indexable() {
    assert_eq!(Value::Null.index_token(), None);
    assert_eq!(Value::Null.id_token(), None);
}

#[test]
fn numbers_hash_to_themselves() {
    assert_eq!(Value::Int(-42).index_token().as_deref(), Some("-42"));
    assert_eq!(Value::Uint(7).index_token().as_deref(), Some("7"));
    assert_eq!(Value::Float(2.5).index_token().as_deref(), Some("2.5"));
    assert_eq!(Value::Bool(true).index_token().as_deref(), Some("1"));
    assert_eq!(Value::Bool(false).index_token().as_deref(), Some("0"));
}

#[test]
fn signed_zero_floats_share_a_token() {
    assert_eq!(Value::Float(-0.0), Value::Float(0.0));
    assert_eq!(
        Value::Float(-0.0).index_token(),
        Value::Float(0.0).index_token(),
        "equal floats should land in the same index set"
    );
    assert_eq!(Value::Float(-1.5).index_token().as_deref(), Some("-1.5"));
}

#[test]
fn text_hashes_to_opaque_token() {
    let token = Value::from("GOOG").index_token().expect("text should be indexable");

    assert_eq!(token.len(), 16, "text tokens are fixed-width hex");
    assert_eq!(token, text_token("GOOG"));
    assert_ne!(token, text_token("IBM"), "distinct symbols should hash apart");
}

#[test]
fn dates_hash_to_midnight_timestamp() {
    let d = date!(2010 - 06 - 01);

    assert_eq!(date_timestamp(d), 1_275_350_400);
    assert_eq!(
        Value::Date(d).index_token().as_deref(),
        Some("1275350400"),
        "date token should be the UTC midnight timestamp"
    );
}

#[test]
fn id_tokens_keep_text_verbatim() {
    assert_eq!(Value::from("abc").id_token().as_deref(), Some("abc"));
    assert_eq!(Value::Int(3).id_token().as_deref(), Some("3"));
    assert_eq!(Value::Float(3.0).id_token(), None, "floats never identify records");
}

#[test]
fn option_conversion_maps_none_to_null() {
    assert_eq!(Value::from(None::<i64>), Value::Null);
    assert_eq!(Value::from(Some("x")), Value::Text("x".to_string()));
}

proptest! {
    #[test]
    fn index_tokens_never_contain_separator(s in ".*", n in any::<i64>(), f in any::<f64>()) {
        for value in [Value::Text(s.clone()), Value::Int(n), Value::Float(f)] {
            let token = value.index_token().expect("non-null values are indexable");
            prop_assert!(!token.contains(':'), "token {token:?} contains the key separator");
        }
    }

    #[test]
    fn integer_tokens_are_injective(a in any::<i64>(), b in any::<i64>()) {
        prop_assume!(a != b);
        prop_assert_ne!(Value::Int(a).index_token(), Value::Int(b).index_token());
    }
}
