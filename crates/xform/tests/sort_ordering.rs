use core::cmp::Ordering;
use proptest::prelude::*;
use rstest::{fixture, rstest};
use rust_decimal::Decimal;
use std::sync::Arc;
use xform::collation::{CodepointCollation, SimpleCaseCollation};
use xform::expr::{Literal, VariableRef};
use xform::sort::{AtomicComparer, AtomicSortComparer, CaseOrder, DataType, NumericComparer, SortOrder, Tuple};
use xform::{
    AtomicValue, DynamicContext, DynamicContextBuilder, ErrorCode, ExpandedName, Expression, Item, Sequence,
    SortExpression, SortKeyDefinition, StaticContextBuilder, TupleSorter,
};

fn atomics(values: impl IntoIterator<Item = AtomicValue>) -> Sequence {
    values.into_iter().map(Item::Atomic).collect()
}

fn sort(input: Sequence, key: SortKeyDefinition) -> Result<Sequence, xform::Error> {
    let mut expr = SortExpression::new(Literal::sequence(input).shared(), vec![key]);
    expr.type_check(&StaticContextBuilder::new().build())?;
    expr.evaluate(&DynamicContext::default())
}

#[fixture]
fn generic() -> AtomicSortComparer {
    AtomicSortComparer::new(Arc::new(CodepointCollation), chrono::FixedOffset::east_opt(0).unwrap())
}

fn number() -> impl Strategy<Value = AtomicValue> {
    prop_oneof![
        (-1000i64..1000).prop_map(AtomicValue::Integer),
        ((-100_000i64..100_000), 0u32..4).prop_map(|(m, s)| AtomicValue::Decimal(Decimal::new(m, s))),
        prop_oneof![
            (-1000i32..1000).prop_map(|i| f64::from(i) / 4.0),
            Just(f64::NAN),
            Just(f64::INFINITY),
            Just(f64::NEG_INFINITY),
            Just(-0.0),
            any::<f64>(),
        ]
        .prop_map(AtomicValue::Double),
    ]
}

proptest! {
    #[test]
    fn nan_sorts_before_every_number(values in proptest::collection::vec(number(), 0..24)) {
        let out = sort(atomics(values.clone()), SortKeyDefinition::default()).unwrap();
        let nans = values.iter().filter(|v| v.is_nan()).count();
        prop_assert_eq!(out.len(), values.len());
        for (i, item) in out.iter().enumerate() {
            prop_assert_eq!(item.atomize().is_nan(), i < nans);
        }
    }

    #[test]
    fn equal_values_share_a_comparison_key(a in number(), b in number()) {
        let c = AtomicSortComparer::new(Arc::new(CodepointCollation), chrono::FixedOffset::east_opt(0).unwrap());
        let equal = c.compares_equal(&a, &b).unwrap();
        let same_key = c.comparison_key(&a).unwrap() == c.comparison_key(&b).unwrap();
        prop_assert_eq!(equal, same_key, "{:?} vs {:?}", a, b);
    }

    #[test]
    fn equal_strings_share_a_collation_key(a in "[a-cA-C]{0,4}", b in "[a-cA-C]{0,4}") {
        let c = AtomicSortComparer::new(Arc::new(SimpleCaseCollation), chrono::FixedOffset::east_opt(0).unwrap());
        let (a, b) = (AtomicValue::string(a), AtomicValue::string(b));
        let equal = c.compares_equal(&a, &b).unwrap();
        let same_key = c.comparison_key(&a).unwrap() == c.comparison_key(&b).unwrap();
        prop_assert_eq!(equal, same_key);
    }

    #[test]
    fn ties_keep_input_order(keys in proptest::collection::vec(0i64..4, 0..40)) {
        let tuples = keys
            .iter()
            .enumerate()
            .map(|(i, k)| Tuple::new(vec![Item::Atomic(AtomicValue::Integer(i as i64))], [Some(AtomicValue::Integer(*k))]))
            .collect();
        let out = TupleSorter::new(vec![SortKeyDefinition::default()]).sort(tuples, &DynamicContext::default()).unwrap();
        let order: Vec<usize> = out
            .iter()
            .map(|item| match item.atomize() {
                AtomicValue::Integer(i) => i as usize,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        for pair in order.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            prop_assert!(keys[a] < keys[b] || (keys[a] == keys[b] && a < b));
        }
    }
}

#[rstest]
fn mixed_input_under_number_data_type() {
    let input = atomics([
        AtomicValue::Integer(3),
        AtomicValue::untyped("2"),
        AtomicValue::Double(f64::NAN),
        AtomicValue::Integer(1),
    ]);
    let out = sort(input, SortKeyDefinition::default().with_data_type(DataType::Number)).unwrap();
    let rendered: Vec<String> = out.iter().map(Item::string_value).collect();
    assert_eq!(rendered, vec!["NaN", "1", "2", "3"]);
    assert!(matches!(out[2].atomize(), AtomicValue::UntypedAtomic(_)));
}

#[rstest]
fn numeric_comparer_orders_mixed_values_directly() {
    let c = NumericComparer::instance();
    let nan = AtomicValue::Double(f64::NAN);
    let two = AtomicValue::untyped("2");
    assert_eq!(c.compare_atomic_values(Some(&nan), Some(&AtomicValue::Integer(1))).unwrap(), Ordering::Less);
    assert_eq!(c.compare_atomic_values(Some(&two), Some(&AtomicValue::Integer(3))).unwrap(), Ordering::Less);
    assert_eq!(c.compare_atomic_values(Some(&two), Some(&AtomicValue::Integer(1))).unwrap(), Ordering::Greater);
}

#[rstest]
fn string_against_boolean_is_not_comparable(generic: AtomicSortComparer) {
    let err = generic
        .compare_atomic_values(Some(&AtomicValue::string("true")), Some(&AtomicValue::Boolean(true)))
        .unwrap_err();
    assert_eq!(err.code_enum(), ErrorCode::XPTY0004);
    let err = sort(atomics([AtomicValue::string("a"), AtomicValue::Boolean(false)]), SortKeyDefinition::default())
        .unwrap_err();
    assert_eq!(err.code_enum(), ErrorCode::XPTY0004);
}

#[rstest]
#[case(CaseOrder::UpperFirst, &["A", "a", "B", "b"])]
#[case(CaseOrder::LowerFirst, &["a", "A", "b", "B"])]
fn case_order_breaks_ties_between_cases(#[case] case_order: CaseOrder, #[case] expected: &[&str]) {
    let input = atomics(["b", "A", "B", "a"].map(AtomicValue::string));
    let out = sort(input, SortKeyDefinition::default().with_case_order(case_order)).unwrap();
    let rendered: Vec<String> = out.iter().map(Item::string_value).collect();
    assert_eq!(rendered, expected);
}

#[rstest]
#[case("ascending", "number", "upper-first")]
#[case("descending", "text", "lower-first")]
#[case("descending", "number", "#default")]
fn fixed_key_resolves_like_the_deferred_one(#[case] order: &str, #[case] data_type: &str, #[case] case_order: &str) {
    let var = |n: &str| -> Arc<dyn Expression> { Arc::new(VariableRef::new(ExpandedName::local(n))) };
    let mut key = SortKeyDefinition::default();
    key.set_order(var("order")).unwrap();
    key.set_data_type(var("type")).unwrap();
    key.set_case_order(var("case")).unwrap();
    assert!(!key.is_fixed());

    let ctx = DynamicContextBuilder::new()
        .with_variable(ExpandedName::local("order"), atomics([AtomicValue::string(order)]))
        .with_variable(ExpandedName::local("type"), atomics([AtomicValue::string(data_type)]))
        .with_variable(ExpandedName::local("case"), atomics([AtomicValue::string(case_order)]))
        .build();
    let fixed = key.fix(&ctx).unwrap();
    assert!(fixed.is_fixed());
    assert_eq!(fixed.order(), Some(SortOrder::parse(order).unwrap()));

    let deferred = key.make_comparator(&ctx).unwrap();
    let resolved = fixed.make_comparator(&DynamicContext::default()).unwrap();
    assert_eq!(deferred.describe(), resolved.describe());
}

#[rstest]
fn invalid_order_value_is_a_dynamic_error() {
    let mut key = SortKeyDefinition::default();
    key.set_order(Arc::new(VariableRef::new(ExpandedName::local("o")))).unwrap();
    let ctx = DynamicContextBuilder::new()
        .with_variable(ExpandedName::local("o"), atomics([AtomicValue::string("sideways")]))
        .build();
    assert_eq!(key.make_comparator(&ctx).unwrap_err().code_enum(), ErrorCode::XTDE0030);
}
