use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use harvest_core::{
    build_candidates, build_training_set, CustomerId, FeatureEngineer, PairKey, TransactionRecord,
    TransactionSnapshot,
};
use proptest::prelude::*;
use rust_decimal::Decimal;

fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 1).expect("valid date")
}

fn arb_record() -> impl Strategy<Value = TransactionRecord> {
    (0u8..4, 0u8..5, 0i64..120, 0u32..6, 0i64..1000, any::<bool>()).prop_map(
        |(customer, product, day, quantity, cents, surplus)| {
            TransactionRecord::new(
                format!("C{customer}").as_str(),
                format!("P{product}").as_str(),
                base_date() + Duration::days(day),
                quantity,
                Decimal::new(cents, 2),
                surplus,
            )
        },
    )
}

fn arb_snapshot() -> impl Strategy<Value = TransactionSnapshot> {
    prop::collection::vec(arb_record(), 0..60).prop_map(|records| {
        TransactionSnapshot::from_records(records).expect("generated records are valid")
    })
}

proptest! {
    #[test]
    fn features_ignore_everything_after_the_cutoff(
        snapshot in arb_snapshot(),
        cutoff_offset in 0i64..120,
        noise in prop::collection::vec(arb_record(), 0..20),
    ) {
        let cutoff = base_date() + Duration::days(cutoff_offset);
        let baseline = FeatureEngineer::new().build(&snapshot, cutoff);

        // Extra records dated strictly after the cutoff must not change any feature.
        let mut records = snapshot.records().to_vec();
        records.extend(noise.into_iter().map(|mut record| {
            let offset = (record.purchase_date - base_date()).num_days();
            record.purchase_date = cutoff + Duration::days(1 + offset);
            record
        }));
        let extended = TransactionSnapshot::from_records(records).expect("valid records");

        prop_assert_eq!(FeatureEngineer::new().build(&extended, cutoff), baseline);
    }

    #[test]
    fn labels_match_the_forward_window_exactly(
        snapshot in arb_snapshot(),
        cutoff_offset in 0i64..120,
        window_days in 1u32..30,
    ) {
        let cutoff = base_date() + Duration::days(cutoff_offset);
        let window_end = cutoff + Duration::days(i64::from(window_days));
        let examples = build_training_set(&snapshot, cutoff, window_days).expect("labels");

        let mut expected: BTreeMap<PairKey, (u64, usize)> = BTreeMap::new();
        for record in snapshot.records() {
            if record.purchase_date > cutoff && record.purchase_date <= window_end {
                let entry = expected.entry(record.key()).or_default();
                entry.0 += u64::from(record.quantity);
                entry.1 += 1;
            }
        }

        for example in &examples {
            let (quantity, count) =
                expected.get(example.features.key()).copied().unwrap_or_default();
            prop_assert_eq!(example.label.future_quantity, quantity);
            prop_assert_eq!(example.label.future_purchase_count, count);
            prop_assert_eq!(example.label.will_buy, count > 0);
        }
    }

    #[test]
    fn candidates_agree_with_training_features(
        snapshot in arb_snapshot(),
        cutoff_offset in 0i64..120,
        customer in 0u8..4,
    ) {
        let cutoff = base_date() + Duration::days(cutoff_offset);
        let customer_id = CustomerId::new(format!("C{customer}"));

        let candidates = build_candidates(&snapshot, &customer_id, cutoff);
        let features: Vec<_> = FeatureEngineer::new()
            .build(&snapshot, cutoff)
            .into_iter()
            .filter(|vector| vector.customer_id() == &customer_id)
            .collect();

        prop_assert_eq!(candidates, features);
    }
}

#[test]
fn single_purchase_pairs_have_zero_history_span() {
    let snapshot = TransactionSnapshot::from_records(vec![TransactionRecord::new(
        "C1",
        "P1",
        base_date(),
        3,
        Decimal::ONE,
        false,
    )])
    .expect("valid records");

    let features = FeatureEngineer::new().build(&snapshot, base_date() + Duration::days(10));
    assert_eq!(features.len(), 1);
    assert_eq!(features[0].interaction.days_since_first_purchase, 0);
    assert_eq!(features[0].interaction.avg_inter_purchase_interval_days, 0.0);
    assert_eq!(features[0].interaction.recency_days, 10);
}
