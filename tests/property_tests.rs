//! Point-in-time reads checked against a BTreeMap model

use proptest::prelude::*;
use std::collections::{BTreeMap, HashMap};
use temporal_kv::prelude::*;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn writes() -> impl Strategy<Value = Vec<(String, i64, String)>> {
    prop::collection::vec(
        (
            prop::sample::select(vec!["a".to_string(), "b".to_string(), "c".to_string()]),
            -50i64..50,
            "[a-z]{1,6}",
        ),
        0..40,
    )
}

proptest! {
    #[test]
    fn get_matches_latest_at_or_before(writes in writes(), queries in prop::collection::vec(-60i64..60, 1..20)) {
        let rt = runtime();
        let store = TemporalStore::in_memory();
        let mut model: HashMap<String, BTreeMap<i64, String>> = HashMap::new();

        rt.block_on(async {
            for (key, ts, value) in &writes {
                store.put(key, value, Timestamp::new(*ts)).await.unwrap();
            }
        });
        for (key, ts, value) in writes {
            model.entry(key).or_default().insert(ts, value);
        }

        for key in ["a", "b", "c", "missing"] {
            for q in &queries {
                let expected = model
                    .get(key)
                    .and_then(|timeline| timeline.range(..=*q).next_back())
                    .map(|(_, v)| v.clone());
                let actual = rt.block_on(store.get(key, Timestamp::new(*q))).unwrap();
                prop_assert_eq!(actual, expected);
            }

            let history = rt.block_on(store.history(key)).unwrap();
            let expected_len = model.get(key).map(|t| t.len()).unwrap_or(0);
            prop_assert_eq!(history.len(), expected_len);
            prop_assert!(history.windows(2).all(|w| w[0].timestamp() < w[1].timestamp()));
        }
    }

    #[test]
    fn writes_to_one_key_never_change_another(
        other_writes in prop::collection::vec((-50i64..50, "[a-z]{1,6}"), 0..30),
        query in -60i64..60,
    ) {
        let rt = runtime();
        let store = TemporalStore::in_memory();

        let before = rt.block_on(async {
            store.put("b", "fixed", Timestamp::new(0)).await.unwrap();
            store.get("b", Timestamp::new(query)).await.unwrap()
        });

        rt.block_on(async {
            for (ts, value) in &other_writes {
                store.put("a", value, Timestamp::new(*ts)).await.unwrap();
            }
        });

        let after = rt.block_on(store.get("b", Timestamp::new(query))).unwrap();
        prop_assert_eq!(before, after);
    }
}
