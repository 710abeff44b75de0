use bsgs_diagcache::{
    encoded_row_len, index_table_len, open_for_read, open_for_write, CacheLocation, DiagRow,
    RnsCodec, RnsPoly, SchemeParams,
};
use proptest::prelude::*;

const PROPTEST_CASES: u32 = 64;

fn poly(ring_degree: usize, num_moduli: usize, seed: u64) -> RnsPoly {
    RnsPoly {
        level: 2,
        scale: 1024.0,
        ring_degree,
        limbs: (0..num_moduli as u64)
            .map(|l| (0..ring_degree as u64).map(|i| seed ^ (l << 20) ^ i).collect())
            .collect(),
    }
}

fn arb_tables() -> impl Strategy<Value = (usize, Vec<bool>, Vec<bool>)> {
    (1usize..600).prop_flat_map(|slots| {
        let d = index_table_len(slots);
        (
            Just(slots),
            prop::collection::vec(any::<bool>(), d),
            prop::collection::vec(any::<bool>(), d),
        )
    })
}

fn arb_mask() -> impl Strategy<Value = Vec<bool>> {
    // At least one slot present so the row can start a stream.
    prop::collection::vec(any::<bool>(), 1..12).prop_map(|mut mask| {
        mask[0] = true;
        mask
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(PROPTEST_CASES))]

    #[test]
    fn index_tables_survive_the_header((slots, baby, giant) in arb_tables()) {
        let dir = tempfile::tempdir().unwrap();
        let location = CacheLocation::new(dir.path().join("tables"), 0);
        let params = SchemeParams::new(slots);

        let mut writer = open_for_write(&location, &params, RnsCodec)
            .unwrap()
            .into_writer()
            .unwrap();
        writer.set_index_tables(baby.clone(), giant.clone()).unwrap();
        writer.write_diag(0, &[Some(poly(2, 1, 1))]).unwrap();
        writer.close().unwrap();

        let mut reader = open_for_read(&location, &params, RnsCodec).unwrap();
        prop_assert_eq!(&reader.index_tables().baby, &baby);
        prop_assert_eq!(&reader.index_tables().giant, &giant);
        prop_assert_eq!(reader.read_diag().unwrap().unwrap().shift, 0);
    }

    #[test]
    fn sparse_rows_are_compacted(
        mask in arb_mask(),
        ring_degree in 1usize..6,
        num_moduli in 1usize..4,
        shift in any::<i32>(),
    ) {
        let dir = tempfile::tempdir().unwrap();
        let location = CacheLocation::new(dir.path().join("sparse"), 0);
        let params = SchemeParams::new(4);

        let slots: Vec<Option<RnsPoly>> = mask
            .iter()
            .enumerate()
            .map(|(i, &present)| present.then(|| poly(ring_degree, num_moduli, i as u64)))
            .collect();
        let present = mask.iter().filter(|&&p| p).count();
        let per_slot = ring_degree * num_moduli * 8;

        let mut writer = open_for_write(&location, &params, RnsCodec)
            .unwrap()
            .into_writer()
            .unwrap();
        writer.set_index_tables(vec![true; 2], vec![true; 2]).unwrap();
        let len = writer.write_diag(shift, &slots).unwrap();
        let row_size = writer.header().unwrap().row_size as usize;
        writer.close().unwrap();

        prop_assert_eq!(len, 4 + present * (1 + per_slot) + (mask.len() - present));
        prop_assert_eq!(len, encoded_row_len(mask.len(), present, per_slot));
        prop_assert!(len <= row_size);
        if present < mask.len() {
            prop_assert!(len < row_size);
        }

        let mut reader = open_for_read(&location, &params, RnsCodec).unwrap();
        let row = reader.read_diag().unwrap().unwrap();
        prop_assert_eq!(row, DiagRow::new(shift, slots));
        prop_assert!(reader.read_diag().unwrap().is_none());
    }
}
