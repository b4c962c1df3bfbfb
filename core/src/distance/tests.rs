use super::*;

const EPSILON: f32 = 1e-5;

fn approx_eq(left: f32, right: f32) {
    assert!((left - right).abs() < EPSILON, "expected {left} ~= {right}");
}

fn deterministic_vector(seed: usize, len: usize) -> Vec<f32> {
    (0..len)
        .map(|index| {
            let mixed = seed
                .wrapping_mul(1_103_515_245)
                .wrapping_add(index.wrapping_mul(12_345))
                .wrapping_add(97);
            (mixed % 10_000) as f32 / 5_000.0 - 1.0
        })
        .collect()
}

fn scalar_l2_squared(left: &[f32], right: &[f32]) -> f32 {
    left.iter()
        .zip(right)
        .map(|(l, r)| (l - r) * (l - r))
        .sum()
}

#[test]
fn l2_is_squared_euclidean() {
    approx_eq(l2_squared(&[1.0, 2.0, 3.0], &[1.0, 2.0, 6.0]), 9.0);
    approx_eq(distance(DistanceType::L2, &[0.0, 0.0], &[3.0, 4.0]), 25.0);
}

#[test]
fn cosine_and_dot_are_one_minus_similarity() {
    approx_eq(distance(DistanceType::Cosine, &[1.0, 0.0], &[0.0, 1.0]), 1.0);
    approx_eq(distance(DistanceType::Cosine, &[1.0, 0.0], &[2.0, 0.0]), 0.0);
    approx_eq(distance(DistanceType::Dot, &[1.0, 2.0], &[3.0, 4.0]), 1.0 - 11.0);
}

#[test]
fn cosine_against_zero_row_is_one() {
    approx_eq(distance(DistanceType::Cosine, &[1.0, 2.0], &[0.0, 0.0]), 1.0);
}

#[test]
fn prepared_query_matches_scalar_reference_across_lengths() {
    for len in [1usize, 3, 7, 8, 9, 16, 17, 64, 129] {
        let query = deterministic_vector(17, len);
        let row = deterministic_vector(31, len);
        let prepared = PreparedQuery::new(DistanceType::L2, &query);
        let reference = scalar_l2_squared(&query, &row);
        assert!((prepared.distance(&row) - reference).abs() < 1e-3);
        assert!((dot(&query, &row) - (1.0 - distance(DistanceType::Dot, &query, &row))).abs() < 1e-3);
    }
}

#[test]
fn validate_query_rejects_bad_input() {
    let error = validate_query(&[1.0, 2.0], 3, DistanceType::L2).expect_err("must fail");
    assert!(matches!(error, Error::InvalidArgument(_)));
    validate_query(&[], 0, DistanceType::L2).expect_err("empty query must fail");
    validate_query(&[1.0, f32::NAN], 2, DistanceType::L2).expect_err("nan must fail");
    validate_query(&[0.0, 0.0], 2, DistanceType::Cosine).expect_err("zero cosine must fail");
    validate_query(&[0.0, 0.0], 2, DistanceType::L2).expect("zero l2 query is fine");
}

#[test]
fn normalized_has_unit_length() {
    let unit = normalized(&[3.0, 4.0]);
    approx_eq(unit[0], 0.6);
    approx_eq(unit[1], 0.8);
    assert_eq!(normalized(&[0.0, 0.0]), vec![0.0, 0.0]);
}

#[test]
fn distance_type_parses_names() {
    assert_eq!("L2".parse::<DistanceType>().expect("must parse"), DistanceType::L2);
    assert_eq!(
        "cosine".parse::<DistanceType>().expect("must parse"),
        DistanceType::Cosine
    );
    "hamming".parse::<DistanceType>().expect_err("must fail");
}
