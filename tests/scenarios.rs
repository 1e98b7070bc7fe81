//! Seed scenarios exercising the engine end to end.

use approx::assert_relative_eq;
use labeled_rs::{ops, Dim, Dimensions, Error, Unit, Variable};

fn dims(pairs: &[(Dim, usize)]) -> Dimensions {
    Dimensions::new(pairs).unwrap()
}

#[test]
fn test_addition_with_variance() {
    let d = dims(&[(Dim::X, 2)]);
    let mut a =
        Variable::with_variances(d.clone(), Unit::counts(), vec![1.0, 2.0], vec![1.0, 1.0])
            .unwrap();
    let b = Variable::with_variances(d, Unit::counts(), vec![10.0, 20.0], vec![4.0, 9.0]).unwrap();
    ops::add_in_place(&mut a, &b).unwrap();
    assert_eq!(a.values::<f64>().unwrap(), &[11.0, 22.0]);
    assert_eq!(a.variances::<f64>().unwrap(), &[5.0, 10.0]);
}

#[test]
fn test_multiplication_with_variance() {
    let d = dims(&[(Dim::X, 1)]);
    let mut a = Variable::with_variances(d.clone(), Unit::counts(), vec![3.0], vec![1.0]).unwrap();
    let b = Variable::with_variances(d, Unit::dimensionless(), vec![2.0], vec![4.0]).unwrap();
    ops::mul_in_place(&mut a, &b).unwrap();
    assert_eq!(a.values::<f64>().unwrap(), &[6.0]);
    // sigma^2 = 1 * 2^2 + 4 * 3^2 = 40
    assert_eq!(a.variances::<f64>().unwrap(), &[40.0]);
}

#[test]
fn test_broadcast_addition() {
    let mut a = Variable::new(
        dims(&[(Dim::Y, 2), (Dim::X, 2)]),
        Unit::counts(),
        vec![1.0, 2.0, 3.0, 4.0],
    )
    .unwrap();
    let b = Variable::new(dims(&[(Dim::X, 2)]), Unit::counts(), vec![10.0, 20.0]).unwrap();
    ops::add_in_place(&mut a, &b).unwrap();
    assert_eq!(a.values::<f64>().unwrap(), &[11.0, 22.0, 13.0, 24.0]);
}

#[test]
fn test_bin_edge_iteration() {
    let edges = Variable::new(dims(&[(Dim::Tof, 3)]), Unit::us(), vec![0.2, 1.2, 2.2]).unwrap();
    let bins = edges.bins::<f64>(Dim::Tof).unwrap();
    assert_eq!(bins.len(), 2);
    assert_relative_eq!(bins[0].left, 0.2);
    assert_relative_eq!(bins[0].right, 1.2);
    assert_relative_eq!(bins[0].center(), 0.7);
    assert_relative_eq!(bins[0].width(), 1.0);
    assert_relative_eq!(bins[1].left, 1.2);
    assert_relative_eq!(bins[1].right, 2.2);
    assert_relative_eq!(bins[1].center(), 1.7);
}

#[test]
fn test_sparse_row_addition() {
    let mut d = Dimensions::empty();
    d.add_sparse(Dim::X).unwrap();
    let mut a =
        Variable::sparse_from_rows::<f64>(d.clone(), Unit::us(), vec![vec![1.1, 2.2]]).unwrap();
    let b = Variable::sparse_from_rows::<f64>(d.clone(), Unit::us(), vec![vec![3.3, 4.4]]).unwrap();
    ops::add_in_place(&mut a, &b).unwrap();
    let rows = a.sparse_values::<f64>().unwrap();
    assert_relative_eq!(rows[0][0], 4.4);
    assert_relative_eq!(rows[0][1], 6.6);

    let c = Variable::sparse_from_rows::<f64>(d, Unit::us(), vec![vec![1.0, 2.0, 3.0]]).unwrap();
    let err = ops::add_in_place(&mut a, &c).unwrap_err();
    assert!(matches!(err, Error::Shape(2, 3)));
}

#[test]
fn test_dataset_coord_mismatch() {
    use labeled_rs::Dataset;

    let build = |coord: Vec<f64>| {
        let mut d = Dataset::new();
        d.set_data(
            "data",
            Variable::new(dims(&[(Dim::X, 2)]), Unit::counts(), vec![10.0, 20.0]).unwrap(),
        )
        .unwrap();
        d.set_coord(
            Dim::X,
            Variable::new(dims(&[(Dim::X, 2)]), Unit::m(), coord).unwrap(),
        )
        .unwrap();
        d
    };
    let mut a = build(vec![0.0, 1.0]);
    let b = build(vec![0.0, 2.0]);
    let err = a.add_assign(&b).unwrap_err();
    assert!(matches!(err, Error::CoordMismatch(_)));
    assert_eq!(a["data"].data().values::<f64>().unwrap(), &[10.0, 20.0]);
}
