use provtensor_core::{Array, CpuStorage, DType, Device, Error, Graph};
use rand::{rngs::StdRng, Rng, SeedableRng};

macro_rules! test_for_device_dtype {
    ($dtype:ty, $dev:expr, $sample:expr, $add:expr, $mul:expr, $name:ident) => {
        mod $name {
            use super::*;

            fn expected_add(l: $dtype, r: $dtype) -> $dtype {
                let add: fn($dtype, $dtype) -> $dtype = $add;
                add(l, r)
            }

            fn expected_mul(l: $dtype, r: $dtype) -> $dtype {
                let mul: fn($dtype, $dtype) -> $dtype = $mul;
                mul(l, r)
            }

            fn random(graph: &Graph, rng: &mut StdRng, dims: [usize; 2]) -> Array {
                let sample: fn(&mut StdRng) -> $dtype = $sample;
                let data: Vec<$dtype> = (0..dims[0] * dims[1]).map(|_| sample(rng)).collect();
                Array::from_vec(graph, data, dims, &$dev).unwrap()
            }

            #[test]
            fn add() {
                let graph = Graph::empty();
                let mut rng = StdRng::seed_from_u64(0);
                let a = random(&graph, &mut rng, [3, 4]);
                let b = random(&graph, &mut rng, [3, 4]);
                let (a_before, b_before) =
                    (a.to_vec::<$dtype>().unwrap(), b.to_vec::<$dtype>().unwrap());

                let c = a.add(&b).unwrap();
                let expected: Vec<$dtype> = a_before
                    .iter()
                    .zip(&b_before)
                    .map(|(l, r)| expected_add(*l, *r))
                    .collect();
                assert_eq!(c.to_vec::<$dtype>().unwrap(), expected);
                assert_eq!(c.shape(), a.shape());
                assert_eq!(c.dtype(), a.dtype());
                assert!(!c.same_storage(&a));
                assert_eq!(a.to_vec::<$dtype>().unwrap(), a_before);
                assert_eq!(b.to_vec::<$dtype>().unwrap(), b_before);
            }

            #[test]
            fn mul() {
                let graph = Graph::empty();
                let mut rng = StdRng::seed_from_u64(1);
                let a = random(&graph, &mut rng, [2, 5]);
                let b = random(&graph, &mut rng, [2, 5]);
                let (a_before, b_before) =
                    (a.to_vec::<$dtype>().unwrap(), b.to_vec::<$dtype>().unwrap());

                let c = (&a * &b).unwrap();
                let expected: Vec<$dtype> = a_before
                    .iter()
                    .zip(&b_before)
                    .map(|(l, r)| expected_mul(*l, *r))
                    .collect();
                assert_eq!(c.to_vec::<$dtype>().unwrap(), expected);
                assert_eq!(a.to_vec::<$dtype>().unwrap(), a_before);
                assert_eq!(b.to_vec::<$dtype>().unwrap(), b_before);
            }

            #[test]
            fn iadd() {
                let graph = Graph::empty();
                let mut rng = StdRng::seed_from_u64(2);
                let mut a = random(&graph, &mut rng, [4, 4]);
                let b = random(&graph, &mut rng, [4, 4]);
                let a_before = a.to_vec::<$dtype>().unwrap();
                let old_node = a.node();

                let returned = a.iadd(&b).unwrap().node();
                assert_eq!(returned, a.node());
                assert_ne!(a.node(), old_node);
                let expected: Vec<$dtype> = a_before
                    .iter()
                    .zip(&b.to_vec::<$dtype>().unwrap())
                    .map(|(l, r)| expected_add(*l, *r))
                    .collect();
                assert_eq!(a.to_vec::<$dtype>().unwrap(), expected);
                assert_eq!(a.producer().unwrap().operands(), &[old_node, b.node()]);
            }

            #[test]
            fn imul() {
                let graph = Graph::empty();
                let mut rng = StdRng::seed_from_u64(3);
                let mut a = random(&graph, &mut rng, [1, 7]);
                let b = random(&graph, &mut rng, [1, 7]);
                let a_before = a.to_vec::<$dtype>().unwrap();

                a.imul(&b).unwrap();
                let expected: Vec<$dtype> = a_before
                    .iter()
                    .zip(&b.to_vec::<$dtype>().unwrap())
                    .map(|(l, r)| expected_mul(*l, *r))
                    .collect();
                assert_eq!(a.to_vec::<$dtype>().unwrap(), expected);
                assert_eq!(a.producer().unwrap().name(), "mul");
            }

            #[test]
            fn additive_identity() {
                let graph = Graph::empty();
                let mut rng = StdRng::seed_from_u64(4);
                let a = random(&graph, &mut rng, [3, 3]);
                let c = a.add(&a.zeros_like().unwrap()).unwrap();
                assert_eq!(c.to_vec::<$dtype>().unwrap(), a.to_vec::<$dtype>().unwrap());
            }

            #[test]
            fn multiplicative_identity() {
                let graph = Graph::empty();
                let mut rng = StdRng::seed_from_u64(5);
                let a = random(&graph, &mut rng, [3, 3]);
                let c = a.mul(&a.ones_like().unwrap()).unwrap();
                assert_eq!(c.to_vec::<$dtype>().unwrap(), a.to_vec::<$dtype>().unwrap());
            }

            #[test]
            fn add_into() {
                let graph = Graph::empty();
                let mut rng = StdRng::seed_from_u64(6);
                let a = random(&graph, &mut rng, [2, 2]);
                let b = random(&graph, &mut rng, [2, 2]);
                let mut out = a.zeros_like().unwrap();
                let expected = a.add(&b).unwrap().to_vec::<$dtype>().unwrap();

                a.add_into(&b, &mut out).unwrap();
                assert_eq!(out.to_vec::<$dtype>().unwrap(), expected);
                assert_eq!(out.producer().unwrap().operands(), &[a.node(), b.node()]);
            }

            #[test]
            fn shape_mismatch() {
                let graph = Graph::empty();
                let mut rng = StdRng::seed_from_u64(7);
                let a = random(&graph, &mut rng, [2, 3]);
                let b = random(&graph, &mut rng, [3, 2]);
                let nodes = graph.node_count();

                let err = a.add(&b).unwrap_err();
                assert!(matches!(err.inner(), Error::ShapeMismatch { op: "add", .. }));
                assert_eq!(graph.node_count(), nodes);
            }
        }
    };
}

test_for_device_dtype!(bool, Device::Cpu, |rng| rng.random(), |l, r| l | r, |l, r| l & r, cpu_bool);
test_for_device_dtype!(i8, Device::Cpu, |rng| rng.random(), i8::wrapping_add, i8::wrapping_mul, cpu_i8);
test_for_device_dtype!(i16, Device::Cpu, |rng| rng.random(), i16::wrapping_add, i16::wrapping_mul, cpu_i16);
test_for_device_dtype!(i32, Device::Cpu, |rng| rng.random(), i32::wrapping_add, i32::wrapping_mul, cpu_i32);
test_for_device_dtype!(i64, Device::Cpu, |rng| rng.random(), i64::wrapping_add, i64::wrapping_mul, cpu_i64);
test_for_device_dtype!(u8, Device::Cpu, |rng| rng.random(), u8::wrapping_add, u8::wrapping_mul, cpu_u8);
test_for_device_dtype!(f32, Device::Cpu, |rng| rng.random_range(-8.0..8.0), |l, r| l + r, |l, r| l * r, cpu_f32);
test_for_device_dtype!(f64, Device::Cpu, |rng| rng.random_range(-8.0..8.0), |l, r| l + r, |l, r| l * r, cpu_f64);
#[cfg(feature = "cuda")]
test_for_device_dtype!(f32, Device::new_cuda(0).unwrap(), |rng| rng.random_range(-8.0..8.0), |l, r| l + r, |l, r| l * r, cuda_f32);
#[cfg(feature = "cuda")]
test_for_device_dtype!(i64, Device::new_cuda(0).unwrap(), |rng| rng.random(), i64::wrapping_add, i64::wrapping_mul, cuda_i64);

#[test]
fn add_small_ints() {
    let graph = Graph::empty();
    let a = Array::from_vec(&graph, vec![1i32, 2], [2], &Device::Cpu).unwrap();
    let b = Array::from_vec(&graph, vec![3i32, 4], [2], &Device::Cpu).unwrap();
    assert_eq!(a.add(&b).unwrap().to_vec::<i32>().unwrap(), vec![4, 6]);
    assert_eq!((&a * &b).unwrap().to_vec::<i32>().unwrap(), vec![3, 8]);
}

#[test]
fn integers_wrap() {
    let graph = Graph::empty();
    let a = Array::from_vec(&graph, vec![i8::MAX, 100], [2], &Device::Cpu).unwrap();
    let b = Array::from_vec(&graph, vec![1i8, 2], [2], &Device::Cpu).unwrap();
    assert_eq!(a.add(&b).unwrap().to_vec::<i8>().unwrap(), vec![i8::MIN, 102]);
    assert_eq!(a.mul(&b).unwrap().to_vec::<i8>().unwrap(), vec![i8::MAX, -56]);
}

#[test]
fn bool_add_is_or_mul_is_and() {
    let graph = Graph::empty();
    let a = Array::from_vec(&graph, vec![true, true, false, false], [4], &Device::Cpu).unwrap();
    let b = Array::from_vec(&graph, vec![true, false, true, false], [4], &Device::Cpu).unwrap();
    assert_eq!(
        a.add(&b).unwrap().to_vec::<bool>().unwrap(),
        vec![true, true, true, false]
    );
    assert_eq!(
        a.mul(&b).unwrap().to_vec::<bool>().unwrap(),
        vec![true, false, false, false]
    );
}

#[test]
fn dtype_mismatch() {
    let graph = Graph::empty();
    let a = Array::from_vec(&graph, vec![1i32, 2], [2], &Device::Cpu).unwrap();
    let b = Array::from_vec(&graph, vec![1f32, 2.0], [2], &Device::Cpu).unwrap();
    let err = a.mul(&b).unwrap_err();
    assert!(matches!(
        err.inner(),
        Error::DTypeMismatch {
            op: "mul",
            lhs: DType::I32,
            rhs: DType::F32,
        }
    ));
    assert!(a.producer().is_none());
    assert_eq!(graph.op_count(), 0);
}

#[test]
fn dtype_is_checked_before_shape() {
    let graph = Graph::empty();
    let a = Array::from_vec(&graph, vec![1i32, 2], [2], &Device::Cpu).unwrap();
    let b = Array::from_vec(&graph, vec![1f64], [1], &Device::Cpu).unwrap();
    let err = a.add(&b).unwrap_err();
    assert!(matches!(err.inner(), Error::DTypeMismatch { .. }));
}

#[test]
fn failed_in_place_leaves_receiver_untouched() {
    let graph = Graph::empty();
    let mut a = Array::from_vec(&graph, vec![1i64, 2, 3, 4, 5, 6], [2, 3], &Device::Cpu).unwrap();
    let b = Array::from_vec(&graph, vec![1i64; 6], [3, 2], &Device::Cpu).unwrap();
    let node = a.node();
    let err = a.iadd(&b).unwrap_err();
    assert!(matches!(err.inner(), Error::ShapeMismatch { .. }));
    assert_eq!(a.node(), node);
    assert_eq!(a.to_vec::<i64>().unwrap(), vec![1, 2, 3, 4, 5, 6]);
}

#[test]
fn output_must_match_operands() {
    let graph = Graph::empty();
    let a = Array::from_vec(&graph, vec![1f32, 2.0], [2], &Device::Cpu).unwrap();
    let b = Array::from_vec(&graph, vec![3f32, 4.0], [2], &Device::Cpu).unwrap();
    let mut wrong_shape = Array::zeros(&graph, [3], DType::F32, &Device::Cpu).unwrap();
    let mut wrong_dtype = Array::zeros(&graph, [2], DType::F64, &Device::Cpu).unwrap();
    let before = wrong_shape.node();

    assert!(matches!(
        a.add_into(&b, &mut wrong_shape).unwrap_err().inner(),
        Error::ShapeMismatch { .. }
    ));
    assert!(matches!(
        a.mul_into(&b, &mut wrong_dtype).unwrap_err().inner(),
        Error::DTypeMismatch { .. }
    ));
    assert_eq!(wrong_shape.node(), before);
    assert_eq!(wrong_shape.to_vec::<f32>().unwrap(), vec![0.0; 3]);
}

#[test]
fn operands_from_different_graphs() {
    let a = Array::from_vec(&Graph::empty(), vec![1u8], [1], &Device::Cpu).unwrap();
    let b = Array::from_vec(&Graph::empty(), vec![1u8], [1], &Device::Cpu).unwrap();
    let err = a.add(&b).unwrap_err();
    assert!(matches!(err.inner(), Error::GraphMismatch { op: "add" }));
}

#[test]
fn self_assign_through_alias() {
    let graph = Graph::empty();
    let mut a = Array::from_vec(&graph, vec![1i32, 2, 3], [3], &Device::Cpu).unwrap();
    let alias = a.clone();
    let alias_node = alias.node();

    a.iadd(&alias).unwrap();
    assert_eq!(a.to_vec::<i32>().unwrap(), vec![2, 4, 6]);
    // Both handles see the new values, only the receiver gets a new node.
    assert_eq!(alias.to_vec::<i32>().unwrap(), vec![2, 4, 6]);
    assert_eq!(alias.node(), alias_node);
    assert_eq!(a.producer().unwrap().operands(), &[alias_node, alias_node]);
}

#[test]
fn add_into_aliasing_the_lhs() {
    let graph = Graph::empty();
    let a = Array::from_vec(&graph, vec![2f64, 3.0], [2], &Device::Cpu).unwrap();
    let b = Array::from_vec(&graph, vec![10f64, 10.0], [2], &Device::Cpu).unwrap();
    let mut out = a.clone();
    a.mul_into(&b, &mut out).unwrap();
    assert_eq!(out.to_vec::<f64>().unwrap(), vec![20.0, 30.0]);
    assert_eq!(a.to_vec::<f64>().unwrap(), vec![20.0, 30.0]);
    assert_ne!(out.node(), a.node());
}

#[test]
fn windowed_operands() {
    let graph = Graph::empty();
    let lhs = Array::new(
        &graph,
        [2],
        CpuStorage::from(vec![0u8, 0, 3, 4]),
        2,
        &Device::Cpu,
    )
    .unwrap();
    let rhs = Array::new(&graph, [2], CpuStorage::from(vec![5u8, 6, 0]), 0, &Device::Cpu).unwrap();
    assert_eq!(lhs.mul(&rhs).unwrap().to_vec::<u8>().unwrap(), vec![15, 24]);
}

#[test]
fn large_arrays_keep_order() {
    let graph = Graph::empty();
    let n = 100_000;
    let a = Array::from_vec(&graph, (0..n as i64).collect(), [n], &Device::Cpu).unwrap();
    let b = Array::from_vec(&graph, (0..n as i64).rev().collect(), [n], &Device::Cpu).unwrap();
    let c = a.add(&b).unwrap();
    assert_eq!(c.to_vec::<i64>().unwrap(), vec![n as i64 - 1; n]);
}
