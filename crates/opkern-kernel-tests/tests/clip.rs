//! Clip across its two registrations: attribute bounds before opset 11,
//! tensor bounds afterwards. The registry must route each node version to
//! the right implementation.

use opkern_kernel_tests::OpTester;
use opkern::tensor::TensorShape;

#[test]
fn v6_clamps_with_attribute_bounds() {
    OpTester::new("Clip", 6)
        .attr("min", -1.0f32)
        .attr("max", 1.0f32)
        .input("x", [5], vec![-2.0f32, -0.5, 0.0, 0.5, 2.0])
        .expect_f32("y", [5], vec![-1.0, -0.5, 0.0, 0.5, 1.0])
        .run();
}

#[test]
fn v6_defaults_pass_everything_through() {
    OpTester::new("Clip", 6)
        .input("x", [3], vec![-1e30f32, 0.0, 1e30])
        .expect_f32("y", [3], vec![-1e30, 0.0, 1e30])
        .run();
}

#[test]
fn v6_registration_stops_before_opset_11() {
    // Version 12 must not fall back onto the attribute implementation when
    // only the v6 range would match; it resolves to the v11 registration,
    // which ignores attributes.
    OpTester::new("Clip", 12)
        .attr("min", -1.0f32)
        .attr("max", 1.0f32)
        .input("x", [2], vec![-5.0f32, 5.0])
        .expect_f32("y", [2], vec![-5.0, 5.0])
        .run();
}

#[test]
fn v11_clamps_with_tensor_bounds() {
    OpTester::new("Clip", 11)
        .input("x", [5], vec![-2.0f32, -0.5, 0.0, 0.5, 2.0])
        .input("min", TensorShape::scalar(), vec![-1.0f32])
        .input("max", TensorShape::scalar(), vec![1.0f32])
        .expect_f32("y", [5], vec![-1.0, -0.5, 0.0, 0.5, 1.0])
        .run();
}

#[test]
fn v11_min_only_leaves_the_upper_side_open() {
    OpTester::new("Clip", 11)
        .input("x", [3], vec![-2.0f32, 0.0, 2.0])
        .input("min", TensorShape::scalar(), vec![-1.0f32])
        .expect_f32("y", [3], vec![-1.0, 0.0, 2.0])
        .run();
}

#[test]
fn v11_skipped_min_still_reaches_max() {
    OpTester::new("Clip", 11)
        .input("x", [3], vec![-2.0f32, 0.0, 2.0])
        .absent_input()
        .input("max", TensorShape::scalar(), vec![1.0f32])
        .expect_f32("y", [3], vec![-2.0, 0.0, 1.0])
        .run();
}

#[test]
fn v11_without_bounds_is_the_identity() {
    OpTester::new("Clip", 11)
        .input("x", [3], vec![-2.0f32, 0.0, 2.0])
        .expect_f32("y", [3], vec![-2.0, 0.0, 2.0])
        .run();
}

#[test]
fn v11_rejects_non_scalar_bounds() {
    OpTester::new("Clip", 11)
        .input("x", [2], vec![-2.0f32, 2.0])
        .input("min", [2], vec![-1.0f32, -1.0])
        .expect_f32("y", [2], vec![-1.0, 2.0])
        .run_expect_error("must be a scalar tensor");
}

#[test]
fn opset_5_has_no_registration() {
    OpTester::new("Clip", 5)
        .input("x", [1], vec![0.0f32])
        .expect_f32("y", [1], vec![0.0])
        .run_expect_error("no registration matches version 5");
}
