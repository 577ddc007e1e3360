//! Variadic Sum through the shared registry.

use opkern_kernel_tests::OpTester;

#[test]
fn sums_two_inputs() {
    OpTester::new("Sum", 1)
        .input("a", [2, 2], vec![1.0f32, 2.0, 3.0, 4.0])
        .input("b", [2, 2], vec![10.0f32, 20.0, 30.0, 40.0])
        .input_arg_count(vec![2])
        .expect_f32("sum", [2, 2], vec![11.0, 22.0, 33.0, 44.0])
        .run();
}

#[test]
fn sums_a_longer_variadic_run() {
    OpTester::new("Sum", 1)
        .input("a", [3], vec![1.0f32, 1.0, 1.0])
        .input("b", [3], vec![2.0f32, 2.0, 2.0])
        .input("c", [3], vec![3.0f32, 3.0, 3.0])
        .input("d", [3], vec![4.0f32, 4.0, 4.0])
        .input_arg_count(vec![4])
        .expect_f32("sum", [3], vec![10.0, 10.0, 10.0])
        .run();
}

#[test]
fn single_input_is_the_identity() {
    OpTester::new("Sum", 1)
        .input("a", [2], vec![5.0f32, -5.0])
        .input_arg_count(vec![1])
        .expect_f32("sum", [2], vec![5.0, -5.0])
        .run();
}

#[test]
fn mismatched_shapes_are_rejected() {
    OpTester::new("Sum", 1)
        .input("a", [2], vec![1.0f32, 2.0])
        .input("b", [3], vec![1.0f32, 2.0, 3.0])
        .input_arg_count(vec![2])
        .expect_f32("sum", [2], vec![0.0, 0.0])
        .run_expect_error("input shapes differ");
}
